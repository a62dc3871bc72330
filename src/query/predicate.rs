//! Compilation of queries into record predicates.

use crate::query::model::{Criteria, Query};
use crate::query::value::{natural_cmp, scalar_eq, searchable_text};
use crate::types::Document;
use serde_json::Value;
use std::cmp::Ordering;

/// A compiled query.
pub type Predicate = Box<dyn Fn(&Document) -> bool + Send + Sync>;

/// How a query object with several field keys is evaluated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FieldMatch {
    /// Every field's criteria must hold.
    #[default]
    AllFields,
    /// Only the first field, in the order written, is tested and the rest
    /// are ignored. For callers that depend on first-key-wins queries.
    FirstField,
}

impl Criteria {
    /// Test a record's field value. A missing field never matches.
    pub fn matches(&self, value: Option<&Value>) -> bool {
        let Some(value) = value else {
            return false;
        };
        match self {
            Criteria::In(options) => options.iter().any(|o| scalar_eq(value, o)),
            Criteria::Eq(operand) => scalar_eq(value, operand),
            Criteria::Gt(operand) => natural_cmp(value, operand) == Some(Ordering::Greater),
            Criteria::Lt(operand) => natural_cmp(value, operand) == Some(Ordering::Less),
        }
    }
}

/// Compile a query into a predicate.
///
/// `text_fields` lists the fields searched by `$text`.
pub fn compile(query: &Query, text_fields: &[String], mode: FieldMatch) -> Predicate {
    match query {
        Query::Text(term) => compile_text(term, text_fields),
        Query::And(branches) => {
            let predicates = compile_all(branches, text_fields, mode);
            Box::new(move |doc| predicates.iter().all(|p| p(doc)))
        }
        Query::Or(branches) => {
            let predicates = compile_all(branches, text_fields, mode);
            Box::new(move |doc| predicates.iter().any(|p| p(doc)))
        }
        Query::Fields(fields) => compile_fields(fields, mode),
    }
}

fn compile_all(branches: &[Query], text_fields: &[String], mode: FieldMatch) -> Vec<Predicate> {
    branches
        .iter()
        .map(|q| compile(q, text_fields, mode))
        .collect()
}

fn compile_fields(fields: &[(String, Criteria)], mode: FieldMatch) -> Predicate {
    let fields: Vec<(String, Criteria)> = match mode {
        FieldMatch::AllFields => fields.to_vec(),
        FieldMatch::FirstField => fields.iter().take(1).cloned().collect(),
    };

    // An empty set accepts everything
    Box::new(move |doc| {
        fields
            .iter()
            .all(|(name, criteria)| criteria.matches(doc.get(name)))
    })
}

fn compile_text(term: &str, text_fields: &[String]) -> Predicate {
    let term = term.to_lowercase();
    let fields = text_fields.to_vec();

    Box::new(move |doc| {
        fields.iter().any(|field| {
            doc.get(field)
                .and_then(searchable_text)
                .map_or(false, |text| {
                    text.split_whitespace()
                        .any(|token| token.to_lowercase() == term)
                })
        })
    })
}
