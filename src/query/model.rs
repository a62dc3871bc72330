//! Query expression tree.
//!
//! Queries are usually written as JSON objects in the familiar document
//! store dialect:
//!
//! ```text
//! {"age": {"$gt": 30}}
//! {"$text": "rust"}
//! {"$and": [{"role": {"$eq": "admin"}}, {"$or": [{"id": {"$in": [1, 2]}}, {"$text": "ops"}]}]}
//! ```
//!
//! [`Query::from_json`] turns that form into the typed tree below.

use crate::error::{Result, StoreError};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

pub const GT: &str = "$gt";
pub const LT: &str = "$lt";
pub const EQ: &str = "$eq";
pub const IN: &str = "$in";
pub const TEXT: &str = "$text";
pub const AND: &str = "$and";
pub const OR: &str = "$or";

/// A single-field comparison.
#[derive(Clone, Debug, PartialEq)]
pub enum Criteria {
    Gt(Value),
    Lt(Value),
    Eq(Value),
    In(Vec<Value>),
}

impl Criteria {
    /// Parse a criteria object such as `{"$gt": 5}`.
    ///
    /// Operators are looked up in the order `$in`, `$eq`, `$gt`, `$lt` and
    /// the first one present is used. Returns `Ok(None)` when none of them
    /// is present.
    pub fn from_json(value: &Value) -> Result<Option<Self>> {
        let Some(object) = value.as_object() else {
            return Ok(None);
        };

        if let Some(operand) = object.get(IN) {
            let items = operand.as_array().ok_or_else(|| {
                StoreError::InvalidQuery(format!("{} expects an array, got {}", IN, operand))
            })?;
            return Ok(Some(Criteria::In(items.clone())));
        }
        if let Some(operand) = object.get(EQ) {
            return Ok(Some(Criteria::Eq(operand.clone())));
        }
        if let Some(operand) = object.get(GT) {
            return Ok(Some(Criteria::Gt(operand.clone())));
        }
        if let Some(operand) = object.get(LT) {
            return Ok(Some(Criteria::Lt(operand.clone())));
        }
        Ok(None)
    }

    pub fn to_json(&self) -> Value {
        let (op, operand) = match self {
            Criteria::Gt(v) => (GT, v.clone()),
            Criteria::Lt(v) => (LT, v.clone()),
            Criteria::Eq(v) => (EQ, v.clone()),
            Criteria::In(vs) => (IN, Value::Array(vs.clone())),
        };
        let mut object = Map::new();
        object.insert(op.to_string(), operand);
        Value::Object(object)
    }
}

/// A query node.
#[derive(Clone, Debug, PartialEq)]
pub enum Query {
    /// Per-field criteria, in the order they were written.
    Fields(Vec<(String, Criteria)>),
    /// Whole-token, case-insensitive search over the store's text fields.
    Text(String),
    And(Vec<Query>),
    Or(Vec<Query>),
}

impl Query {
    /// Matches every record.
    pub fn all() -> Self {
        Query::Fields(Vec::new())
    }

    pub fn field(name: impl Into<String>, criteria: Criteria) -> Self {
        Query::Fields(vec![(name.into(), criteria)])
    }

    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Criteria)>,
        S: Into<String>,
    {
        Query::Fields(fields.into_iter().map(|(n, c)| (n.into(), c)).collect())
    }

    pub fn eq(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(name, Criteria::Eq(value.into()))
    }

    pub fn gt(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(name, Criteria::Gt(value.into()))
    }

    pub fn lt(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(name, Criteria::Lt(value.into()))
    }

    pub fn is_in<I, V>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::field(name, Criteria::In(values.into_iter().map(Into::into).collect()))
    }

    pub fn text(term: impl Into<String>) -> Self {
        Query::Text(term.into())
    }

    pub fn and(queries: impl IntoIterator<Item = Query>) -> Self {
        Query::And(queries.into_iter().collect())
    }

    pub fn or(queries: impl IntoIterator<Item = Query>) -> Self {
        Query::Or(queries.into_iter().collect())
    }

    /// Parse a JSON query object.
    ///
    /// One object may mix `$text`, `$and`, `$or` and field keys. Only one
    /// of them takes effect, checked in that order; field criteria apply
    /// only when none of the operators is present.
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            StoreError::InvalidQuery(format!("expected a query object, got {}", value))
        })?;

        if let Some(term) = object.get(TEXT) {
            return term.as_str().map(Query::text).ok_or_else(|| {
                StoreError::InvalidQuery(format!("{} expects a string, got {}", TEXT, term))
            });
        }
        if let Some(branches) = object.get(AND) {
            return Ok(Query::And(parse_branches(AND, branches)?));
        }
        if let Some(branches) = object.get(OR) {
            return Ok(Query::Or(parse_branches(OR, branches)?));
        }

        let mut fields = Vec::with_capacity(object.len());
        for (name, criteria) in object {
            match Criteria::from_json(criteria)? {
                Some(criteria) => fields.push((name.clone(), criteria)),
                None => return Err(StoreError::UnknownFilter(value.to_string())),
            }
        }
        Ok(Query::Fields(fields))
    }

    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        match self {
            Query::Fields(fields) => {
                for (name, criteria) in fields {
                    object.insert(name.clone(), criteria.to_json());
                }
            }
            Query::Text(term) => {
                object.insert(TEXT.to_string(), Value::String(term.clone()));
            }
            Query::And(branches) => {
                object.insert(AND.to_string(), branches_to_json(branches));
            }
            Query::Or(branches) => {
                object.insert(OR.to_string(), branches_to_json(branches));
            }
        }
        Value::Object(object)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl FromStr for Query {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(s)
            .map_err(|e| StoreError::InvalidQuery(format!("query is not valid JSON: {}", e)))?;
        Query::from_json(&value)
    }
}

impl TryFrom<&Value> for Query {
    type Error = StoreError;

    fn try_from(value: &Value) -> Result<Self> {
        Query::from_json(value)
    }
}

fn parse_branches(op: &str, value: &Value) -> Result<Vec<Query>> {
    let items = value.as_array().ok_or_else(|| {
        StoreError::InvalidQuery(format!("{} expects an array of queries, got {}", op, value))
    })?;
    items.iter().map(Query::from_json).collect()
}

fn branches_to_json(branches: &[Query]) -> Value {
    Value::Array(branches.iter().map(Query::to_json).collect())
}
