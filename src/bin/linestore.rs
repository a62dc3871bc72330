//! linestore CLI
//!
//! Query and modify a record log from the command line.

use clap::{Parser, Subcommand};
use linestore::{FieldMatch, Store, StoreConfig};
use serde_json::Value;
use tracing_subscriber::{fmt, EnvFilter};

/// linestore CLI
#[derive(Parser, Debug)]
#[command(name = "linestore")]
#[command(about = "Embedded line-log record store")]
#[command(version)]
struct Args {
    /// Log file
    #[arg(short, long, default_value = "./store.log")]
    file: String,

    /// Field searched by $text queries (repeatable)
    #[arg(short = 't', long = "text-field")]
    text_fields: Vec<String>,

    /// Test only the first field of multi-field query objects
    #[arg(long)]
    first_field: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print matching records, one JSON object per line
    Find {
        /// Query as JSON, e.g. '{"id": {"$eq": 1}}'
        #[arg(default_value = "{}")]
        query: String,

        /// Options as JSON, e.g. '{"sort": {"name": 1}}'
        #[arg(short, long)]
        options: Option<String>,
    },

    /// Append a record
    Insert {
        /// Record as a JSON object
        record: String,
    },

    /// Tombstone matching records
    Delete {
        /// Query as JSON
        query: String,
    },

    /// Print record counts
    Stats,
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let field_match = if args.first_field {
        FieldMatch::FirstField
    } else {
        FieldMatch::AllFields
    };
    let config = StoreConfig::builder()
        .path(&args.file)
        .text_fields(args.text_fields)
        .field_match(field_match)
        .build();
    let store: Store<Value> = Store::open(config)?;

    match args.command {
        Commands::Find { query, options } => {
            let query: Value = serde_json::from_str(&query)?;
            let options: Option<Value> = options.as_deref().map(serde_json::from_str).transpose()?;
            for record in store.find_json(&query, options.as_ref())? {
                println!("{}", Value::Object(record));
            }
        }
        Commands::Insert { record } => {
            let record: Value = serde_json::from_str(&record)?;
            store.insert(&record)?;
        }
        Commands::Delete { query } => {
            let query: Value = serde_json::from_str(&query)?;
            let deleted = store.delete_json(&query)?;
            println!("{}", serde_json::json!({ "deleted": deleted }));
        }
        Commands::Stats => {
            println!("{}", serde_json::to_string(&store.stats()?)?);
        }
    }
    Ok(())
}
