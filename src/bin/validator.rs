//! Type Validator CLI
//!
//! Validates records against type definitions and inspects catalog snapshots.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use master_data::field::RESERVED_FIELD_PREFIX;
use master_data::{
    build_attribute_map, resolve_schema_for_input, AttributeMap, Catalog, CatalogSnapshot,
    EngineConfig, EngineError, Resolution, Schema, SchemaInput,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "type-validator")]
#[command(about = "Validate records against runtime type definitions")]
struct Cli {
    /// Config file to load (optional)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a record and print its normalized attributes
    Validate {
        /// Type definition (JSON)
        #[arg(short, long)]
        schema: PathBuf,
        /// Raw record attributes (JSON object)
        #[arg(short, long)]
        record: PathBuf,
    },

    /// Print the JSON Schema of a type
    JsonSchema {
        /// Type definition (JSON)
        #[arg(short, long)]
        schema: PathBuf,
    },

    /// Print the records of a catalog snapshot as a table
    Table {
        /// Catalog snapshot (JSON)
        #[arg(long)]
        catalog: PathBuf,
        /// Only show records of this type
        #[arg(short = 't', long = "type")]
        type_name: Option<String>,
        /// Only show rows containing this text
        #[arg(short, long)]
        search: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve a typed name against a catalog snapshot
    Resolve {
        /// Catalog snapshot (JSON)
        #[arg(long)]
        catalog: PathBuf,
        /// Type name as typed by a user
        name: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse JSON in {}", path.display()))
}

fn load_catalog(path: &Path, config: EngineConfig) -> anyhow::Result<Catalog> {
    let snapshot: CatalogSnapshot = read_json(path)?;
    Ok(Catalog::from_snapshot(snapshot, config)?)
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = EngineConfig::load_from(cli.config.as_deref())?;

    match cli.command {
        Commands::Validate { schema, record } => {
            let schema: Schema = read_json(&schema)?;
            let raw: AttributeMap = read_json(&record)?;

            match build_attribute_map(&raw, &schema) {
                Ok(attributes) => {
                    println!("{}", serde_json::to_string_pretty(&attributes)?);
                }
                Err(EngineError::SchemaValidation(errors)) => {
                    println!("❌ Record is not a valid {}", schema.name());
                    for error in &errors {
                        println!("   └─ {}", error);
                    }
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            }
            Ok(())
        }

        Commands::JsonSchema { schema } => {
            let schema: Schema = read_json(&schema)?;
            println!("{}", serde_json::to_string_pretty(&schema.to_json_schema())?);
            Ok(())
        }

        Commands::Table { catalog, type_name, search, json } => {
            let catalog = load_catalog(&catalog, config)?;

            let filter = match type_name.as_deref() {
                None => None,
                Some(name) => match resolve_schema_for_input(
                    SchemaInput::Name(name),
                    catalog.types(),
                    &catalog.config().fields.primary_field_name,
                )? {
                    Resolution::Existing(schema) | Resolution::RejectedInactive(schema) => Some(schema.id()),
                    Resolution::NewRequest(_) => bail!("No type named {:?}", name),
                },
            };

            let mut table = catalog.table(filter);
            if let Some(text) = search {
                table = table.search(&text);
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&table.flat_rows())?);
            } else {
                let header: Vec<&str> = table
                    .columns
                    .iter()
                    .map(|column| column.trim_start_matches(RESERVED_FIELD_PREFIX))
                    .collect();
                println!("{}", header.join("\t"));
                for row in table.flat_rows() {
                    let cells: Vec<String> = table
                        .columns
                        .iter()
                        .map(|column| match row.get(column) {
                            Some(serde_json::Value::String(s)) => s.clone(),
                            Some(value) => value.to_string(),
                            None => String::new(),
                        })
                        .collect();
                    println!("{}", cells.join("\t"));
                }
                println!();
                println!("{} record(s)", table.len());
            }
            Ok(())
        }

        Commands::Resolve { catalog, name } => {
            let catalog = load_catalog(&catalog, config)?;

            match resolve_schema_for_input(
                SchemaInput::Name(&name),
                catalog.types(),
                &catalog.config().fields.primary_field_name,
            )? {
                Resolution::Existing(schema) => {
                    println!("✅ {} resolves to existing type {} ({})", name, schema.name(), schema.id());
                    for field in schema.fields() {
                        let marker = if field.is_primary() { " [primary]" } else if field.is_mandatory() { " [mandatory]" } else { "" };
                        println!("   └─ {} ({}){}", field.name(), field.kind(), marker);
                    }
                }
                Resolution::NewRequest(draft) => {
                    println!("🆕 {} is a new type", draft.name());
                    for field in draft.fields() {
                        println!("   └─ {} ({}) [primary]", field.name(), field.kind());
                    }
                }
                Resolution::RejectedInactive(schema) => {
                    println!("❌ {}", EngineError::InactiveSchema(schema.name().to_string()));
                    std::process::exit(1);
                }
            }
            Ok(())
        }
    }
}
