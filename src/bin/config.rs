//! Type Config CLI
//!
//! View and manage type engine configuration.

use clap::{Parser, Subcommand};
use master_data::EngineConfig;

#[derive(Parser)]
#[command(name = "type-config")]
#[command(about = "View and manage type engine configuration")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show current configuration
    Show {
        /// Config file to load (optional)
        #[arg(short, long)]
        config: Option<String>,

        /// Output as TOML
        #[arg(long)]
        toml: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Initialize a new config file
    Init {
        /// Output path (default: master_data.toml)
        #[arg(short, long, default_value = "master_data.toml")]
        output: String,
    },

    /// Validate configuration
    Validate {
        /// Config file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Show { config, toml, json } => {
            let cfg = EngineConfig::load_from(config.as_deref())?;

            if json {
                println!("{}", serde_json::to_string_pretty(&cfg)?);
            } else if toml {
                println!("{}", ::toml::to_string_pretty(&cfg)?);
            } else {
                println!("📋 Type Engine Configuration\n");
                println!("Catalog:");
                println!("  Max type name length: {}", cfg.catalog.max_type_name_length);
                println!("  Record id width: {}", cfg.catalog.record_id_width);
                println!("  Ad-hoc attributes: {:?}", cfg.catalog.adhoc_attributes);

                println!("\nFields:");
                println!("  Primary field name: {}", cfg.fields.primary_field_name);

                println!("\nDisplay:");
                println!("  Summary separator: {:?}", cfg.display.summary_separator);
                println!("  Unknown type label: {}", cfg.display.unknown_type_label);
            }
        }

        Commands::Init { output } => {
            let cfg = EngineConfig::default();
            cfg.save(&output)?;
            println!("✅ Created config file: {}", output);
        }

        Commands::Validate { config } => match EngineConfig::load_from(config.as_deref()) {
            Ok(cfg) => {
                let problems = cfg.problems();
                if problems.is_empty() {
                    println!("✅ Configuration is valid");
                    println!("   Primary field: {}", cfg.fields.primary_field_name);
                    println!("   Ad-hoc attributes: {:?}", cfg.catalog.adhoc_attributes);
                } else {
                    eprintln!("❌ Configuration has {} problem(s):", problems.len());
                    for problem in problems {
                        eprintln!("   └─ {}", problem);
                    }
                    std::process::exit(1);
                }
            }
            Err(e) => {
                eprintln!("❌ Configuration error: {}", e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
