//! Schema Registry CLI
//!
//! Commands for registering, inspecting and administering topic schemas.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use similar::{ChangeTag, TextDiff};
use topic_schemas::avro::definition_from_avro;
use topic_schemas::{CompatibilityStrategy, SchemaConfig, SchemaDefinition, SchemaRegistry};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-registry")]
#[command(about = "Compatibility-checked, append-only topic schema registry")]
struct Cli {
    /// Configuration file layered over the default locations
    #[arg(short, long)]
    config: Option<String>,

    /// Data directory (overrides the configured one)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a schema (JSON definition or .avsc) for a topic
    Register {
        topic: String,
        file: PathBuf,
    },

    /// Check a schema against a topic without registering it
    Check {
        topic: String,
        file: PathBuf,
    },

    /// Print one version of a topic's schema
    Get {
        topic: String,
        version: u64,
    },

    /// Print the latest schema of a topic
    Latest {
        topic: String,
    },

    /// List every version of a topic
    List {
        topic: String,
    },

    /// List topics with registered schemas
    Topics,

    /// Show or set a topic's compatibility strategy
    Strategy {
        topic: String,
        /// New strategy (e.g., BACKWARD, full_transitive)
        #[arg(short, long)]
        set: Option<CompatibilityStrategy>,
    },

    /// Set the compatibility strategy of a tenant/namespace
    NamespaceStrategy {
        namespace: String,
        #[arg(short, long)]
        set: CompatibilityStrategy,
    },

    /// Line diff of two versions' canonical form
    Diff {
        topic: String,
        from: u64,
        to: u64,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config =
        SchemaConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
    if let Some(dir) = cli.data_dir {
        config.registry.data_dir = dir;
        config.registry.durable = true;
    }

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let registry = SchemaRegistry::from_config(&config)
        .with_context(|| format!("opening registry at {:?}", config.data_dir()))?;

    match cli.command {
        Commands::Register { topic, file } => {
            let definition = read_definition(&file)?;
            let before = registry.list_all(&topic)?.len();
            let version = registry.register(&topic, &definition)?;

            if registry.list_all(&topic)?.len() == before {
                println!("♻️  Identical to {} of {}", version, topic);
            } else {
                println!("✅ Registered {} for {}", version, topic);
            }
            Ok(())
        }

        Commands::Check { topic, file } => {
            let definition = read_definition(&file)?;
            let result = registry.check(&topic, &definition)?;

            println!("📊 Compatibility check for {} under {}", topic, result.strategy);
            if result.checked_against.is_empty() {
                println!("   (no reference versions)");
            } else {
                let versions: Vec<String> =
                    result.checked_against.iter().map(|v| format!("v{}", v)).collect();
                println!("   against {}", versions.join(", "));
            }
            println!();

            if result.is_compatible() {
                println!("✅ Compatible");
                Ok(())
            } else {
                for violation in &result.violations {
                    println!("❌ {}", violation);
                }
                bail!("{} violation(s)", result.violations.len())
            }
        }

        Commands::Get { topic, version } => {
            let definition = registry.get_version(&topic, version)?;
            println!("{}", definition.to_json_pretty()?);
            Ok(())
        }

        Commands::Latest { topic } => {
            let latest = registry.get_latest(&topic)?;
            println!("📦 {} {}", topic, latest);
            println!("{}", latest.definition.to_json_pretty()?);
            Ok(())
        }

        Commands::List { topic } => {
            let versions = registry.list_all(&topic)?;

            if versions.is_empty() {
                println!("No schemas registered for {}.", topic);
            } else {
                println!("📚 Schemas of {} ({}):", topic, registry.get_strategy(&topic)?);
                let last = versions.len() - 1;
                for (i, v) in versions.iter().enumerate() {
                    let marker = if i == last { " (latest)" } else { "" };
                    let fields: Vec<String> = v
                        .definition
                        .fields
                        .iter()
                        .map(|f| format!("{}: {}", f.name, f.type_label()))
                        .collect();
                    println!(
                        "  {} {}{}  {{{}}}",
                        v,
                        v.created_at.format("%Y-%m-%d %H:%M:%S"),
                        marker,
                        fields.join(", ")
                    );
                }
            }
            Ok(())
        }

        Commands::Topics => {
            let topics = registry.topics();
            if topics.is_empty() {
                println!("No topics registered yet.");
            } else {
                println!("📚 Topics:");
                for topic in topics {
                    let latest = registry.get_latest(topic.as_str())?;
                    let strategy = registry.get_strategy(topic.as_str())?;
                    println!("  {} [{}] latest {}", topic, strategy, latest);
                }
            }
            Ok(())
        }

        Commands::Strategy { topic, set } => {
            if let Some(strategy) = set {
                registry.set_strategy(&topic, strategy)?;
                println!("✅ {} now uses {}", topic, strategy);
            } else {
                println!("{}", registry.get_strategy(&topic)?);
            }
            Ok(())
        }

        Commands::NamespaceStrategy { namespace, set } => {
            registry.set_namespace_strategy(&namespace, set)?;
            println!("✅ Namespace {} now uses {}", namespace, set);
            Ok(())
        }

        Commands::Diff { topic, from, to } => {
            let old = registry.get_version(&topic, from)?.canonical().to_json_pretty()?;
            let new = registry.get_version(&topic, to)?.canonical().to_json_pretty()?;

            println!("📊 {} v{} -> v{}", topic, from, to);
            let diff = TextDiff::from_lines(&old, &new);
            for change in diff.iter_all_changes() {
                let sign = match change.tag() {
                    ChangeTag::Delete => "-",
                    ChangeTag::Insert => "+",
                    ChangeTag::Equal => " ",
                };
                print!("{}{}", sign, change);
            }
            Ok(())
        }
    }
}

/// Load a definition, treating `.avsc` files as AVRO
fn read_definition(path: &Path) -> Result<SchemaDefinition> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    let definition = match path.extension().and_then(|e| e.to_str()) {
        Some("avsc") => definition_from_avro(&content)?,
        _ => SchemaDefinition::from_json(&content)?,
    };
    Ok(definition)
}
