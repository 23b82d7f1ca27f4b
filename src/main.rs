//! ogm - administration CLI
//!
//! Checks connectivity and inspects or clears the schema of the configured
//! Neo4j databases.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use graph_ogm::neo4j::{GraphDriver, Neo4jClient};
use graph_ogm::schema::SchemaReconciler;
use graph_ogm::{Config, RegistryBuilder};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ogm")]
#[command(about = "Graph OGM administration")]
struct Cli {
    /// Path to the YAML config (defaults to ./ogm.yaml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that every configured database answers
    Ping,

    /// Inspect or clear constraints and indexes
    Schema {
        #[command(subcommand)]
        action: SchemaAction,
    },
}

#[derive(Subcommand)]
enum SchemaAction {
    /// List constraints and indexes
    Show,

    /// Drop every constraint and index
    Drop {
        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,graph_ogm=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_yaml_and_env(cli.config.as_deref())?;
    let drivers = connect(&config).await?;

    match cli.command {
        Commands::Ping => run_ping(&drivers).await,
        Commands::Schema { action } => run_schema(&config, &drivers, action).await,
    }
}

async fn connect(config: &Config) -> Result<Vec<Neo4jClient>> {
    let mut drivers = Vec::new();
    for settings in config.connection_settings() {
        let target = settings.database.clone().unwrap_or_else(|| "default".into());
        let client = Neo4jClient::new(&settings)
            .await
            .with_context(|| format!("Failed to connect to database '{}'", target))?;
        drivers.push(client);
    }
    Ok(drivers)
}

async fn run_ping(drivers: &[Neo4jClient]) -> Result<()> {
    for driver in drivers {
        driver
            .ping()
            .await
            .with_context(|| format!("Ping failed on '{}'", driver.target_name()))?;
        println!("{}: ok", driver.target_name());
    }
    Ok(())
}

async fn run_schema(config: &Config, drivers: &[Neo4jClient], action: SchemaAction) -> Result<()> {
    // The admin tool maps no types; it only sees what the database reports.
    let registry = RegistryBuilder::new(config.primary_key.clone()).build()?;
    let reconciler = SchemaReconciler::new(&registry);

    match action {
        SchemaAction::Show => {
            for driver in drivers {
                let live = reconciler.live(driver).await?;
                println!("{}:", driver.target_name());
                for item in live.items() {
                    let kind = if item.is_constraint { "constraint" } else { "index" };
                    match &item.item {
                        Some(schema_item) => {
                            println!("  {} {} ({}): {}", kind, item.name, item.kind, schema_item)
                        }
                        None => println!("  {} {} ({})", kind, item.name, item.kind),
                    }
                }
            }
            Ok(())
        }
        SchemaAction::Drop { yes } => {
            if !yes {
                anyhow::bail!("Refusing to drop the schema without --yes");
            }
            for driver in drivers {
                let dropped = reconciler.drop_all(driver).await?;
                println!("{}: dropped {} items", driver.target_name(), dropped);
            }
            Ok(())
        }
    }
}
