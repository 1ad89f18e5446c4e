mod commands;
mod release;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use idem_core::{AppConfigTrait, ConfigSource, LoggingConfig, MigrateConfig};
use idem_migrate::SplitMode;

use commands::*;

#[derive(Parser)]
#[command(name = "idem")]
#[command(version, about = "Idempotent schema migration runner")]
struct Cli {
    /// Database URL (overrides DATABASE_URL)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply or inspect schema migrations
    Migrate {
        #[command(subcommand)]
        migrate_command: MigrateCommands,
    },

    /// Inspect the live schema
    Schema {
        #[command(subcommand)]
        schema_command: SchemaCommands,
    },
}

#[derive(Subcommand)]
enum MigrateCommands {
    /// Run the release plan (or a YAML plan file)
    Run {
        /// YAML plan file; the built-in release plan is used when omitted
        #[arg(long)]
        plan: Option<PathBuf>,

        /// Keep running the remaining steps after a failed step
        #[arg(long)]
        continue_on_failure: bool,

        /// Statement splitting: naive or quote-aware
        #[arg(long)]
        split_mode: Option<SplitMode>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Evaluate preconditions without executing anything
    Status {
        /// YAML plan file; the built-in release plan is used when omitted
        #[arg(long)]
        plan: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum SchemaCommands {
    /// Show the columns of a table
    Describe {
        /// Table name, optionally schema qualified
        table: String,
    },

    /// Write CREATE TABLE statements for a list of tables
    Dump {
        /// Comma separated tables (defaults to IDEM_DUMP_TABLES)
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,

        /// Output file (defaults to IDEM_DUMP_OUTPUT)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let dotenv = dotenvy::dotenv();

    let mut config = MigrateConfig::from_env().context("invalid configuration")?;
    if let Some(url) = &cli.database_url {
        config.database_url = Some(url.clone());
        config.validate().context("invalid --database-url")?;
    }

    idem_core::init_logging(&LoggingConfig::from_config(&config))?;

    match dotenv {
        Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!("Ignoring unreadable .env file: {}", e),
    }

    let mut sources = config.config_sources();
    if cli.database_url.is_some() {
        sources.insert(
            "database_url".to_string(),
            ConfigSource::CommandLine("--database-url".to_string()),
        );
    }
    let mut fields: Vec<_> = sources.into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    for (field, source) in fields {
        tracing::debug!("config {}: {}", field, source);
    }

    if config.environment.is_production() {
        tracing::warn!("Running against the {} environment", config.environment);
    }

    match cli.command {
        Commands::Migrate { migrate_command } => match migrate_command {
            MigrateCommands::Run {
                plan,
                continue_on_failure,
                split_mode,
                json,
            } => {
                if continue_on_failure {
                    config.continue_on_failure = true;
                }
                let status = migrate::run(&config, plan.as_deref(), split_mode, json).await?;
                Ok(status.exit_code())
            }
            MigrateCommands::Status { plan } => migrate::status(&config, plan.as_deref()).await,
        },
        Commands::Schema { schema_command } => match schema_command {
            SchemaCommands::Describe { table } => {
                schema::describe(&config, &table).await?;
                Ok(0)
            }
            SchemaCommands::Dump { tables, output } => {
                let failed = schema::dump(&config, tables, output).await?;
                Ok(if failed == 0 { 0 } else { 2 })
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_migrate_run() {
        let cli = Cli::try_parse_from([
            "idem",
            "migrate",
            "run",
            "--plan",
            "release.yaml",
            "--continue-on-failure",
            "--split-mode",
            "quote-aware",
        ])
        .unwrap();

        match cli.command {
            Commands::Migrate {
                migrate_command:
                    MigrateCommands::Run {
                        plan,
                        continue_on_failure,
                        split_mode,
                        json,
                    },
            } => {
                assert_eq!(plan, Some(PathBuf::from("release.yaml")));
                assert!(continue_on_failure);
                assert_eq!(split_mode, Some(SplitMode::QuoteAware));
                assert!(!json);
            }
            _ => panic!("expected migrate run"),
        }
    }

    #[test]
    fn test_global_database_url() {
        let cli = Cli::try_parse_from([
            "idem",
            "schema",
            "describe",
            "users",
            "--database-url",
            "mysql://root@localhost/app",
        ])
        .unwrap();
        assert_eq!(cli.database_url.as_deref(), Some("mysql://root@localhost/app"));
    }

    #[test]
    fn test_parse_dump_tables() {
        let cli = Cli::try_parse_from(["idem", "schema", "dump", "--tables", "users, orders"]).unwrap();
        match cli.command {
            Commands::Schema {
                schema_command: SchemaCommands::Dump { tables, output },
            } => {
                assert_eq!(tables, vec!["users", " orders"]);
                assert!(output.is_none());
            }
            _ => panic!("expected schema dump"),
        }
    }

    #[test]
    fn test_invalid_split_mode_rejected() {
        assert!(Cli::try_parse_from(["idem", "migrate", "run", "--split-mode", "smart"]).is_err());
    }
}
