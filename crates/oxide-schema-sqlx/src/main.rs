//! oxide-schema CLI
//!
//! Prints, checks and syncs the demo schema, and runs the query demo
//! against a SQLite database.

use clap::{Parser, Subcommand};
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

use oxide_schema_core::sync::SyncOptions;
use oxide_schema_sqlx::{DatabaseConfig, demo};

/// Schema sync and query demo for oxide-schema.
#[derive(Parser)]
#[command(name = "oxide-schema")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (SQLite path or connection string).
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:db.sqlite3")]
    database: String,

    /// Backend used to render SQL.
    #[arg(short, long, env = "DATABASE_BACKEND", default_value = "sqlite")]
    backend: String,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the CREATE statements of the demo tables.
    Schema,

    /// Report how the database differs from the demo tables.
    Check,

    /// Bring the database in line with the demo tables.
    Sync {
        /// Show SQL without executing (dry run).
        #[arg(long)]
        dry_run: bool,

        /// Drop columns the tables no longer declare.
        #[arg(long)]
        drop_removed_columns: bool,
    },

    /// Sync the demo tables, then run inserts, updates and queries.
    Demo,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = DatabaseConfig {
        url: cli.database,
        backend: cli.backend,
        ..DatabaseConfig::from_env()?
    };
    let backend = config.backend()?;
    let tables = demo::tables(backend)?;

    match cli.command {
        Commands::Schema => {
            for table in &tables {
                for sql in table.create_sql() {
                    println!("{sql}");
                }
                println!();
            }
        }

        Commands::Check => {
            let conn = config.connect().await?;
            let options = SyncOptions::default();
            for table in &tables {
                let report = table.check_sync(&conn, &options).await?;
                if report.is_in_sync() {
                    println!(" [X] {}", report.table);
                } else {
                    println!(" [ ] {}", report.table);
                    for reason in &report.reasons {
                        println!("       {reason}");
                    }
                }
            }
        }

        Commands::Sync {
            dry_run,
            drop_removed_columns,
        } => {
            let conn = config.connect().await?;
            let options = SyncOptions {
                drop_removed_columns,
                ..SyncOptions::default()
            };
            if dry_run {
                info!("Dry run mode - SQL will be printed but not executed.");
            }
            for table in &tables {
                if dry_run {
                    let report = table.check_sync(&conn, &options).await?;
                    for sql in table.commit_sql(&report, &options)? {
                        println!("{sql}");
                    }
                    continue;
                }
                let outcome = table.sync(&conn, &options).await?;
                if outcome.after.needs_commit() {
                    warn!(table = %table.name(), "Table still differs after sync");
                }
                for sql in &outcome.statements {
                    println!("{sql}");
                }
            }
        }

        Commands::Demo => {
            let conn = config.connect().await?;
            for table in &tables {
                table.sync(&conn, &SyncOptions::default()).await?;
            }
            demo::run(&conn, backend).await?;
        }
    }

    Ok(())
}
