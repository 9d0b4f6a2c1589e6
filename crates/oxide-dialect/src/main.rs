//! oxide-dialect CLI
//!
//! Inspects a backend through its dialect.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_dialect::config::DEFAULT_MAX_CONNECTIONS;
use oxide_dialect::prelude::*;

/// Backend dialects for the oxide ORM.
#[derive(Parser)]
#[command(name = "oxide-dialect")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Driver name (postgres, cassandra, or any sqlx driver).
    #[arg(long, env = "OXIDE_DB_DRIVER", default_value = "sqlite")]
    driver: String,

    /// Data source descriptor.
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite::memory:")]
    dsn: String,

    /// Maximum pooled connections.
    #[arg(long, env = "OXIDE_DB_MAX_CONNECTIONS", default_value_t = DEFAULT_MAX_CONNECTIONS)]
    max_connections: u32,

    /// JSON configuration file; overrides driver, DSN and pool size.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the column type for a native kind.
    Tag {
        /// Native kind (bool, int32, int64, string, timestamp, uuid, ...).
        kind: String,

        /// Declared field width.
        #[arg(short, long, default_value_t = 0)]
        size: usize,

        /// Request an auto-increment column.
        #[arg(short, long)]
        auto_increment: bool,
    },

    /// Check whether a table exists.
    HasTable {
        table: String,
    },

    /// Check whether a column exists.
    HasColumn {
        table: String,
        column: String,
    },

    /// Check whether an index exists.
    HasIndex {
        table: String,
        index: String,
    },

    /// Run a statement and print the affected row count.
    Exec {
        sql: String,
    },

    /// Run a query and print its rows, tab separated.
    Query {
        sql: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &cli.config {
        Some(path) => DialectConfig::from_json_file(path)?,
        None => DialectConfig::new(&cli.driver, &cli.dsn).max_connections(cli.max_connections),
    };

    if let Commands::Tag {
        kind,
        size,
        auto_increment,
    } = &cli.command
    {
        let native_kind = NativeKind::parse(kind)
            .ok_or_else(|| anyhow::anyhow!("unknown native kind: {kind}"))?;
        let dialect = build(&config);
        let tag = dialect.sql_tag(&NativeType::new(native_kind, kind.clone()), *size, *auto_increment)?;
        println!("{tag}");
        return Ok(());
    }

    let mut dialect = open(&config).await?;
    let outcome = run(dialect.as_mut(), cli.command).await;
    dialect.close_db().await?;
    outcome
}

async fn run(dialect: &mut dyn Dialect, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Tag { .. } => {}

        Commands::HasTable { table } => {
            println!("{}", dialect.has_table(&table).await?);
        }

        Commands::HasColumn { table, column } => {
            println!("{}", dialect.has_column(&table, &column).await?);
        }

        Commands::HasIndex { table, index } => {
            println!("{}", dialect.has_index(&table, &index).await?);
        }

        Commands::Exec { sql } => {
            let result = dialect.exec(&sql, &[]).await?;
            info!(rows = result.rows_affected(), "Statement executed");
            println!("{}", result.rows_affected());
        }

        Commands::Query { sql } => {
            let mut rows = dialect.query(&sql, &[]).await?;
            let mut header = false;
            while rows.next() {
                if !header {
                    println!("{}", rows.columns()?.join("\t"));
                    header = true;
                }
                let values: Vec<SqlValue> = rows.scan()?;
                let line: Vec<String> = values.iter().map(render).collect();
                println!("{}", line.join("\t"));
            }
            if let Some(err) = rows.err() {
                anyhow::bail!("query interrupted: {err}");
            }
        }
    }

    Ok(())
}

fn render(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Bool(b) => b.to_string(),
        SqlValue::Int(n) => n.to_string(),
        SqlValue::Float(f) => f.to_string(),
        SqlValue::Text(s) => s.clone(),
        SqlValue::Bytes(b) => b.iter().map(|byte| format!("{byte:02x}")).collect(),
        SqlValue::Timestamp(ts) => ts.to_rfc3339(),
        SqlValue::Uuid(u) => u.to_string(),
    }
}
