use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bqsql_core::{Config, ConnectionArgs, GenericValue, Record};
use bqsql_driver::{BigQueryFactory, CancellationToken, Registry};

/// bqsql - SQL over BigQuery from the command line
#[derive(Parser)]
#[command(name = "bqsql")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: bqsql.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Which tenant and project a command runs against
#[derive(clap::Args)]
struct Target {
    /// Datasource id (default: server.default_datasource, or the only datasource)
    #[arg(short = 'd', long)]
    datasource: Option<i64>,

    /// Project (default: the datasource's default project)
    #[arg(short, long)]
    project: Option<String>,

    /// Processing location (default: the datasource's processing location)
    #[arg(short, long)]
    location: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a query and print one JSON object per row
    Query {
        #[command(flatten)]
        target: Target,

        /// Dataset unqualified table names resolve against
        #[arg(long)]
        dataset: Option<String>,

        /// Submit the text as is, without expanding $__ macros
        #[arg(long)]
        raw: bool,

        /// Query text
        sql: String,
    },

    /// Print the project used when a datasource has none configured
    DefaultProject {
        /// Datasource id (default: server.default_datasource, or the only datasource)
        #[arg(short = 'd', long)]
        datasource: Option<i64>,
    },

    /// List datasets of the project
    Datasets {
        #[command(flatten)]
        target: Target,
    },

    /// List tables of a dataset
    Tables {
        #[command(flatten)]
        target: Target,

        dataset: String,
    },

    /// Show the schema of a table
    Schema {
        #[command(flatten)]
        target: Target,

        dataset: String,

        table: String,

        /// Print flattened column names instead of the schema document
        #[arg(long)]
        columns: bool,

        /// With --columns, only list columns usable in ORDER BY
        #[arg(long, requires = "columns")]
        orderable: bool,
    },

    /// Serve the metadata routes over HTTP
    Serve {
        /// Listen address (default: server.addr from the config)
        #[arg(short, long)]
        addr: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    // Load config if specified
    let config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else if std::path::Path::new("bqsql.toml").exists() {
        Config::from_file(std::path::Path::new("bqsql.toml"))?
    } else {
        if cli.verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        Config::default()
    };

    if cli.verbose {
        eprintln!("{} {} datasource(s)", "Loaded".cyan(), config.datasources.len());
    }

    let registry = Arc::new(Registry::new(Arc::new(BigQueryFactory::new())));
    for datasource in &config.datasources {
        registry.register_settings(datasource.clone());
    }

    match cli.command {
        Commands::Query { target, dataset, raw, sql } => {
            let sql = if raw { sql } else { bqsql_core::interpolate(&sql)? };
            query_command(&config, &registry, &target, dataset, &sql, cli.verbose).await
        }
        Commands::DefaultProject { datasource } => {
            let tenant = datasource_id(&config, datasource)?;
            println!("{}", registry.default_project(tenant).await?);
            Ok(())
        }
        Commands::Datasets { target } => datasets_command(&config, &registry, &target).await,
        Commands::Tables { target, dataset } => tables_command(&config, &registry, &target, &dataset).await,
        Commands::Schema { target, dataset, table, columns, orderable } => {
            schema_command(&config, &registry, &target, &dataset, &table, columns, orderable).await
        }
        Commands::Serve { addr } => {
            let addr = addr.unwrap_or_else(|| config.server.addr.clone());
            eprintln!("{} {}", "Serving metadata routes on".green(), addr);
            bqsql_server::serve(&addr, registry, config.server.default_datasource).await?;
            Ok(())
        }
    }
}

/// Pick the datasource a command runs against
fn datasource_id(config: &Config, requested: Option<i64>) -> Result<i64> {
    if let Some(id) = requested {
        return Ok(id);
    }
    if let Some(id) = config.server.default_datasource {
        return Ok(id);
    }

    match config.datasources.as_slice() {
        [only] => Ok(only.id),
        [] => Err(anyhow::anyhow!(
            "No datasource configured. Add a [[datasource]] section to bqsql.toml."
        )),
        _ => Err(anyhow::anyhow!(
            "Several datasources configured; pick one with --datasource or set server.default_datasource."
        )),
    }
}

/// Query command - stream rows as JSON lines
async fn query_command(
    config: &Config,
    registry: &Registry,
    target: &Target,
    dataset: Option<String>,
    sql: &str,
    verbose: bool,
) -> Result<()> {
    let tenant = datasource_id(config, target.datasource)?;
    let args = ConnectionArgs {
        project: target.project.clone().unwrap_or_default(),
        dataset: dataset.unwrap_or_default(),
        location: target.location.clone().unwrap_or_default(),
        ..Default::default()
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let cached = registry.connection(tenant, &args).await?;
    if verbose {
        let settings = cached.connection.settings();
        eprintln!(
            "{} {} ({})",
            "Running query in".cyan(),
            settings.project,
            if settings.location.is_empty() { "default location" } else { settings.location.as_str() }
        );
    }

    let mut rows = cached.connection.query(sql, &cancel).await?;
    let names: Vec<String> = rows.column_names().iter().map(|n| n.to_string()).collect();

    let mut count = 0usize;
    while let Some(values) = rows.next(&cancel).await? {
        let mut record = Record::with_capacity(names.len());
        for (name, value) in names.iter().zip(values) {
            record.push(name.clone(), value);
        }
        println!("{}", GenericValue::Record(record).to_json());
        count += 1;
    }

    if verbose {
        eprintln!("{} {} row(s)", "Fetched".green(), count);
    }

    Ok(())
}

/// Datasets command - list datasets of the project
async fn datasets_command(config: &Config, registry: &Registry, target: &Target) -> Result<()> {
    let client = client_for(config, registry, target).await?;
    let datasets = client.list_datasets().await?;
    println!("{}", serde_json::to_string_pretty(&datasets)?);
    Ok(())
}

/// Tables command - list tables of a dataset
async fn tables_command(config: &Config, registry: &Registry, target: &Target, dataset: &str) -> Result<()> {
    let client = client_for(config, registry, target).await?;
    let tables = client.list_tables(dataset).await?;
    println!("{}", serde_json::to_string_pretty(&tables)?);
    Ok(())
}

/// Schema command - print a table schema or its flattened columns
async fn schema_command(
    config: &Config,
    registry: &Registry,
    target: &Target,
    dataset: &str,
    table: &str,
    columns: bool,
    orderable: bool,
) -> Result<()> {
    let client = client_for(config, registry, target).await?;

    if columns {
        let names = client.columns(dataset, table, orderable).await?;
        println!("{}", serde_json::to_string_pretty(&names)?);
    } else {
        let metadata = client.table_schema(dataset, table).await?;
        println!("{}", serde_json::to_string_pretty(&metadata)?);
    }

    Ok(())
}

async fn client_for(config: &Config, registry: &Registry, target: &Target) -> Result<Arc<bqsql_driver::ApiClient>> {
    let tenant = datasource_id(config, target.datasource)?;
    let client = registry
        .client(
            tenant,
            target.project.as_deref().unwrap_or_default(),
            target.location.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bqsql_core::DatasourceSettings;

    fn config(ids: &[i64], default: Option<i64>) -> Config {
        let mut config = Config::default();
        config.datasources = ids
            .iter()
            .map(|id| DatasourceSettings { id: *id, ..Default::default() })
            .collect();
        config.server.default_datasource = default;
        config
    }

    #[test]
    fn test_datasource_selection() {
        assert_eq!(datasource_id(&config(&[1, 2], None), Some(2)).unwrap(), 2);
        assert_eq!(datasource_id(&config(&[1, 2], Some(1)), None).unwrap(), 1);
        assert_eq!(datasource_id(&config(&[5], None), None).unwrap(), 5);
        assert!(datasource_id(&config(&[], None), None).is_err());
        assert!(datasource_id(&config(&[1, 2], None), None).is_err());
    }

    #[test]
    fn test_cli_parses_query() {
        let cli = Cli::try_parse_from(["bqsql", "query", "-d", "3", "--dataset", "crm", "SELECT 1"]).unwrap();
        match cli.command {
            Commands::Query { target, dataset, raw, sql } => {
                assert_eq!(target.datasource, Some(3));
                assert_eq!(dataset.as_deref(), Some("crm"));
                assert!(!raw);
                assert_eq!(sql, "SELECT 1");
            }
            _ => panic!("expected query command"),
        }
    }

    #[test]
    fn test_cli_parses_default_project() {
        let cli = Cli::try_parse_from(["bqsql", "default-project", "-d", "4"]).unwrap();
        match cli.command {
            Commands::DefaultProject { datasource } => assert_eq!(datasource, Some(4)),
            _ => panic!("expected default-project command"),
        }
    }

    #[test]
    fn test_orderable_requires_columns() {
        assert!(Cli::try_parse_from(["bqsql", "schema", "crm", "users", "--orderable"]).is_err());
        assert!(Cli::try_parse_from(["bqsql", "schema", "crm", "users", "--columns", "--orderable"]).is_ok());
    }
}
