//! askdb: natural-language questions answered with generated SQL.
//!
//! # Usage
//!
//! ```bash
//! # One-shot question against a SQLite file
//! askdb --backend sqlite --path clinic.db "patients with cholesterol above 200"
//!
//! # Show the SQL without running it
//! askdb --backend sqlite --path clinic.db --dry-run "how many appointments today"
//!
//! # Interactive loop against PostgreSQL
//! ASKDB_DB_PASSWORD=... askdb --backend postgres --host localhost \
//!     --username app --database clinic repl
//! ```

use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::*;

use askdb::config::{Config, DB_PASSWORD_ENV};
use askdb::connect::{BackendKind, ConnectionSpec};
use askdb::execute::ExecOptions;
use askdb::model::{self, ModelChoice};
use askdb::render::{self, OutputFormat};
use askdb::repl;
use askdb::session::{Session, SessionOptions};

#[derive(Parser)]
#[command(name = "askdb")]
#[command(version)]
#[command(about = "Ask your database questions in plain language", long_about = None)]
#[command(after_help = "EXAMPLES:
    askdb --backend sqlite --path clinic.db 'patients with cholesterol above 200'
    askdb --backend mysql --host localhost --username root --database clinic repl
    askdb --backend sqlite --path clinic.db schema")]
struct Cli {
    /// The question to answer (one-shot mode)
    question: Option<String>,

    /// Database backend
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    /// Server host
    #[arg(long)]
    host: Option<String>,

    /// Server port (backend default when omitted)
    #[arg(long)]
    port: Option<u16>,

    /// Login user
    #[arg(long)]
    username: Option<String>,

    /// Login password (prefer the environment variable)
    #[arg(long, env = DB_PASSWORD_ENV, hide_env_values = true)]
    password: Option<String>,

    /// Database name
    #[arg(long)]
    database: Option<String>,

    /// Database file path (SQLite)
    #[arg(long)]
    path: Option<String>,

    /// Model that turns questions into SQL
    #[arg(short, long, value_enum)]
    model: Option<ModelChoice>,

    /// Generate the SQL but don't execute it
    #[arg(long)]
    dry_run: bool,

    /// Allow write statements (the default is read-only)
    #[arg(long)]
    read_write: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Cap on rendered rows
    #[arg(long)]
    max_rows: Option<usize>,

    /// Model and query timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive question loop
    Repl,
    /// Print the connected database's schema
    Schema,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;
    let spec = build_spec(&cli, &config)?;

    let model_choice = cli
        .model
        .or(config.model.backend)
        .unwrap_or(ModelChoice::Gemini);
    let generation_timeout =
        Duration::from_secs(cli.timeout.unwrap_or(config.model.timeout_secs));
    let backend = model::backend_for(model_choice, &config.model.ollama_url, generation_timeout)?;

    let mut policy = config.policy();
    if cli.read_write {
        policy.read_only = false;
    }

    let options = SessionOptions {
        generation_timeout,
        exec: ExecOptions {
            max_rows: cli.max_rows.unwrap_or(config.execution.max_rows),
            timeout: Duration::from_secs(cli.timeout.unwrap_or(config.execution.timeout_secs)),
        },
    };

    let mut session = Session::connect(&spec, backend, policy, options).await?;

    // Release the handle on every path, success or failure.
    let result = dispatch(&cli, &mut session).await;
    session.close().await;
    result
}

async fn dispatch(cli: &Cli, session: &mut Session) -> anyhow::Result<()> {
    match &cli.command {
        Some(Commands::Repl) => {
            repl::run_repl(session, cli.format).await;
            Ok(())
        }
        Some(Commands::Schema) => {
            let schema = session.schema().await?;
            render::print_schema(schema);
            Ok(())
        }
        None => {
            let Some(question) = &cli.question else {
                anyhow::bail!(
                    "no question given. Try: askdb --backend sqlite --path clinic.db \"how many patients\""
                );
            };

            if cli.dry_run {
                let query = session.generate(question).await?;
                println!("{}", "Generated SQL:".green().bold());
                println!("{}", query.sql.white());
                return Ok(());
            }

            let turn = session.ask(question).await?;
            println!("{} {}", "→".green(), turn.query.sql.white().bold());
            render::print_outcome(&turn.outcome, cli.format);
            Ok(())
        }
    }
}

fn build_spec(cli: &Cli, config: &Config) -> anyhow::Result<ConnectionSpec> {
    let kind = cli.backend.or(config.connection.backend).ok_or_else(|| {
        anyhow::anyhow!(
            "no backend selected. Use --backend or set [connection] backend in askdb.toml"
        )
    })?;

    let mut spec = ConnectionSpec::new(kind);
    spec.host = cli.host.clone().or_else(|| config.connection.host.clone());
    spec.port = cli.port.or(config.connection.port);
    spec.username = cli
        .username
        .clone()
        .or_else(|| config.connection.username.clone());
    spec.password = cli.password.clone();
    spec.database = cli
        .database
        .clone()
        .or_else(|| config.connection.database.clone());
    spec.path = cli.path.clone().or_else(|| config.connection.path.clone());
    Ok(spec)
}
