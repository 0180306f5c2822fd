//! db-ask - natural-language questions over PostgreSQL.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use db_ask::bootstrap::{self, BootstrapOptions};
use db_ask::cli::Cli;
use db_ask::config::Config;
use db_ask::db::{self, DatabaseClient, ExecutionLimits};
use db_ask::llm::{LlmClient, OllamaClient, OllamaConfig, PromptTemplate};
use db_ask::logging;
use db_ask::pipeline::Pipeline;
use db_ask::query::QueryExecutor;
use db_ask::server::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse_args();

    match &cli.log_file {
        Some(path) => logging::init_file_logging(path, cli.verbose)?,
        None => logging::init_stderr_logging(cli.verbose),
    }

    if let Err(e) = run(cli).await {
        error!("{e:#}");
        return Err(e);
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?;

    cli.apply_to(&mut config)?;
    config.database.connection.apply_env_defaults();
    config.validate()?;

    let cancel = CancellationToken::new();
    server::cancel_on_shutdown_signal(cancel.clone());

    info!("Database: {}", config.database.display_string());
    let postgres = db::connect(&config.database)
        .await
        .context("failed to set up the database pool")?;
    let database: Arc<dyn DatabaseClient> = Arc::new(postgres);

    let llm: Arc<dyn LlmClient> = Arc::new(OllamaClient::new(OllamaConfig::from(&config.llm))?);
    info!(url = %config.llm.base_url, model = %config.llm.model, "Model service");

    let prompt = PromptTemplate::resolve(&config.prompt, database.as_ref()).await?;

    let (readiness, _bootstrap) = bootstrap::spawn(
        llm.clone(),
        BootstrapOptions::from(&config.llm),
        cancel.clone(),
    );

    let limits = ExecutionLimits::new(
        Duration::from_secs(config.query.statement_timeout_secs),
        config.query.row_cap,
    );
    let executor = QueryExecutor::new(database.clone(), limits);
    let pipeline = Pipeline::new(llm, executor, prompt);

    let bind = config.server.bind_address();
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;

    server::serve(listener, AppState::new(pipeline, readiness, cancel)).await?;

    database.close().await;
    info!("Shut down cleanly");
    Ok(())
}
