use anyhow::{Context, Result};
use role_tracker::{
    database::seed_companies, start_scheduler, start_web_server, ApiKeys, DatabaseConfig,
    EnvironmentConfig, ScoringClient, ScrapeOrchestrator, ScrapeSettings, SearchClient,
};
use std::sync::Arc;
use tracing::info;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

#[tokio::main]
async fn main() -> Result<()> {
    Registry::default()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = match std::env::var("ROCKET_PORT") {
        Ok(value) => value
            .parse::<u16>()
            .map_err(|_| anyhow::anyhow!("ROCKET_PORT must be a valid port number"))?,
        Err(_) => 8000,
    };

    let api_keys = ApiKeys::from_env()?;
    let settings = ScrapeSettings::default();

    let environment = EnvironmentConfig::load()?;
    environment.ensure_directories().await?;

    let mut db_config = DatabaseConfig::new(environment.database_path.clone());
    db_config.init_pool().await?;
    db_config.migrate().await?;
    let pool = db_config.pool()?.clone();

    if environment.companies_path.exists() {
        seed_companies(&pool, &environment.companies_path).await?;
    }

    let profile_content = tokio::fs::read_to_string(&environment.profile_path)
        .await
        .with_context(|| {
            format!(
                "Failed to read candidate profile: {}",
                environment.profile_path.display()
            )
        })?;
    let profile: serde_json::Value =
        serde_json::from_str(&profile_content).context("Failed to parse candidate profile")?;

    let searcher = Arc::new(SearchClient::new(
        api_keys.perplexity,
        settings.target_locations.clone(),
    )?);
    let scorer = Arc::new(ScoringClient::new(api_keys.gemini, profile)?);
    let orchestrator = Arc::new(ScrapeOrchestrator::new(
        pool,
        searcher,
        scorer,
        settings.threshold,
    ));

    // Keep the scheduler handle alive for the lifetime of the server
    let _scheduler = start_scheduler(
        orchestrator.clone(),
        settings.schedule_hour,
        settings.schedule_minute,
    )
    .await?;

    info!("Starting Role Tracker API server");
    info!("Database: {}", environment.database_path.display());
    info!("Profile: {}", environment.profile_path.display());
    info!("Qualification threshold: {}", settings.threshold);
    info!("Server: http://0.0.0.0:{}", port);

    start_web_server(db_config, orchestrator, settings, port).await
}
