pub mod config;
pub mod database;
pub mod environment;
pub mod extract;
pub mod orchestrator;
pub mod scheduler;
pub mod scoring_client;
pub mod search_client;
pub mod web;

pub use config::{ApiKeys, ScrapeSettings};
pub use database::DatabaseConfig;
pub use environment::EnvironmentConfig;
pub use orchestrator::ScrapeOrchestrator;
pub use scheduler::start_scheduler;
pub use scoring_client::ScoringClient;
pub use search_client::SearchClient;
pub use web::start_web_server;
