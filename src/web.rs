// src/web.rs
use crate::config::ScrapeSettings;
use crate::database::{
    dashboard_stats, Company, CompanyRepository, DashboardStats, DatabaseConfig, RoleListing,
    RoleRepository, ScrapeLogEntry, ScrapeLogRepository,
};
use crate::orchestrator::{RunStatus, ScrapeOrchestrator};
use anyhow::Result;
use rocket::http::{Header, Status};
use rocket::serde::{json::Json, Deserialize, Serialize};
use rocket::{
    delete,
    fairing::{Fairing, Info, Kind},
    get, patch, post, routes, State,
};
use rocket::{Request, Response};
use std::sync::Arc;
use tracing::{error, info, warn};

const SCRAPE_HISTORY_LIMIT: i64 = 20;

pub struct Cors;

#[rocket::async_trait]
impl Fairing for Cors {
    fn info(&self) -> Info {
        Info {
            name: "Add CORS headers to responses",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, _request: &'r Request<'_>, response: &mut Response<'r>) {
        response.set_header(Header::new("Access-Control-Allow-Origin", "*"));
        response.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "POST, GET, PATCH, DELETE, OPTIONS",
        ));
        response.set_header(Header::new("Access-Control-Allow-Headers", "*"));
        response.set_header(Header::new("Access-Control-Allow-Credentials", "true"));
    }
}

#[derive(Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct CompanyCreateRequest {
    pub name: String,
    pub careers_url: String,
}

#[derive(Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct RoleStatusUpdate {
    pub status: String,
}

#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
pub struct ScrapeTriggerResponse {
    pub message: String,
    pub status: String,
}

fn pool_or_500<'a>(db_config: &'a DatabaseConfig) -> Result<&'a sqlx::SqlitePool, Status> {
    db_config.pool().map_err(|e| {
        error!("Database connection failed: {}", e);
        Status::InternalServerError
    })
}

#[get("/stats")]
pub async fn get_stats(
    db_config: &State<DatabaseConfig>,
    settings: &State<ScrapeSettings>,
) -> Result<Json<DashboardStats>, Status> {
    let pool = pool_or_500(db_config)?;

    match dashboard_stats(pool, settings.threshold).await {
        Ok(stats) => Ok(Json(stats)),
        Err(e) => {
            error!("Failed to compute dashboard stats: {}", e);
            Err(Status::InternalServerError)
        }
    }
}

#[get("/companies")]
pub async fn list_companies(
    db_config: &State<DatabaseConfig>,
) -> Result<Json<Vec<Company>>, Status> {
    let pool = pool_or_500(db_config)?;

    match CompanyRepository::new(pool).list_all().await {
        Ok(companies) => Ok(Json(companies)),
        Err(e) => {
            error!("Failed to list companies: {}", e);
            Err(Status::InternalServerError)
        }
    }
}

#[post("/companies", data = "<request>")]
pub async fn add_company(
    request: Json<CompanyCreateRequest>,
    db_config: &State<DatabaseConfig>,
) -> Result<Json<MessageResponse>, Status> {
    let pool = pool_or_500(db_config)?;

    // Duplicate names are absorbed silently; the add is idempotent
    match CompanyRepository::new(pool)
        .add(&request.name, &request.careers_url)
        .await
    {
        Ok(_) => Ok(Json(MessageResponse {
            message: format!("Added {}", request.name),
        })),
        Err(e) => {
            error!("Failed to add company {}: {}", request.name, e);
            Err(Status::InternalServerError)
        }
    }
}

#[delete("/companies/<company_id>")]
pub async fn deactivate_company(
    company_id: i64,
    db_config: &State<DatabaseConfig>,
) -> Result<Json<MessageResponse>, Status> {
    let pool = pool_or_500(db_config)?;

    match CompanyRepository::new(pool).deactivate(company_id).await {
        Ok(true) => Ok(Json(MessageResponse {
            message: "Company deactivated".to_string(),
        })),
        Ok(false) => Err(Status::NotFound),
        Err(e) => {
            error!("Failed to deactivate company {}: {}", company_id, e);
            Err(Status::InternalServerError)
        }
    }
}

#[get("/roles?<qualified_only>&<company_id>")]
pub async fn list_roles(
    qualified_only: Option<bool>,
    company_id: Option<i64>,
    db_config: &State<DatabaseConfig>,
    settings: &State<ScrapeSettings>,
) -> Result<Json<Vec<RoleListing>>, Status> {
    let pool = pool_or_500(db_config)?;
    let repo = RoleRepository::new(pool);

    let result = if let Some(company_id) = company_id {
        repo.list_by_company(company_id).await
    } else if qualified_only.unwrap_or(true) {
        repo.list_qualified(settings.threshold).await
    } else {
        repo.list_all().await
    };

    match result {
        Ok(roles) => Ok(Json(roles)),
        Err(e) => {
            error!("Failed to list roles: {}", e);
            Err(Status::InternalServerError)
        }
    }
}

#[patch("/roles/<role_id>", data = "<request>")]
pub async fn update_role_status(
    role_id: i64,
    request: Json<RoleStatusUpdate>,
    db_config: &State<DatabaseConfig>,
) -> Result<Json<MessageResponse>, Status> {
    let pool = pool_or_500(db_config)?;
    let repo = RoleRepository::new(pool);

    let updated = match request.status.as_str() {
        "applied" => repo.mark_applied(role_id).await,
        "dismissed" => repo.mark_dismissed(role_id).await,
        other => {
            warn!("Rejected role status update to '{}'", other);
            return Err(Status::BadRequest);
        }
    };

    match updated {
        Ok(true) => {
            info!("Role {} marked as {}", role_id, request.status);
            Ok(Json(MessageResponse {
                message: format!("Role {} marked as {}", role_id, request.status),
            }))
        }
        Ok(false) => Err(Status::NotFound),
        Err(e) => {
            error!("Failed to update role {}: {}", role_id, e);
            Err(Status::InternalServerError)
        }
    }
}

#[post("/scrape?<company_id>")]
pub async fn trigger_scrape(
    company_id: Option<i64>,
    orchestrator: &State<Arc<ScrapeOrchestrator>>,
) -> Result<Json<ScrapeTriggerResponse>, Status> {
    let company_ids = company_id.map(|id| vec![id]);

    match orchestrator.try_start(company_ids) {
        Ok(_) => {
            info!("Manual scrape triggered (company: {:?})", company_id);
            Ok(Json(ScrapeTriggerResponse {
                message: "Scrape started".to_string(),
                status: "running".to_string(),
            }))
        }
        Err(e) => {
            warn!("Manual scrape rejected: {}", e);
            Err(Status::Conflict)
        }
    }
}

#[get("/scrape/status")]
pub async fn scrape_status(orchestrator: &State<Arc<ScrapeOrchestrator>>) -> Json<RunStatus> {
    Json(orchestrator.status())
}

#[get("/scrape/history")]
pub async fn scrape_history(
    db_config: &State<DatabaseConfig>,
) -> Result<Json<Vec<ScrapeLogEntry>>, Status> {
    let pool = pool_or_500(db_config)?;

    match ScrapeLogRepository::new(pool)
        .recent(SCRAPE_HISTORY_LIMIT)
        .await
    {
        Ok(entries) => Ok(Json(entries)),
        Err(e) => {
            error!("Failed to load scrape history: {}", e);
            Err(Status::InternalServerError)
        }
    }
}

#[get("/health")]
pub async fn health() -> Json<&'static str> {
    Json("OK")
}

// Handle OPTIONS requests for CORS preflight
#[rocket::options("/<_..>")]
pub async fn options() -> Status {
    Status::Ok
}

pub async fn start_web_server(
    db_config: DatabaseConfig,
    orchestrator: Arc<ScrapeOrchestrator>,
    settings: ScrapeSettings,
    port: u16,
) -> Result<()> {
    info!("Starting Role Tracker API server on port {}", port);

    let figment = rocket::Config::figment()
        .merge(("port", port))
        .merge(("address", "0.0.0.0"));

    let _rocket = rocket::custom(figment)
        .attach(Cors)
        .manage(db_config)
        .manage(orchestrator)
        .manage(settings)
        .mount(
            "/api",
            routes![
                get_stats,
                list_companies,
                add_company,
                deactivate_company,
                list_roles,
                update_role_status,
                trigger_scrape,
                scrape_status,
                scrape_history,
                health,
                options
            ],
        )
        .launch()
        .await;

    Ok(())
}
