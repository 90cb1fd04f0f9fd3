// src/database.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub careers_url: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_scraped_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Role {
    pub id: i64,
    pub company_id: i64,
    pub title: String,
    pub url: String,
    pub location: String,
    pub description: String,
    pub seniority: String,
    pub department: String,
    pub posted_date: Option<String>,
    pub score: i64,
    pub score_breakdown: String,
    pub status: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub applied_at: Option<DateTime<Utc>>,
}

/// A role row joined with its owning company, as served by the listing
/// endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RoleListing {
    pub id: i64,
    pub company_id: i64,
    pub company_name: String,
    pub careers_url: String,
    pub title: String,
    pub url: String,
    pub location: String,
    pub description: String,
    pub seniority: String,
    pub department: String,
    pub posted_date: Option<String>,
    pub score: i64,
    pub score_breakdown: String,
    pub status: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub applied_at: Option<DateTime<Utc>>,
}

/// Fields written on every role upsert. Human decisions (`status`,
/// `applied_at`) are deliberately absent: the store preserves them.
#[derive(Debug, Clone)]
pub struct NewRole {
    pub company_id: i64,
    pub title: String,
    pub url: String,
    pub location: String,
    pub description: String,
    pub seniority: String,
    pub department: String,
    pub posted_date: Option<String>,
    pub score: i64,
    pub score_breakdown: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScrapeLogEntry {
    pub id: i64,
    pub company_id: i64,
    pub company_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub roles_found: i64,
    pub roles_qualified: i64,
    pub status: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_companies: i64,
    pub total_roles: i64,
    pub qualified_roles: i64,
    pub applied_roles: i64,
    pub new_roles: i64,
}

#[derive(Debug)]
pub struct DatabaseConfig {
    pub database_path: PathBuf,
    pub pool: Option<SqlitePool>,
}

impl DatabaseConfig {
    pub fn new(database_path: PathBuf) -> Self {
        Self {
            database_path,
            pool: None,
        }
    }

    /// Initialize the database connection pool
    pub async fn init_pool(&mut self) -> Result<()> {
        if let Some(parent) = self.database_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        let database_url = format!("sqlite:{}?mode=rwc", self.database_path.display());
        let pool = SqlitePool::connect(&database_url)
            .await
            .context("Failed to connect to SQLite database")?;
        self.pool = Some(pool);

        info!("Database connection pool initialized: {}", database_url);
        Ok(())
    }

    /// Get the database pool
    pub fn pool(&self) -> Result<&SqlitePool> {
        self.pool.as_ref().ok_or_else(|| {
            anyhow::anyhow!("Database pool not initialized. Call init_pool() first.")
        })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        run_migrations(self.pool()?).await
    }
}

/// Create the schema. Separate from [`DatabaseConfig`] so tests can run it
/// against an in-memory pool.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS companies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            careers_url TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            last_scraped_at TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS roles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            company_id INTEGER NOT NULL REFERENCES companies(id),
            title TEXT NOT NULL,
            url TEXT NOT NULL DEFAULT '',
            location TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            seniority TEXT NOT NULL DEFAULT '',
            department TEXT NOT NULL DEFAULT '',
            posted_date TEXT,
            score INTEGER NOT NULL DEFAULT 0,
            score_breakdown TEXT NOT NULL DEFAULT '{}',
            status TEXT NOT NULL DEFAULT 'new',
            first_seen_at TEXT NOT NULL,
            last_seen_at TEXT NOT NULL,
            applied_at TEXT,
            UNIQUE(company_id, title, location)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scrape_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            company_id INTEGER NOT NULL REFERENCES companies(id),
            started_at TEXT NOT NULL,
            finished_at TEXT,
            roles_found INTEGER NOT NULL DEFAULT 0,
            roles_qualified INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'running',
            error TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_roles_company
        ON roles(company_id);
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_roles_score
        ON roles(score);
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_scrape_logs_started
        ON scrape_logs(started_at);
        "#,
    )
    .execute(pool)
    .await?;

    info!("Database migrations completed successfully");
    Ok(())
}

pub struct CompanyRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CompanyRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// List companies eligible for scraping
    pub async fn list_active(&self) -> Result<Vec<Company>> {
        let companies = sqlx::query_as::<_, Company>(
            r#"
            SELECT id, name, careers_url, active, created_at, last_scraped_at
            FROM companies
            WHERE active = 1
            ORDER BY name ASC
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        Ok(companies)
    }

    /// List all companies, active or not
    pub async fn list_all(&self) -> Result<Vec<Company>> {
        let companies = sqlx::query_as::<_, Company>(
            r#"
            SELECT id, name, careers_url, active, created_at, last_scraped_at
            FROM companies
            ORDER BY name ASC
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        Ok(companies)
    }

    /// Add a company. Idempotent on the unique name: a duplicate add is a
    /// silent no-op, not an error. Returns whether a row was inserted.
    pub async fn add(&self, name: &str, careers_url: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO companies (name, careers_url, active, created_at)
            VALUES (?, ?, 1, ?)
            ON CONFLICT(name) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(careers_url)
        .bind(Utc::now())
        .execute(self.pool)
        .await?;

        let inserted = result.rows_affected() > 0;
        if inserted {
            info!("Added company: {}", name);
        }
        Ok(inserted)
    }

    /// Soft-delete a company. Role history is preserved.
    pub async fn deactivate(&self, company_id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE companies SET active = 0 WHERE id = ?")
            .bind(company_id)
            .execute(self.pool)
            .await?;

        let updated = result.rows_affected() > 0;
        if updated {
            info!("Deactivated company id {}", company_id);
        }
        Ok(updated)
    }

    /// Stamp the company as scraped now
    pub async fn mark_scraped(&self, company_id: i64) -> Result<()> {
        sqlx::query("UPDATE companies SET last_scraped_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(company_id)
            .execute(self.pool)
            .await?;

        Ok(())
    }
}

pub struct RoleRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> RoleRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert a role keyed by (company_id, title, location).
    ///
    /// On re-observation the descriptive fields and score are overwritten and
    /// `last_seen_at` refreshed; `status` and `applied_at` survive re-scraping
    /// and `first_seen_at` is only set on creation.
    pub async fn upsert(&self, role: &NewRole) -> Result<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO roles (company_id, title, url, location, description, seniority,
                               department, posted_date, score, score_breakdown,
                               first_seen_at, last_seen_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(company_id, title, location) DO UPDATE SET
                url = excluded.url,
                description = excluded.description,
                seniority = excluded.seniority,
                department = excluded.department,
                posted_date = excluded.posted_date,
                score = excluded.score,
                score_breakdown = excluded.score_breakdown,
                last_seen_at = excluded.last_seen_at
            "#,
        )
        .bind(role.company_id)
        .bind(&role.title)
        .bind(&role.url)
        .bind(&role.location)
        .bind(&role.description)
        .bind(&role.seniority)
        .bind(&role.department)
        .bind(&role.posted_date)
        .bind(role.score)
        .bind(&role.score_breakdown)
        .bind(now)
        .bind(now)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Roles at or above the qualification threshold, best first
    pub async fn list_qualified(&self, threshold: i64) -> Result<Vec<RoleListing>> {
        let roles = sqlx::query_as::<_, RoleListing>(
            r#"
            SELECT r.id, r.company_id, c.name AS company_name, c.careers_url,
                   r.title, r.url, r.location, r.description, r.seniority, r.department,
                   r.posted_date, r.score, r.score_breakdown, r.status,
                   r.first_seen_at, r.last_seen_at, r.applied_at
            FROM roles r JOIN companies c ON r.company_id = c.id
            WHERE r.score >= ?
            ORDER BY r.score DESC, r.last_seen_at DESC
            "#,
        )
        .bind(threshold)
        .fetch_all(self.pool)
        .await?;

        Ok(roles)
    }

    pub async fn list_all(&self) -> Result<Vec<RoleListing>> {
        let roles = sqlx::query_as::<_, RoleListing>(
            r#"
            SELECT r.id, r.company_id, c.name AS company_name, c.careers_url,
                   r.title, r.url, r.location, r.description, r.seniority, r.department,
                   r.posted_date, r.score, r.score_breakdown, r.status,
                   r.first_seen_at, r.last_seen_at, r.applied_at
            FROM roles r JOIN companies c ON r.company_id = c.id
            ORDER BY r.score DESC, r.last_seen_at DESC
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        Ok(roles)
    }

    pub async fn list_by_company(&self, company_id: i64) -> Result<Vec<RoleListing>> {
        let roles = sqlx::query_as::<_, RoleListing>(
            r#"
            SELECT r.id, r.company_id, c.name AS company_name, c.careers_url,
                   r.title, r.url, r.location, r.description, r.seniority, r.department,
                   r.posted_date, r.score, r.score_breakdown, r.status,
                   r.first_seen_at, r.last_seen_at, r.applied_at
            FROM roles r JOIN companies c ON r.company_id = c.id
            WHERE r.company_id = ?
            ORDER BY r.score DESC, r.last_seen_at DESC
            "#,
        )
        .bind(company_id)
        .fetch_all(self.pool)
        .await?;

        Ok(roles)
    }

    /// Transition a role to `applied`, stamping `applied_at`
    pub async fn mark_applied(&self, role_id: i64) -> Result<bool> {
        let result =
            sqlx::query("UPDATE roles SET status = 'applied', applied_at = ? WHERE id = ?")
                .bind(Utc::now())
                .bind(role_id)
                .execute(self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_dismissed(&self, role_id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE roles SET status = 'dismissed' WHERE id = ?")
            .bind(role_id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

pub struct ScrapeLogRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ScrapeLogRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a completion record for one per-company scrape attempt. There
    /// is no separate "start" row: this single row carries both timestamps.
    pub async fn append(
        &self,
        company_id: i64,
        started_at: DateTime<Utc>,
        roles_found: i64,
        roles_qualified: i64,
        status: &str,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scrape_logs (company_id, started_at, finished_at, roles_found,
                                     roles_qualified, status, error)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(company_id)
        .bind(started_at)
        .bind(Utc::now())
        .bind(roles_found)
        .bind(roles_qualified)
        .bind(status)
        .bind(error)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Most recent scrape attempts, newest first
    pub async fn recent(&self, limit: i64) -> Result<Vec<ScrapeLogEntry>> {
        let entries = sqlx::query_as::<_, ScrapeLogEntry>(
            r#"
            SELECT sl.id, sl.company_id, c.name AS company_name, sl.started_at,
                   sl.finished_at, sl.roles_found, sl.roles_qualified, sl.status, sl.error
            FROM scrape_logs sl JOIN companies c ON sl.company_id = c.id
            ORDER BY sl.started_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(entries)
    }
}

/// Aggregate counts for the dashboard
pub async fn dashboard_stats(pool: &SqlitePool, threshold: i64) -> Result<DashboardStats> {
    let total_companies: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM companies WHERE active = 1")
            .fetch_one(pool)
            .await?;
    let total_roles: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM roles")
        .fetch_one(pool)
        .await?;
    let qualified_roles: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM roles WHERE score >= ?")
        .bind(threshold)
        .fetch_one(pool)
        .await?;
    let applied_roles: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM roles WHERE status = 'applied'")
            .fetch_one(pool)
            .await?;
    let new_roles: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM roles WHERE status = 'new' AND score >= ?")
            .bind(threshold)
            .fetch_one(pool)
            .await?;

    Ok(DashboardStats {
        total_companies,
        total_roles,
        qualified_roles,
        applied_roles,
        new_roles,
    })
}

#[derive(Debug, Deserialize)]
struct SeedCompany {
    name: String,
    careers_url: String,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

/// Load companies from a JSON seed file. Existing names are left untouched.
pub async fn seed_companies(pool: &SqlitePool, path: &Path) -> Result<usize> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read seed file: {}", path.display()))?;
    let seeds: Vec<SeedCompany> =
        serde_json::from_str(&content).context("Failed to parse company seed file")?;

    let mut inserted = 0;
    for seed in seeds {
        let result = sqlx::query(
            r#"
            INSERT INTO companies (name, careers_url, active, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(name) DO NOTHING
            "#,
        )
        .bind(&seed.name)
        .bind(&seed.careers_url)
        .bind(seed.active)
        .bind(Utc::now())
        .execute(pool)
        .await?;
        inserted += result.rows_affected() as usize;
    }

    info!("Seeded {} companies from {}", inserted, path.display());
    Ok(inserted)
}
