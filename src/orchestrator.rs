// src/orchestrator.rs
//! Scrape Orchestrator: walks the active company fleet, searches and scores
//! roles, and merges the results into the store.
//!
//! Companies are processed strictly sequentially. A failure in one company's
//! pipeline is recorded as an `error` scrape-log row and never blocks the
//! rest of the run.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::database::{Company, CompanyRepository, NewRole, RoleRepository, ScrapeLogRepository};
use crate::scoring_client::{score_batch, RoleScoring};
use crate::search_client::RoleSearch;

/// Snapshot of the process-wide run flag, served by the status endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStatus {
    pub is_running: bool,
    pub current_company: Option<String>,
    pub progress: String,
}

/// The single piece of shared mutable state outside the database. Initialized
/// at process start, transitioned only by the orchestrator, read by the
/// status endpoint. The mutex is never held across an await.
#[derive(Debug, Default)]
pub struct RunState(Mutex<RunStatus>);

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> RunStatus {
        self.0.lock().expect("run state poisoned").clone()
    }

    /// Atomically claim the flag. Returns false if a run is already active.
    fn try_begin(&self) -> bool {
        let mut status = self.0.lock().expect("run state poisoned");
        if status.is_running {
            return false;
        }
        *status = RunStatus {
            is_running: true,
            current_company: None,
            progress: "Starting...".to_string(),
        };
        true
    }

    fn update(&self, company: &str, progress: String) {
        let mut status = self.0.lock().expect("run state poisoned");
        status.current_company = Some(company.to_string());
        status.progress = progress;
    }

    fn finish(&self) {
        let mut status = self.0.lock().expect("run state poisoned");
        *status = RunStatus {
            is_running: false,
            current_company: None,
            progress: "Done".to_string(),
        };
    }
}

/// Returned when a trigger arrives while a run is in progress. The trigger is
/// rejected, not queued.
#[derive(Debug)]
pub struct RunInProgress;

impl std::fmt::Display for RunInProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "a scrape is already in progress")
    }
}

impl std::error::Error for RunInProgress {}

struct ScrapeOutcome {
    roles_found: i64,
    roles_qualified: i64,
}

pub struct ScrapeOrchestrator {
    pool: SqlitePool,
    searcher: Arc<dyn RoleSearch>,
    scorer: Arc<dyn RoleScoring>,
    state: Arc<RunState>,
    threshold: i64,
}

impl ScrapeOrchestrator {
    pub fn new(
        pool: SqlitePool,
        searcher: Arc<dyn RoleSearch>,
        scorer: Arc<dyn RoleScoring>,
        threshold: i64,
    ) -> Self {
        Self {
            pool,
            searcher,
            scorer,
            state: Arc::new(RunState::new()),
            threshold,
        }
    }

    pub fn status(&self) -> RunStatus {
        self.state.snapshot()
    }

    /// Start a run on a background task, optionally restricted to a company
    /// subset. Rejected if a run is already in progress.
    pub fn try_start(
        self: &Arc<Self>,
        company_ids: Option<Vec<i64>>,
    ) -> Result<JoinHandle<()>, RunInProgress> {
        if !self.state.try_begin() {
            return Err(RunInProgress);
        }

        let orchestrator = Arc::clone(self);
        Ok(tokio::spawn(async move {
            orchestrator.execute(company_ids).await;
            orchestrator.state.finish();
        }))
    }

    async fn execute(&self, company_ids: Option<Vec<i64>>) {
        info!("Scrape run starting");

        let companies = match CompanyRepository::new(&self.pool).list_active().await {
            Ok(companies) => companies,
            Err(e) => {
                error!("Failed to list active companies: {}", e);
                return;
            }
        };

        let selected: Vec<Company> = match &company_ids {
            Some(ids) => companies
                .into_iter()
                .filter(|c| ids.contains(&c.id))
                .collect(),
            None => companies,
        };

        for company in &selected {
            self.state
                .update(&company.name, format!("Scraping {}...", company.name));

            let started_at = Utc::now();
            let logs = ScrapeLogRepository::new(&self.pool);

            match self.scrape_company(company).await {
                Ok(outcome) => {
                    if let Err(e) = CompanyRepository::new(&self.pool)
                        .mark_scraped(company.id)
                        .await
                    {
                        error!("Failed to stamp {} as scraped: {}", company.name, e);
                    }
                    if let Err(e) = logs
                        .append(
                            company.id,
                            started_at,
                            outcome.roles_found,
                            outcome.roles_qualified,
                            "completed",
                            None,
                        )
                        .await
                    {
                        error!("Failed to log scrape for {}: {}", company.name, e);
                    }
                    info!(
                        "Done: {} - {}/{} qualified",
                        company.name, outcome.roles_qualified, outcome.roles_found
                    );
                }
                Err(e) => {
                    error!("Error scraping {}: {}", company.name, e);
                    if let Err(log_err) = logs
                        .append(company.id, started_at, 0, 0, "error", Some(&e.to_string()))
                        .await
                    {
                        error!("Failed to log scrape error for {}: {}", company.name, log_err);
                    }
                }
            }
        }

        info!("Scrape run complete ({} companies)", selected.len());
    }

    async fn scrape_company(&self, company: &Company) -> Result<ScrapeOutcome> {
        let roles = self
            .searcher
            .find_roles(&company.name, &company.careers_url)
            .await?;

        self.state.update(
            &company.name,
            format!("Scoring {} roles from {}...", roles.len(), company.name),
        );

        let scores = score_batch(self.scorer.as_ref(), &roles, &company.name).await;

        let repo = RoleRepository::new(&self.pool);
        let mut qualified = 0;
        for (role, score) in roles.iter().zip(scores.iter()) {
            if score.total_score >= self.threshold {
                qualified += 1;
            }

            let breakdown = serde_json::to_string(&score.breakdown)?;
            repo.upsert(&NewRole {
                company_id: company.id,
                title: if role.title.is_empty() {
                    "Unknown".to_string()
                } else {
                    role.title.clone()
                },
                url: role.url.clone(),
                location: role.location.clone(),
                description: role.description.clone(),
                seniority: role.seniority.clone(),
                department: role.department.clone(),
                posted_date: normalize_posted_date(role.posted_date.as_deref()),
                score: score.total_score,
                score_breakdown: breakdown,
            })
            .await?;
        }

        Ok(ScrapeOutcome {
            roles_found: roles.len() as i64,
            roles_qualified: qualified,
        })
    }
}

/// The search service reports unknown posting dates as the literal
/// "Not specified"; treat that, and emptiness, as null.
fn normalize_posted_date(raw: Option<&str>) -> Option<String> {
    match raw {
        Some(value) if !value.trim().is_empty() && value != "Not specified" => {
            Some(value.to_string())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{run_migrations, CompanyRepository, ScrapeLogRepository};
    use crate::scoring_client::ScoreResult;
    use crate::search_client::DiscoveredRole;
    use async_trait::async_trait;

    struct StubSearcher {
        /// Company name -> canned result; missing names fail the search.
        fail_for: Option<String>,
        roles: Vec<DiscoveredRole>,
    }

    #[async_trait]
    impl RoleSearch for StubSearcher {
        async fn find_roles(
            &self,
            company_name: &str,
            _careers_url: &str,
        ) -> Result<Vec<DiscoveredRole>> {
            if self.fail_for.as_deref() == Some(company_name) {
                anyhow::bail!("search service returned error status 502: bad gateway");
            }
            Ok(self.roles.clone())
        }
    }

    struct StubScorer {
        score: i64,
    }

    #[async_trait]
    impl RoleScoring for StubScorer {
        async fn score_role(&self, _: &DiscoveredRole, _: &str) -> Result<ScoreResult> {
            Ok(ScoreResult {
                total_score: self.score,
                recommendation: "Good".to_string(),
                ..Default::default()
            })
        }
    }

    fn sample_role(title: &str, posted_date: Option<&str>) -> DiscoveredRole {
        DiscoveredRole {
            title: title.to_string(),
            url: "https://example.com/job".to_string(),
            location: "London".to_string(),
            description: "A role.".to_string(),
            seniority: "Senior".to_string(),
            department: "Strategy".to_string(),
            posted_date: posted_date.map(str::to_string),
        }
    }

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    fn orchestrator(
        pool: SqlitePool,
        searcher: StubSearcher,
        scorer: StubScorer,
    ) -> Arc<ScrapeOrchestrator> {
        Arc::new(ScrapeOrchestrator::new(
            pool,
            Arc::new(searcher),
            Arc::new(scorer),
            80,
        ))
    }

    #[test]
    fn posted_date_normalization() {
        assert_eq!(
            normalize_posted_date(Some("2026-08-01")).as_deref(),
            Some("2026-08-01")
        );
        assert!(normalize_posted_date(Some("Not specified")).is_none());
        assert!(normalize_posted_date(Some("")).is_none());
        assert!(normalize_posted_date(Some("   ")).is_none());
        assert!(normalize_posted_date(None).is_none());
    }

    #[tokio::test]
    async fn failing_company_does_not_block_siblings() {
        let pool = test_pool().await;
        let companies = CompanyRepository::new(&pool);
        companies.add("Alpha", "https://a.example").await.unwrap();
        companies.add("Bravo", "https://b.example").await.unwrap();
        companies.add("Carol", "https://c.example").await.unwrap();

        let orch = orchestrator(
            pool.clone(),
            StubSearcher {
                fail_for: Some("Bravo".to_string()),
                roles: vec![sample_role("Strategy Manager", Some("Not specified"))],
            },
            StubScorer { score: 90 },
        );

        orch.try_start(None).unwrap().await.unwrap();

        let logs = ScrapeLogRepository::new(&pool).recent(20).await.unwrap();
        assert_eq!(logs.len(), 3);
        let by_company = |name: &str| {
            logs.iter()
                .find(|entry| entry.company_name == name)
                .unwrap()
                .clone()
        };
        assert_eq!(by_company("Alpha").status, "completed");
        assert_eq!(by_company("Carol").status, "completed");
        let failed = by_company("Bravo");
        assert_eq!(failed.status, "error");
        assert_eq!(failed.roles_found, 0);
        assert!(failed.error.as_deref().unwrap().contains("502"));

        // Successful companies got stamped, the failed one did not
        let all = CompanyRepository::new(&pool).list_all().await.unwrap();
        for company in &all {
            if company.name == "Bravo" {
                assert!(company.last_scraped_at.is_none());
            } else {
                assert!(company.last_scraped_at.is_some());
            }
        }

        assert!(!orch.status().is_running);
    }

    #[tokio::test]
    async fn run_upserts_normalized_roles_and_counts_qualified() {
        let pool = test_pool().await;
        CompanyRepository::new(&pool)
            .add("Alpha", "https://a.example")
            .await
            .unwrap();

        let orch = orchestrator(
            pool.clone(),
            StubSearcher {
                fail_for: None,
                roles: vec![
                    sample_role("Qualified Role", Some("2026-08-01")),
                    sample_role("Other Role", Some("Not specified")),
                ],
            },
            StubScorer { score: 80 },
        );

        orch.try_start(None).unwrap().await.unwrap();

        let roles = RoleRepository::new(&pool).list_all().await.unwrap();
        assert_eq!(roles.len(), 2);
        let dated = roles.iter().find(|r| r.title == "Qualified Role").unwrap();
        assert_eq!(dated.posted_date.as_deref(), Some("2026-08-01"));
        let undated = roles.iter().find(|r| r.title == "Other Role").unwrap();
        assert!(undated.posted_date.is_none());

        let logs = ScrapeLogRepository::new(&pool).recent(1).await.unwrap();
        assert_eq!(logs[0].roles_found, 2);
        // Score 80 meets the threshold of 80
        assert_eq!(logs[0].roles_qualified, 2);
    }

    #[tokio::test]
    async fn company_filter_restricts_the_run() {
        let pool = test_pool().await;
        let companies = CompanyRepository::new(&pool);
        companies.add("Alpha", "https://a.example").await.unwrap();
        companies.add("Bravo", "https://b.example").await.unwrap();
        let alpha_id = companies
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .find(|c| c.name == "Alpha")
            .unwrap()
            .id;

        let orch = orchestrator(
            pool.clone(),
            StubSearcher {
                fail_for: None,
                roles: vec![],
            },
            StubScorer { score: 0 },
        );

        orch.try_start(Some(vec![alpha_id])).unwrap().await.unwrap();

        let logs = ScrapeLogRepository::new(&pool).recent(20).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].company_name, "Alpha");
    }

    #[tokio::test]
    async fn concurrent_trigger_is_rejected() {
        let pool = test_pool().await;
        let orch = orchestrator(
            pool,
            StubSearcher {
                fail_for: None,
                roles: vec![],
            },
            StubScorer { score: 0 },
        );

        // Claim the flag directly, as a running scrape would
        assert!(orch.state.try_begin());
        assert!(orch.try_start(None).is_err());
        assert!(orch.status().is_running);

        orch.state.finish();
        assert!(!orch.status().is_running);

        // Idle again: triggering works
        orch.try_start(None).unwrap().await.unwrap();
    }
}
