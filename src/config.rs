// src/config.rs

/// Role categories the search prompt asks the external service to match.
pub const TARGET_CATEGORIES: &[&str] = &[
    "Strategy (corporate strategy, business strategy, commercial strategy)",
    "Business Development",
    "Product Management / Product Strategy",
    "Management Consulting / Advisory",
    "AI Strategy / GenAI",
    "Commercial / GTM / Go-to-Market",
    "Operations Strategy",
    "Partnerships",
    "Chief of Staff / Founders Associate",
];

/// Process-wide scrape settings. Single-tenant: one threshold, one
/// location list, one schedule.
#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    /// Minimum total score for a role to count as qualified.
    pub threshold: i64,
    pub target_locations: Vec<String>,
    /// Daily scrape time, UTC.
    pub schedule_hour: u8,
    pub schedule_minute: u8,
}

impl ScrapeSettings {
    pub fn new() -> Self {
        Self {
            threshold: 80,
            target_locations: vec!["London".to_string()],
            schedule_hour: 8,
            schedule_minute: 0,
        }
    }

    pub fn with_threshold(mut self, threshold: i64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_locations(mut self, locations: Vec<String>) -> Self {
        self.target_locations = locations;
        self
    }

    pub fn with_schedule(mut self, hour: u8, minute: u8) -> Self {
        self.schedule_hour = hour;
        self.schedule_minute = minute;
        self
    }
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self::new()
    }
}

/// Secrets pulled from the environment at startup.
#[derive(Debug, Clone)]
pub struct ApiKeys {
    pub perplexity: String,
    pub gemini: String,
}

impl ApiKeys {
    pub fn from_env() -> anyhow::Result<Self> {
        let perplexity = std::env::var("PERPLEXITY_API_KEY")
            .map_err(|_| anyhow::anyhow!("PERPLEXITY_API_KEY environment variable not set"))?;
        let gemini = std::env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY environment variable not set"))?;
        Ok(Self { perplexity, gemini })
    }
}
