// src/search_client.rs
//! Role Search Client: asks an external search-and-answer service to
//! enumerate open roles on a company's careers page.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::TARGET_CATEGORIES;
use crate::extract::{lenient_json, JsonShape};

const PERPLEXITY_API_URL: &str = "https://api.perplexity.ai/chat/completions";
const SEARCH_MODEL: &str = "sonar-pro";
const SEARCH_TIMEOUT_SECS: u64 = 60;
const SEARCH_MAX_TOKENS: u32 = 4000;
const SEARCH_TEMPERATURE: f32 = 0.1;

/// A candidate role as reported by the search service. All fields are
/// best-effort; missing keys deserialize to empty values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveredRole {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub seniority: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub posted_date: Option<String>,
}

/// Seam for the external search service, so the orchestrator can be driven
/// by stubs in tests.
#[async_trait]
pub trait RoleSearch: Send + Sync {
    /// Enumerate open roles at `company_name` via its careers page URL.
    async fn find_roles(&self, company_name: &str, careers_url: &str)
        -> Result<Vec<DiscoveredRole>>;
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

pub struct SearchClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    target_locations: Vec<String>,
}

impl SearchClient {
    pub fn new(api_key: String, target_locations: Vec<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(SEARCH_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_key,
            base_url: PERPLEXITY_API_URL.to_string(),
            target_locations,
        })
    }

    fn build_prompt(&self, company_name: &str, careers_url: &str) -> String {
        let categories = TARGET_CATEGORIES
            .iter()
            .map(|c| format!("- {}", c))
            .collect::<Vec<_>>()
            .join("\n");
        let locations = self.target_locations.join(", ");

        format!(
            "Search the careers/jobs page of {company_name} ({careers_url}) and find ALL currently open roles\n\
             that match ANY of these categories:\n{categories}\n\n\
             Focus on roles in these locations: {locations}\n\n\
             For EACH role found, return a JSON array where each element has:\n\
             - \"title\": exact job title\n\
             - \"url\": direct link to the job posting (full URL)\n\
             - \"location\": city/country listed\n\
             - \"description\": 2-3 sentence summary of the role\n\
             - \"seniority\": inferred seniority level (Junior/Associate/Mid/Senior/Lead/Manager/Director/VP)\n\
             - \"department\": department or team name\n\
             - \"posted_date\": the date when the job was posted on the careers page (in format YYYY-MM-DD if available, or \"Not specified\" if not found)\n\n\
             Return ONLY the JSON array, no other text. If no matching roles are found, return an empty array [].\n\
             Be thorough; check multiple pages if the careers site has pagination.\n\
             Do NOT include engineering/software development roles unless they are specifically product management or strategy roles."
        )
    }

    /// Parse the model's reply into role records. Any parse failure degrades
    /// to an empty list rather than an error.
    fn parse_roles(content: &str) -> Vec<DiscoveredRole> {
        lenient_json(content, JsonShape::Array).unwrap_or_default()
    }
}

#[async_trait]
impl RoleSearch for SearchClient {
    async fn find_roles(
        &self,
        company_name: &str,
        careers_url: &str,
    ) -> Result<Vec<DiscoveredRole>> {
        let request = ChatRequest {
            model: SEARCH_MODEL.to_string(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: "You are a job search assistant. You search company careers pages \
                              and return structured JSON data about open positions. Always \
                              return valid JSON arrays."
                        .to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: self.build_prompt(company_name, careers_url),
                },
            ],
            temperature: SEARCH_TEMPERATURE,
            max_tokens: SEARCH_MAX_TOKENS,
        };

        info!("Searching roles at {} via {}", company_name, careers_url);

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to search service")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            anyhow::bail!("Search service returned error status {}: {}", status, error_text);
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .context("Failed to parse search service response")?;

        let content = chat_response
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .unwrap_or_default();

        let roles = Self::parse_roles(content);
        info!("Found {} candidate roles at {}", roles.len(), company_name);
        Ok(roles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARRAY: &str = r#"[
        {"title": "Strategy Manager", "url": "https://x.example/1", "location": "London",
         "description": "Owns commercial strategy.", "seniority": "Manager",
         "department": "Strategy", "posted_date": "2026-08-01"},
        {"title": "Chief of Staff", "url": "https://x.example/2", "location": "London",
         "description": "Partners with the CEO.", "seniority": "Senior",
         "department": "Office of the CEO", "posted_date": "Not specified"}
    ]"#;

    #[test]
    fn parses_plain_array() {
        let roles = SearchClient::parse_roles(ARRAY);
        assert_eq!(roles.len(), 2);
        assert_eq!(roles[0].title, "Strategy Manager");
        assert_eq!(roles[1].posted_date.as_deref(), Some("Not specified"));
    }

    #[test]
    fn fenced_array_parses_identically() {
        let fenced = format!("```json\n{}\n```", ARRAY);
        let plain = SearchClient::parse_roles(ARRAY);
        let wrapped = SearchClient::parse_roles(&fenced);
        assert_eq!(plain.len(), wrapped.len());
        assert_eq!(plain[0].title, wrapped[0].title);
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let roles = SearchClient::parse_roles(r#"[{"title": "BD Lead"}]"#);
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].location, "");
        assert!(roles[0].posted_date.is_none());
    }

    #[test]
    fn unparsable_content_degrades_to_empty() {
        assert!(SearchClient::parse_roles("I could not access the page.").is_empty());
        assert!(SearchClient::parse_roles("").is_empty());
    }

    #[test]
    fn empty_array_response() {
        assert!(SearchClient::parse_roles("[]").is_empty());
    }

    #[test]
    fn prompt_names_every_category_and_location() {
        let client = SearchClient::new(
            "test-key".to_string(),
            vec!["London".to_string(), "Remote (UK)".to_string()],
        )
        .unwrap();
        let prompt = client.build_prompt("Acme", "https://acme.example/careers");
        assert!(prompt.contains("https://acme.example/careers"));
        assert!(prompt.contains("London, Remote (UK)"));
        for category in TARGET_CATEGORIES {
            assert!(prompt.contains(category), "missing category: {}", category);
        }
    }
}
