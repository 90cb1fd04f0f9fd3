// src/scoring_client.rs
//! Role Scoring Client: evaluates a single role against the static candidate
//! profile with an external generative-language service.
//!
//! A transport or parse failure for one role is never fatal: it degrades to a
//! zero-score result with recommendation "Error", so a batch always yields one
//! result per input role.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::extract::{lenient_json, JsonShape};
use crate::search_client::DiscoveredRole;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const SCORING_MODEL: &str = "gemini-3-pro-preview";
const SCORING_TIMEOUT_SECS: u64 = 30;
const SCORING_MAX_OUTPUT_TOKENS: u32 = 8000;
const SCORING_TEMPERATURE: f32 = 0.2;

/// Sub-scores per rubric category. Caps (25/20/20/10/10/10/5) are enforced by
/// the prompt; missing categories deserialize to 0.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    #[serde(default)]
    pub hard_requirements: u32,
    #[serde(default)]
    pub core_skills: u32,
    #[serde(default)]
    pub experience_relevance: u32,
    #[serde(default)]
    pub seniority_alignment: u32,
    #[serde(default)]
    pub industry_domain: u32,
    #[serde(default)]
    pub preferred_skills: u32,
    #[serde(default)]
    pub career_narrative: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreResult {
    #[serde(default)]
    pub total_score: i64,
    #[serde(default)]
    pub breakdown: ScoreBreakdown,
    #[serde(default)]
    pub red_flags: Vec<String>,
    #[serde(default)]
    pub recommendation: String,
    #[serde(default)]
    pub reasoning: String,
}

impl ScoreResult {
    /// The recoverable failure outcome: zero score, recommendation "Error",
    /// one explanatory red flag.
    pub fn error(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            total_score: 0,
            breakdown: ScoreBreakdown::default(),
            red_flags: vec![reason.clone()],
            recommendation: "Error".to_string(),
            reasoning: reason,
        }
    }
}

/// Seam for the external scoring service.
#[async_trait]
pub trait RoleScoring: Send + Sync {
    /// Score one role against the candidate profile. A transport error is
    /// returned as `Err`; callers scoring a batch substitute
    /// [`ScoreResult::error`] instead of aborting.
    async fn score_role(&self, role: &DiscoveredRole, company_name: &str) -> Result<ScoreResult>;
}

/// Score a batch of roles, preserving a 1:1 correspondence between input
/// roles and output results.
pub async fn score_batch(
    scorer: &dyn RoleScoring,
    roles: &[DiscoveredRole],
    company_name: &str,
) -> Vec<ScoreResult> {
    let mut results = Vec::with_capacity(roles.len());
    for role in roles {
        match scorer.score_role(role, company_name).await {
            Ok(result) => results.push(result),
            Err(e) => {
                warn!("Scoring failed for '{}' at {}: {}", role.title, company_name, e);
                results.push(ScoreResult::error(format!("Scoring error: {}", e)));
            }
        }
    }
    results
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiResponseContent,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

pub struct ScoringClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    /// Candidate profile, embedded verbatim in every scoring prompt.
    profile: serde_json::Value,
}

impl ScoringClient {
    pub fn new(api_key: String, profile: serde_json::Value) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(SCORING_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_key,
            base_url: GEMINI_API_BASE.to_string(),
            profile,
        })
    }

    fn build_prompt(&self, role: &DiscoveredRole, company_name: &str) -> String {
        let profile_summary =
            serde_json::to_string_pretty(&self.profile).unwrap_or_else(|_| "{}".to_string());

        format!(
            "You are an expert career advisor evaluating job fit for a candidate.\n\n\
             CANDIDATE PROFILE:\n{profile_summary}\n\n\
             JOB TO EVALUATE:\n\
             - Company: {company_name}\n\
             - Title: {title}\n\
             - Location: {location}\n\
             - Seniority: {seniority}\n\
             - Description: {description}\n\n\
             SCORING FRAMEWORK (100 points total):\n\
             1. Hard Requirements (25 pts): Does the candidate meet experience years, visa/work authorization, required certifications, education requirements?\n\
             2. Core Skills Match (20 pts): How well do the candidate's core skills align with the role requirements?\n\
             3. Experience Relevance (20 pts): How relevant is the candidate's past work to this role?\n\
             4. Seniority Alignment (10 pts): Is the role at the right level for the candidate's experience?\n\
             5. Industry/Domain (10 pts): Does the candidate have relevant industry experience?\n\
             6. Preferred/Bonus Skills (10 pts): Does the candidate have nice-to-have skills listed?\n\
             7. Career Narrative (5 pts): Does this role make sense as a next step in the candidate's career?\n\n\
             RED FLAGS (auto-deductions):\n\
             - Missing hard requirement (e.g., required certification): -20 pts\n\
             - Significant experience gap (e.g., requires 10 yrs, has 8): -15 pts\n\
             - No relevant industry experience AND role explicitly requires it: -10 pts\n\
             - Overqualified (senior for junior role): -10 pts\n\n\
             Return ONLY a JSON object with:\n\
             {{\n\
               \"total_score\": <integer 0-100>,\n\
               \"breakdown\": {{\n\
                 \"hard_requirements\": <0-25>,\n\
                 \"core_skills\": <0-20>,\n\
                 \"experience_relevance\": <0-20>,\n\
                 \"seniority_alignment\": <0-10>,\n\
                 \"industry_domain\": <0-10>,\n\
                 \"preferred_skills\": <0-10>,\n\
                 \"career_narrative\": <0-5>\n\
               }},\n\
               \"red_flags\": [\"list of any red flags applied\"],\n\
               \"recommendation\": \"<Excellent|Good|Moderate|Weak|Poor>\",\n\
               \"reasoning\": \"<2-3 sentence explanation of the score>\"\n\
             }}",
            title = role.title,
            location = role.location,
            seniority = role.seniority,
            description = role.description,
        )
    }

    /// Parse the model's reply into a score result. Unparsable content
    /// degrades to the zero-score error result.
    fn parse_score_result(content: &str) -> ScoreResult {
        lenient_json(content, JsonShape::Object)
            .unwrap_or_else(|| ScoreResult::error("Failed to parse scoring response"))
    }
}

#[async_trait]
impl RoleScoring for ScoringClient {
    async fn score_role(&self, role: &DiscoveredRole, company_name: &str) -> Result<ScoreResult> {
        let url = format!(
            "{}/{}:generateContent?key={}",
            self.base_url, SCORING_MODEL, self.api_key
        );

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: self.build_prompt(role, company_name),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: SCORING_TEMPERATURE,
                max_output_tokens: SCORING_MAX_OUTPUT_TOKENS,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to scoring service")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            anyhow::bail!("Scoring service returned error status {}: {}", status, error_text);
        }

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .context("Failed to parse scoring service response")?;

        let content = gemini_response
            .candidates
            .first()
            .and_then(|candidate| candidate.content.parts.first())
            .map(|part| part.text.as_str())
            .unwrap_or_default();

        let result = Self::parse_score_result(content);
        info!(
            "Scored '{}' at {}: {} ({})",
            role.title, company_name, result.total_score, result.recommendation
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OBJECT: &str = r#"{
        "total_score": 84,
        "breakdown": {
            "hard_requirements": 22, "core_skills": 18, "experience_relevance": 17,
            "seniority_alignment": 9, "industry_domain": 8, "preferred_skills": 7,
            "career_narrative": 3
        },
        "red_flags": [],
        "recommendation": "Good",
        "reasoning": "Strong overlap with the candidate's strategy background."
    }"#;

    #[test]
    fn parses_full_object() {
        let result = ScoringClient::parse_score_result(OBJECT);
        assert_eq!(result.total_score, 84);
        assert_eq!(result.breakdown.hard_requirements, 22);
        assert_eq!(result.recommendation, "Good");
        assert!(result.red_flags.is_empty());
    }

    #[test]
    fn fenced_object_parses_identically() {
        let fenced = format!("```json\n{}\n```", OBJECT);
        let result = ScoringClient::parse_score_result(&fenced);
        assert_eq!(result.total_score, 84);
    }

    #[test]
    fn unparsable_text_yields_error_result_not_failure() {
        let result = ScoringClient::parse_score_result("I am unable to score this role.");
        assert_eq!(result.total_score, 0);
        assert_eq!(result.recommendation, "Error");
        assert_eq!(result.red_flags.len(), 1);
    }

    #[test]
    fn partial_breakdown_defaults_missing_categories() {
        let result = ScoringClient::parse_score_result(
            r#"{"total_score": 40, "breakdown": {"core_skills": 12}, "recommendation": "Weak"}"#,
        );
        assert_eq!(result.total_score, 40);
        assert_eq!(result.breakdown.core_skills, 12);
        assert_eq!(result.breakdown.career_narrative, 0);
        assert!(result.reasoning.is_empty());
    }

    struct FailingScorer;

    #[async_trait]
    impl RoleScoring for FailingScorer {
        async fn score_role(&self, _: &DiscoveredRole, _: &str) -> Result<ScoreResult> {
            anyhow::bail!("connection reset")
        }
    }

    #[tokio::test]
    async fn batch_substitutes_error_results_one_to_one() {
        let roles = vec![DiscoveredRole::default(), DiscoveredRole::default()];
        let results = score_batch(&FailingScorer, &roles, "Acme").await;
        assert_eq!(results.len(), 2);
        for result in &results {
            assert_eq!(result.total_score, 0);
            assert_eq!(result.recommendation, "Error");
        }
    }

    #[test]
    fn prompt_embeds_profile_and_role() {
        let profile = serde_json::json!({"name": "Test Candidate", "years_experience": 8});
        let client = ScoringClient::new("test-key".to_string(), profile).unwrap();
        let role = DiscoveredRole {
            title: "Head of Partnerships".to_string(),
            location: "London".to_string(),
            ..Default::default()
        };
        let prompt = client.build_prompt(&role, "Acme");
        assert!(prompt.contains("Test Candidate"));
        assert!(prompt.contains("Head of Partnerships"));
        assert!(prompt.contains("Company: Acme"));
        assert!(prompt.contains("career_narrative"));
    }
}
