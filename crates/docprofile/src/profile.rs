//! Structured profile produced by the final pipeline stage.

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AnalyzeError;

static RE_CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*```").unwrap());

/// One entry of the work history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperienceEntry {
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "company")]
    pub organization: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One entry of the education history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EducationEntry {
    #[serde(default, alias = "school")]
    pub institution: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degree: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
}

/// Profile fields as returned by a [`ProfileExtractor`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileData {
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub experience: Vec<ExperienceEntry>,
    #[serde(default)]
    pub education: Vec<EducationEntry>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
}

impl ProfileData {
    /// True when the extractor returned nothing usable at all.
    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
            && self.experience.is_empty()
            && self.education.is_empty()
            && self.summary.trim().is_empty()
            && self.recommendations.is_empty()
            && self.strengths.is_empty()
            && self.weaknesses.is_empty()
    }
}

/// A persisted profile, keyed 1:1 by its job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub job_id: String,
    #[serde(flatten)]
    pub data: ProfileData,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(job_id: &str, data: ProfileData) -> Self {
        Self {
            job_id: job_id.to_string(),
            data,
            created_at: Utc::now(),
        }
    }
}

/// Turns document text into a structured profile, usually through an LLM.
///
/// Implementations must report a failed or timed-out call as
/// [`AnalyzeError::Service`] and an answer that cannot be read as a profile
/// as [`AnalyzeError::Malformed`].
#[async_trait]
pub trait ProfileExtractor: Send + Sync {
    async fn analyze(
        &self,
        full_text: &str,
        external_profile_url: Option<&str>,
    ) -> Result<ProfileData, AnalyzeError>;
}

/// Parses the raw text answer of a language model into [`ProfileData`].
///
/// Accepts bare JSON, JSON wrapped in a Markdown code fence, or JSON
/// surrounded by prose. An answer without a single usable field is
/// rejected as malformed.
pub fn parse_profile_response(raw: &str) -> Result<ProfileData, AnalyzeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AnalyzeError::Malformed("empty response".to_string()));
    }

    let body = RE_CODE_FENCE
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(trimmed);

    let body = match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => &body[start..=end],
        _ => {
            return Err(AnalyzeError::Malformed(
                "response does not contain a JSON object".to_string(),
            ))
        }
    };

    let data: ProfileData =
        serde_json::from_str(body).map_err(|e| AnalyzeError::Malformed(e.to_string()))?;

    if data.is_empty() {
        return Err(AnalyzeError::Malformed(
            "response contains no profile fields".to_string(),
        ));
    }

    Ok(data)
}
