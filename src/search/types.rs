//! Search request and result types.

use serde::{Deserialize, Serialize};

use super::normalize::UNKNOWN_NAME;
use crate::error::{Error, Result};

/// Canonical alumni result, identical in shape regardless of which search
/// path produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlumniResult {
    pub name: String,
    pub current_role: String,
    pub current_company: String,
    pub current_location: String,
    /// May be empty
    pub linkedin_url: String,
    pub major: String,
    /// Display string; sources mix integers and free text
    pub graduation_year: String,
    /// 0-100, higher is better
    pub relevance_score: f64,
    pub match_reason: String,
    pub text_snippet: String,
    /// "{major} → {role} at {company}"
    pub career_trajectory: String,
}

impl AlumniResult {
    /// Key used to collapse the same person appearing twice in one result set.
    ///
    /// LinkedIn URL first, then name. Nameless results are keyed on role,
    /// company and year so distinct unknown alumni stay apart.
    pub fn dedupe_key(&self) -> String {
        let url = self.linkedin_url.trim().trim_end_matches('/');
        if !url.is_empty() {
            return url.to_lowercase();
        }

        let name = self.name.trim();
        if !name.is_empty() && name != UNKNOWN_NAME {
            return name.to_lowercase();
        }

        format!(
            "{}|{}|{}|{}",
            name, self.current_role, self.current_company, self.graduation_year
        )
        .to_lowercase()
    }
}

/// Onboarding profile of the student asking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudentProfile {
    pub major: Option<String>,
    /// Interests or preferred industries
    pub interests: Option<String>,
    pub skills: Option<String>,
    pub location: Option<String>,
}

/// A single search invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    pub raw_query: String,
    #[serde(default)]
    pub profile: Option<StudentProfile>,
}

impl SearchRequest {
    pub fn new(raw_query: impl Into<String>) -> Self {
        Self {
            raw_query: raw_query.into(),
            profile: None,
        }
    }

    pub fn with_profile(mut self, profile: StudentProfile) -> Self {
        self.profile = Some(profile);
        self
    }
}

/// Per-call-site search bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchLimits {
    /// Nearest neighbours requested from the vector index
    pub top_k: usize,
    /// Minimum similarity in [0, 1] a vector match must reach
    pub score_floor: f32,
    /// Maximum results returned to the caller
    pub display_cap: usize,
    /// Rows fetched by the relational fallback
    pub fallback_row_limit: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            top_k: 10,
            score_floor: 0.45,
            display_cap: 10,
            fallback_row_limit: 10,
        }
    }
}

impl SearchLimits {
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 || self.top_k > 100 {
            return Err(Error::Config(format!(
                "top_k must be between 1 and 100, got {}",
                self.top_k
            )));
        }
        if !(0.0..=1.0).contains(&self.score_floor) {
            return Err(Error::Config(format!(
                "score_floor must be between 0.0 and 1.0, got {}",
                self.score_floor
            )));
        }
        if self.display_cap == 0 {
            return Err(Error::Config("display_cap must be at least 1".to_string()));
        }
        if self.fallback_row_limit == 0 {
            return Err(Error::Config(
                "fallback_row_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Result cap for the relational path, which never returns more rows
    /// than it fetched.
    pub fn fallback_cap(&self) -> usize {
        self.display_cap.min(self.fallback_row_limit)
    }
}
