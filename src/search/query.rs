//! Search text formulation.

use super::types::StudentProfile;

/// Blends the student's question with profile signal so the embedding
/// leans toward their context.
pub struct QueryFormulator;

impl QueryFormulator {
    /// Build the search text for a query and optional profile.
    ///
    /// Missing or blank profile fields are skipped. Whitespace inside each
    /// part is collapsed, so equal inputs always produce equal text.
    pub fn formulate(raw_query: &str, profile: Option<&StudentProfile>) -> String {
        let mut parts = Vec::with_capacity(5);

        let query = collapse_whitespace(raw_query);
        if !query.is_empty() {
            parts.push(query);
        }

        if let Some(profile) = profile {
            let fields = [
                ("Major", &profile.major),
                ("Interests", &profile.interests),
                ("Skills", &profile.skills),
                ("Location", &profile.location),
            ];
            for (label, value) in fields {
                let value = collapse_whitespace(value.as_deref().unwrap_or_default());
                if !value.is_empty() {
                    parts.push(format!("{}: {}", label, value));
                }
            }
        }

        parts.join(". ")
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
