//! Normalization of vector-index metadata and relational rows into
//! [`AlumniResult`].

use super::relational::RelationalRow;
use super::types::AlumniResult;
use super::vector::VectorMatch;
use super::{DEFAULT_RELEVANCE_SCORE, MAX_RELEVANCE_SCORE};

pub const UNKNOWN_NAME: &str = "Unknown";
pub const UNKNOWN_ROLE: &str = "Position not specified";
pub const UNKNOWN_COMPANY: &str = "Company not specified";
pub const UNKNOWN_LOCATION: &str = "Location not specified";
pub const UNKNOWN_MAJOR: &str = "Major not specified";
pub const UNKNOWN_YEAR: &str = "Year not specified";
pub const NO_SNIPPET: &str = "No summary available";

/// Keywords taken from a search text for the relational fallback.
const MAX_KEYWORDS: usize = 8;
const MIN_KEYWORD_LEN: usize = 3;
/// Score added per query keyword found in a fallback row.
const KEYWORD_WEIGHT: f64 = 10.0;

const STOP_WORDS: &[&str] = &[
    "about", "alumni", "and", "any", "are", "can", "find", "for", "from", "have", "help", "how",
    "interested", "interests", "into", "like", "location", "looking", "major", "more", "people",
    "show", "skills", "someone", "that", "the", "their", "them", "there", "want", "what", "who",
    "with", "work", "working", "would", "you", "your",
];

/// Lowercased, deduplicated keywords of `text`, in order of appearance.
///
/// Stop words (including the profile labels added by the query formulator)
/// and words shorter than three characters are dropped.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
    {
        if word.chars().count() < MIN_KEYWORD_LEN
            || STOP_WORDS.contains(&word.as_str())
            || keywords.contains(&word)
        {
            continue;
        }
        keywords.push(word);
        if keywords.len() == MAX_KEYWORDS {
            break;
        }
    }
    keywords
}

/// Maps source records into the canonical result shape.
pub struct ResultNormalizer;

impl ResultNormalizer {
    /// Vector branch: similarity in [0, 1] becomes relevance in [0, 100].
    pub fn from_vector_match(m: &VectorMatch) -> AlumniResult {
        let name = m.field("name").unwrap_or(UNKNOWN_NAME);
        let role = m
            .field("latest_position")
            .or_else(|| m.field("current_role"))
            .unwrap_or(UNKNOWN_ROLE);
        let company = m.field("current_company").unwrap_or(UNKNOWN_COMPANY);
        let location = m
            .field("city")
            .or_else(|| m.field("location"))
            .unwrap_or(UNKNOWN_LOCATION);
        let major = m.field("yale_major").unwrap_or(UNKNOWN_MAJOR);

        let (relevance_score, match_reason) = match m.score {
            Some(score) => {
                let relevance = clamp_relevance(f64::from(score) * MAX_RELEVANCE_SCORE);
                (
                    relevance,
                    format!("{:.0}% semantic match with your question", relevance),
                )
            }
            None => (
                DEFAULT_RELEVANCE_SCORE,
                "Semantic match with your question".to_string(),
            ),
        };

        AlumniResult {
            name: name.to_string(),
            current_role: role.to_string(),
            current_company: company.to_string(),
            current_location: location.to_string(),
            linkedin_url: m.field("linkedin_url").unwrap_or_default().to_string(),
            major: major.to_string(),
            graduation_year: m.field("yale_class").unwrap_or(UNKNOWN_YEAR).to_string(),
            relevance_score,
            match_reason,
            text_snippet: m.field("text_snippet").unwrap_or(NO_SNIPPET).to_string(),
            career_trajectory: trajectory(major, role, company),
        }
    }

    /// Relational branch: relevance grows with the number of `keywords`
    /// found in the row's position, field and company, the same columns the
    /// fallback query filters on.
    pub fn from_relational_row(row: &RelationalRow, keywords: &[String]) -> AlumniResult {
        let name = non_blank(&row.name).unwrap_or(UNKNOWN_NAME);
        let role = non_blank(&row.position).unwrap_or(UNKNOWN_ROLE);
        let company = non_blank(&row.current_company_name).unwrap_or(UNKNOWN_COMPANY);
        let location = non_blank(&row.location).unwrap_or(UNKNOWN_LOCATION);
        let major = non_blank(&row.field).unwrap_or(UNKNOWN_MAJOR);
        let year = non_blank(&row.end_year).unwrap_or(UNKNOWN_YEAR);

        let matched = matched_keywords(row, keywords);
        let relevance_score = clamp_relevance(
            DEFAULT_RELEVANCE_SCORE + KEYWORD_WEIGHT * matched.len() as f64,
        );
        let match_reason = if !matched.is_empty() {
            format!("Background mentions {}", matched.join(", "))
        } else if major != UNKNOWN_MAJOR {
            format!("Yale alum with a background in {}", major)
        } else {
            "Yale alum".to_string()
        };

        AlumniResult {
            name: name.to_string(),
            current_role: role.to_string(),
            current_company: company.to_string(),
            current_location: location.to_string(),
            linkedin_url: non_blank(&row.url).unwrap_or_default().to_string(),
            major: major.to_string(),
            graduation_year: year.to_string(),
            relevance_score,
            match_reason,
            text_snippet: format!(
                "{} studied {} at Yale ({}) and works as {} at {}.",
                name, major, year, role, company
            ),
            career_trajectory: trajectory(major, role, company),
        }
    }
}

fn trajectory(major: &str, role: &str, company: &str) -> String {
    format!("{} → {} at {}", major, role, company)
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn clamp_relevance(score: f64) -> f64 {
    if score.is_nan() {
        return DEFAULT_RELEVANCE_SCORE;
    }
    score.clamp(0.0, MAX_RELEVANCE_SCORE)
}

fn matched_keywords<'k>(row: &RelationalRow, keywords: &'k [String]) -> Vec<&'k str> {
    let haystack = [&row.position, &row.field, &row.current_company_name]
        .iter()
        .filter_map(|v| v.as_deref())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    keywords
        .iter()
        .filter(|k| haystack.contains(k.as_str()))
        .map(String::as_str)
        .collect()
}
