//! Search orchestration: vector search first, relational search as fallback.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::embedding::EmbeddingClient;
use super::normalize::{extract_keywords, ResultNormalizer};
use super::query::QueryFormulator;
use super::relational::{build_fallback_query, RelationalSearchClient};
use super::types::{AlumniResult, SearchLimits, SearchRequest, StudentProfile};
use super::vector::{VectorIndexClient, VectorMatch};
use super::DEFAULT_EMBEDDING_DIMENSIONS;
use crate::config::SearchConfig;
use crate::error::{Error, Result};
use crate::metrics;

/// Which path produced a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchPath {
    Vector,
    Relational,
    /// Both paths failed or found nothing
    None,
}

impl SearchPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchPath::Vector => "vector",
            SearchPath::Relational => "relational",
            SearchPath::None => "none",
        }
    }
}

/// Results of one search together with the path that produced them.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub results: Vec<AlumniResult>,
    pub path: SearchPath,
}

/// Coordinates the embedding model, vector index and relational store.
///
/// Searching never fails: collaborator errors are logged and degrade to the
/// fallback path, and finally to an empty list.
#[derive(Clone)]
pub struct SearchOrchestrator {
    embedder: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndexClient>,
    store: Arc<dyn RelationalSearchClient>,
    dimensions: usize,
    affiliation_keyword: String,
    affiliation_flag_field: Option<String>,
    limits: SearchLimits,
}

impl SearchOrchestrator {
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndexClient>,
        store: Arc<dyn RelationalSearchClient>,
    ) -> Self {
        Self {
            embedder,
            index,
            store,
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            affiliation_keyword: "yale".to_string(),
            affiliation_flag_field: None,
            limits: SearchLimits::default(),
        }
    }

    /// Apply the `[search]` section: default limits and affiliation rules.
    pub fn with_config(mut self, config: &SearchConfig) -> Self {
        self.limits = config.limits();
        self.affiliation_keyword = config.affiliation_keyword.to_lowercase();
        self.affiliation_flag_field = config.affiliation_flag_field.clone();
        self
    }

    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn with_limits(mut self, limits: SearchLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> SearchLimits {
        self.limits
    }

    /// Search with the default limits.
    pub async fn search(
        &self,
        search_text: &str,
        profile: Option<&StudentProfile>,
    ) -> Vec<AlumniResult> {
        self.search_with(search_text, profile, self.limits)
            .await
            .results
    }

    /// Formulate the search text from a request, then search.
    pub async fn search_request(&self, request: &SearchRequest) -> Vec<AlumniResult> {
        let text = QueryFormulator::formulate(&request.raw_query, request.profile.as_ref());
        self.search(&text, request.profile.as_ref()).await
    }

    /// Search with call-site limits, reporting which path answered.
    pub async fn search_with(
        &self,
        search_text: &str,
        profile: Option<&StudentProfile>,
        limits: SearchLimits,
    ) -> SearchOutcome {
        let started = Instant::now();

        let outcome = match self.vector_search(search_text, limits).await {
            Ok(results) if !results.is_empty() => SearchOutcome {
                results,
                path: SearchPath::Vector,
            },
            Ok(_) => {
                info!("Vector search returned no results, using relational fallback");
                metrics::record_fallback("empty");
                self.fallback(search_text, profile, limits).await
            }
            Err(e) => {
                warn!(error = %e, "Vector search failed, using relational fallback");
                metrics::record_upstream_error(service_label(&e));
                metrics::record_fallback("error");
                self.fallback(search_text, profile, limits).await
            }
        };

        debug!(
            path = outcome.path.as_str(),
            results = outcome.results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Search complete"
        );
        metrics::record_search(outcome.path.as_str(), started.elapsed());
        outcome
    }

    async fn vector_search(
        &self,
        search_text: &str,
        limits: SearchLimits,
    ) -> Result<Vec<AlumniResult>> {
        let vector = self.embedder.embed(search_text, self.dimensions).await?;
        let matches = self.index.query(&vector, limits.top_k, true).await?;

        let raw = matches.len();
        let results: Vec<AlumniResult> = matches
            .iter()
            .filter(|m| self.is_affiliated(m))
            .filter(|m| m.score.map_or(true, |s| s >= limits.score_floor))
            .map(ResultNormalizer::from_vector_match)
            .collect();

        debug!(raw, kept = results.len(), "Filtered vector matches");
        Ok(rank(results, limits.display_cap))
    }

    async fn fallback(
        &self,
        search_text: &str,
        profile: Option<&StudentProfile>,
        limits: SearchLimits,
    ) -> SearchOutcome {
        match self.relational_search(search_text, profile, limits).await {
            Ok(results) if !results.is_empty() => SearchOutcome {
                results,
                path: SearchPath::Relational,
            },
            Ok(_) => SearchOutcome {
                results: Vec::new(),
                path: SearchPath::None,
            },
            Err(e) => {
                warn!(error = %e, "Relational fallback failed, returning no results");
                metrics::record_upstream_error(service_label(&e));
                SearchOutcome {
                    results: Vec::new(),
                    path: SearchPath::None,
                }
            }
        }
    }

    async fn relational_search(
        &self,
        search_text: &str,
        profile: Option<&StudentProfile>,
        limits: SearchLimits,
    ) -> Result<Vec<AlumniResult>> {
        // A question like "who could help me?" carries no usable keywords;
        // the profile then decides what the fallback filters on.
        let profile_text;
        let text = if extract_keywords(search_text).is_empty() {
            profile_text = QueryFormulator::formulate("", profile);
            profile_text.as_str()
        } else {
            search_text
        };

        let query = build_fallback_query(text, &self.affiliation_keyword, limits.fallback_row_limit);
        let rows = self.store.query(&query.sql, &query.params).await?;

        let results = rows
            .iter()
            .map(|row| ResultNormalizer::from_relational_row(row, &query.keywords))
            .collect();
        Ok(rank(results, limits.fallback_cap()))
    }

    fn is_affiliated(&self, m: &VectorMatch) -> bool {
        if let Some(flag) = self.affiliation_flag_field.as_deref() {
            if m.field(flag)
                .is_some_and(|v| v.eq_ignore_ascii_case("false"))
            {
                return false;
            }
        }

        ["education", "text_snippet"].iter().any(|key| {
            m.field(key)
                .is_some_and(|v| v.to_lowercase().contains(&self.affiliation_keyword))
        })
    }
}

/// Drop duplicates, order by descending relevance and cap the list.
fn rank(mut results: Vec<AlumniResult>, cap: usize) -> Vec<AlumniResult> {
    results.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));

    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|r| seen.insert(r.dedupe_key()))
        .take(cap)
        .collect()
}

fn service_label(err: &Error) -> &'static str {
    match err {
        Error::Embedding(_) => "embedding",
        Error::IndexQuery(_) => "vector_index",
        Error::Query(_) => "relational",
        Error::Completion(_) => "completion",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::relational::tests::seeded_pool;
    use crate::search::testing::{alum, row, FakeEmbedder, FakeIndex, FakeStore};
    use crate::search::{SqliteSearchClient, UnavailableEmbeddingClient, UnavailableIndexClient};
    use std::sync::atomic::Ordering;

    fn orchestrator(
        embedder: FakeEmbedder,
        index: Arc<FakeIndex>,
        store: Arc<FakeStore>,
    ) -> SearchOrchestrator {
        SearchOrchestrator::new(Arc::new(embedder), index, store)
    }

    #[tokio::test]
    async fn test_empty_vector_results_trigger_fallback() {
        let index = Arc::new(FakeIndex::with(Vec::new()));
        let store = Arc::new(FakeStore::with(vec![row("Ada Park", "Quant Trader")]));
        let orch = orchestrator(FakeEmbedder { fail: false }, index, store.clone());

        let outcome = orch
            .search_with("quant", None, SearchLimits::default())
            .await;

        assert_eq!(store.calls(), 1);
        assert_eq!(outcome.path, SearchPath::Relational);
        assert_eq!(outcome.results[0].name, "Ada Park");
    }

    #[tokio::test]
    async fn test_fallback_runs_even_when_it_finds_nothing() {
        let index = Arc::new(FakeIndex::with(Vec::new()));
        let store = Arc::new(FakeStore::with(Vec::new()));
        let orch = orchestrator(FakeEmbedder { fail: false }, index, store.clone());

        let results = orch.search("quant", None).await;

        assert!(results.is_empty());
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test]
    async fn test_embedding_failure_triggers_fallback() {
        let index = Arc::new(FakeIndex::with(vec![alum("Ada", 0.9, "Yale University")]));
        let store = Arc::new(FakeStore::with(vec![row("Ben Ortiz", "Engineer")]));
        let orch = orchestrator(FakeEmbedder { fail: true }, index.clone(), store.clone());

        let outcome = orch
            .search_with("software", None, SearchLimits::default())
            .await;

        assert_eq!(outcome.path, SearchPath::Relational);
        assert_eq!(store.calls(), 1);
        // The index is never reached without an embedding.
        assert_eq!(index.last_top_k.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_index_failure_triggers_fallback() {
        let store = Arc::new(FakeStore::with(vec![row("Ben Ortiz", "Engineer")]));
        let orch = orchestrator(
            FakeEmbedder { fail: false },
            Arc::new(FakeIndex::failing()),
            store.clone(),
        );

        let results = orch.search("software", None).await;

        assert_eq!(results.len(), 1);
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test]
    async fn test_both_paths_failing_yields_empty_list() {
        let orch = orchestrator(
            FakeEmbedder { fail: true },
            Arc::new(FakeIndex::failing()),
            Arc::new(FakeStore::failing()),
        );

        let outcome = orch
            .search_with("anything", None, SearchLimits::default())
            .await;

        assert!(outcome.results.is_empty());
        assert_eq!(outcome.path, SearchPath::None);
    }

    #[tokio::test]
    async fn test_vector_results_are_affiliated_only() {
        let mut snippet_only = alum("Cara", 0.7, "");
        snippet_only.metadata.insert(
            "text_snippet".to_string(),
            "Cara graduated from YALE in 2015".to_string(),
        );
        let index = Arc::new(FakeIndex::with(vec![
            alum("Ada", 0.9, "Yale University, BA Economics"),
            alum("Dan", 0.95, "University of Chicago"),
            snippet_only,
        ]));
        let store = Arc::new(FakeStore::with(Vec::new()));
        let orch = orchestrator(FakeEmbedder { fail: false }, index, store.clone());

        let results = orch.search("finance", None).await;
        let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();

        assert_eq!(names, vec!["Ada", "Cara"]);
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_affiliation_flag_vetoes_match() {
        let mut flagged = alum("Eve", 0.9, "Yale University");
        flagged
            .metadata
            .insert("yale_affiliated".to_string(), "false".to_string());
        let index = Arc::new(FakeIndex::with(vec![flagged, alum("Ada", 0.8, "Yale")]));
        let config = SearchConfig {
            affiliation_flag_field: Some("yale_affiliated".to_string()),
            ..Default::default()
        };
        let orch = orchestrator(
            FakeEmbedder { fail: false },
            index,
            Arc::new(FakeStore::with(Vec::new())),
        )
        .with_config(&config);

        let results = orch.search("finance", None).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Ada");
    }

    #[tokio::test]
    async fn test_score_floor_excludes_weak_matches() {
        let index = Arc::new(FakeIndex::with(vec![
            alum("Ada", 0.62, "Yale"),
            alum("Ben", 0.41, "Yale"),
        ]));
        let orch = orchestrator(
            FakeEmbedder { fail: false },
            index,
            Arc::new(FakeStore::with(Vec::new())),
        );
        let limits = SearchLimits {
            score_floor: 0.5,
            ..Default::default()
        };

        let outcome = orch.search_with("finance", None, limits).await;
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].name, "Ada");
    }

    #[tokio::test]
    async fn test_vector_results_sorted_deduped_and_capped() {
        let matches: Vec<_> = (0..20)
            .map(|i| alum(&format!("Alum {}", i % 15), 0.5 + i as f32 * 0.02, "Yale"))
            .collect();
        let index = Arc::new(FakeIndex::with(matches));
        let orch = orchestrator(
            FakeEmbedder { fail: false },
            index.clone(),
            Arc::new(FakeStore::with(Vec::new())),
        );
        let limits = SearchLimits {
            top_k: 20,
            display_cap: 8,
            ..Default::default()
        };

        let results = orch.search_with("finance", None, limits).await.results;

        assert_eq!(index.last_top_k.load(Ordering::SeqCst), 20);
        assert_eq!(results.len(), 8);
        assert!(results
            .windows(2)
            .all(|w| w[0].relevance_score >= w[1].relevance_score));
        let unique: HashSet<_> = results.iter().map(|r| r.dedupe_key()).collect();
        assert_eq!(unique.len(), results.len());
    }

    #[tokio::test]
    async fn test_fallback_results_are_capped() {
        let rows: Vec<_> = (0..10)
            .map(|i| row(&format!("Person {}", i), "Analyst"))
            .collect();
        let orch = orchestrator(
            FakeEmbedder { fail: true },
            Arc::new(FakeIndex::with(Vec::new())),
            Arc::new(FakeStore::with(rows)),
        );
        let limits = SearchLimits {
            display_cap: 6,
            ..Default::default()
        };

        let outcome = orch.search_with("analyst", None, limits).await;
        assert_eq!(outcome.results.len(), 6);
    }

    #[tokio::test]
    async fn test_fallback_uses_profile_when_query_has_no_keywords() {
        let store = Arc::new(FakeStore::with(Vec::new()));
        let orch = orchestrator(
            FakeEmbedder { fail: true },
            Arc::new(FakeIndex::with(Vec::new())),
            store.clone(),
        );
        let profile = StudentProfile {
            interests: Some("biotech".to_string()),
            ..Default::default()
        };

        orch.search("who can help me?", Some(&profile)).await;

        let params = store.last_params.lock().unwrap().clone();
        assert!(params.contains(&"%biotech%".to_string()));
    }

    #[tokio::test]
    async fn test_fallback_against_sqlite() {
        let store = Arc::new(SqliteSearchClient::from_pool(seeded_pool().await));
        let orch = SearchOrchestrator::new(
            Arc::new(FakeEmbedder { fail: false }),
            Arc::new(FakeIndex::failing()),
            store,
        );
        let request = SearchRequest::new("quant finance").with_profile(StudentProfile {
            major: Some("Economics".to_string()),
            interests: Some("trading".to_string()),
            ..Default::default()
        });

        let results = orch.search_request(&request).await;
        let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();

        // Ada matches quant + economics, Cara matches finance + trading.
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"Ada Park") && names.contains(&"Cara Li"));
        assert!(results.iter().all(|r| r.relevance_score == 70.0));
    }

    #[tokio::test]
    async fn test_disabled_semantic_search_serves_relational_results() {
        let orch = SearchOrchestrator::new(
            Arc::new(UnavailableEmbeddingClient::new("model download failed")),
            Arc::new(UnavailableIndexClient::new("PINECONE_API_KEY is empty")),
            Arc::new(SqliteSearchClient::from_pool(seeded_pool().await)),
        );

        let outcome = orch
            .search_with("trading", None, SearchLimits::default())
            .await;

        assert_eq!(outcome.path, SearchPath::Relational);
        assert_eq!(outcome.results[0].name, "Cara Li");
    }
}
