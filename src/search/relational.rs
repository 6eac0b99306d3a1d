//! Relational alumni store, queried when vector search comes up empty.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use super::normalize::extract_keywords;
use crate::config::RelationalConfig;
use crate::error::Result;

/// One alumni row from the `people` ⋈ `education` join.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RelationalRow {
    pub name: Option<String>,
    pub position: Option<String>,
    pub location: Option<String>,
    pub url: Option<String>,
    pub field: Option<String>,
    pub end_year: Option<String>,
    pub current_company_name: Option<String>,
    pub connections: Option<i64>,
}

/// Read-only SQL access to the alumni store.
#[async_trait]
pub trait RelationalSearchClient: Send + Sync {
    /// Run `sql` with positional string parameters.
    ///
    /// Fails with [`crate::Error::Query`].
    async fn query(&self, sql: &str, params: &[String]) -> Result<Vec<RelationalRow>>;
}

/// A fallback SQL statement together with the keywords it filters on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackQuery {
    pub sql: String,
    pub params: Vec<String>,
    pub keywords: Vec<String>,
}

/// Build the parameterized fallback query for `search_text`.
///
/// Rows must have an education entry whose title contains
/// `affiliation_keyword`, and (when the text yields any keywords) a position,
/// field or company containing at least one keyword. Rows are ordered by
/// connection count.
pub fn build_fallback_query(
    search_text: &str,
    affiliation_keyword: &str,
    row_limit: usize,
) -> FallbackQuery {
    let keywords = extract_keywords(search_text);

    let mut sql = String::from(
        "SELECT p.name AS name, p.position AS position, p.location AS location, \
         p.url AS url, e.field AS field, CAST(e.end_year AS TEXT) AS end_year, \
         p.current_company_name AS current_company_name, p.connections AS connections \
         FROM people p \
         JOIN education e ON e.person_id = p.id \
         WHERE LOWER(e.title) LIKE ?",
    );
    let mut params = vec![like_pattern(affiliation_keyword)];

    if !keywords.is_empty() {
        let clauses: Vec<&str> = keywords
            .iter()
            .map(|_| {
                "LOWER(p.position) LIKE ? OR LOWER(e.field) LIKE ? \
                 OR LOWER(p.current_company_name) LIKE ?"
            })
            .collect();
        sql.push_str(" AND (");
        sql.push_str(&clauses.join(" OR "));
        sql.push(')');

        for keyword in &keywords {
            let pattern = like_pattern(keyword);
            params.extend([pattern.clone(), pattern.clone(), pattern]);
        }
    }

    sql.push_str(&format!(
        " ORDER BY p.connections DESC LIMIT {}",
        row_limit
    ));

    FallbackQuery {
        sql,
        params,
        keywords,
    }
}

fn like_pattern(term: &str) -> String {
    let escaped: String = term
        .to_lowercase()
        .chars()
        .filter(|c| *c != '%' && *c != '_')
        .collect();
    format!("%{}%", escaped)
}

/// SQLite-backed alumni store.
pub struct SqliteSearchClient {
    pool: SqlitePool,
}

impl SqliteSearchClient {
    pub async fn connect(config: &RelationalConfig) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RelationalSearchClient for SqliteSearchClient {
    async fn query(&self, sql: &str, params: &[String]) -> Result<Vec<RelationalRow>> {
        let mut query = sqlx::query_as::<_, RelationalRow>(sql);
        for param in params {
            query = query.bind(param.as_str());
        }
        Ok(query.fetch_all(&self.pool).await?)
    }
}
