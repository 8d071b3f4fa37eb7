//! Web research: grounded searches, saved findings and watchlists.

use std::sync::Arc;

use crate::ai::{GenerativeAi, WebSearchResult};
use crate::error::{Error, Result};
use crate::models::{Finding, NewFinding, NewWatchlist, Watchlist};
use crate::store::CaseRepository;

/// Text returned when the provider search fails.
pub const SEARCH_ERROR_TEXT: &str = "Erreur lors de la recherche web.";

pub struct Research {
    repo: Arc<dyn CaseRepository>,
    ai: Arc<dyn GenerativeAi>,
}

impl Research {
    pub fn new(repo: Arc<dyn CaseRepository>, ai: Arc<dyn GenerativeAi>) -> Self {
        Self { repo, ai }
    }

    /// Run a grounded search. Provider failures degrade to a fixed text
    /// without sources.
    pub async fn web_search(&self, query: &str) -> Result<WebSearchResult> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidInput("search query is required".to_string()));
        }
        match self.ai.web_search(query).await {
            Ok(result) => {
                tracing::info!(query, sources = result.sources.len(), "Web search completed");
                Ok(result)
            }
            Err(e) => {
                tracing::error!(query, error = %e, "Web search failed");
                Ok(WebSearchResult {
                    text: SEARCH_ERROR_TEXT.to_string(),
                    sources: Vec::new(),
                })
            }
        }
    }

    /// Keep a search result as a finding.
    pub async fn save_finding(&self, query: &str, result: WebSearchResult) -> Result<Finding> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidInput("finding query is required".to_string()));
        }
        self.repo
            .add_finding(NewFinding {
                query: query.to_string(),
                text: result.text,
                sources: result.sources,
            })
            .await
    }

    pub async fn findings(&self) -> Result<Vec<Finding>> {
        self.repo.list_findings().await
    }

    /// Delete findings in bulk. Unknown ids are ignored.
    pub async fn delete_findings(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let removed = self.repo.delete_findings(ids).await?;
        tracing::info!(requested = ids.len(), removed, "Findings deleted");
        Ok(removed)
    }

    pub async fn watchlists(&self) -> Result<Vec<Watchlist>> {
        self.repo.list_watchlists().await
    }

    /// Register a watchlist. Its queries are not re-run on a schedule.
    pub async fn create_watchlist(
        &self,
        name: &str,
        query: &str,
        refresh_interval_minutes: u32,
    ) -> Result<Watchlist> {
        let name = name.trim();
        let query = query.trim();
        if name.is_empty() || query.is_empty() {
            return Err(Error::InvalidInput(
                "watchlist name and query are required".to_string(),
            ));
        }
        if refresh_interval_minutes == 0 {
            return Err(Error::InvalidInput(
                "refresh interval must be at least one minute".to_string(),
            ));
        }
        self.repo
            .add_watchlist(NewWatchlist {
                name: name.to_string(),
                query: query.to_string(),
                refresh_interval_minutes,
            })
            .await
    }
}
