//! Contracts for the external collaborators the pipelines call out to.
//!
//! Implementations live outside this core: a generative text service, a
//! search/lookup service, and a document renderer. The engine only ever sees
//! these traits, so tests inject stubs and production wires real clients at
//! process start.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use stagehand_shared::{Insight, Synthesis};
use stagehand_store::{ResultCache, cache_key};

/// Failure reported by an external collaborator.
///
/// `Malformed` covers output that arrived but cannot be parsed into the
/// expected structured shape; treated as a stage failure subject to
/// fallback, never as a crash.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("malformed collaborator output: {0}")]
    Malformed(String),
}

/// One result from the search/lookup collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Generative text collaborator (e.g., a language model).
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CollaboratorError>;
}

/// Search/lookup collaborator. Always accessed through [`CachedSearch`].
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, CollaboratorError>;
}

/// Document rendering collaborator, invoked by the final stage.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(
        &self,
        synthesis: &Synthesis,
        insights: &[Insight],
    ) -> Result<String, CollaboratorError>;
}

// ---------------------------------------------------------------------------
// Cached search wrapper
// ---------------------------------------------------------------------------

/// Wraps a [`SearchProvider`] with the TTL result cache.
///
/// Two callers issuing the same logical query within the TTL window hit the
/// underlying collaborator exactly once. The cached copy is consumed, not
/// referenced live: a session may keep data from an entry that has since
/// expired.
pub struct CachedSearch {
    provider: Arc<dyn SearchProvider>,
    cache: Arc<ResultCache<Vec<SearchResult>>>,
}

impl CachedSearch {
    pub fn new(provider: Arc<dyn SearchProvider>, cache: Arc<ResultCache<Vec<SearchResult>>>) -> Self {
        Self { provider, cache }
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, CollaboratorError> {
        let key = cache_key(query, &[]);

        if let Some(results) = self.cache.get(&key).await {
            debug!(query, "search cache hit");
            return Ok(results);
        }

        let results = self.provider.search(query).await?;
        self.cache.put(key, results.clone()).await;
        Ok(results)
    }
}
