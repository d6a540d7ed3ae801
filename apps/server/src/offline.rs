//! Offline collaborator implementations.
//!
//! Deterministic stand-ins used when no external service clients are
//! configured, so the server runs end-to-end out of the box. The search and
//! generator stubs produce placeholder content; the markdown renderer is a
//! complete implementation (rendering needs no external service).

use async_trait::async_trait;
use serde_json::json;

use stagehand_core::{
    CollaboratorError, DocumentRenderer, SearchProvider, SearchResult, TextGenerator,
};
use stagehand_shared::{Insight, Synthesis};

/// Echoes the query back as a single placeholder result.
pub struct OfflineSearch;

#[async_trait]
impl SearchProvider for OfflineSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, CollaboratorError> {
        Ok(vec![SearchResult {
            title: query.to_string(),
            snippet: format!("No search backend configured; placeholder result for \"{query}\"."),
            url: None,
        }])
    }
}

/// Returns minimal well-formed payloads for the structured shapes the
/// pipelines request, keyed off the response schema named in the prompt.
pub struct OfflineGenerator;

#[async_trait]
impl TextGenerator for OfflineGenerator {
    async fn complete(&self, prompt: &str) -> Result<String, CollaboratorError> {
        let payload = if prompt.contains("\"insights\"") {
            json!({ "insights": [] })
        } else {
            json!({
                "summary": "No generative backend configured; see collected sources.",
                "highlights": [],
            })
        };
        Ok(payload.to_string())
    }
}

/// Renders documents as markdown locally.
pub struct MarkdownRenderer;

#[async_trait]
impl DocumentRenderer for MarkdownRenderer {
    async fn render(
        &self,
        synthesis: &Synthesis,
        insights: &[Insight],
    ) -> Result<String, CollaboratorError> {
        let mut body = format!("{}\n", synthesis.summary);
        if !synthesis.highlights.is_empty() {
            body.push_str("\n## Highlights\n");
            for highlight in &synthesis.highlights {
                body.push_str(&format!("- {highlight}\n"));
            }
        }
        if !insights.is_empty() {
            body.push_str("\n## Findings\n");
            for insight in insights {
                body.push_str(&format!("- **{}**: {}\n", insight.heading, insight.detail));
            }
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offline_generator_matches_requested_shape() {
        let synthesis = OfflineGenerator
            .complete("... Respond with JSON only: {\"summary\": \"...\"}")
            .await
            .unwrap();
        assert!(synthesis.contains("summary"));

        let analysis = OfflineGenerator
            .complete("... Respond with JSON only: {\"insights\": [...]}")
            .await
            .unwrap();
        assert!(analysis.contains("insights"));
    }

    #[tokio::test]
    async fn markdown_renderer_lists_highlights_and_findings() {
        let synthesis = Synthesis {
            summary: "summary".into(),
            highlights: vec!["one".into()],
        };
        let insights = vec![Insight {
            heading: "Note".into(),
            detail: "detail".into(),
        }];
        let body = MarkdownRenderer.render(&synthesis, &insights).await.unwrap();
        assert!(body.contains("- one"));
        assert!(body.contains("**Note**: detail"));
    }
}
