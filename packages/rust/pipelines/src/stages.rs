//! Stage executors shared by every pipeline definition.
//!
//! Each pipeline differs only in its stage ordering, query plan, and prompt
//! wording; the executors here carry the actual collection/synthesis/
//! analysis/generation behavior, including the fallback payloads.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::warn;

use stagehand_core::{
    CachedSearch, DocumentRenderer, StageContext, StageError, StageExecutor, TextGenerator,
    fan_out,
};
use stagehand_shared::{Document, Insight, SourceRecord, StageOutput, Synthesis};
use stagehand_store::StageOutputs;

/// Builds the sub-queries a collection stage fans out over.
pub type QueryPlan = fn(&StageContext) -> Vec<String>;

/// Builds the prompt for a generative stage from whatever prior output holds.
pub type PromptBuilder = fn(&StageContext, &StageOutputs) -> String;

// ---------------------------------------------------------------------------
// Collection
// ---------------------------------------------------------------------------

/// Fans sub-queries out over the cached search collaborator and keeps every
/// successful subset. Fails only when no sub-query returned anything usable.
pub struct CollectStage {
    search: Arc<CachedSearch>,
    plan: QueryPlan,
}

impl CollectStage {
    pub fn new(search: Arc<CachedSearch>, plan: QueryPlan) -> Self {
        Self { search, plan }
    }
}

#[async_trait]
impl StageExecutor for CollectStage {
    async fn execute(
        &self,
        ctx: &StageContext,
        _prior: &StageOutputs,
    ) -> Result<StageOutput, StageError> {
        let queries = (self.plan)(ctx);
        let tasks: Vec<_> = queries
            .into_iter()
            .map(|query| {
                let search = self.search.clone();
                async move {
                    let results = search.search(&query).await?;
                    Ok::<_, StageError>((query, results))
                }
            })
            .collect();

        let joined = fan_out(tasks, ctx.exec.fan_out, ctx.exec.call_timeout()).await;

        let mut records = Vec::new();
        for result in joined {
            match result {
                Ok((query, results)) => {
                    records.extend(results.into_iter().map(|r| SourceRecord {
                        query: query.clone(),
                        title: r.title,
                        snippet: r.snippet,
                        url: r.url,
                    }));
                }
                Err(err) => {
                    // Partial-result policy: a failed sub-query drops only
                    // its own contribution.
                    warn!(error = %err, "collection sub-query dropped");
                }
            }
        }

        if records.is_empty() {
            return Err(StageError::new("every collection sub-query failed"));
        }
        Ok(StageOutput::Collection { records })
    }
}

// ---------------------------------------------------------------------------
// Synthesis
// ---------------------------------------------------------------------------

/// Asks the generative collaborator to condense the collected records.
/// Falls back to a deterministic digest of the records themselves.
pub struct SynthesizeStage {
    generator: Arc<dyn TextGenerator>,
    prompt: PromptBuilder,
}

impl SynthesizeStage {
    pub fn new(generator: Arc<dyn TextGenerator>, prompt: PromptBuilder) -> Self {
        Self { generator, prompt }
    }
}

#[async_trait]
impl StageExecutor for SynthesizeStage {
    async fn execute(
        &self,
        ctx: &StageContext,
        prior: &StageOutputs,
    ) -> Result<StageOutput, StageError> {
        if prior.records().is_none_or(|r| r.is_empty()) {
            return Err(StageError::new("nothing collected to synthesize"));
        }
        let text = complete_bounded(&*self.generator, ctx, (self.prompt)(ctx, prior)).await?;
        let synthesis: Synthesis = parse_structured(&text)?;
        Ok(StageOutput::Synthesis(synthesis))
    }

    fn fallback(&self, _ctx: &StageContext, prior: &StageOutputs) -> Option<StageOutput> {
        let records = prior.records().filter(|r| !r.is_empty())?;
        Some(StageOutput::Synthesis(synthesis_from_records(records)))
    }
}

/// Deterministic digest used as the synthesis fallback and as the implicit
/// synthesis for pipelines with no synthesis stage.
pub fn synthesis_from_records(records: &[SourceRecord]) -> Synthesis {
    Synthesis {
        summary: records
            .iter()
            .map(|r| r.snippet.as_str())
            .collect::<Vec<_>>()
            .join(" "),
        highlights: records.iter().take(5).map(|r| r.title.clone()).collect(),
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// Derives structured insights from the prior outputs. No fallback: insights
/// require generative reasoning and have no locally computable substitute.
pub struct AnalyzeStage {
    generator: Arc<dyn TextGenerator>,
    prompt: PromptBuilder,
}

impl AnalyzeStage {
    pub fn new(generator: Arc<dyn TextGenerator>, prompt: PromptBuilder) -> Self {
        Self { generator, prompt }
    }
}

#[derive(Deserialize)]
struct InsightPayload {
    insights: Vec<Insight>,
}

#[async_trait]
impl StageExecutor for AnalyzeStage {
    async fn execute(
        &self,
        ctx: &StageContext,
        prior: &StageOutputs,
    ) -> Result<StageOutput, StageError> {
        if prior.is_empty() {
            return Err(StageError::new("nothing to analyze"));
        }
        let text = complete_bounded(&*self.generator, ctx, (self.prompt)(ctx, prior)).await?;
        let payload: InsightPayload = parse_structured(&text)?;
        Ok(StageOutput::Analysis {
            insights: payload.insights,
        })
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Renders the final document via the rendering collaborator, degrading to a
/// locally assembled markdown document when the renderer fails.
pub struct GenerateStage {
    renderer: Arc<dyn DocumentRenderer>,
}

impl GenerateStage {
    pub fn new(renderer: Arc<dyn DocumentRenderer>) -> Self {
        Self { renderer }
    }

    fn inputs(prior: &StageOutputs) -> Option<(Synthesis, Vec<Insight>)> {
        let synthesis = prior
            .synthesis()
            .cloned()
            .or_else(|| prior.records().map(synthesis_from_records))?;
        let insights = prior.insights().map(<[Insight]>::to_vec).unwrap_or_default();
        Some((synthesis, insights))
    }
}

#[async_trait]
impl StageExecutor for GenerateStage {
    async fn execute(
        &self,
        ctx: &StageContext,
        prior: &StageOutputs,
    ) -> Result<StageOutput, StageError> {
        let (synthesis, insights) =
            Self::inputs(prior).ok_or_else(|| StageError::new("nothing to render"))?;

        let body = tokio::time::timeout(
            ctx.exec.call_timeout(),
            self.renderer.render(&synthesis, &insights),
        )
        .await
        .map_err(|_| StageError::new("renderer timed out"))??;

        Ok(StageOutput::Document(Document {
            title: ctx.input.subject.clone(),
            body,
            generated_at: Utc::now(),
            degraded: false,
        }))
    }

    fn fallback(&self, ctx: &StageContext, prior: &StageOutputs) -> Option<StageOutput> {
        let (synthesis, insights) = Self::inputs(prior)?;
        Some(StageOutput::Document(Document {
            title: ctx.input.subject.clone(),
            body: render_markdown(&ctx.input.subject, &synthesis, &insights),
            generated_at: Utc::now(),
            degraded: true,
        }))
    }
}

/// Deterministic markdown rendering used by the generation fallback.
pub fn render_markdown(subject: &str, synthesis: &Synthesis, insights: &[Insight]) -> String {
    let mut body = format!("# {subject}\n\n{}\n", synthesis.summary);
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
    body
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Single generative call with the per-call timeout applied.
async fn complete_bounded(
    generator: &dyn TextGenerator,
    ctx: &StageContext,
    prompt: String,
) -> Result<String, StageError> {
    match tokio::time::timeout(ctx.exec.call_timeout(), generator.complete(&prompt)).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(StageError::new("generative call timed out")),
    }
}

/// Parses a generative response as JSON, tolerating surrounding prose and
/// code fences. Unparseable output is a stage failure subject to fallback.
fn parse_structured<T: for<'de> Deserialize<'de>>(text: &str) -> Result<T, StageError> {
    let start = text.find('{');
    let end = text.rfind('}');
    let candidate = match (start, end) {
        (Some(s), Some(e)) if s < e => &text[s..=e],
        _ => text,
    };
    serde_json::from_str(candidate)
        .map_err(|e| StageError::new(format!("unparseable generative output: {e}")))
}
