//! Meeting-preparation dossier pipeline.
//!
//! Collects public background on a person or organization, condenses it,
//! derives talking-point insights, and renders a briefing document.

use std::sync::Arc;

use stagehand_core::{PipelineSpec, StageContext};
use stagehand_shared::{Result, StageKind};
use stagehand_store::StageOutputs;

use crate::Collaborators;
use crate::stages::{AnalyzeStage, CollectStage, GenerateStage, SynthesizeStage};

pub const NAME: &str = "dossier";

pub fn spec(collab: &Collaborators) -> Result<PipelineSpec> {
    PipelineSpec::builder(NAME)
        .stage(
            "Collecting",
            StageKind::Collection,
            Arc::new(CollectStage::new(collab.search.clone(), queries)),
        )
        .stage(
            "Synthesizing",
            StageKind::Synthesis,
            Arc::new(SynthesizeStage::new(
                collab.generator.clone(),
                synthesis_prompt,
            )),
        )
        .stage(
            "Analyzing",
            StageKind::Analysis,
            Arc::new(AnalyzeStage::new(
                collab.generator.clone(),
                analysis_prompt,
            )),
        )
        .stage(
            "Generating",
            StageKind::Generation,
            Arc::new(GenerateStage::new(collab.renderer.clone())),
        )
        .build()
}

fn queries(ctx: &StageContext) -> Vec<String> {
    let subject = &ctx.input.subject;
    vec![
        subject.clone(),
        format!("{subject} biography"),
        format!("{subject} career history"),
        format!("{subject} recent news"),
    ]
}

fn synthesis_prompt(ctx: &StageContext, prior: &StageOutputs) -> String {
    let mut prompt = format!(
        "Condense the following research notes about {} into a short briefing.\n",
        ctx.input.subject
    );
    push_records(&mut prompt, prior);
    push_context(&mut prompt, ctx);
    prompt.push_str(
        "Respond with JSON only: {\"summary\": \"...\", \"highlights\": [\"...\"]}\n",
    );
    prompt
}

fn analysis_prompt(ctx: &StageContext, prior: &StageOutputs) -> String {
    let mut prompt = format!(
        "From this briefing about {}, derive talking points for an upcoming meeting.\n",
        ctx.input.subject
    );
    if let Some(synthesis) = prior.synthesis() {
        prompt.push_str(&format!("Briefing: {}\n", synthesis.summary));
    }
    push_context(&mut prompt, ctx);
    prompt.push_str(
        "Respond with JSON only: {\"insights\": [{\"heading\": \"...\", \"detail\": \"...\"}]}\n",
    );
    prompt
}

pub(crate) fn push_records(prompt: &mut String, prior: &StageOutputs) {
    if let Some(records) = prior.records() {
        for record in records {
            prompt.push_str(&format!("- {}: {}\n", record.title, record.snippet));
        }
    }
}

pub(crate) fn push_context(prompt: &mut String, ctx: &StageContext) {
    if let Some(context) = &ctx.input.context {
        prompt.push_str(&format!("Caller context: {context}\n"));
    }
    if let Some(extra) = &ctx.extra {
        prompt.push_str(&format!("Updated focus: {extra}\n"));
    }
}
