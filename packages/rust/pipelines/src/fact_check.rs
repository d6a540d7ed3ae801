//! Email fact-checking pipeline.
//!
//! Treats the input subject as a claim (or email excerpt), gathers
//! corroborating sources, and analyzes them into verdict-style findings.
//! There is no synthesis stage; the generation stage digests the raw
//! sources directly alongside the analysis findings.

use std::sync::Arc;

use stagehand_core::{PipelineSpec, StageContext};
use stagehand_shared::{Result, StageKind};
use stagehand_store::StageOutputs;

use crate::Collaborators;
use crate::dossier::{push_context, push_records};
use crate::stages::{AnalyzeStage, CollectStage, GenerateStage};

pub const NAME: &str = "fact_check";

/// Long email bodies make poor search queries; cap the claim excerpt.
const CLAIM_QUERY_MAX: usize = 160;

pub fn spec(collab: &Collaborators) -> Result<PipelineSpec> {
    PipelineSpec::builder(NAME)
        .stage(
            "Collecting",
            StageKind::Collection,
            Arc::new(CollectStage::new(collab.search.clone(), queries)),
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
    let claim = claim_excerpt(&ctx.input.subject);
    vec![claim.to_string(), format!("{claim} fact check")]
}

fn claim_excerpt(subject: &str) -> &str {
    match subject.char_indices().nth(CLAIM_QUERY_MAX) {
        Some((idx, _)) => &subject[..idx],
        None => subject,
    }
}

fn analysis_prompt(ctx: &StageContext, prior: &StageOutputs) -> String {
    let mut prompt = format!(
        "Assess the following claim against the collected sources:\nClaim: {}\n",
        ctx.input.subject
    );
    push_records(&mut prompt, prior);
    push_context(&mut prompt, ctx);
    prompt.push_str(
        "Respond with JSON only: {\"insights\": [{\"heading\": \"...\", \"detail\": \"...\"}]}\n",
    );
    prompt
}
