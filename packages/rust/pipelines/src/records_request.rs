//! Government-information-request pipeline.
//!
//! Identifies which public bodies likely hold records on the subject, then
//! drafts a formal records request. No analysis stage: the draft follows
//! directly from the synthesized agency research.

use std::sync::Arc;

use stagehand_core::{PipelineSpec, StageContext};
use stagehand_shared::{Result, StageKind};
use stagehand_store::StageOutputs;

use crate::Collaborators;
use crate::dossier::{push_context, push_records};
use crate::stages::{CollectStage, GenerateStage, SynthesizeStage};

pub const NAME: &str = "records_request";

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
            "Generating",
            StageKind::Generation,
            Arc::new(GenerateStage::new(collab.renderer.clone())),
        )
        .build()
}

fn queries(ctx: &StageContext) -> Vec<String> {
    let subject = &ctx.input.subject;
    vec![
        format!("{subject} government agency records"),
        format!("{subject} public records custodian"),
        format!("{subject} freedom of information"),
    ]
}

fn synthesis_prompt(ctx: &StageContext, prior: &StageOutputs) -> String {
    let mut prompt = format!(
        "Identify the public bodies most likely to hold records about {} \
         and what record series to request.\n",
        ctx.input.subject
    );
    push_records(&mut prompt, prior);
    push_context(&mut prompt, ctx);
    prompt.push_str(
        "Respond with JSON only: {\"summary\": \"...\", \"highlights\": [\"...\"]}\n",
    );
    prompt
}
