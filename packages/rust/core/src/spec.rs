//! Immutable pipeline definitions.
//!
//! A [`PipelineSpec`] is an ordered list of named stages bound to executors,
//! shared read-only (via `Arc`) across every session of that pipeline type.

use std::sync::Arc;

use stagehand_shared::{Result, StageKind, StageName, StagehandError};

use crate::executor::StageExecutor;

/// One declared stage: name, error-taxonomy kind, and executor.
#[derive(Clone)]
pub struct StageDef {
    pub name: StageName,
    pub kind: StageKind,
    pub executor: Arc<dyn StageExecutor>,
}

impl std::fmt::Debug for StageDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageDef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Immutable configuration describing one pipeline type.
#[derive(Debug)]
pub struct PipelineSpec {
    name: &'static str,
    stages: Vec<StageDef>,
    resume_from: usize,
}

impl PipelineSpec {
    pub fn builder(name: &'static str) -> PipelineSpecBuilder {
        PipelineSpecBuilder {
            name,
            stages: Vec::new(),
            resume_from: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn stages(&self) -> &[StageDef] {
        &self.stages
    }

    /// Index of the first stage `update` re-runs. Earlier stage outputs are
    /// reused unchanged.
    pub fn resume_from(&self) -> usize {
        self.resume_from
    }

    pub fn first_stage(&self) -> StageName {
        self.stages[0].name
    }
}

/// Builder validating stage ordering constraints at construction time.
pub struct PipelineSpecBuilder {
    name: &'static str,
    stages: Vec<StageDef>,
    resume_from: Option<usize>,
}

impl PipelineSpecBuilder {
    pub fn stage(
        mut self,
        name: &'static str,
        kind: StageKind,
        executor: Arc<dyn StageExecutor>,
    ) -> Self {
        self.stages.push(StageDef {
            name: StageName(name),
            kind,
            executor,
        });
        self
    }

    /// Override the resume point (defaults to 1: everything after the
    /// collection stage re-runs on update).
    pub fn resume_from(mut self, index: usize) -> Self {
        self.resume_from = Some(index);
        self
    }

    pub fn build(self) -> Result<PipelineSpec> {
        if self.stages.is_empty() {
            return Err(StagehandError::config(format!(
                "pipeline {} declares no stages",
                self.name
            )));
        }

        for (i, stage) in self.stages.iter().enumerate() {
            if self.stages[..i].iter().any(|s| s.name == stage.name) {
                return Err(StagehandError::config(format!(
                    "pipeline {} declares duplicate stage {}",
                    self.name, stage.name
                )));
            }
        }

        let resume_from = self.resume_from.unwrap_or(1).min(self.stages.len());

        Ok(PipelineSpec {
            name: self.name,
            stages: self.stages,
            resume_from,
        })
    }
}
