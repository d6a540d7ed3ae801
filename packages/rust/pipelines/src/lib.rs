//! Concrete pipeline definitions built on the stagehand engine.
//!
//! Each pipeline is an ordered stage list wired to the shared collaborator
//! set; the stage behavior itself lives in [`stages`].

use std::sync::Arc;

use stagehand_core::{CachedSearch, DocumentRenderer, PipelineSpec, TextGenerator};
use stagehand_shared::Result;

pub mod dossier;
pub mod fact_check;
pub mod records_request;
pub mod stages;

/// The external services every pipeline draws on.
#[derive(Clone)]
pub struct Collaborators {
    pub search: Arc<CachedSearch>,
    pub generator: Arc<dyn TextGenerator>,
    pub renderer: Arc<dyn DocumentRenderer>,
}

/// All shipped pipeline definitions, ready to register with the orchestrator.
pub fn registry(collab: &Collaborators) -> Result<Vec<Arc<PipelineSpec>>> {
    Ok(vec![
        Arc::new(dossier::spec(collab)?),
        Arc::new(records_request::spec(collab)?),
        Arc::new(fact_check::spec(collab)?),
    ])
}
