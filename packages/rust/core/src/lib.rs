//! Pipeline engine: stage contracts, collaborator traits, and the
//! session-scoped orchestrator that sequences them.

pub mod collaborators;
pub mod executor;
pub mod orchestrator;
pub mod spec;

pub use collaborators::{
    CachedSearch, CollaboratorError, DocumentRenderer, SearchProvider, SearchResult, TextGenerator,
};
pub use executor::{StageContext, StageError, StageExecutor, fan_out, run_stage};
pub use orchestrator::{PipelineOrchestrator, PipelineRun, StatusReport};
pub use spec::{PipelineSpec, PipelineSpecBuilder, StageDef};
