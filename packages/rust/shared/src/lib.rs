//! Shared types, error model, and configuration for Stagehand.
//!
//! This crate is the foundation depended on by all other Stagehand crates.
//! It provides:
//! - [`StagehandError`], the unified stage-tagged error taxonomy
//! - Domain types ([`StageOutput`], [`Document`], [`SessionStatus`], [`StageName`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CacheConfig, ExecutionConfig, ServerConfig, SessionConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{Result, StageFailure, StagehandError};
pub use types::{
    Document, Insight, PipelineInput, SessionStatus, SourceRecord, StageKind, StageName,
    StageOutput, Synthesis, new_session_id,
};
