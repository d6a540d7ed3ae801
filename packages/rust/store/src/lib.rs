//! Shared mutable state for the Stagehand pipeline engine.
//!
//! Two TTL-garbage-collected stores and nothing else:
//! - [`SessionStore`]: session records, per-id serialized mutation
//! - [`ResultCache`]: hash-keyed cache for expensive idempotent lookups
//!
//! Both are constructed explicitly and injected into the orchestrator;
//! there are no module-level globals.

pub mod cache;
pub mod session;

pub use cache::{ResultCache, cache_key};
pub use session::{Session, SessionStore, StageOutputs};
