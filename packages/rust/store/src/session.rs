//! TTL-keyed in-memory store of pipeline session records.
//!
//! The single source of truth for in-flight and completed runs. Mutations go
//! through [`SessionStore::mutate`], which serializes updates per session id
//! while leaving distinct ids fully independent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::ser::SerializeMap;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use stagehand_shared::{
    Insight, PipelineInput, SessionStatus, SourceRecord, StageFailure, StageName, StageOutput,
    Synthesis,
};

// ---------------------------------------------------------------------------
// StageOutputs
// ---------------------------------------------------------------------------

/// Ordered mapping from stage name to the stage's last-produced payload.
///
/// Order is the pipeline's declared stage order; re-inserting under an
/// existing name replaces the payload in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutputs(Vec<(StageName, StageOutput)>);

impl StageOutputs {
    pub fn get(&self, name: &str) -> Option<&StageOutput> {
        self.0
            .iter()
            .find(|(n, _)| n.as_str() == name)
            .map(|(_, o)| o)
    }

    /// Insert or replace the payload for a stage, preserving declared order.
    pub fn insert(&mut self, name: StageName, output: StageOutput) {
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = output,
            None => self.0.push((name, output)),
        }
    }

    pub fn last(&self) -> Option<&StageOutput> {
        self.0.last().map(|(_, o)| o)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StageName, &StageOutput)> {
        self.0.iter().map(|(n, o)| (n, o))
    }

    /// Most recent collection payload, whichever stage produced it.
    pub fn records(&self) -> Option<&[SourceRecord]> {
        self.0.iter().rev().find_map(|(_, o)| o.as_records())
    }

    /// Most recent synthesis payload.
    pub fn synthesis(&self) -> Option<&Synthesis> {
        self.0.iter().rev().find_map(|(_, o)| o.as_synthesis())
    }

    /// Most recent analysis payload.
    pub fn insights(&self) -> Option<&[Insight]> {
        self.0.iter().rev().find_map(|(_, o)| o.as_insights())
    }
}

impl Serialize for StageOutputs {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, output) in &self.0 {
            map.serialize_entry(name.as_str(), output)?;
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The stateful record of a single pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    /// Name of the pipeline definition this session runs under.
    pub pipeline: String,
    /// The caller input the run was started with; reused by `update`.
    pub input: PipelineInput,
    pub status: SessionStatus,
    pub stage_outputs: StageOutputs,
    /// Set when a stage failed fatally; tagged with the originating stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StageFailure>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    fn new(id: String, pipeline: String, input: PipelineInput, initial_stage: StageName) -> Self {
        Self {
            id,
            pipeline,
            input,
            status: SessionStatus::Stage(initial_stage),
            stage_outputs: StageOutputs::default(),
            error: None,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

/// In-memory session store with TTL expiry and per-id serialized mutation.
pub struct SessionStore {
    ttl: Duration,
    entries: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// (Re)initialize the session under `id`: a restart, not an error.
    /// Any prior record under the same id is overwritten wholesale.
    pub async fn create(
        &self,
        id: &str,
        pipeline: &str,
        input: PipelineInput,
        initial_stage: StageName,
    ) {
        let session = Session::new(id.to_string(), pipeline.to_string(), input, initial_stage);
        let mut entries = self.entries.write().await;
        entries.insert(id.to_string(), Arc::new(Mutex::new(session)));
    }

    /// Snapshot of the session, or `None` if absent or past TTL.
    ///
    /// Expired-but-unswept sessions are indistinguishable from never-created
    /// ones (lazy expiry on read).
    pub async fn get(&self, id: &str) -> Option<Session> {
        let slot = {
            let entries = self.entries.read().await;
            entries.get(id)?.clone()
        };
        let session = slot.lock().await;
        if is_expired(session.created_at, self.ttl) {
            return None;
        }
        Some(session.clone())
    }

    /// Apply an atomic, serialized update to one session.
    ///
    /// Concurrent `mutate` calls against the same id are strictly ordered by
    /// the per-session mutex; calls against different ids do not block one
    /// another. Returns `None` when the session is absent or expired.
    pub async fn mutate<R>(&self, id: &str, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let slot = {
            let entries = self.entries.read().await;
            entries.get(id)?.clone()
        };
        let mut session = slot.lock().await;
        if is_expired(session.created_at, self.ttl) {
            return None;
        }
        Some(f(&mut session))
    }

    /// Remove all entries older than TTL. Returns the number removed.
    pub async fn sweep_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, slot| match slot.try_lock() {
            Ok(session) => !is_expired(session.created_at, ttl),
            // A locked slot is mid-mutation and therefore live.
            Err(_) => true,
        });
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "swept expired sessions");
        }
        removed
    }

    /// Unconditional removal regardless of status. Returns whether a record
    /// was present.
    pub async fn delete(&self, id: &str) -> bool {
        let mut entries = self.entries.write().await;
        entries.remove(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

fn is_expired(created_at: DateTime<Utc>, ttl: Duration) -> bool {
    match Utc::now().signed_duration_since(created_at).to_std() {
        Ok(age) => age > ttl,
        // created_at in the future: clock skew, treat as fresh.
        Err(_) => false,
    }
}
