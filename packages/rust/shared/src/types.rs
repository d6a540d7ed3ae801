//! Core domain types for Stagehand pipeline sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// StageName / StageKind
// ---------------------------------------------------------------------------

/// The name of one declared pipeline stage (e.g., `Collecting`).
///
/// Stage names come from static pipeline definitions, so they are borrowed
/// for the process lifetime and cheap to copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct StageName(pub &'static str);

impl StageName {
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

impl AsRef<str> for StageName {
    fn as_ref(&self) -> &str {
        self.0
    }
}

/// Error-taxonomy category a stage belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Collection,
    Synthesis,
    Analysis,
    Generation,
}

// ---------------------------------------------------------------------------
// Session identifiers & status
// ---------------------------------------------------------------------------

/// Mint a fresh time-sortable session id for callers that did not supply one.
pub fn new_session_id() -> String {
    Uuid::now_v7().to_string()
}

/// Where a session currently is in its pipeline's state machine.
///
/// The state set is the pipeline's ordered stage names plus the two
/// absorbing states `Completed` and `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Currently executing (or about to execute) the named stage.
    Stage(StageName),
    Completed,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stage(name) => name.as_str(),
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SessionStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Stage payloads (tagged union)
// ---------------------------------------------------------------------------

/// One record gathered by a collection stage from an external lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// The logical query that produced this record.
    pub query: String,
    /// Result title or headline.
    pub title: String,
    /// Short excerpt of the result body.
    pub snippet: String,
    /// Origin URL, when the collaborator reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Output of a synthesis stage: a condensed narrative over the collected
/// records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synthesis {
    pub summary: String,
    #[serde(default)]
    pub highlights: Vec<String>,
}

/// One insight produced by an analysis stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub heading: String,
    pub detail: String,
}

/// The final rendered document returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    pub body: String,
    pub generated_at: DateTime<Utc>,
    /// True when any stage fell back to degraded local output.
    #[serde(default)]
    pub degraded: bool,
}

/// Payload produced by one pipeline stage.
///
/// A tagged union rather than a free-form map: downstream stages validate
/// structurally by matching the variant they expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageOutput {
    Collection { records: Vec<SourceRecord> },
    Synthesis(Synthesis),
    Analysis { insights: Vec<Insight> },
    Document(Document),
}

impl StageOutput {
    pub fn as_records(&self) -> Option<&[SourceRecord]> {
        match self {
            Self::Collection { records } => Some(records),
            _ => None,
        }
    }

    pub fn as_synthesis(&self) -> Option<&Synthesis> {
        match self {
            Self::Synthesis(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_insights(&self) -> Option<&[Insight]> {
        match self {
            Self::Analysis { insights } => Some(insights),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Self::Document(doc) => Some(doc),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline input
// ---------------------------------------------------------------------------

/// Caller-supplied input to a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineInput {
    /// The subject of the run (a person, a topic, an email body).
    pub subject: String,
    /// Optional free-text context supplied alongside the subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl PipelineInput {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            context: None,
        }
    }

    pub fn with_context(subject: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            context: Some(context.into()),
        }
    }
}
