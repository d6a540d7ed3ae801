//! Pipeline orchestration: session lifecycle, stage sequencing, resume.
//!
//! The orchestrator owns no global state: the session store and pipeline
//! specs are injected at construction. Stages run strictly in declared
//! order; each stage's whole output is committed to the session in one
//! atomic store mutation before the next stage starts.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use stagehand_shared::{
    Document, ExecutionConfig, PipelineInput, Result, SessionStatus, StageFailure, StagehandError,
    new_session_id,
};
use stagehand_store::{SessionStore, StageOutputs};

use crate::executor::{StageContext, run_stage};
use crate::spec::PipelineSpec;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of a completed `generate`/`update` run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRun {
    pub session_id: String,
    pub document: Document,
}

/// Point-in-time view of a session, returned by `status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub state: SessionStatus,
    /// Best available outputs, regardless of terminal state.
    pub partial_outputs: StageOutputs,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StageFailure>,
}

// ---------------------------------------------------------------------------
// PipelineOrchestrator
// ---------------------------------------------------------------------------

/// Sequences stages for the registered pipeline definitions and manages
/// session lifecycle transitions.
pub struct PipelineOrchestrator {
    specs: HashMap<&'static str, Arc<PipelineSpec>>,
    sessions: Arc<SessionStore>,
    exec: ExecutionConfig,
    /// Per-session-id run serialization; distinct ids never contend.
    run_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PipelineOrchestrator {
    pub fn new(
        specs: Vec<Arc<PipelineSpec>>,
        sessions: Arc<SessionStore>,
        exec: ExecutionConfig,
    ) -> Self {
        let specs = specs.into_iter().map(|s| (s.name(), s)).collect();
        Self {
            specs,
            sessions,
            exec,
            run_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Run the named pipeline end to end, creating (or restarting) the
    /// session. A reused id restarts from the first stage, overwriting any
    /// prior terminal state.
    #[instrument(skip_all, fields(pipeline = pipeline, session_id = tracing::field::Empty))]
    pub async fn generate(
        &self,
        pipeline: &str,
        session_id: Option<String>,
        input: PipelineInput,
    ) -> Result<PipelineRun> {
        self.sweep().await;

        let spec = self.spec(pipeline)?;
        let id = session_id.unwrap_or_else(new_session_id);
        tracing::Span::current().record("session_id", id.as_str());

        let lock = self.run_lock(&id).await;
        let _guard = lock.lock().await;

        info!(subject = %input.subject, "starting pipeline run");
        self.sessions
            .create(&id, spec.name(), input.clone(), spec.first_stage())
            .await;

        let ctx = StageContext {
            session_id: id.clone(),
            input,
            extra: None,
            exec: self.exec.clone(),
        };

        let document = self.run_from(&spec, &id, &ctx, 0, true).await?;
        Ok(PipelineRun {
            session_id: id,
            document,
        })
    }

    /// Re-run a completed session from the pipeline's resume point, reusing
    /// the collection-stage output unchanged and folding `extra` into the
    /// re-executed stages.
    ///
    /// The session stays `Completed` for the whole re-run; status only moves
    /// to `Error` on a fatal stage failure. Stage-name states are reserved
    /// for initial generation, which is the only path allowed to rewind the
    /// state machine.
    #[instrument(skip_all, fields(session_id = session_id))]
    pub async fn update(&self, session_id: &str, extra: impl Into<String>) -> Result<PipelineRun> {
        let lock = self.run_lock(session_id).await;
        let _guard = lock.lock().await;

        let session = self
            .sessions
            .get(session_id)
            .await
            .ok_or_else(|| StagehandError::SessionNotFound(session_id.to_string()))?;

        if session.status != SessionStatus::Completed {
            return Err(StagehandError::SessionNotReady(session_id.to_string()));
        }

        let spec = self.spec(&session.pipeline)?;
        info!(pipeline = session.pipeline, "updating completed session");

        let ctx = StageContext {
            session_id: session_id.to_string(),
            input: session.input.clone(),
            extra: Some(extra.into()),
            exec: self.exec.clone(),
        };

        let document = self
            .run_from(&spec, session_id, &ctx, spec.resume_from(), false)
            .await?;
        Ok(PipelineRun {
            session_id: session_id.to_string(),
            document,
        })
    }

    /// Pure read: current state plus whatever partial output exists.
    pub async fn status(&self, session_id: &str) -> Result<StatusReport> {
        let session = self
            .sessions
            .get(session_id)
            .await
            .ok_or_else(|| StagehandError::SessionNotFound(session_id.to_string()))?;

        Ok(StatusReport {
            state: session.status,
            partial_outputs: session.stage_outputs,
            error: session.error,
        })
    }

    /// Remove the session outright, regardless of status.
    ///
    /// Queues behind any in-flight run on the same id, so the removal never
    /// interleaves with a run's writes. The run-lock entry itself stays in
    /// the map until [`sweep`](Self::sweep) observes it idle.
    pub async fn delete(&self, session_id: &str) -> Result<()> {
        let lock = self.run_lock(session_id).await;
        let _guard = lock.lock().await;
        if self.sessions.delete(session_id).await {
            Ok(())
        } else {
            Err(StagehandError::SessionNotFound(session_id.to_string()))
        }
    }

    /// Remove TTL-expired sessions and the run-lock entries left behind by
    /// deleted or expired sessions. Runs at the start of every `generate`;
    /// the server also calls it on a periodic timer. Returns the number of
    /// sessions removed.
    pub async fn sweep(&self) -> usize {
        let removed = self.sessions.sweep_expired().await;
        self.prune_run_locks().await;
        removed
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn spec(&self, pipeline: &str) -> Result<Arc<PipelineSpec>> {
        self.specs
            .get(pipeline)
            .cloned()
            .ok_or_else(|| StagehandError::config(format!("unknown pipeline: {pipeline}")))
    }

    async fn run_lock(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.run_locks.lock().await;
        locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop lock entries whose session is gone and that no run currently
    /// holds. Holding the map mutex here means no new clone can be handed
    /// out mid-check, so a strong count of 1 proves the lock is idle.
    async fn prune_run_locks(&self) {
        let mut locks = self.run_locks.lock().await;
        let idle: Vec<String> = locks
            .iter()
            .filter(|(_, lock)| Arc::strong_count(lock) == 1)
            .map(|(id, _)| id.clone())
            .collect();
        for id in idle {
            if self.sessions.get(&id).await.is_none() {
                locks.remove(&id);
            }
        }
    }

    /// Execute stages `start..` in declared order, committing each stage's
    /// output before the next begins.
    ///
    /// `advance_status` publishes each stage name as the session status;
    /// update re-runs pass `false` so a completed session never reads as
    /// rewound to an earlier stage.
    async fn run_from(
        &self,
        spec: &PipelineSpec,
        id: &str,
        ctx: &StageContext,
        start: usize,
        advance_status: bool,
    ) -> Result<Document> {
        let mut prior: StageOutputs = self
            .sessions
            .get(id)
            .await
            .ok_or_else(|| StagehandError::SessionNotFound(id.to_string()))?
            .stage_outputs;

        for def in &spec.stages()[start..] {
            if advance_status {
                self.sessions
                    .mutate(id, |s| s.status = SessionStatus::Stage(def.name))
                    .await
                    .ok_or_else(|| StagehandError::SessionNotFound(id.to_string()))?;
            }

            info!(stage = %def.name, "running stage");
            match run_stage(def, ctx, &prior).await {
                Ok(output) => {
                    prior.insert(def.name, output.clone());
                    // One mutate call commits the whole stage result.
                    self.sessions
                        .mutate(id, |s| s.stage_outputs.insert(def.name, output))
                        .await
                        .ok_or_else(|| StagehandError::SessionNotFound(id.to_string()))?;
                }
                Err(failure) => {
                    warn!(stage = %failure.stage, error = %failure.message, "stage failed fatally");
                    let _ = self
                        .sessions
                        .mutate(id, |s| {
                            s.status = SessionStatus::Error;
                            s.error = Some(failure.clone());
                        })
                        .await;
                    return Err(failure.to_error());
                }
            }
        }

        let last = spec.stages().last().expect("spec has at least one stage");
        let document = prior
            .last()
            .and_then(|o| o.as_document())
            .cloned()
            .ok_or_else(|| StagehandError::Generation {
                stage: last.name,
                message: "final stage produced no document".into(),
            })?;

        self.sessions
            .mutate(id, |s| {
                s.status = SessionStatus::Completed;
                s.error = None;
            })
            .await
            .ok_or_else(|| StagehandError::SessionNotFound(id.to_string()))?;

        info!("pipeline run complete");
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;

    use stagehand_shared::{StageKind, StageName, StageOutput, Synthesis};

    use crate::executor::{StageError, StageExecutor};

    // -- Stub stages --------------------------------------------------------

    /// Emits a fixed collection payload; records the run's extra context in
    /// the record snippet so update effects are observable.
    struct CollectStage;

    #[async_trait]
    impl StageExecutor for CollectStage {
        async fn execute(
            &self,
            ctx: &StageContext,
            _prior: &StageOutputs,
        ) -> std::result::Result<StageOutput, StageError> {
            Ok(StageOutput::Collection {
                records: vec![stagehand_shared::SourceRecord {
                    query: ctx.input.subject.clone(),
                    title: "bio".into(),
                    snippet: "mathematician".into(),
                    url: None,
                }],
            })
        }
    }

    /// Summarizes the collected records; folds in `extra` when present.
    struct SummarizeStage;

    #[async_trait]
    impl StageExecutor for SummarizeStage {
        async fn execute(
            &self,
            ctx: &StageContext,
            prior: &StageOutputs,
        ) -> std::result::Result<StageOutput, StageError> {
            let records = prior
                .records()
                .ok_or_else(|| StageError::new("no records collected"))?;
            let mut summary = records
                .iter()
                .map(|r| r.snippet.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            if let Some(extra) = &ctx.extra {
                summary.push_str(&format!(" ({extra})"));
            }
            Ok(StageOutput::Synthesis(Synthesis {
                summary,
                highlights: vec![],
            }))
        }
    }

    /// Renders the synthesis into the final document.
    struct RenderStage;

    #[async_trait]
    impl StageExecutor for RenderStage {
        async fn execute(
            &self,
            ctx: &StageContext,
            prior: &StageOutputs,
        ) -> std::result::Result<StageOutput, StageError> {
            let synthesis = prior
                .synthesis()
                .ok_or_else(|| StageError::new("nothing synthesized"))?;
            Ok(StageOutput::Document(Document {
                title: ctx.input.subject.clone(),
                body: synthesis.summary.clone(),
                generated_at: Utc::now(),
                degraded: false,
            }))
        }
    }

    /// Always fails; optionally declares a fallback.
    struct FailingStage {
        with_fallback: bool,
    }

    #[async_trait]
    impl StageExecutor for FailingStage {
        async fn execute(
            &self,
            _ctx: &StageContext,
            _prior: &StageOutputs,
        ) -> std::result::Result<StageOutput, StageError> {
            Err(StageError::new("collaborator exploded"))
        }

        fn fallback(&self, _ctx: &StageContext, _prior: &StageOutputs) -> Option<StageOutput> {
            self.with_fallback.then(|| {
                StageOutput::Synthesis(Synthesis {
                    summary: "degraded summary".into(),
                    highlights: vec![],
                })
            })
        }
    }

    // -- Harness ------------------------------------------------------------

    fn engine(specs: Vec<Arc<PipelineSpec>>) -> PipelineOrchestrator {
        let sessions = Arc::new(SessionStore::new(Duration::from_secs(86_400)));
        PipelineOrchestrator::new(specs, sessions, ExecutionConfig::default())
    }

    fn three_stage_spec() -> Arc<PipelineSpec> {
        Arc::new(
            PipelineSpec::builder("test")
                .stage("Collecting", StageKind::Collection, Arc::new(CollectStage))
                .stage(
                    "Synthesizing",
                    StageKind::Synthesis,
                    Arc::new(SummarizeStage),
                )
                .stage("Generating", StageKind::Generation, Arc::new(RenderStage))
                .build()
                .expect("valid spec"),
        )
    }

    // -- Tests --------------------------------------------------------------

    #[tokio::test]
    async fn generate_runs_all_stages_to_completion() {
        let engine = engine(vec![three_stage_spec()]);
        let run = engine
            .generate("test", Some("s1".into()), PipelineInput::new("Ada Lovelace"))
            .await
            .unwrap();

        assert_eq!(run.session_id, "s1");
        assert!(run.document.body.contains("mathematician"));

        let report = engine.status("s1").await.unwrap();
        assert_eq!(report.state, SessionStatus::Completed);
        assert_eq!(report.partial_outputs.len(), 3);
        assert!(report.error.is_none());
    }

    #[tokio::test]
    async fn generate_mints_session_id_when_absent() {
        let engine = engine(vec![three_stage_spec()]);
        let run = engine
            .generate("test", None, PipelineInput::new("x"))
            .await
            .unwrap();
        assert!(!run.session_id.is_empty());
        assert!(engine.status(&run.session_id).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_pipeline_is_a_config_error() {
        let engine = engine(vec![three_stage_spec()]);
        let err = engine
            .generate("nope", None, PipelineInput::new("x"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown pipeline"));
    }

    #[tokio::test]
    async fn fatal_stage_failure_tags_error_and_keeps_partial_outputs() {
        let spec = Arc::new(
            PipelineSpec::builder("test")
                .stage("Collecting", StageKind::Collection, Arc::new(CollectStage))
                .stage(
                    "Analyzing",
                    StageKind::Analysis,
                    Arc::new(FailingStage {
                        with_fallback: false,
                    }),
                )
                .stage("Generating", StageKind::Generation, Arc::new(RenderStage))
                .build()
                .unwrap(),
        );
        let engine = engine(vec![spec]);

        let err = engine
            .generate("test", Some("s2".into()), PipelineInput::new("X"))
            .await
            .unwrap_err();
        assert!(matches!(err, StagehandError::Analysis { .. }));
        assert_eq!(err.stage(), Some(StageName("Analyzing")));

        let report = engine.status("s2").await.unwrap();
        assert_eq!(report.state, SessionStatus::Error);
        assert_eq!(
            report.error.as_ref().unwrap().stage,
            StageName("Analyzing")
        );
        // The collection output survived the failure.
        assert!(report.partial_outputs.records().is_some());
        assert_eq!(report.partial_outputs.len(), 1);
    }

    #[tokio::test]
    async fn fallback_recovers_stage_and_run_completes() {
        let spec = Arc::new(
            PipelineSpec::builder("test")
                .stage("Collecting", StageKind::Collection, Arc::new(CollectStage))
                .stage(
                    "Synthesizing",
                    StageKind::Synthesis,
                    Arc::new(FailingStage {
                        with_fallback: true,
                    }),
                )
                .stage("Generating", StageKind::Generation, Arc::new(RenderStage))
                .build()
                .unwrap(),
        );
        let engine = engine(vec![spec]);

        let run = engine
            .generate("test", Some("s3".into()), PipelineInput::new("X"))
            .await
            .unwrap();
        assert!(run.document.body.contains("degraded summary"));
        assert_eq!(
            engine.status("s3").await.unwrap().state,
            SessionStatus::Completed
        );
    }

    #[tokio::test]
    async fn update_reuses_collection_output_and_recomputes_rest() {
        let engine = engine(vec![three_stage_spec()]);
        engine
            .generate("test", Some("s4".into()), PipelineInput::new("Ada"))
            .await
            .unwrap();

        let before = engine.status("s4").await.unwrap();
        let collection_before =
            serde_json::to_string(before.partial_outputs.get("Collecting").unwrap()).unwrap();
        let synthesis_before =
            serde_json::to_string(before.partial_outputs.get("Synthesizing").unwrap()).unwrap();

        let run = engine.update("s4", "focus on the analytical engine").await.unwrap();
        assert!(run.document.body.contains("analytical engine"));

        let after = engine.status("s4").await.unwrap();
        assert_eq!(after.state, SessionStatus::Completed);
        let collection_after =
            serde_json::to_string(after.partial_outputs.get("Collecting").unwrap()).unwrap();
        let synthesis_after =
            serde_json::to_string(after.partial_outputs.get("Synthesizing").unwrap()).unwrap();

        // Resume invariant: collection byte-identical, later stages changed.
        assert_eq!(collection_before, collection_after);
        assert_ne!(synthesis_before, synthesis_after);
    }

    #[tokio::test]
    async fn update_requires_completed_session() {
        let spec = Arc::new(
            PipelineSpec::builder("test")
                .stage("Collecting", StageKind::Collection, Arc::new(CollectStage))
                .stage(
                    "Analyzing",
                    StageKind::Analysis,
                    Arc::new(FailingStage {
                        with_fallback: false,
                    }),
                )
                .build()
                .unwrap(),
        );
        let engine = engine(vec![spec]);
        let _ = engine
            .generate("test", Some("s5".into()), PipelineInput::new("X"))
            .await;

        let err = engine.update("s5", "extra").await.unwrap_err();
        assert!(matches!(err, StagehandError::SessionNotReady(_)));
    }

    #[tokio::test]
    async fn update_and_status_on_unknown_session_are_not_found() {
        let engine = engine(vec![three_stage_spec()]);
        assert!(matches!(
            engine.update("ghost", "x").await.unwrap_err(),
            StagehandError::SessionNotFound(_)
        ));
        assert!(matches!(
            engine.status("ghost").await.unwrap_err(),
            StagehandError::SessionNotFound(_)
        ));
        assert!(matches!(
            engine.delete("ghost").await.unwrap_err(),
            StagehandError::SessionNotFound(_)
        ));
    }

    #[tokio::test]
    async fn status_is_idempotent() {
        let engine = engine(vec![three_stage_spec()]);
        engine
            .generate("test", Some("s6".into()), PipelineInput::new("Ada"))
            .await
            .unwrap();

        let first = engine.status("s6").await.unwrap();
        let second = engine.status("s6").await.unwrap();
        assert_eq!(first.state, second.state);
        assert_eq!(
            serde_json::to_string(&first.partial_outputs).unwrap(),
            serde_json::to_string(&second.partial_outputs).unwrap()
        );
    }

    #[tokio::test]
    async fn generate_restarts_errored_session_under_same_id() {
        let failed = Arc::new(AtomicBool::new(true));

        /// Fails on the first run only.
        struct FlakyStage {
            failed: Arc<AtomicBool>,
        }

        #[async_trait]
        impl StageExecutor for FlakyStage {
            async fn execute(
                &self,
                _ctx: &StageContext,
                _prior: &StageOutputs,
            ) -> std::result::Result<StageOutput, StageError> {
                if self.failed.swap(false, Ordering::SeqCst) {
                    Err(StageError::new("transient outage"))
                } else {
                    Ok(StageOutput::Synthesis(Synthesis {
                        summary: "recovered".into(),
                        highlights: vec![],
                    }))
                }
            }
        }

        let spec = Arc::new(
            PipelineSpec::builder("test")
                .stage("Collecting", StageKind::Collection, Arc::new(CollectStage))
                .stage(
                    "Synthesizing",
                    StageKind::Synthesis,
                    Arc::new(FlakyStage { failed }),
                )
                .stage("Generating", StageKind::Generation, Arc::new(RenderStage))
                .build()
                .unwrap(),
        );
        let engine = engine(vec![spec]);

        assert!(
            engine
                .generate("test", Some("s7".into()), PipelineInput::new("X"))
                .await
                .is_err()
        );
        assert_eq!(engine.status("s7").await.unwrap().state, SessionStatus::Error);

        // Same id, fresh run: prior terminal state is overwritten.
        let run = engine
            .generate("test", Some("s7".into()), PipelineInput::new("X"))
            .await
            .unwrap();
        assert!(run.document.body.contains("recovered"));
        assert_eq!(
            engine.status("s7").await.unwrap().state,
            SessionStatus::Completed
        );
    }

    #[tokio::test]
    async fn concurrent_sessions_do_not_contaminate_each_other() {
        let engine = Arc::new(engine(vec![three_stage_spec()]));

        let mut handles = Vec::new();
        for i in 0..8 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                let id = format!("c{i}");
                engine
                    .generate("test", Some(id.clone()), PipelineInput::new(format!("subject-{i}")))
                    .await
                    .unwrap();
                id
            }));
        }

        for handle in handles {
            let id = handle.await.unwrap();
            let report = engine.status(&id).await.unwrap();
            assert_eq!(report.state, SessionStatus::Completed);
            let i = id.strip_prefix('c').unwrap();
            let records = report.partial_outputs.records().unwrap();
            assert_eq!(records[0].query, format!("subject-{i}"));
        }
    }

    #[tokio::test]
    async fn final_stage_must_produce_a_document() {
        let spec = Arc::new(
            PipelineSpec::builder("test")
                .stage("Collecting", StageKind::Collection, Arc::new(CollectStage))
                .build()
                .unwrap(),
        );
        let engine = engine(vec![spec]);

        let err = engine
            .generate("test", Some("s8".into()), PipelineInput::new("X"))
            .await
            .unwrap_err();
        assert!(matches!(err, StagehandError::Generation { .. }));
    }

    #[tokio::test]
    async fn runs_on_the_same_id_never_overlap() {
        /// Tracks how many runs execute this stage simultaneously.
        struct OverlapStage {
            in_flight: Arc<AtomicUsize>,
            peak: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl StageExecutor for OverlapStage {
            async fn execute(
                &self,
                _ctx: &StageContext,
                _prior: &StageOutputs,
            ) -> std::result::Result<StageOutput, StageError> {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(StageOutput::Document(Document {
                    title: "t".into(),
                    body: "b".into(),
                    generated_at: Utc::now(),
                    degraded: false,
                }))
            }
        }

        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let spec = Arc::new(
            PipelineSpec::builder("test")
                .stage(
                    "Generating",
                    StageKind::Generation,
                    Arc::new(OverlapStage {
                        in_flight: in_flight.clone(),
                        peak: peak.clone(),
                    }),
                )
                .build()
                .unwrap(),
        );
        let engine = Arc::new(engine(vec![spec]));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine
                    .generate("test", Some("shared".into()), PipelineInput::new("X"))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // The per-id run lock queues same-id runs strictly one at a time.
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(
            engine.status("shared").await.unwrap().state,
            SessionStatus::Completed
        );
    }

    #[tokio::test]
    async fn delete_queues_behind_an_inflight_run() {
        /// Collection that takes long enough for a delete to race it.
        struct SlowCollect;

        #[async_trait]
        impl StageExecutor for SlowCollect {
            async fn execute(
                &self,
                ctx: &StageContext,
                _prior: &StageOutputs,
            ) -> std::result::Result<StageOutput, StageError> {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(StageOutput::Collection {
                    records: vec![stagehand_shared::SourceRecord {
                        query: ctx.input.subject.clone(),
                        title: "t".into(),
                        snippet: ctx.input.subject.clone(),
                        url: None,
                    }],
                })
            }
        }

        let spec = Arc::new(
            PipelineSpec::builder("test")
                .stage("Collecting", StageKind::Collection, Arc::new(SlowCollect))
                .stage(
                    "Synthesizing",
                    StageKind::Synthesis,
                    Arc::new(SummarizeStage),
                )
                .stage("Generating", StageKind::Generation, Arc::new(RenderStage))
                .build()
                .unwrap(),
        );
        let engine = Arc::new(engine(vec![spec]));

        let slow = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .generate("test", Some("s9".into()), PipelineInput::new("slow"))
                    .await
            })
        };

        // Wait until the slow run has created the session.
        while engine.status("s9").await.is_err() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        engine.delete("s9").await.unwrap();

        let run = engine
            .generate("test", Some("s9".into()), PipelineInput::new("fast"))
            .await
            .unwrap();
        assert!(run.document.body.contains("fast"));

        // No output from the deleted run leaks into the fresh session.
        let report = engine.status("s9").await.unwrap();
        assert_eq!(report.state, SessionStatus::Completed);
        let records = report.partial_outputs.records().unwrap();
        assert!(records.iter().all(|r| r.query == "fast"));

        slow.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn update_holds_completed_status_while_rerunning() {
        /// Records the session status observed at each execution.
        struct StatusWatchingStage {
            store: Arc<SessionStore>,
            seen: Arc<std::sync::Mutex<Vec<String>>>,
        }

        #[async_trait]
        impl StageExecutor for StatusWatchingStage {
            async fn execute(
                &self,
                ctx: &StageContext,
                _prior: &StageOutputs,
            ) -> std::result::Result<StageOutput, StageError> {
                let status = self
                    .store
                    .get(&ctx.session_id)
                    .await
                    .expect("session exists")
                    .status;
                self.seen.lock().unwrap().push(status.as_str().to_string());
                Ok(StageOutput::Synthesis(Synthesis {
                    summary: "watched".into(),
                    highlights: vec![],
                }))
            }
        }

        let sessions = Arc::new(SessionStore::new(Duration::from_secs(86_400)));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let spec = Arc::new(
            PipelineSpec::builder("test")
                .stage("Collecting", StageKind::Collection, Arc::new(CollectStage))
                .stage(
                    "Synthesizing",
                    StageKind::Synthesis,
                    Arc::new(StatusWatchingStage {
                        store: sessions.clone(),
                        seen: seen.clone(),
                    }),
                )
                .stage("Generating", StageKind::Generation, Arc::new(RenderStage))
                .build()
                .unwrap(),
        );
        let engine =
            PipelineOrchestrator::new(vec![spec], sessions, ExecutionConfig::default());

        engine
            .generate("test", Some("s10".into()), PipelineInput::new("Ada"))
            .await
            .unwrap();
        engine.update("s10", "new focus").await.unwrap();

        assert_eq!(
            engine.status("s10").await.unwrap().state,
            SessionStatus::Completed
        );
        let seen = seen.lock().unwrap();
        // Initial generation publishes the stage name; the update re-run
        // never rewinds the state machine from Completed.
        assert_eq!(seen.as_slice(), ["Synthesizing", "completed"]);
    }
}
