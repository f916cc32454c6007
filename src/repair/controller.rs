//! The probe -> request -> apply -> report loop

use super::applier::{FileReport, PatchApplier};
use super::diff;
use super::patch::{PatchDocument, PatchError, parse_patch};
use super::probe::{ExecutionProbe, ProbeError};
use super::prompt::{PromptBuilder, PromptContext, PromptError};
use crate::backend_executor::{BackendError, BackendExecutor};
use crate::cli::{OutputHandler, RepairEvent};
use crate::config::RepairConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Conditions that end the loop early
#[derive(Debug, Error)]
pub enum RepairError {
    #[error("failed to read target {path}: {source}")]
    ReadTarget {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("backend request failed: {0}")]
    Backend(#[from] BackendError),

    #[error("no usable patch after {requests} requests: {source}")]
    MalformedPatch { requests: u32, source: PatchError },

    #[error(transparent)]
    Prompt(#[from] PromptError),
}

/// How a repair run ended
#[derive(Debug)]
pub enum RepairOutcome {
    /// The last probe found no failure marker
    Success { attempts: u32, probes: u32 },
    /// `max_attempts` patches were applied and the target still fails
    Exhausted {
        attempts: u32,
        probes: u32,
        last_output: String,
    },
    Fatal(RepairError),
}

impl RepairOutcome {
    /// Process exit code: 0 fixed, 1 gave up, 2 error
    pub fn exit_code(&self) -> i32 {
        match self {
            RepairOutcome::Success { .. } => 0,
            RepairOutcome::Exhausted { .. } => 1,
            RepairOutcome::Fatal(_) => 2,
        }
    }
}

#[derive(Debug)]
enum LoopState {
    Probing,
    Requesting { output: String },
    Applying { patch: PatchDocument },
    Reporting { reports: Vec<FileReport> },
    Done,
    Exhausted { output: String },
}

impl LoopState {
    fn name(&self) -> &'static str {
        match self {
            LoopState::Probing => "probing",
            LoopState::Requesting { .. } => "requesting",
            LoopState::Applying { .. } => "applying",
            LoopState::Reporting { .. } => "reporting",
            LoopState::Done => "done",
            LoopState::Exhausted { .. } => "exhausted",
        }
    }
}

/// Drives one target from its first failing run to success or exhaustion
pub struct RepairLoop<B: BackendExecutor> {
    target: PathBuf,
    intent: Option<String>,
    probe: ExecutionProbe,
    backend: B,
    applier: PatchApplier,
    prompt: PromptBuilder,
    max_attempts: u32,
    malformed_retries: u32,
}

impl<B: BackendExecutor> RepairLoop<B> {
    /// Patch file names resolve against `base_dir`
    pub fn new(
        target: &Path,
        base_dir: &Path,
        backend: B,
        config: &RepairConfig,
    ) -> Result<Self, RepairError> {
        Ok(Self {
            target: target.to_path_buf(),
            intent: None,
            probe: ExecutionProbe::from_config(config),
            backend,
            applier: PatchApplier::new(base_dir),
            prompt: PromptBuilder::from_path(config.prompt_template.as_deref())?,
            max_attempts: config.max_attempts,
            malformed_retries: config.malformed_retries,
        })
    }

    /// Free-text hint about what the program should do
    pub fn with_intent(mut self, intent: Option<String>) -> Self {
        self.intent = intent.filter(|i| !i.trim().is_empty());
        self
    }

    pub async fn run(&self, handler: &dyn OutputHandler) -> RepairOutcome {
        match self.drive(handler).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "repair loop aborted");
                RepairOutcome::Fatal(e)
            }
        }
    }

    async fn drive(&self, handler: &dyn OutputHandler) -> Result<RepairOutcome, RepairError> {
        let code = self.read_target()?;
        handler.emit(RepairEvent::Start {
            target: self.target.display().to_string(),
            code,
        });

        let mut attempts = 0;
        let mut probes = 0;
        let mut state = LoopState::Probing;

        loop {
            tracing::debug!(state = state.name(), attempts, probes, "repair loop state");

            state = match state {
                LoopState::Probing => {
                    let result = self.probe.run(&self.target).await?;
                    probes += 1;

                    handler.emit(RepairEvent::ProbeFinished {
                        output: result.combined_output.clone(),
                        failed: result.failed,
                        exit_code: result.exit_code,
                    });

                    if !result.failed {
                        LoopState::Done
                    } else if attempts >= self.max_attempts {
                        LoopState::Exhausted {
                            output: result.combined_output,
                        }
                    } else {
                        LoopState::Requesting {
                            output: result.combined_output,
                        }
                    }
                }

                LoopState::Requesting { output } => {
                    attempts += 1;
                    tracing::info!(attempt = attempts, max = self.max_attempts, "requesting fix");
                    handler.emit(RepairEvent::Fixing {
                        attempt: attempts,
                        max_attempts: self.max_attempts,
                    });

                    let patch = self.request_patch(&output, handler).await?;
                    handler.emit(RepairEvent::PatchAccepted {
                        explanation: patch.explanation.clone(),
                        files: patch.files.len(),
                        edits: patch.edit_count(),
                    });
                    LoopState::Applying { patch }
                }

                LoopState::Applying { patch } => {
                    let mut reports = Vec::new();
                    let results = self.applier.apply_document(&patch);
                    for (set, result) in patch.files.iter().zip(results) {
                        match result {
                            Ok(report) => reports.push(report),
                            Err(e) => {
                                tracing::warn!(file = %set.file_name, error = %e, "skipping file");
                                handler.emit(RepairEvent::FileFailed {
                                    file: set.file_name.clone(),
                                    error: e.to_string(),
                                });
                            }
                        }
                    }
                    LoopState::Reporting { reports }
                }

                LoopState::Reporting { reports } => {
                    for report in &reports {
                        handler.emit(RepairEvent::FileChanged {
                            file: report.file_name.clone(),
                            diff: diff::unified(&report.file_name, &report.before, &report.after),
                            applied: report.applied_count(),
                            skipped: report.skipped_count(),
                        });
                    }
                    LoopState::Probing
                }

                LoopState::Done => {
                    handler.emit(RepairEvent::Fixed { attempts });
                    return Ok(RepairOutcome::Success { attempts, probes });
                }

                LoopState::Exhausted { output } => {
                    handler.emit(RepairEvent::GaveUp { attempts });
                    return Ok(RepairOutcome::Exhausted {
                        attempts,
                        probes,
                        last_output: output,
                    });
                }
            };
        }
    }

    /// One request, plus up to `malformed_retries` more if the answer does
    /// not validate
    async fn request_patch(
        &self,
        output: &str,
        handler: &dyn OutputHandler,
    ) -> Result<PatchDocument, RepairError> {
        let code = self.read_target()?;
        let file_path = self.target.display().to_string();
        let request = self.prompt.build(&PromptContext {
            file_path: &file_path,
            code: &code,
            output,
            intent: self.intent.as_deref(),
        })?;

        let mut requests = 0;
        loop {
            let response = self.backend.execute(&request).await?;
            requests += 1;
            let usage = response.usage.as_ref();
            tracing::debug!(
                backend = %response.backend,
                model = response.model.as_deref().unwrap_or("unreported"),
                duration = ?response.duration,
                prompt_tokens = ?usage.and_then(|u| u.prompt_tokens),
                completion_tokens = ?usage.and_then(|u| u.completion_tokens),
                total_tokens = ?usage.and_then(|u| u.total_tokens),
                "received patch response"
            );
            handler.emit(RepairEvent::PatchReceived {
                text: response.text.clone(),
            });

            match parse_patch(&response.text) {
                Ok(patch) => return Ok(patch),
                Err(e) if requests <= self.malformed_retries => {
                    let retries_left = self.malformed_retries + 1 - requests;
                    tracing::warn!(error = %e, retries_left, "rejected patch");
                    handler.emit(RepairEvent::PatchRejected {
                        error: e.to_string(),
                        retries_left,
                    });
                }
                Err(e) => return Err(RepairError::MalformedPatch { requests, source: e }),
            }
        }
    }

    fn read_target(&self) -> Result<String, RepairError> {
        std::fs::read_to_string(&self.target).map_err(|e| RepairError::ReadTarget {
            path: self.target.clone(),
            source: e,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::backend_executor::{BackendRequest, BackendResponse};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::fs;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    const BROKEN: &str = "echo starting\necho 'Traceback (most recent call last):'\n";

    /// Backend that replays canned responses and records prompts
    struct ScriptedBackend {
        responses: Mutex<VecDeque<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn new(responses: &[&str]) -> Self {
            Self {
                responses: Mutex::new(responses.iter().map(|r| r.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl BackendExecutor for ScriptedBackend {
        async fn execute(
            &self,
            request: &BackendRequest,
        ) -> Result<BackendResponse, BackendError> {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            let text = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| BackendError::network("script exhausted"))?;
            Ok(BackendResponse::new(text, "scripted".into(), Duration::from_millis(1)))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    /// Handler that keeps every event
    #[derive(Default)]
    struct RecordingHandler {
        events: Mutex<Vec<RepairEvent>>,
    }

    impl RecordingHandler {
        fn events(&self) -> Vec<RepairEvent> {
            self.events.lock().unwrap().clone()
        }

        fn count(&self, pred: impl Fn(&RepairEvent) -> bool) -> usize {
            self.events().iter().filter(|e| pred(e)).count()
        }
    }

    impl OutputHandler for RecordingHandler {
        fn emit(&self, event: RepairEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn config(max_attempts: u32, malformed_retries: u32) -> RepairConfig {
        RepairConfig {
            interpreter: "sh".into(),
            failure_marker: "Traceback".into(),
            max_attempts,
            malformed_retries,
            prompt_template: None,
        }
    }

    fn edit_patch(line: usize, original: &str, new: &str) -> String {
        serde_json::json!({
            "intent": "print a message",
            "explanation": "the script prints a traceback",
            "files": [{
                "file_name": "prog.sh",
                "changes": [{
                    "action": "edit",
                    "line_number": line,
                    "original_line": original,
                    "new_line": new,
                }]
            }]
        })
        .to_string()
    }

    fn setup(content: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("prog.sh");
        fs::write(&target, content).unwrap();
        (dir, target)
    }

    #[tokio::test]
    async fn test_already_passing_makes_no_requests() {
        let (dir, target) = setup("echo fine\n");
        let backend = ScriptedBackend::new(&[]);
        let handler = RecordingHandler::default();

        let repair = RepairLoop::new(&target, dir.path(), backend, &config(3, 0)).unwrap();
        let outcome = repair.run(&handler).await;

        assert!(matches!(
            outcome,
            RepairOutcome::Success {
                attempts: 0,
                probes: 1
            }
        ));
        assert_eq!(repair.backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_single_edit_fixes_target() {
        let (dir, target) = setup(BROKEN);
        let patch = edit_patch(2, "echo 'Traceback (most recent call last):'", "echo done");
        let backend = ScriptedBackend::new(&[patch.as_str()]);
        let handler = RecordingHandler::default();

        let repair = RepairLoop::new(&target, dir.path(), backend, &config(5, 0))
            .unwrap()
            .with_intent(Some("say hello".into()));
        let outcome = repair.run(&handler).await;

        assert!(matches!(
            outcome,
            RepairOutcome::Success {
                attempts: 1,
                probes: 2
            }
        ));
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(
            fs::read_to_string(&target).unwrap(),
            "echo starting\necho done\n"
        );

        let prompts = repair.backend.prompts.lock().unwrap().clone();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("echo starting"));
        assert!(prompts[0].contains("Traceback (most recent call last):"));
        assert!(prompts[0].contains("Intent: say hello"));

        let events = handler.events();
        assert!(matches!(events.first(), Some(RepairEvent::Start { .. })));
        assert!(matches!(events.last(), Some(RepairEvent::Fixed { attempts: 1 })));
        assert!(events.iter().any(|e| matches!(
            e,
            RepairEvent::FileChanged { diff, applied: 1, skipped: 0, .. }
                if diff.contains("+echo done")
        )));
    }

    #[tokio::test]
    async fn test_stale_patch_leaves_file_and_exhausts() {
        let (dir, target) = setup(BROKEN);
        let stale = edit_patch(2, "echo 'something else'", "echo done");
        let backend = ScriptedBackend::new(&[stale.as_str(), stale.as_str()]);
        let handler = RecordingHandler::default();

        let repair = RepairLoop::new(&target, dir.path(), backend, &config(2, 0)).unwrap();
        let outcome = repair.run(&handler).await;

        match &outcome {
            RepairOutcome::Exhausted {
                attempts,
                probes,
                last_output,
            } => {
                assert_eq!(*attempts, 2);
                assert_eq!(*probes, 3);
                assert!(last_output.contains("Traceback"));
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(fs::read_to_string(&target).unwrap(), BROKEN);

        // Every probe saw the same failure
        let outputs: Vec<String> = handler
            .events()
            .into_iter()
            .filter_map(|e| match e {
                RepairEvent::ProbeFinished { output, .. } => Some(output),
                _ => None,
            })
            .collect();
        assert_eq!(outputs.len(), 3);
        assert!(outputs.windows(2).all(|w| w[0] == w[1]));

        assert_eq!(
            handler.count(|e| matches!(e, RepairEvent::FileChanged { applied: 0, skipped: 1, .. })),
            2
        );
        assert!(matches!(handler.events().last(), Some(RepairEvent::GaveUp { attempts: 2 })));
    }

    #[tokio::test]
    async fn test_malformed_response_is_retried() {
        let (dir, target) = setup(BROKEN);
        let patch = edit_patch(2, "echo 'Traceback (most recent call last):'", "echo done");
        let backend = ScriptedBackend::new(&[
            "Sorry, I can't help with that.",
            "{\"files\": 3}",
            patch.as_str(),
        ]);
        let handler = RecordingHandler::default();

        let repair = RepairLoop::new(&target, dir.path(), backend, &config(1, 2)).unwrap();
        let outcome = repair.run(&handler).await;

        assert!(matches!(outcome, RepairOutcome::Success { attempts: 1, .. }));
        assert_eq!(repair.backend.calls(), 3);
        assert_eq!(
            handler.count(|e| matches!(e, RepairEvent::PatchRejected { .. })),
            2
        );
    }

    #[tokio::test]
    async fn test_malformed_response_is_fatal_without_retries() {
        let (dir, target) = setup(BROKEN);
        let backend = ScriptedBackend::new(&["not json at all"]);
        let handler = RecordingHandler::default();

        let repair = RepairLoop::new(&target, dir.path(), backend, &config(3, 0)).unwrap();
        let outcome = repair.run(&handler).await;

        assert!(matches!(
            outcome,
            RepairOutcome::Fatal(RepairError::MalformedPatch { requests: 1, .. })
        ));
        assert_eq!(outcome.exit_code(), 2);
        assert_eq!(fs::read_to_string(&target).unwrap(), BROKEN);
    }

    #[tokio::test]
    async fn test_backend_error_is_fatal() {
        let (dir, target) = setup(BROKEN);
        let backend = ScriptedBackend::new(&[]);
        let handler = RecordingHandler::default();

        let repair = RepairLoop::new(&target, dir.path(), backend, &config(3, 0)).unwrap();
        let outcome = repair.run(&handler).await;

        assert!(matches!(outcome, RepairOutcome::Fatal(RepairError::Backend(_))));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_fatal() {
        let (dir, target) = setup(BROKEN);
        let backend = ScriptedBackend::new(&[]);
        let handler = RecordingHandler::default();
        let config = RepairConfig {
            interpreter: "mend-no-such-interpreter".into(),
            ..config(3, 0)
        };

        let repair = RepairLoop::new(&target, dir.path(), backend, &config).unwrap();
        let outcome = repair.run(&handler).await;

        assert!(matches!(
            outcome,
            RepairOutcome::Fatal(RepairError::Probe(ProbeError::SpawnFailed { .. }))
        ));
        assert_eq!(repair.backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_line_zero_edit_does_not_cost_a_request() {
        let (dir, target) = setup(BROKEN);
        let patch = serde_json::json!({
            "files": [{
                "file_name": "prog.sh",
                "changes": [
                    {"action": "add", "line_number": 0, "new_line": "echo never"},
                    {
                        "action": "edit", "line_number": 2,
                        "original_line": "echo 'Traceback (most recent call last):'",
                        "new_line": "echo done"
                    }
                ]
            }]
        })
        .to_string();
        let backend = ScriptedBackend::new(&[patch.as_str()]);
        let handler = RecordingHandler::default();

        let repair = RepairLoop::new(&target, dir.path(), backend, &config(2, 0)).unwrap();
        let outcome = repair.run(&handler).await;

        assert!(matches!(outcome, RepairOutcome::Success { attempts: 1, .. }));
        assert_eq!(repair.backend.calls(), 1);
        assert_eq!(
            handler.count(|e| matches!(e, RepairEvent::PatchRejected { .. })),
            0
        );
        assert_eq!(
            handler.count(|e| matches!(e, RepairEvent::FileChanged { applied: 1, skipped: 1, .. })),
            1
        );
        assert_eq!(fs::read_to_string(&target).unwrap(), "echo starting\necho done\n");
    }

    #[tokio::test]
    async fn test_unknown_file_in_patch_is_skipped() {
        let (dir, target) = setup(BROKEN);
        let patch = serde_json::json!({
            "files": [
                {"file_name": "missing.sh", "changes": [{
                    "action": "add", "line_number": 1, "new_line": "x"
                }]},
                {"file_name": "prog.sh", "changes": [{
                    "action": "edit", "line_number": 2,
                    "original_line": "echo 'Traceback (most recent call last):'",
                    "new_line": "echo done"
                }]}
            ]
        })
        .to_string();
        let backend = ScriptedBackend::new(&[patch.as_str()]);
        let handler = RecordingHandler::default();

        let repair = RepairLoop::new(&target, dir.path(), backend, &config(1, 0)).unwrap();
        let outcome = repair.run(&handler).await;

        assert!(matches!(outcome, RepairOutcome::Success { attempts: 1, probes: 2 }));
        assert!(!dir.path().join("missing.sh").exists());
        let failed = handler.count(
            |e| matches!(e, RepairEvent::FileFailed { file, .. } if file == "missing.sh"),
        );
        assert_eq!(failed, 1);
    }

    #[tokio::test]
    async fn test_missing_target_is_fatal() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("gone.sh");
        let handler = RecordingHandler::default();

        let repair =
            RepairLoop::new(&target, dir.path(), ScriptedBackend::new(&[]), &config(1, 0))
                .unwrap();
        let outcome = repair.run(&handler).await;

        assert!(matches!(outcome, RepairOutcome::Fatal(RepairError::ReadTarget { .. })));
        assert!(handler.events().is_empty());
    }

    #[test]
    fn test_blank_intent_dropped() {
        let dir = TempDir::new().unwrap();
        let repair = RepairLoop::new(
            &dir.path().join("x.sh"),
            dir.path(),
            ScriptedBackend::new(&[]),
            &config(1, 0),
        )
        .unwrap()
        .with_intent(Some("   ".into()));
        assert!(repair.intent.is_none());
    }
}
