//! Execution Engine
//!
//! Runs parsed commands singly or as fail-fast batches. A batch is a
//! small state machine (Idle, Running, Completed, Failed) with an
//! observable cursor and failure marker: on the first failing command
//! the run stops, the marker is set, and the batch is retained so the
//! caller can edit it and re-run. One operation is in flight per engine
//! at a time; callers must check the busy flag before starting another.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::services::formatter::format_result;
use crate::services::parser::{scan_commands, ParsedCommand};
use crate::services::router::Router;
use crate::services::sink::OutputSink;
use crate::services::types::InvokeResponse;
use crate::utils::error::{AppError, AppResult};

/// Width of the separator line between batch report sections.
const SECTION_SEPARATOR_WIDTH: usize = 40;

/// Lifecycle of a pending batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// What to do with the partial report when a batch fails mid-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchFailurePolicy {
    /// Write the partial report to the sink as well as displaying it.
    WritePartial,
    /// Only display the partial report; the sink keeps its last value.
    DisplayOnly,
}

/// An ordered command sequence with run progress.
#[derive(Debug, Clone)]
pub struct PendingBatch {
    pub commands: Vec<ParsedCommand>,
    /// Index of the currently executing (or next) command.
    pub cursor: usize,
    /// Index of the command that failed the last run, if any.
    pub failed_index: Option<usize>,
    pub state: BatchState,
}

impl PendingBatch {
    fn new(commands: Vec<ParsedCommand>) -> Self {
        Self {
            commands,
            cursor: 0,
            failed_index: None,
            state: BatchState::Idle,
        }
    }
}

/// Result of one batch run.
#[derive(Debug)]
pub struct BatchRunResult {
    pub state: BatchState,
    pub report: String,
    pub failed_index: Option<usize>,
}

/// Single-flight command executor over an injected router and sink.
pub struct Engine {
    router: Router,
    sink: Arc<dyn OutputSink>,
    policy: BatchFailurePolicy,
    busy: AtomicBool,
    batch: Mutex<Option<PendingBatch>>,
}

impl Engine {
    pub fn new(router: Router, sink: Arc<dyn OutputSink>) -> Self {
        Self {
            router,
            sink,
            policy: BatchFailurePolicy::WritePartial,
            busy: AtomicBool::new(false),
            batch: Mutex::new(None),
        }
    }

    pub fn with_policy(mut self, policy: BatchFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Whether a single or batch run is currently in flight.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Scan `text` and stage every detected command as the pending
    /// batch, replacing any previous one. Returns the command count.
    pub fn load_batch(&self, text: &str) -> usize {
        let commands = scan_commands(text);
        let count = commands.len();
        *self.lock_batch() = if commands.is_empty() {
            None
        } else {
            Some(PendingBatch::new(commands))
        };
        count
    }

    /// Stage an explicit command sequence as the pending batch.
    pub fn set_batch(&self, commands: Vec<ParsedCommand>) {
        *self.lock_batch() = if commands.is_empty() {
            None
        } else {
            Some(PendingBatch::new(commands))
        };
    }

    /// Current batch contents and progress.
    pub fn batch(&self) -> Option<PendingBatch> {
        self.lock_batch().clone()
    }

    /// Remove a staged command by index. Illegal while running; resets
    /// the batch to Idle so the edited sequence can be re-run.
    pub fn remove_command(&self, index: usize) -> AppResult<()> {
        if self.is_busy() {
            return Err(AppError::command("Cannot edit a running batch"));
        }
        let mut guard = self.lock_batch();
        let batch = guard
            .as_mut()
            .ok_or_else(|| AppError::not_found("No pending batch"))?;
        if index >= batch.commands.len() {
            return Err(AppError::validation(format!(
                "Command index {} out of range (batch has {})",
                index,
                batch.commands.len()
            )));
        }
        batch.commands.remove(index);
        batch.cursor = 0;
        batch.failed_index = None;
        batch.state = BatchState::Idle;
        if batch.commands.is_empty() {
            *guard = None;
        }
        Ok(())
    }

    /// Discard the pending batch and failure marker. Illegal mid-run.
    pub fn cancel(&self) -> AppResult<()> {
        if self.is_busy() {
            return Err(AppError::command("Cannot cancel a running batch"));
        }
        *self.lock_batch() = None;
        Ok(())
    }

    /// Parse one command from `text` and execute it.
    pub async fn execute_text(&self, text: &str) -> InvokeResponse {
        let commands = scan_commands(text);
        let Some(command) = commands.into_iter().next() else {
            return InvokeResponse::err("No command found in input");
        };
        self.execute_command(&command).await
    }

    /// Execute a single (server, tool, args) call. On success the
    /// formatted result goes to both sink channels; on failure the sink
    /// is untouched and the error comes back in the response.
    pub async fn execute_single(&self, server: &str, tool: &str, args: Value) -> InvokeResponse {
        let _guard = match self.acquire() {
            Ok(guard) => guard,
            Err(e) => return InvokeResponse::err(e),
        };

        match self.router.invoke(server, tool, args.clone()).await {
            Ok(payload) => {
                let text = format_result(tool, &args, &payload);
                if let Err(e) = self.sink.write(&text) {
                    return InvokeResponse::err(e);
                }
                self.sink.display(&text);
                InvokeResponse::ok(text)
            }
            Err(e) => InvokeResponse::err(e),
        }
    }

    async fn execute_command(&self, command: &ParsedCommand) -> InvokeResponse {
        if !command.is_valid {
            return InvokeResponse::err(format!(
                "Invalid command: {}",
                command
                    .error
                    .as_deref()
                    .unwrap_or("malformed argument literal")
            ));
        }
        self.execute_single(&command.server, &command.tool, command.args.clone())
            .await
    }

    /// Run the pending batch from index 0, fail-fast.
    ///
    /// Completion writes the full report to both sink channels and
    /// clears the batch. Failure keeps the batch (with the failure
    /// marker set) and handles the partial report per the configured
    /// policy. Re-running a failed batch resets the marker first.
    pub async fn run_batch(&self) -> AppResult<BatchRunResult> {
        let _guard = self.acquire()?;

        let commands = {
            let mut guard = self.lock_batch();
            let batch = guard
                .as_mut()
                .ok_or_else(|| AppError::not_found("No pending batch"))?;
            batch.cursor = 0;
            batch.failed_index = None;
            batch.state = BatchState::Running;
            batch.commands.clone()
        };

        tracing::info!("[Engine] Running batch of {} commands", commands.len());

        let mut sections: Vec<String> = Vec::new();
        let mut failed_index: Option<usize> = None;

        for (index, command) in commands.iter().enumerate() {
            self.update_batch(|batch| batch.cursor = index);

            let label = format!("{}:{}", command.server, command.tool);
            let outcome = if command.is_valid {
                self.router
                    .invoke(&command.server, &command.tool, command.args.clone())
                    .await
            } else {
                Err(AppError::parse(
                    command
                        .error
                        .clone()
                        .unwrap_or_else(|| "malformed argument literal".to_string()),
                ))
            };

            match outcome {
                Ok(payload) => {
                    let text = format_result(&command.tool, &command.args, &payload);
                    let args_json = serde_json::to_string(&command.args)
                        .unwrap_or_else(|_| "{}".to_string());
                    sections.push(format!(
                        "### [CMD] {} (Args: {})\n{}\n",
                        label, args_json, text
                    ));
                    self.update_batch(|batch| batch.cursor = index + 1);
                }
                Err(e) => {
                    tracing::warn!("[Engine] Batch halted at {}: {}", index, e);
                    sections.push(format!("### [CMD FAILED] {}\nERROR: {}\n", label, e));
                    failed_index = Some(index);
                    break;
                }
            }
        }

        let separator = format!("\n{}\n\n", "=".repeat(SECTION_SEPARATOR_WIDTH));
        let report = sections.join(&separator);

        match failed_index {
            None => {
                self.sink.write(&report)?;
                self.sink.display(&report);
                *self.lock_batch() = None;
                Ok(BatchRunResult {
                    state: BatchState::Completed,
                    report,
                    failed_index: None,
                })
            }
            Some(index) => {
                if self.policy == BatchFailurePolicy::WritePartial {
                    self.sink.write(&report)?;
                }
                self.sink.display(&report);
                self.update_batch(|batch| {
                    batch.failed_index = Some(index);
                    batch.state = BatchState::Failed;
                });
                Ok(BatchRunResult {
                    state: BatchState::Failed,
                    report,
                    failed_index: Some(index),
                })
            }
        }
    }

    fn lock_batch(&self) -> std::sync::MutexGuard<'_, Option<PendingBatch>> {
        self.batch.lock().expect("batch lock poisoned")
    }

    fn update_batch(&self, apply: impl FnOnce(&mut PendingBatch)) {
        if let Some(batch) = self.lock_batch().as_mut() {
            apply(batch);
        }
    }

    fn acquire(&self) -> AppResult<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| AppError::command("Engine is busy"))?;
        Ok(BusyGuard { flag: &self.busy })
    }
}

/// Clears the busy flag when a run ends, including on early return.
struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::internal::InternalTools;
    use crate::services::registry::test_support::MockProvider;
    use crate::services::registry::ToolRegistry;
    use crate::services::sink::BufferSink;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        engine: Engine,
        sink: Arc<BufferSink>,
        provider: Arc<MockProvider>,
    }

    fn fixture() -> Fixture {
        fixture_with_policy(BatchFailurePolicy::WritePartial)
    }

    fn fixture_with_policy(policy: BatchFailurePolicy) -> Fixture {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(MockProvider::new("util"));
        let mut registry = ToolRegistry::new(InternalTools::new(dir.path()));
        registry.register(provider.clone());
        let sink = Arc::new(BufferSink::new());
        let engine =
            Engine::new(Router::new(Arc::new(registry)), sink.clone()).with_policy(policy);
        Fixture {
            _dir: dir,
            engine,
            sink,
            provider,
        }
    }

    #[tokio::test]
    async fn test_single_success_writes_and_displays() {
        let f = fixture();
        let response = f
            .engine
            .execute_single("util", "echo", serde_json::json!({"message": "hi"}))
            .await;
        assert!(response.success);
        assert_eq!(response.data.as_deref(), Some("hi"));
        assert_eq!(f.sink.written().as_deref(), Some("hi"));
        assert_eq!(f.sink.displayed(), vec!["hi"]);
    }

    #[tokio::test]
    async fn test_single_failure_leaves_sink_untouched() {
        let f = fixture();
        let response = f
            .engine
            .execute_single("util", "explode", serde_json::json!({}))
            .await;
        assert!(!response.success);
        assert!(response.error.unwrap().contains("tool exploded"));
        assert!(f.sink.written().is_none());
        assert!(f.sink.displayed().is_empty());
    }

    #[tokio::test]
    async fn test_execute_text_parses_and_runs() {
        let f = fixture();
        let response = f
            .engine
            .execute_text(r#"mcp:util:echo({"message": "parsed"})"#)
            .await;
        assert!(response.success);
        assert_eq!(response.data.as_deref(), Some("parsed"));
    }

    #[tokio::test]
    async fn test_execute_text_rejects_invalid_command() {
        let f = fixture();
        let response = f.engine.execute_text("mcp:util:echo({broken: )").await;
        assert!(!response.success);
        assert!(response.error.unwrap().contains("Invalid command"));
        assert!(f.provider.call_log().is_empty());
    }

    #[tokio::test]
    async fn test_batch_all_success() {
        let f = fixture();
        let count = f.engine.load_batch(
            "mcp:util:echo({message: \"one\"}) mcp:util:echo({message: \"two\"}) mcp:util:echo({message: \"three\"})",
        );
        assert_eq!(count, 3);

        let result = f.engine.run_batch().await.unwrap();
        assert_eq!(result.state, BatchState::Completed);
        assert!(result.failed_index.is_none());

        let sections: Vec<&str> = result.report.matches("### [CMD]").collect();
        assert_eq!(sections.len(), 3);
        assert!(result.report.contains(&"=".repeat(40)));
        // Report ordering follows command order.
        let one = result.report.find("one").unwrap();
        let three = result.report.find("three").unwrap();
        assert!(one < three);

        // Completed batches clear and write the full report.
        assert!(f.engine.batch().is_none());
        assert_eq!(f.sink.written().unwrap(), result.report);
        assert_eq!(f.provider.call_log().len(), 3);
    }

    #[tokio::test]
    async fn test_batch_fail_fast_at_index() {
        let f = fixture();
        f.engine.load_batch(
            "mcp:util:echo({message: \"a\"}) mcp:util:explode() mcp:util:echo({message: \"c\"})",
        );

        let result = f.engine.run_batch().await.unwrap();
        assert_eq!(result.state, BatchState::Failed);
        assert_eq!(result.failed_index, Some(1));

        // Two sections: one success, one failure. The third command
        // was never dispatched.
        assert_eq!(result.report.matches("### [CMD]").count(), 1);
        assert_eq!(result.report.matches("### [CMD FAILED]").count(), 1);
        assert!(result.report.contains("ERROR:"));
        assert_eq!(f.provider.call_log(), vec!["echo", "explode"]);

        // Batch retained in full for inspection and re-run.
        let batch = f.engine.batch().unwrap();
        assert_eq!(batch.commands.len(), 3);
        assert_eq!(batch.failed_index, Some(1));
        assert_eq!(batch.state, BatchState::Failed);
        assert_eq!(batch.cursor, 1);

        // Default policy writes the partial report.
        assert_eq!(f.sink.written().unwrap(), result.report);
    }

    #[tokio::test]
    async fn test_batch_failure_display_only_policy() {
        let f = fixture_with_policy(BatchFailurePolicy::DisplayOnly);
        f.engine.load_batch("mcp:util:explode()");

        let result = f.engine.run_batch().await.unwrap();
        assert_eq!(result.state, BatchState::Failed);
        assert!(f.sink.written().is_none());
        assert_eq!(f.sink.displayed().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_command_halts_batch_without_dispatch() {
        let f = fixture();
        f.engine
            .load_batch("mcp:util:echo({broken: ) \nmcp:util:echo({message: \"b\"})");

        let result = f.engine.run_batch().await.unwrap();
        assert_eq!(result.failed_index, Some(0));
        assert!(f.provider.call_log().is_empty());
    }

    #[tokio::test]
    async fn test_rerun_after_removing_failed_command() {
        let f = fixture();
        f.engine
            .load_batch("mcp:util:explode() mcp:util:echo({message: \"ok\"})");

        let first = f.engine.run_batch().await.unwrap();
        assert_eq!(first.failed_index, Some(0));

        f.engine.remove_command(0).unwrap();
        let batch = f.engine.batch().unwrap();
        assert_eq!(batch.commands.len(), 1);
        assert_eq!(batch.state, BatchState::Idle);
        assert!(batch.failed_index.is_none());

        let second = f.engine.run_batch().await.unwrap();
        assert_eq!(second.state, BatchState::Completed);
        assert!(f.engine.batch().is_none());
    }

    #[tokio::test]
    async fn test_cancel_clears_batch() {
        let f = fixture();
        f.engine.load_batch("mcp:util:echo({message: \"x\"})");
        assert!(f.engine.batch().is_some());
        f.engine.cancel().unwrap();
        assert!(f.engine.batch().is_none());
    }

    #[tokio::test]
    async fn test_run_without_batch_errors() {
        let f = fixture();
        let err = f.engine.run_batch().await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_remove_command_bounds_check() {
        let f = fixture();
        f.engine.load_batch("mcp:util:echo({message: \"x\"})");
        let err = f.engine.remove_command(5).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_busy_guard_releases_on_drop() {
        let f = fixture();
        {
            let _guard = f.engine.acquire().unwrap();
            assert!(f.engine.is_busy());
            assert!(f.engine.acquire().is_err());
        }
        assert!(!f.engine.is_busy());
    }
}
