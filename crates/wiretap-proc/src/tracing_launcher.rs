use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use wiretap_core::redact::sanitize_env;
use wiretap_core::truncate::CappedBuffer;
use wiretap_core::{
    classify_command, now_millis, ExecutionId, OutputStream, SessionId, TraceConfig, TraceEvent,
};
use wiretap_sink::{EventSink, Session};

use crate::launcher::{
    ExitState, LaunchError, OutputChunk, ProcessHandle, ProcessLauncher, SpawnOptions, SpawnSpec,
};

/// Decorator around a process-launch capability that records each launch as
/// a `ToolExecutionStart` followed by exactly one `ToolExecutionComplete`
/// or `ToolExecutionError` sharing a fresh execution id.
///
/// Purely observational: the spec reaches the inner launcher untouched and
/// the caller gets the inner launcher's handle back unmodified. Output is
/// watched through a non-consuming subscription, so nothing is taken away
/// from the caller's own observers.
pub struct TracingLauncher<L: ProcessLauncher> {
    inner: L,
    sink: Arc<EventSink>,
    config: TraceConfig,
    session_id: SessionId,
}

impl<L: ProcessLauncher> TracingLauncher<L> {
    pub fn new(inner: L, session: &Session, sink: Arc<EventSink>) -> Self {
        Self {
            inner,
            sink,
            config: session.config.clone(),
            session_id: session.id.clone(),
        }
    }

    fn start_event(
        &self,
        execution_id: &ExecutionId,
        command: &str,
        args: &[String],
        options: &SpawnOptions,
    ) -> TraceEvent {
        let sanitized = SpawnOptions {
            cwd: options.cwd.clone(),
            env: sanitize_env(&options.env),
        };
        TraceEvent::ToolExecutionStart {
            timestamp_millis: now_millis(),
            session_id: self.session_id.clone(),
            execution_id: execution_id.clone(),
            command: command.to_string(),
            args: args.to_vec(),
            sanitized_options: serde_json::to_value(&sanitized)
                .unwrap_or(serde_json::Value::Null),
            tool_class: classify_command(command),
        }
    }
}

#[async_trait]
impl<L: ProcessLauncher> ProcessLauncher for TracingLauncher<L> {
    async fn launch(&self, spec: SpawnSpec) -> Result<ProcessHandle, LaunchError> {
        if !self.config.enabled {
            return self.inner.launch(spec).await;
        }

        let execution_id = ExecutionId::new();
        let start = Instant::now();
        let command = spec.command.clone();
        debug!(execution_id = %execution_id, command = %command, "tracing process launch");

        self.sink
            .append(&self.start_event(&execution_id, &command, &spec.args, &spec.options));

        let handle = match self.inner.launch(spec).await {
            Ok(handle) => handle,
            Err(err) => {
                self.sink.append(&TraceEvent::ToolExecutionError {
                    timestamp_millis: now_millis(),
                    session_id: self.session_id.clone(),
                    execution_id,
                    command,
                    message: err.to_string(),
                    duration_millis: start.elapsed().as_millis() as u64,
                    exit_code: None,
                    signal: None,
                    stdout_captured: None,
                    stderr_captured: None,
                });
                return Err(err);
            }
        };

        // Subscribe before returning so the observer covers the whole
        // stream, then watch from a detached task; the caller is never
        // blocked on capture.
        let observer = Observer {
            sink: Arc::clone(&self.sink),
            session_id: self.session_id.clone(),
            execution_id,
            command,
            debug: self.config.debug,
            start,
        };
        let rx = handle.subscribe();
        tokio::spawn(observer.watch(handle.clone(), rx));

        Ok(handle)
    }
}

struct Observer {
    sink: Arc<EventSink>,
    session_id: SessionId,
    execution_id: ExecutionId,
    command: String,
    debug: bool,
    start: Instant,
}

impl Observer {
    async fn watch(self, handle: ProcessHandle, mut rx: broadcast::Receiver<OutputChunk>) {
        let mut stdout = CappedBuffer::new();
        let mut stderr = CappedBuffer::new();

        loop {
            match rx.recv().await {
                Ok(chunk) => {
                    match chunk.stream {
                        OutputStream::Stdout => stdout.push(&chunk.data),
                        OutputStream::Stderr => stderr.push(&chunk.data),
                    }
                    if self.debug {
                        self.sink.append(&TraceEvent::ToolOutput {
                            timestamp_millis: now_millis(),
                            session_id: self.session_id.clone(),
                            execution_id: self.execution_id.clone(),
                            command: self.command.clone(),
                            chunk: chunk.data,
                            stream: chunk.stream,
                        });
                    }
                }
                Err(broadcast::error::RecvError::Lagged(lost)) => {
                    // Lag discards the oldest buffered chunks, the ones the
                    // capped capture keeps. Needs the observer ~1MiB behind
                    // the pump, so a stalled sink is the only realistic cause.
                    debug!(execution_id = %self.execution_id, lost, "output observer lagged; capture is missing early chunks");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        let exit = handle.wait().await;
        let duration_millis = self.start.elapsed().as_millis() as u64;

        match exit {
            ExitState::Exited { code: Some(0), signal: None } => {
                self.sink.append(&TraceEvent::ToolExecutionComplete {
                    timestamp_millis: now_millis(),
                    session_id: self.session_id,
                    execution_id: self.execution_id,
                    command: self.command,
                    stdout_captured: stdout.into_captured(),
                    stderr_captured: stderr.into_captured(),
                    duration_millis,
                    exit_code: 0,
                });
            }
            ExitState::Exited { code, signal } => {
                self.sink.append(&TraceEvent::ToolExecutionError {
                    timestamp_millis: now_millis(),
                    session_id: self.session_id,
                    execution_id: self.execution_id,
                    command: self.command,
                    message: exit_message(code, signal),
                    duration_millis,
                    exit_code: code,
                    signal,
                    stdout_captured: non_empty(stdout),
                    stderr_captured: non_empty(stderr),
                });
            }
            ExitState::Failed(message) => {
                self.sink.append(&TraceEvent::ToolExecutionError {
                    timestamp_millis: now_millis(),
                    session_id: self.session_id,
                    execution_id: self.execution_id,
                    command: self.command,
                    message,
                    duration_millis,
                    exit_code: None,
                    signal: None,
                    stdout_captured: non_empty(stdout),
                    stderr_captured: non_empty(stderr),
                });
            }
        }
    }
}

fn exit_message(code: Option<i32>, signal: Option<i32>) -> String {
    match (code, signal) {
        (_, Some(sig)) => format!("process killed by signal {sig}"),
        (Some(code), None) => format!("process exited with code {code}"),
        (None, None) => "process ended without exit code or signal".to_string(),
    }
}

fn non_empty(buf: CappedBuffer) -> Option<String> {
    if buf.is_empty() {
        None
    } else {
        Some(buf.into_captured())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokio_launcher::TokioLauncher;
    use std::time::Duration;
    use wiretap_core::truncate::TOOL_OUTPUT_LIMIT;

    fn temp_session(config: TraceConfig) -> Session {
        let dir = std::env::temp_dir().join(format!("wiretap-proc-test-{}", uuid::Uuid::now_v7()));
        Session::new(SessionId::from_raw("sess_proc"), dir, config)
    }

    fn tracer(config: TraceConfig) -> (TracingLauncher<TokioLauncher>, Arc<EventSink>) {
        let session = temp_session(config);
        let sink = Arc::new(EventSink::create(&session).unwrap());
        let launcher = TracingLauncher::new(TokioLauncher::new(), &session, Arc::clone(&sink));
        (launcher, sink)
    }

    /// The observer task finishes shortly after the process does; poll the
    /// log until the expected number of lines lands.
    async fn wait_for_events(sink: &EventSink, count: usize) -> Vec<serde_json::Value> {
        for _ in 0..100 {
            let events = read_events(sink);
            if events.len() >= count {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!(
            "expected {count} events, got {}: {:?}",
            read_events(sink).len(),
            read_events(sink)
        );
    }

    fn read_events(sink: &EventSink) -> Vec<serde_json::Value> {
        std::fs::read_to_string(sink.path())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn successful_run_emits_start_then_complete() {
        let (launcher, sink) = tracer(TraceConfig::default());
        let done = launcher
            .run(SpawnSpec::new("echo").arg("hello"))
            .await
            .unwrap();
        assert!(done.exit.is_success());

        let events = wait_for_events(&sink, 2).await;
        assert_eq!(events[0]["type"], "tool_execution_start");
        assert_eq!(events[0]["command"], "echo");
        assert_eq!(events[0]["toolClass"], "unknown");
        assert_eq!(events[1]["type"], "tool_execution_complete");
        assert_eq!(events[1]["exitCode"], 0);
        assert_eq!(events[1]["stdoutCaptured"], "hello\n");
        assert_eq!(events[0]["executionId"], events[1]["executionId"]);
    }

    #[tokio::test]
    async fn classified_command_lands_in_start_event() {
        let (launcher, sink) = tracer(TraceConfig::default());
        launcher
            .run(SpawnSpec::new("ls").arg("/"))
            .await
            .unwrap();

        let events = wait_for_events(&sink, 2).await;
        assert_eq!(events[0]["toolClass"], "filesystem");
    }

    #[tokio::test]
    async fn nonzero_exit_emits_error_with_code_and_capture() {
        let (launcher, sink) = tracer(TraceConfig::default());
        let done = launcher
            .run(SpawnSpec::new("sh").arg("-c").arg("echo bad >&2; exit 3"))
            .await
            .unwrap();
        assert!(!done.exit.is_success());

        let events = wait_for_events(&sink, 2).await;
        assert_eq!(events[1]["type"], "tool_execution_error");
        assert_eq!(events[1]["exitCode"], 3);
        assert!(events[1].get("signal").is_none());
        assert_eq!(events[1]["stderrCaptured"], "bad\n");
        assert!(events[1].get("stdoutCaptured").is_none());
        assert_eq!(
            events[1]["message"].as_str().unwrap(),
            "process exited with code 3"
        );
        assert_eq!(events[0]["executionId"], events[1]["executionId"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn killed_process_emits_error_with_signal() {
        let (launcher, sink) = tracer(TraceConfig::default());
        let handle = launcher
            .launch(SpawnSpec::new("sh").arg("-c").arg("kill -9 $$"))
            .await
            .unwrap();
        handle.wait().await;

        let events = wait_for_events(&sink, 2).await;
        assert_eq!(events[1]["type"], "tool_execution_error");
        assert_eq!(events[1]["signal"], 9);
        assert!(events[1]["message"]
            .as_str()
            .unwrap()
            .contains("signal 9"));
    }

    #[tokio::test]
    async fn spawn_failure_is_recorded_then_propagated() {
        let (launcher, sink) = tracer(TraceConfig::default());
        let err = launcher
            .launch(SpawnSpec::new("definitely-not-a-real-binary-xyz"))
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::Spawn(_)));

        let events = wait_for_events(&sink, 2).await;
        assert_eq!(events[0]["type"], "tool_execution_start");
        assert_eq!(events[1]["type"], "tool_execution_error");
        assert!(events[1].get("exitCode").is_none());
        assert!(events[1]["message"]
            .as_str()
            .unwrap()
            .contains("failed to spawn"));
    }

    #[tokio::test]
    async fn secret_env_values_are_sanitized_in_start_event() {
        let (launcher, sink) = tracer(TraceConfig::default());
        launcher
            .run(
                SpawnSpec::new("echo")
                    .env("API_TOKEN", "tok-123")
                    .env("HOME", "/home/x"),
            )
            .await
            .unwrap();

        let events = wait_for_events(&sink, 2).await;
        let env = &events[0]["sanitizedOptions"]["env"];
        assert_eq!(env["API_TOKEN"], "[REDACTED]");
        assert_eq!(env["HOME"], "/home/x");
    }

    #[tokio::test]
    async fn debug_mode_emits_per_chunk_output_events() {
        let mut config = TraceConfig::default();
        config.debug = true;
        let (launcher, sink) = tracer(config);
        launcher
            .run(SpawnSpec::new("echo").arg("chunky"))
            .await
            .unwrap();

        // start + at least one tool_output + complete
        let events = wait_for_events(&sink, 3).await;
        let outputs: Vec<_> = events
            .iter()
            .filter(|e| e["type"] == "tool_output")
            .collect();
        assert!(!outputs.is_empty());
        assert_eq!(outputs[0]["stream"], "stdout");
        assert!(outputs[0]["chunk"].as_str().unwrap().contains("chunky"));
        assert_eq!(outputs[0]["executionId"], events[0]["executionId"]);
    }

    #[tokio::test]
    async fn long_output_is_truncated_with_elided_count() {
        let (launcher, sink) = tracer(TraceConfig::default());
        let n = TOOL_OUTPUT_LIMIT + 100;
        launcher
            .run(
                SpawnSpec::new("sh")
                    .arg("-c")
                    .arg(format!("printf 'x%.0s' $(seq {n})")),
            )
            .await
            .unwrap();

        let events = wait_for_events(&sink, 2).await;
        let captured = events[1]["stdoutCaptured"].as_str().unwrap();
        assert!(captured.ends_with("[... truncated 100 characters]"));
        assert!(captured.starts_with(&"x".repeat(TOOL_OUTPUT_LIMIT)));
    }

    #[tokio::test]
    async fn caller_observation_is_not_consumed_by_tracing() {
        let (launcher, _sink) = tracer(TraceConfig::default());
        // run() subscribes through the returned handle while the tracer's
        // own observer watches the same stream.
        let done = launcher
            .run(SpawnSpec::new("echo").arg("shared"))
            .await
            .unwrap();
        assert_eq!(done.stdout, "shared\n");
    }

    #[tokio::test]
    async fn disabled_config_captures_nothing() {
        let mut config = TraceConfig::default();
        config.enabled = false;
        let (launcher, sink) = tracer(config);
        let done = launcher.run(SpawnSpec::new("echo").arg("hi")).await.unwrap();
        assert!(done.exit.is_success());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(read_events(&sink).is_empty());
    }
}
