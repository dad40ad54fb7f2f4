use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

use wiretap_core::OutputStream;

/// Broadcast ring capacity, in chunks. A slow observer lags and loses the
/// oldest buffered chunks rather than blocking the pump; at 4096-byte
/// reads that takes falling ~1MiB behind the process.
const OUTPUT_CHANNEL_CAPACITY: usize = 256;

/// Receivers pre-created before any output can flow. The first few
/// subscribers (the tracer, a `run()` collector) observe the complete
/// stream; later subscribers tail live output.
const PRESUBSCRIBED_RECEIVERS: usize = 4;

/// Options accompanying a spawn. Serializable so the sanitized copy can be
/// embedded in a trace event.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

/// A process launch request: command, arguments, options.
#[derive(Clone, Debug, Default)]
pub struct SpawnSpec {
    pub command: String,
    pub args: Vec<String>,
    pub options: SpawnOptions,
}

impl SpawnSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.options.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.env.insert(key.into(), value.into());
        self
    }
}

/// One observed chunk of process output.
#[derive(Clone, Debug)]
pub struct OutputChunk {
    pub stream: OutputStream,
    pub data: String,
}

/// How a launched process ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExitState {
    /// The process ran and exited (possibly signalled).
    Exited {
        code: Option<i32>,
        signal: Option<i32>,
    },
    /// A runtime failure distinct from a normal exit (e.g. wait failed).
    Failed(String),
}

impl ExitState {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::Exited {
                code: Some(0),
                signal: None
            }
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("failed to spawn process: {0}")]
    Spawn(String),
}

/// Handle to a launched process. Cloneable; observation is non-consuming,
/// so any number of parties can watch output and await the exit without
/// taking anything away from each other.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pid: Option<u32>,
    output: broadcast::Sender<OutputChunk>,
    presubscribed: Arc<Mutex<Vec<broadcast::Receiver<OutputChunk>>>>,
    exit: watch::Receiver<Option<ExitState>>,
}

impl ProcessHandle {
    /// Build a handle around its channels. Call before any output is
    /// pumped so the pre-created receivers cover the whole stream.
    pub fn new(
        pid: Option<u32>,
        output: broadcast::Sender<OutputChunk>,
        exit: watch::Receiver<Option<ExitState>>,
    ) -> Self {
        let presubscribed = (0..PRESUBSCRIBED_RECEIVERS)
            .map(|_| output.subscribe())
            .collect();
        Self {
            pid,
            output,
            presubscribed: Arc::new(Mutex::new(presubscribed)),
            exit,
        }
    }

    /// Create the output channel pair for a handle.
    pub fn output_channel() -> (broadcast::Sender<OutputChunk>, broadcast::Receiver<OutputChunk>) {
        broadcast::channel(OUTPUT_CHANNEL_CAPACITY)
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Observe the process output. The first few subscribers receive every
    /// chunk from the start; later ones see chunks from subscription on.
    pub fn subscribe(&self) -> broadcast::Receiver<OutputChunk> {
        self.presubscribed
            .lock()
            .pop()
            .unwrap_or_else(|| self.output.subscribe())
    }

    /// Wait for the process to end. Safe to call from any number of
    /// clones; each gets the same exit state.
    pub async fn wait(&self) -> ExitState {
        let mut exit = self.exit.clone();
        let result = exit.wait_for(|state| state.is_some()).await;
        match result {
            Ok(state) => state.clone().unwrap_or(ExitState::Failed("empty exit state".into())),
            Err(_) => ExitState::Failed("exit channel closed before process ended".into()),
        }
    }
}

/// Everything a finished convenience run yields.
#[derive(Clone, Debug)]
pub struct CompletedProcess {
    pub exit: ExitState,
    pub stdout: String,
    pub stderr: String,
}

/// The process-launch capability. The real launcher and the tracing
/// decorator expose the identical signature.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn launch(&self, spec: SpawnSpec) -> Result<ProcessHandle, LaunchError>;

    /// Convenience: launch, collect all output, and wait for the exit.
    async fn run(&self, spec: SpawnSpec) -> Result<CompletedProcess, LaunchError> {
        let handle = self.launch(spec).await?;
        let mut rx = handle.subscribe();

        let mut stdout = String::new();
        let mut stderr = String::new();
        loop {
            match rx.recv().await {
                Ok(chunk) => match chunk.stream {
                    OutputStream::Stdout => stdout.push_str(&chunk.data),
                    OutputStream::Stderr => stderr.push_str(&chunk.data),
                },
                // Lag discards the oldest chunks; keep collecting what remains.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        let exit = handle.wait().await;
        Ok(CompletedProcess {
            exit,
            stdout,
            stderr,
        })
    }
}

#[async_trait]
impl<L: ProcessLauncher + ?Sized> ProcessLauncher for Arc<L> {
    async fn launch(&self, spec: SpawnSpec) -> Result<ProcessHandle, LaunchError> {
        self.as_ref().launch(spec).await
    }
}
