use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use wiretap_core::OutputStream;

use crate::launcher::{
    ExitState, LaunchError, OutputChunk, ProcessHandle, ProcessLauncher, SpawnSpec,
};

const READ_BUF_SIZE: usize = 4096;

/// The real process-launch capability, backed by `tokio::process`.
/// Stdout and stderr are pumped into the handle's broadcast channel; the
/// exit state is published only after both pumps drain, so output chunks
/// always precede it.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioLauncher;

impl TokioLauncher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessLauncher for TokioLauncher {
    async fn launch(&self, spec: SpawnSpec) -> Result<ProcessHandle, LaunchError> {
        let mut cmd = tokio::process::Command::new(&spec.command);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &spec.options.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &spec.options.env {
            cmd.env(key, value);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| LaunchError::Spawn(format!("{}: {e}", spec.command)))?;

        let pid = child.id();
        debug!(command = %spec.command, pid, "process spawned");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (output_tx, _) = ProcessHandle::output_channel();
        let (exit_tx, exit_rx) = watch::channel(None);

        // Handle construction pre-creates receivers, so it must happen
        // before the pumps start.
        let handle = ProcessHandle::new(pid, output_tx.clone(), exit_rx);

        tokio::spawn(async move {
            tokio::join!(
                pump(stdout, OutputStream::Stdout, output_tx.clone()),
                pump(stderr, OutputStream::Stderr, output_tx.clone()),
            );
            drop(output_tx); // closes the channel for observers

            let state = match child.wait().await {
                Ok(status) => ExitState::Exited {
                    code: status.code(),
                    signal: unix_signal(&status),
                },
                Err(e) => ExitState::Failed(format!("wait failed: {e}")),
            };
            let _ = exit_tx.send(Some(state));
        });

        Ok(handle)
    }
}

async fn pump<R: tokio::io::AsyncRead + Unpin>(
    stream: Option<R>,
    tag: OutputStream,
    tx: broadcast::Sender<OutputChunk>,
) {
    let Some(mut stream) = stream else {
        return;
    };
    let mut buf = [0u8; READ_BUF_SIZE];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                // Garbled bytes are captured lossily, never fatally.
                let data = String::from_utf8_lossy(&buf[..n]).into_owned();
                let _ = tx.send(OutputChunk { stream: tag, data });
            }
        }
    }
}

#[cfg(unix)]
fn unix_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn unix_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}
