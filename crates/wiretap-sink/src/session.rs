use std::path::PathBuf;

use wiretap_core::{SessionId, TraceConfig};

/// One instrumentation run: an opaque id, where its artifacts live, and an
/// immutable config snapshot. Supplied by setup code; the sink derives its
/// log path from it.
#[derive(Clone, Debug)]
pub struct Session {
    pub id: SessionId,
    pub output_dir: PathBuf,
    pub config: TraceConfig,
}

impl Session {
    pub fn new(id: SessionId, output_dir: impl Into<PathBuf>, config: TraceConfig) -> Self {
        Self {
            id,
            output_dir: output_dir.into(),
            config,
        }
    }

    /// Directory holding this session's artifacts: `<output_dir>/<id>`.
    pub fn session_dir(&self) -> PathBuf {
        self.output_dir.join(self.id.as_str())
    }

    /// The append-only event log: `<output_dir>/<id>/session.jsonl`.
    pub fn log_path(&self) -> PathBuf {
        self.session_dir().join("session.jsonl")
    }
}
