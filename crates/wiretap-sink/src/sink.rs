use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use wiretap_core::{SessionId, TraceEvent};

use crate::error::SinkError;
use crate::session::Session;

/// Append-only JSONL destination shared by all tracers of one session.
///
/// The file handle is the only shared mutable resource in the capture path;
/// a single mutex makes each line-write atomic with respect to concurrent
/// callers. Append failures are swallowed (fail-open): tracing degrades to
/// fewer events, never to a broken instrumented call.
pub struct EventSink {
    session_id: SessionId,
    path: PathBuf,
    debug: bool,
    file: Mutex<Option<File>>,
}

impl EventSink {
    /// Create the session directory and open the log in append mode, so a
    /// rerun against the same path extends rather than destroys the log.
    /// This is the one fatal point: without a log there is nothing to trace
    /// into.
    pub fn create(session: &Session) -> Result<Self, SinkError> {
        let dir = session.session_dir();
        std::fs::create_dir_all(&dir)
            .map_err(|e| SinkError::Init(format!("create {}: {e}", dir.display())))?;

        let path = session.log_path();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| SinkError::Init(format!("open {}: {e}", path.display())))?;

        info!(path = %path.display(), session_id = %session.id, "event sink opened");

        Ok(Self {
            session_id: session.id.clone(),
            path,
            debug: session.config.debug,
            file: Mutex::new(Some(file)),
        })
    }

    /// Serialize and append one event as a complete line. Never fails from
    /// the caller's point of view.
    pub fn append(&self, event: &TraceEvent) {
        let mut line = match serde_json::to_string(event) {
            Ok(s) => s,
            Err(e) => {
                self.diagnose("event serialization failed", event.event_type(), &e.to_string());
                return;
            }
        };
        line.push('\n');

        let mut guard = self.file.lock();
        match guard.as_mut() {
            Some(file) => {
                if let Err(e) = file.write_all(line.as_bytes()).and_then(|_| file.flush()) {
                    self.diagnose("event write failed", event.event_type(), &e.to_string());
                }
            }
            None => {
                self.diagnose("append after close", event.event_type(), "sink is closed");
            }
        }
    }

    /// Flush and release the log. Appends after close become diagnosed
    /// no-ops. Idempotent.
    pub fn close(&self) -> Result<(), SinkError> {
        let mut guard = self.file.lock();
        if let Some(mut file) = guard.take() {
            file.flush().map_err(|e| SinkError::Write(e.to_string()))?;
            info!(path = %self.path.display(), "event sink closed");
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    fn diagnose(&self, what: &str, event_type: &str, detail: &str) {
        if self.debug {
            warn!(session_id = %self.session_id, event_type, detail, "{what}");
        } else {
            debug!(session_id = %self.session_id, event_type, detail, "{what}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use wiretap_core::{now_millis, CorrelationId, TraceConfig};

    fn temp_session(id: &str) -> Session {
        let dir = std::env::temp_dir().join(format!("wiretap-sink-test-{}", uuid::Uuid::now_v7()));
        Session::new(SessionId::from_raw(id), dir, TraceConfig::default())
    }

    fn sample_event(session_id: &str) -> TraceEvent {
        TraceEvent::HttpError {
            timestamp_millis: now_millis(),
            session_id: SessionId::from_raw(session_id),
            correlation_id: CorrelationId::new(),
            method: "GET".into(),
            url: "https://example.com".into(),
            message: "refused".into(),
        }
    }

    fn read_lines(path: &Path) -> Vec<serde_json::Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn append_produces_parseable_lines() {
        let session = temp_session("s1");
        let sink = EventSink::create(&session).unwrap();
        sink.append(&sample_event("s1"));
        sink.append(&sample_event("s1"));
        sink.close().unwrap();

        let lines = read_lines(sink.path());
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "http_error");
        assert_eq!(lines[0]["sessionId"], "s1");
    }

    #[test]
    fn reopening_appends_instead_of_truncating() {
        let session = temp_session("s2");
        let sink = EventSink::create(&session).unwrap();
        sink.append(&sample_event("s2"));
        sink.close().unwrap();

        let sink = EventSink::create(&session).unwrap();
        sink.append(&sample_event("s2"));
        sink.close().unwrap();

        assert_eq!(read_lines(sink.path()).len(), 2);
    }

    #[test]
    fn append_after_close_is_a_no_op() {
        let session = temp_session("s3");
        let sink = EventSink::create(&session).unwrap();
        sink.append(&sample_event("s3"));
        sink.close().unwrap();
        sink.append(&sample_event("s3"));

        assert_eq!(read_lines(sink.path()).len(), 1);
    }

    #[test]
    fn close_is_idempotent() {
        let session = temp_session("s4");
        let sink = EventSink::create(&session).unwrap();
        sink.close().unwrap();
        sink.close().unwrap();
    }

    #[test]
    fn create_fails_when_path_is_unwritable() {
        let file_as_dir = std::env::temp_dir().join(format!("wiretap-flat-{}", uuid::Uuid::now_v7()));
        std::fs::write(&file_as_dir, b"not a dir").unwrap();
        let session = Session::new(
            SessionId::from_raw("s5"),
            &file_as_dir,
            TraceConfig::default(),
        );
        assert!(matches!(EventSink::create(&session), Err(SinkError::Init(_))));
    }

    #[test]
    fn concurrent_appends_never_interleave() {
        let session = temp_session("s6");
        let sink = Arc::new(EventSink::create(&session).unwrap());

        let threads: Vec<_> = (0..8)
            .map(|t| {
                let sink = Arc::clone(&sink);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        // A body long enough that a torn write would split it.
                        let event = TraceEvent::HttpResponse {
                            timestamp_millis: now_millis(),
                            session_id: SessionId::from_raw("s6"),
                            correlation_id: CorrelationId::from_raw(format!("req_{t}_{i}")),
                            status_code: 200,
                            status_text: "OK".into(),
                            headers: BTreeMap::new(),
                            body: Some("z".repeat(2048)),
                            content_type: None,
                            response_size_bytes: 2048,
                            duration_millis: 1,
                            success: true,
                        };
                        sink.append(&event);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        sink.close().unwrap();

        let lines = read_lines(sink.path());
        assert_eq!(lines.len(), 8 * 50);
        for line in &lines {
            assert_eq!(line["type"], "http_response");
            assert_eq!(line["body"].as_str().unwrap().len(), 2048);
        }
    }
}
