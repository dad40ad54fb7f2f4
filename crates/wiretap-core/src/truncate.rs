/// Marker appended to truncated HTTP body captures.
pub const BODY_TRUNCATED_MARKER: &str = "[TRUNCATED]";

/// Fixed capture limit for tool output, in characters, per stream.
pub const TOOL_OUTPUT_LIMIT: usize = 4096;

/// Bound a captured HTTP body at `limit` bytes, backing off to a UTF-8
/// char boundary, and append the marker. The value used by the real call
/// is never the one truncated here.
pub fn truncate_body(body: &str, limit: usize) -> String {
    truncate_body_bytes(body.as_bytes(), limit)
}

/// Byte-level variant: the slice happens before decoding, so capture never
/// materializes more than `limit` bytes of a large body. Invalid bytes
/// decode as U+FFFD; a char cut in half by the byte slice is dropped from
/// the logged copy rather than logged as a replacement character.
pub fn truncate_body_bytes(bytes: &[u8], limit: usize) -> String {
    if bytes.len() <= limit {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    let decoded = String::from_utf8_lossy(&bytes[..limit]);
    let kept = decoded.strip_suffix('\u{FFFD}').unwrap_or(&decoded);
    format!("{kept}{BODY_TRUNCATED_MARKER}")
}

/// Bound captured tool output at [`TOOL_OUTPUT_LIMIT`] characters,
/// appending a marker with the exact elided count.
pub fn truncate_tool_output(output: &str) -> String {
    let total = output.chars().count();
    if total <= TOOL_OUTPUT_LIMIT {
        return output.to_string();
    }
    let kept: String = output.chars().take(TOOL_OUTPUT_LIMIT).collect();
    format!("{kept}\n[... truncated {} characters]", total - TOOL_OUTPUT_LIMIT)
}

/// Streaming accumulator for process output capture. Keeps at most
/// [`TOOL_OUTPUT_LIMIT`] characters while counting everything seen, so
/// memory stays bounded and the elided count in the marker is exact.
#[derive(Debug, Default)]
pub struct CappedBuffer {
    kept: String,
    kept_chars: usize,
    total_chars: usize,
}

impl CappedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) {
        for ch in chunk.chars() {
            if self.kept_chars < TOOL_OUTPUT_LIMIT {
                self.kept.push(ch);
                self.kept_chars += 1;
            }
            self.total_chars += 1;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_chars == 0
    }

    pub fn total_chars(&self) -> usize {
        self.total_chars
    }

    /// Render the capture, with the same marker [`truncate_tool_output`]
    /// would have produced for the full value.
    pub fn into_captured(self) -> String {
        if self.total_chars <= TOOL_OUTPUT_LIMIT {
            return self.kept;
        }
        format!(
            "{}\n[... truncated {} characters]",
            self.kept,
            self.total_chars - TOOL_OUTPUT_LIMIT
        )
    }
}
