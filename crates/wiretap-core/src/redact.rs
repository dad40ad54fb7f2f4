use std::collections::{BTreeMap, HashMap, HashSet};

/// Marker substituted for secret-bearing values before persistence.
pub const REDACTED: &str = "[REDACTED]";

// Header names that always carry caller secrets, regardless of config.
const BASELINE_SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "x-api-key",
    "x-auth-token",
    "cookie",
    "x-anthropic-api-key",
    "openai-api-key",
    "google-api-key",
];

// Any header whose name contains one of these is treated as sensitive.
const SENSITIVE_HEADER_SUBSTRINGS: &[&str] = &["token", "key"];

// Env var keys containing one of these are sanitized before logging.
const SENSITIVE_ENV_SUBSTRINGS: &[&str] = &["password", "secret", "token", "key"];

/// Whether a header name must never be logged with its original value.
/// Matches the baseline set or `extra` case-insensitively, or any name
/// containing "token"/"key".
pub fn is_sensitive_header(name: &str, extra: &HashSet<String>) -> bool {
    let lowered = name.to_ascii_lowercase();
    if BASELINE_SENSITIVE_HEADERS.contains(&lowered.as_str()) {
        return true;
    }
    if extra.iter().any(|s| s.eq_ignore_ascii_case(&lowered)) {
        return true;
    }
    SENSITIVE_HEADER_SUBSTRINGS.iter().any(|s| lowered.contains(s))
}

/// Redact sensitive header values, preserving keys and non-sensitive
/// values verbatim. Operates on a copy; callers keep the originals.
pub fn redact_headers(
    headers: &BTreeMap<String, String>,
    extra: &HashSet<String>,
) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            if is_sensitive_header(name, extra) {
                (name.clone(), REDACTED.to_string())
            } else {
                (name.clone(), value.clone())
            }
        })
        .collect()
}

/// Sanitize a spawn environment for logging: values of keys whose
/// lowercase name contains password/secret/token/key are replaced.
pub fn sanitize_env(env: &HashMap<String, String>) -> HashMap<String, String> {
    env.iter()
        .map(|(key, value)| {
            let lowered = key.to_ascii_lowercase();
            if SENSITIVE_ENV_SUBSTRINGS.iter().any(|s| lowered.contains(s)) {
                (key.clone(), REDACTED.to_string())
            } else {
                (key.clone(), value.clone())
            }
        })
        .collect()
}
