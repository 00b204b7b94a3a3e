//! Locating JSON inside tool output
//!
//! The tool interleaves log lines with its JSON answer on the same stream,
//! and occasionally writes several objects back to back with no separator.

use serde_json::Value;

fn starts_like_json(text: &str) -> bool {
    text.starts_with('{') || text.starts_with('[')
}

fn parses(text: &str) -> bool {
    serde_json::from_str::<Value>(text).is_ok()
}

/// Candidate JSON lines, in output order
///
/// `}{` is split into two lines first. Candidates are not validated; a log
/// prefix such as `[info]` also qualifies here.
pub fn json_segments(raw: &str) -> Vec<String> {
    let normalized = raw.replace("}{", "}\n{");
    normalized
        .split(['\n', '\r'])
        .map(str::trim)
        .filter(|line| starts_like_json(line))
        .map(str::to_string)
        .collect()
}

/// Every segment that is valid JSON, in output order
///
/// A candidate line that does not parse on its own is retried as the start
/// of a multi-line document.
pub fn json_payloads(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if starts_like_json(trimmed) && parses(trimmed) {
        return vec![trimmed.to_string()];
    }

    let normalized = trimmed.replace("}{", "}\n{");
    let mut payloads = Vec::new();
    let mut offset = 0;
    let mut skip_until = 0;

    for line in normalized.split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        if start < skip_until {
            continue;
        }

        let candidate = line.trim();
        if !starts_like_json(candidate) {
            continue;
        }
        if parses(candidate) {
            payloads.push(candidate.to_string());
            continue;
        }
        if let Some(document) = leading_document(&normalized[start..]) {
            skip_until = start + document.len();
            payloads.push(document.trim().to_string());
        }
    }

    payloads
}

/// The first complete JSON value at the start of `text`, as written
///
/// The value must end its line; `[1] starting` is a log prefix, not a document.
fn leading_document(text: &str) -> Option<&str> {
    let mut stream = serde_json::Deserializer::from_str(text).into_iter::<Value>();
    match stream.next() {
        Some(Ok(Value::Object(_) | Value::Array(_))) => {
            let end = stream.byte_offset();
            let rest = &text[end..];
            let rest_of_line = rest.split('\n').next().unwrap_or_default();
            rest_of_line
                .trim()
                .is_empty()
                .then(|| &text[..end])
        }
        _ => None,
    }
}

/// The single meaningful JSON payload, if the output has one
pub fn extract_payload(raw: &str) -> Option<String> {
    json_payloads(raw).into_iter().next()
}
