//! Repairs free-form model output into a command list.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::command::CommandEntry;

// Leftmost `[` to rightmost `]`, across newlines.
static ARRAY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[.*\]").expect("array pattern is a valid regex"));

const TIME_FIELDS: [&str; 2] = ["start", "end"];

#[derive(Debug, Error)]
enum ExtractError {
    #[error("no JSON array in response")]
    NoArray,
    #[error("bracketed text is not a list")]
    NotAList,
    #[error("JSON array is empty")]
    EmptyList,
    #[error("invalid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

fn extract_array(raw: &str) -> Result<Vec<Value>, ExtractError> {
    let found = ARRAY_PATTERN.find(raw).ok_or(ExtractError::NoArray)?;
    match serde_json::from_str::<Value>(found.as_str())? {
        Value::Array(items) if items.is_empty() => Err(ExtractError::EmptyList),
        Value::Array(items) => Ok(items),
        _ => Err(ExtractError::NotAList),
    }
}

/// Decodes the assistant's commands. Never empty: anything that is not a
/// usable JSON array becomes a single MESSAGE carrying the raw text.
pub fn parse_commands(raw: &str) -> Vec<CommandEntry> {
    match extract_array(raw) {
        Ok(items) => items
            .into_iter()
            .map(|mut item| {
                normalize_command_times(&mut item);
                CommandEntry::from_value(item)
            })
            .collect(),
        Err(ExtractError::NoArray) => {
            debug!("assistant replied without a command array");
            vec![CommandEntry::message(raw)]
        }
        Err(err) => {
            warn!(error = %err, "failed to parse assistant response as commands");
            vec![CommandEntry::message(raw)]
        }
    }
}

/// Rewrites `start`/`end` string fields of a command object in place.
pub fn normalize_command_times(command: &mut Value) {
    let Value::Object(fields) = command else {
        return;
    };
    for field in TIME_FIELDS {
        if let Some(Value::String(text)) = fields.get_mut(field) {
            *text = normalize_datetime(text);
        }
    }
}

/// `"2025-07-30 10:00:00"` and `"2025-07-30TT10:00:00"` both become
/// `"2025-07-30T10:00:00"`. Idempotent; does not check that the result is a
/// real timestamp.
pub fn normalize_datetime(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        let c = if c == ' ' { 'T' } else { c };
        if c == 'T' && out.ends_with('T') {
            continue;
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(entries: &[CommandEntry]) -> Value {
        serde_json::to_value(entries).unwrap()
    }

    #[test]
    fn normalizes_space_and_double_separator() {
        assert_eq!(normalize_datetime("2025-07-30 10:00:00"), "2025-07-30T10:00:00");
        assert_eq!(normalize_datetime("2025-07-30TT10:00:00"), "2025-07-30T10:00:00");
        assert_eq!(normalize_datetime("2025-07-30 T10:00:00"), "2025-07-30T10:00:00");
        assert_eq!(normalize_datetime("2025-07-30   10:00"), "2025-07-30T10:00");
        assert_eq!(normalize_datetime("2025-07-30T10:00:00"), "2025-07-30T10:00:00");
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in [
            "2025-07-30 10:00:00",
            "2025-07-30TT10:00:00",
            " 2025-07-30  T T 10:00 ",
            "next tuesday",
            "",
        ] {
            let once = normalize_datetime(raw);
            assert_eq!(normalize_datetime(&once), once, "input {:?}", raw);
        }
    }

    #[test]
    fn prose_wrapped_array_is_extracted() {
        let raw = "Here you go:\n[\n  {\"command\": \"MESSAGE\", \"text\": \"Hi\"}\n]\nAnything else?";
        assert_eq!(values(&parse_commands(raw)), json!([{"command": "MESSAGE", "text": "Hi"}]));
    }

    #[test]
    fn prose_without_brackets_becomes_message() {
        let raw = "Sure, I'll do that!";
        assert_eq!(
            values(&parse_commands(raw)),
            json!([{"command": "MESSAGE", "text": "Sure, I'll do that!"}])
        );
    }

    #[test]
    fn broken_json_becomes_message() {
        let raw = "[{\"command\": \"ADD\", \"title\": ]";
        assert_eq!(parse_commands(raw), vec![CommandEntry::message(raw)]);
    }

    #[test]
    fn greedy_match_spanning_two_arrays_fails_over_to_message() {
        let raw = "[1] and later [2]";
        assert_eq!(parse_commands(raw), vec![CommandEntry::message(raw)]);
    }

    #[test]
    fn empty_array_keeps_one_command() {
        assert_eq!(parse_commands("[]"), vec![CommandEntry::message("[]")]);
    }

    #[test]
    fn non_string_times_are_left_alone() {
        let raw = r#"[{"command":"ADD","title":"x","start":1722330000,"end":null}]"#;
        assert_eq!(
            values(&parse_commands(raw)),
            json!([{"command": "ADD", "title": "x", "start": 1722330000, "end": null}])
        );
    }
}
