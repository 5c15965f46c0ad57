//! Frame classification: every inbound WebSocket text frame goes through
//! [`ControlMessage::classify`] before anything else touches it.

use forager_domain::{Error, Result};
use serde_json::Value;

use crate::batch::BatchDirective;
use crate::task::TaskDescriptor;

/// A classified control-plane frame.
///
/// Classification order matches the protocol: the `type_event` tag wins
/// (heartbeat, batch), then the presence of a `url` field marks a task, and
/// anything else is passed through as [`ControlMessage::Other`] for the host
/// to observe.
#[derive(Debug, Clone)]
pub enum ControlMessage {
    /// Liveness marker; acknowledged internally, never dispatched.
    Heartbeat,
    /// A task group announcement. `raw` keeps the full payload so a batch
    /// runner can pull the task list out of it.
    Batch {
        directive: BatchDirective,
        raw: Value,
    },
    /// A single work item. `rate_exempt` is set for `method: GET`/`POST`
    /// frames, which do not consume rate-limit quota.
    Task {
        task: TaskDescriptor,
        rate_exempt: bool,
    },
    /// Valid JSON the classifier has no opinion on.
    Other(Value),
}

impl ControlMessage {
    pub fn classify(raw: &str) -> Result<ControlMessage> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| Error::Protocol(format!("invalid JSON frame: {e}")))?;

        match value.get("type_event").and_then(Value::as_str) {
            Some("heartbeat") => return Ok(ControlMessage::Heartbeat),
            Some("batch") => {
                let directive = serde_json::from_value::<BatchDirective>(value.clone())
                    .map_err(|e| Error::Protocol(format!("malformed batch directive: {e}")))?;
                return Ok(ControlMessage::Batch {
                    directive,
                    raw: value,
                });
            }
            _ => {}
        }

        if value.get("url").is_some() {
            let rate_exempt = matches!(
                value.get("method").and_then(Value::as_str),
                Some("GET") | Some("POST")
            );
            let task = serde_json::from_value::<TaskDescriptor>(value.clone())
                .map_err(|e| Error::Protocol(format!("malformed task: {e}")))?;
            return Ok(ControlMessage::Task { task, rate_exempt });
        }

        Ok(ControlMessage::Other(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_tag_wins() {
        let msg = ControlMessage::classify(r#"{"type_event":"heartbeat"}"#).unwrap();
        assert!(matches!(msg, ControlMessage::Heartbeat));
    }

    #[test]
    fn batch_carries_directive_and_raw_payload() {
        let msg = ControlMessage::classify(
            r#"{"type_event":"batch","batch_id":"b7","type_batch":"fetch","urls":["https://a","https://b"]}"#,
        )
        .unwrap();
        match msg {
            ControlMessage::Batch { directive, raw } => {
                assert_eq!(directive.batch_id, "b7");
                assert_eq!(directive.effective_parallelism(), 2);
                assert_eq!(raw["urls"].as_array().map(Vec::len), Some(2));
            }
            other => panic!("expected batch, got {other:?}"),
        }
    }

    #[test]
    fn batch_without_id_is_a_protocol_error() {
        let result = ControlMessage::classify(r#"{"type_event":"batch"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn url_marks_a_task() {
        let msg = ControlMessage::classify(
            r#"{"url":"https://example.com","recordID":"r1","orgId":"o1"}"#,
        )
        .unwrap();
        match msg {
            ControlMessage::Task { task, rate_exempt } => {
                assert_eq!(task.record_id, "r1");
                assert!(!rate_exempt);
            }
            other => panic!("expected task, got {other:?}"),
        }
    }

    #[test]
    fn get_and_post_tasks_are_rate_exempt() {
        for method in ["GET", "POST"] {
            let msg = ControlMessage::classify(&format!(
                r#"{{"url":"https://example.com","recordID":"r1","method":"{method}"}}"#
            ))
            .unwrap();
            match msg {
                ControlMessage::Task { rate_exempt, .. } => assert!(rate_exempt),
                other => panic!("expected task, got {other:?}"),
            }
        }
    }

    #[test]
    fn url_with_missing_record_id_is_a_protocol_error() {
        let result = ControlMessage::classify(r#"{"url":"https://example.com"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn unrecognized_frames_pass_through() {
        let msg = ControlMessage::classify(r#"{"notice":"maintenance at 02:00"}"#).unwrap();
        assert!(matches!(msg, ControlMessage::Other(_)));
    }

    #[test]
    fn invalid_json_is_a_protocol_error() {
        assert!(ControlMessage::classify("not json").is_err());
    }
}
