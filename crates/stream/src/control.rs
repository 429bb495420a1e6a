//! Parsing for `stream_control` events: the engine's explicit
//! open/close protocol, distinct from a run's own status, because a
//! run can have worker activity (e.g. summary workers) after the
//! supervisor's model response finishes.

use foreman_domain::entities::RunEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Sets the close barrier at this event's id — the stream ends
    /// once the client has consumed up to (and including) it.
    Close,
    /// Cancels any scheduled heuristic close and extends the client's
    /// lease by `ttl_ms` (pre-cap; the caller applies the config cap).
    KeepOpen { ttl_ms: u64 },
}

pub fn parse_control(ev: &RunEvent) -> Option<ControlSignal> {
    if ev.event_type != "stream_control" {
        return None;
    }
    match ev.payload.get("action").and_then(|v| v.as_str())? {
        "close" => Some(ControlSignal::Close),
        "keep_open" => {
            let ttl_ms = ev.payload.get("ttl_ms").and_then(|v| v.as_u64()).unwrap_or(0);
            Some(ControlSignal::KeepOpen { ttl_ms })
        }
        other => {
            tracing::warn!(action = other, "unrecognized stream_control action");
            None
        }
    }
}

/// Caps a requested `keep_open` lease at the configured ceiling.
pub fn capped_ttl_ms(requested_ms: u64, cap_ms: u64) -> u64 {
    requested_ms.min(cap_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event_type: &str, payload: serde_json::Value) -> RunEvent {
        RunEvent {
            id: 1,
            run_id: 1,
            event_type: event_type.to_string(),
            payload,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn non_control_events_parse_to_none() {
        assert_eq!(parse_control(&event("worker_complete", json!({}))), None);
    }

    #[test]
    fn close_action_parses() {
        let ev = event("stream_control", json!({"action": "close", "reason": "done"}));
        assert_eq!(parse_control(&ev), Some(ControlSignal::Close));
    }

    #[test]
    fn keep_open_parses_ttl() {
        let ev = event("stream_control", json!({"action": "keep_open", "ttl_ms": 5000}));
        assert_eq!(parse_control(&ev), Some(ControlSignal::KeepOpen { ttl_ms: 5000 }));
    }

    #[test]
    fn keep_open_ttl_is_capped() {
        assert_eq!(capped_ttl_ms(1_000_000, 300_000), 300_000);
        assert_eq!(capped_ttl_ms(1_000, 300_000), 1_000);
    }

    #[test]
    fn unrecognized_action_parses_to_none() {
        let ev = event("stream_control", json!({"action": "pause"}));
        assert_eq!(parse_control(&ev), None);
    }
}
