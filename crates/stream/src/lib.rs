//! Stream Assembler: replay-then-live-tail delivery of a run's event
//! timeline, with an explicit open/close protocol so a client that
//! disconnects mid-run can reconnect with `last_event_id` and receive
//! exactly the events it missed, no duplicates, no gaps.
//!
//! Grounded in the reference gateway's SSE handler
//! (`other_examples/...agent_runs_handlers.rs.rs`, a
//! `tokio_stream::wrappers::BroadcastStream` fed by a
//! `tokio::sync::broadcast` channel) generalized to add the replay
//! pass and the `stream_control` close barrier spec.md §4.5 requires.

mod control;

pub use control::{capped_ttl_ms, parse_control, ControlSignal};

use std::time::Duration;

use foreman_domain::config::StreamConfig;
use foreman_domain::entities::RunEvent;
use foreman_domain::Result;
use foreman_store::{EventStore, RunStore};

/// `stream(run_id, last_event_id, include_tokens) -> async sequence`.
///
/// Owns no per-run state itself — every call is independent, sharing
/// only the underlying `EventStore`'s broadcast channel and storage.
#[derive(Clone)]
pub struct StreamAssembler {
    events: EventStore,
    runs: RunStore,
    config: StreamConfig,
}

impl StreamAssembler {
    pub fn new(events: EventStore, runs: RunStore, config: StreamConfig) -> Self {
        Self { events, runs, config }
    }

    /// Replay `run_id`'s history after `last_event_id`, then switch to
    /// a live tail, terminating at the close barrier (or, absent any
    /// `stream_control` events, once the run reaches a terminal status
    /// and `heuristic_close_fallback` is enabled).
    pub fn stream(
        &self,
        run_id: i64,
        last_event_id: i64,
        include_tokens: bool,
    ) -> impl tokio_stream::Stream<Item = Result<RunEvent>> + Send + 'static {
        let events = self.events.clone();
        let runs = self.runs.clone();
        let config = self.config.clone();

        async_stream::try_stream! {
            // Subscribe before the replay read so any event committed
            // concurrently with replay is not lost between the two —
            // it will simply show up twice, and the dedup-by-id below
            // collapses that overlap.
            let mut live_rx = events.subscribe(run_id);

            let mut cursor = last_event_id;
            let mut close_barrier: Option<i64> = None;
            let mut keep_open_deadline: Option<tokio::time::Instant> = None;

            // Replay pass: keep re-fetching until a read returns
            // nothing new, which covers events that landed while the
            // previous read was in flight.
            loop {
                let batch = events.get_after(run_id, cursor).await?;
                if batch.is_empty() {
                    break;
                }
                for ev in batch {
                    let Some(ev) = filter_and_advance(ev, include_tokens, &config, &mut cursor) else {
                        continue;
                    };
                    if let Some(signal) = parse_control(&ev) {
                        apply_signal(signal, ev.id, &config, &mut close_barrier, &mut keep_open_deadline);
                    }
                    let reached_barrier = close_barrier.is_some_and(|b| cursor >= b);
                    yield ev;
                    if reached_barrier {
                        return;
                    }
                }
            }

            // Live tail.
            loop {
                let sleep = sleep_until_deadline(keep_open_deadline);
                tokio::select! {
                    biased;

                    recv = live_rx.recv() => {
                        match recv {
                            Ok(ev) => {
                                let Some(ev) = filter_and_advance(ev, include_tokens, &config, &mut cursor) else {
                                    continue;
                                };
                                if let Some(signal) = parse_control(&ev) {
                                    apply_signal(signal, ev.id, &config, &mut close_barrier, &mut keep_open_deadline);
                                }
                                let reached_barrier = close_barrier.is_some_and(|b| cursor >= b);
                                yield ev;
                                if reached_barrier {
                                    return;
                                }
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                                // The live queue dropped messages under
                                // backpressure. Non-token events must
                                // never be lost, so recover the gap
                                // from storage; any token events inside
                                // it are allowed to stay dropped.
                                let recovered = events.get_after(run_id, cursor).await?;
                                for ev in recovered {
                                    let Some(ev) = filter_and_advance(ev, include_tokens, &config, &mut cursor) else {
                                        continue;
                                    };
                                    if let Some(signal) = parse_control(&ev) {
                                        apply_signal(signal, ev.id, &config, &mut close_barrier, &mut keep_open_deadline);
                                    }
                                    let reached_barrier = close_barrier.is_some_and(|b| cursor >= b);
                                    yield ev;
                                    if reached_barrier {
                                        return;
                                    }
                                }
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                                // The run's channel was forgotten
                                // (`EventStore::forget`) — nothing more
                                // will ever arrive.
                                return;
                            }
                        }
                    }

                    _ = sleep, if config.heuristic_close_fallback && close_barrier.is_none() => {
                        // The keep_open lease (or the implicit one
                        // this legacy fallback grants every run) has
                        // expired with no close barrier ever observed.
                        // Only actually close if the run is terminal —
                        // a lease lapsing mid-run just means the next
                        // tick re-checks.
                        if let Some(run) = runs.get_run(run_id).await? {
                            if run.status.is_terminal() {
                                return;
                            }
                        }
                        keep_open_deadline = Some(
                            tokio::time::Instant::now()
                                + Duration::from_millis(config.keep_open_ttl_cap_ms),
                        );
                    }
                }
            }
        }
    }
}

/// Applies the token-exclusion filter and, for everything that
/// survives it, advances `cursor` past the event's id (so a filtered
/// token event still moves the replay cursor forward and is never
/// re-requested).
fn filter_and_advance(
    ev: RunEvent,
    include_tokens: bool,
    config: &StreamConfig,
    cursor: &mut i64,
) -> Option<RunEvent> {
    if ev.id <= *cursor {
        return None; // already delivered — overlap between replay and live tail
    }
    *cursor = ev.id;
    if is_token_event(&ev.event_type) && !include_tokens && !config.replay_tokens {
        return None;
    }
    Some(ev)
}

fn is_token_event(event_type: &str) -> bool {
    event_type == "supervisor_token"
}

fn apply_signal(
    signal: ControlSignal,
    event_id: i64,
    config: &StreamConfig,
    close_barrier: &mut Option<i64>,
    keep_open_deadline: &mut Option<tokio::time::Instant>,
) {
    match signal {
        ControlSignal::Close => {
            *close_barrier = Some(event_id);
        }
        ControlSignal::KeepOpen { ttl_ms } => {
            let capped = capped_ttl_ms(ttl_ms, config.keep_open_ttl_cap_ms);
            *keep_open_deadline = Some(tokio::time::Instant::now() + Duration::from_millis(capped));
        }
    }
}

fn sleep_until_deadline(deadline: Option<tokio::time::Instant>) -> tokio::time::Sleep {
    match deadline {
        Some(when) => tokio::time::sleep_until(when),
        // No lease pending: sleep until the fallback fires anyway so
        // a run with no control events at all still gets checked
        // periodically against its own terminal status.
        None => tokio::time::sleep(Duration::from_secs(5)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(id: i64, event_type: &str, payload: serde_json::Value) -> RunEvent {
        RunEvent {
            id,
            run_id: 1,
            event_type: event_type.to_string(),
            payload,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn filter_and_advance_dedupes_already_delivered_events() {
        let config = StreamConfig::default();
        let mut cursor = 10;
        let ev = event(5, "supervisor_tool_started", json!({}));
        assert!(filter_and_advance(ev, true, &config, &mut cursor).is_none());
        assert_eq!(cursor, 10);
    }

    #[test]
    fn filter_and_advance_drops_tokens_when_excluded_but_moves_cursor() {
        let config = StreamConfig::default();
        let mut cursor = 0;
        let ev = event(1, "supervisor_token", json!({"text": "hi"}));
        assert!(filter_and_advance(ev, false, &config, &mut cursor).is_none());
        assert_eq!(cursor, 1);
    }

    #[test]
    fn filter_and_advance_keeps_tokens_when_included() {
        let config = StreamConfig::default();
        let mut cursor = 0;
        let ev = event(1, "supervisor_token", json!({"text": "hi"}));
        assert!(filter_and_advance(ev, true, &config, &mut cursor).is_some());
        assert_eq!(cursor, 1);
    }

    #[test]
    fn filter_and_advance_never_drops_non_token_events() {
        let config = StreamConfig::default();
        let mut cursor = 0;
        let ev = event(1, "worker_complete", json!({}));
        assert!(filter_and_advance(ev, false, &config, &mut cursor).is_some());
    }
}
