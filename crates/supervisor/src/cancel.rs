//! Per-run cancellation tokens.
//!
//! Cancellation is cooperative: the token is checked between steps and
//! around the LLM call; nothing forcibly kills an in-flight task. A
//! `spawn_worker` job already dispatched to a runner is not recalled —
//! its result is simply recorded without resuming the run (see
//! [`crate::engine`]).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks active cancellation tokens per run.
#[derive(Default)]
pub struct CancelRegistry {
    tokens: Mutex<HashMap<i64, CancelToken>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, run_id: i64) -> CancelToken {
        let token = CancelToken::new();
        self.tokens.lock().insert(run_id, token.clone());
        token
    }

    /// Register a token only if one isn't already tracked. Used when
    /// re-entering a run (resume, crash recovery) so a cancellation
    /// requested while the run was waiting isn't clobbered by a fresh,
    /// un-cancelled token.
    pub fn ensure_registered(&self, run_id: i64) -> CancelToken {
        self.tokens.lock().entry(run_id).or_insert_with(CancelToken::new).clone()
    }

    /// Returns `true` if a running token was found and signalled.
    pub fn cancel(&self, run_id: i64) -> bool {
        if let Some(token) = self.tokens.lock().get(&run_id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    pub fn remove(&self, run_id: i64) {
        self.tokens.lock().remove(&run_id);
    }

    pub fn is_running(&self, run_id: i64) -> bool {
        self.tokens.lock().contains_key(&run_id)
    }

    /// Returns `false` for a run with no registered token — a fresh
    /// invocation of `drive` after a process restart, before a token
    /// has been re-registered, should not treat that as cancelled.
    pub fn is_cancelled(&self, run_id: i64) -> bool {
        self.tokens.lock().get(&run_id).map(CancelToken::is_cancelled).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_lifecycle() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn registry_register_and_cancel() {
        let registry = CancelRegistry::new();
        let token = registry.register(1);
        assert!(registry.is_running(1));
        assert!(registry.cancel(1));
        assert!(token.is_cancelled());
        registry.remove(1);
        assert!(!registry.is_running(1));
    }

    #[test]
    fn ensure_registered_preserves_existing_cancellation() {
        let registry = CancelRegistry::new();
        let token = registry.register(2);
        token.cancel();
        let same = registry.ensure_registered(2);
        assert!(same.is_cancelled());
    }

    #[test]
    fn cancel_unknown_run_returns_false() {
        let registry = CancelRegistry::new();
        assert!(!registry.cancel(999));
    }
}
