//! The external-value protocol (§4.8): hardware reads (`digitalRead`,
//! `analogRead`, `millis`/`micros`, library sensor calls) are satisfied
//! either synchronously, by a host-supplied [`SyncProvider`], or
//! asynchronously, by suspending the evaluator and resuming it later via
//! [`crate::Interpreter::handle_response`].

use crate::consts::DEFAULT_EXTERNAL_VALUE_TIMEOUT_MS;
use crate::value::Value;
use std::collections::HashMap;
#[cfg(not(target_arch = "wasm32"))]
use std::time::{Duration, Instant};

/// The host-implemented hardware surface consulted in synchronous mode.
/// Every method returns a [`Value`]; a host unable to answer a particular
/// call should return [`Value::Null`] rather than panicking, since a
/// panic would abort the whole interpreter.
pub trait SyncProvider {
    fn digital_read(&mut self, pin: i32) -> Value;
    fn analog_read(&mut self, pin: i32) -> Value;
    fn millis(&mut self) -> Value;
    fn micros(&mut self) -> Value;
    /// A library method call not covered by the above, identified by the
    /// library/class name and method name (e.g. `("Wire", "available")`).
    fn library_call(&mut self, library: &str, method: &str, args: &[Value]) -> Value;
}

/// A request awaiting a response in asynchronous mode.
#[derive(Clone, Debug)]
pub struct PendingEntry {
    pub request_id: u64,
    pub function: String,
    #[cfg(not(target_arch = "wasm32"))]
    pub deadline: Instant,
    pub timeout_ms: u32,
}

/// The resolved outcome of a pending asynchronous request.
#[derive(Clone, Debug)]
pub enum ExternalResponseOutcome {
    Value(Value),
    Error(String),
    TimedOut,
}

/// Tracks in-flight asynchronous external-value requests: the next
/// `request_id` to hand out, and a map from `request_id` to its deadline
/// and originating call, used both to validate incoming
/// [`crate::Interpreter::handle_response`] calls and to detect expiry on
/// [`crate::Interpreter::tick`].
#[derive(Debug, Default)]
pub struct AsyncState {
    next_request_id: u64,
    pending: HashMap<u64, PendingEntry>,
    resolved: HashMap<u64, ExternalResponseOutcome>,
}

impl AsyncState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending request for `function`, returning its
    /// `request_id`. `timeout_ms` of `0` means the configured default
    /// (§4.8).
    pub fn begin(&mut self, function: &str, timeout_ms: u32) -> PendingEntry {
        let request_id = self.next_request_id;
        self.next_request_id += 1;
        let timeout_ms = if timeout_ms == 0 {
            DEFAULT_EXTERNAL_VALUE_TIMEOUT_MS
        } else {
            timeout_ms
        };
        let entry = PendingEntry {
            request_id,
            function: function.to_string(),
            #[cfg(not(target_arch = "wasm32"))]
            deadline: Instant::now() + Duration::from_millis(timeout_ms as u64),
            timeout_ms,
        };
        self.pending.insert(request_id, entry.clone());
        entry
    }

    pub fn is_pending(&self, request_id: u64) -> bool {
        self.pending.contains_key(&request_id)
    }

    pub fn resolve(&mut self, request_id: u64) -> Option<PendingEntry> {
        self.pending.remove(&request_id)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Record the host's answer to a pending request (§4.8). Returns
    /// `false` if `request_id` wasn't awaited, either because it never
    /// existed or because it already timed out.
    pub fn deliver(&mut self, request_id: u64, outcome: ExternalResponseOutcome) -> bool {
        if self.pending.remove(&request_id).is_none() {
            return false;
        }
        self.resolved.insert(request_id, outcome);
        true
    }

    /// Take the resolved outcome for `request_id`, if the evaluator's
    /// suspended future has one waiting. Polled by
    /// [`crate::interpreter::ExternalValueFuture`] on every re-poll.
    pub fn take_resolved(&mut self, request_id: u64) -> Option<ExternalResponseOutcome> {
        self.resolved.remove(&request_id)
    }

    /// Mark every expired pending request as timed out so the next poll of
    /// its future observes [`ExternalResponseOutcome::TimedOut`].
    pub fn expire_into_resolved(&mut self) {
        for entry in self.expire_elapsed() {
            self.resolved.insert(entry.request_id, ExternalResponseOutcome::TimedOut);
        }
    }

    /// Collect and remove every request whose deadline has elapsed.
    /// wasm32 has no [`Instant`], so expiry there is advanced exclusively
    /// by the host calling [`crate::Interpreter::tick`] with elapsed
    /// milliseconds it tracks itself; this method is a no-op on wasm32
    /// and callers must track elapsed time themselves via `tick`.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn expire_elapsed(&mut self) -> Vec<PendingEntry> {
        let now = Instant::now();
        let expired_ids: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        expired_ids
            .into_iter()
            .filter_map(|id| self.pending.remove(&id))
            .collect()
    }

    #[cfg(target_arch = "wasm32")]
    pub fn expire_elapsed(&mut self) -> Vec<PendingEntry> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_assigns_increasing_ids() {
        let mut state = AsyncState::new();
        let a = state.begin("digitalRead", 0);
        let b = state.begin("analogRead", 0);
        assert_eq!(b.request_id, a.request_id + 1);
    }

    #[test]
    fn test_default_timeout_applied_when_zero() {
        let mut state = AsyncState::new();
        let entry = state.begin("millis", 0);
        assert_eq!(entry.timeout_ms, DEFAULT_EXTERNAL_VALUE_TIMEOUT_MS);
    }

    #[test]
    fn test_resolve_removes_entry() {
        let mut state = AsyncState::new();
        let entry = state.begin("millis", 1000);
        assert!(state.is_pending(entry.request_id));
        state.resolve(entry.request_id);
        assert!(!state.is_pending(entry.request_id));
    }
}
