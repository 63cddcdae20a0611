//! Per-client and process-wide counters owned by the guard store.

use std::time::{Duration, Instant};

/// One occupied concurrency slot.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Slot {
    pub ticket: u64,
    pub admitted_at: Instant,
}

/// Mutable record tracked for each client identifier.
#[derive(Debug, Clone)]
pub(crate) struct ClientState {
    /// Requests admitted in the current window.
    pub request_count: u32,
    /// When the current request window expires.
    pub window_reset_at: Instant,
    /// Set once the client is penalized. While set, it is also the entry's
    /// expiry time.
    pub blocked_until: Option<Instant>,
    /// Payloads flagged as suspicious. Survives window rollover; only a
    /// block expiry clears it.
    pub suspicious_attempts: u32,
    /// Admissions still holding a concurrency slot.
    pub in_flight: Vec<Slot>,
    pub last_request_at: Instant,
}

impl ClientState {
    /// A new entry that has just admitted one request.
    pub fn fresh(now: Instant, window: Duration, ticket: u64) -> Self {
        Self {
            request_count: 1,
            window_reset_at: now + window,
            blocked_until: None,
            suspicious_attempts: 0,
            in_flight: vec![Slot {
                ticket,
                admitted_at: now,
            }],
            last_request_at: now,
        }
    }

    /// The moment this entry stops governing admissions.
    pub fn reset_at(&self) -> Instant {
        self.blocked_until.unwrap_or(self.window_reset_at)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.reset_at()
    }

    /// Expired with no request still in flight, so safe to forget.
    pub fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        self.is_expired(now) && self.concurrent(now, timeout) == 0
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked_until.is_some()
    }

    pub fn block(&mut self, now: Instant, penalty: Duration) {
        self.blocked_until = Some(now + penalty);
    }

    /// Drop slots whose processing timeout has elapsed.
    pub fn prune_slots(&mut self, now: Instant, timeout: Duration) {
        self.in_flight.retain(|s| now < s.admitted_at + timeout);
    }

    /// Number of slots still live at `now`.
    pub fn concurrent(&self, now: Instant, timeout: Duration) -> usize {
        self.in_flight
            .iter()
            .filter(|s| now < s.admitted_at + timeout)
            .count()
    }

    pub fn release(&mut self, ticket: u64) {
        self.in_flight.retain(|s| s.ticket != ticket);
    }
}

/// The coarse, process-wide request window shared by all clients.
#[derive(Debug, Clone)]
pub(crate) struct GlobalWindow {
    pub count: u64,
    pub reset_at: Instant,
}

impl GlobalWindow {
    pub fn new(now: Instant, window: Duration) -> Self {
        Self {
            count: 0,
            reset_at: now + window,
        }
    }

    /// Count one request against the global budget.
    ///
    /// The counter is incremented even when the request ends up over budget.
    pub fn hit(&mut self, now: Instant, window: Duration, max: u64) -> bool {
        if now > self.reset_at {
            self.count = 1;
            self.reset_at = now + window;
            return true;
        }
        self.count += 1;
        self.count <= max
    }
}

/// Read-only copy of a client's counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSnapshot {
    pub request_count: u32,
    pub window_reset_at: Instant,
    pub blocked: bool,
    pub blocked_until: Option<Instant>,
    pub suspicious_attempts: u32,
    pub concurrent_requests: usize,
    pub last_request_at: Instant,
}

impl ClientSnapshot {
    pub(crate) fn capture(state: &ClientState, now: Instant, timeout: Duration) -> Self {
        Self {
            request_count: state.request_count,
            window_reset_at: state.window_reset_at,
            blocked: state.is_blocked(),
            blocked_until: state.blocked_until,
            suspicious_attempts: state.suspicious_attempts,
            concurrent_requests: state.concurrent(now, timeout),
            last_request_at: state.last_request_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(900);

    #[test]
    fn test_fresh_entry_holds_one_slot() {
        let now = Instant::now();
        let state = ClientState::fresh(now, WINDOW, 7);
        assert_eq!(state.request_count, 1);
        assert_eq!(state.concurrent(now, Duration::from_secs(30)), 1);
        assert!(!state.is_blocked());
        assert_eq!(state.reset_at(), now + WINDOW);
    }

    #[test]
    fn test_block_moves_expiry_to_penalty_end() {
        let now = Instant::now();
        let mut state = ClientState::fresh(now, WINDOW, 1);
        state.block(now, Duration::from_secs(3600));

        assert_eq!(state.reset_at(), now + Duration::from_secs(3600));
        assert!(!state.is_expired(now + WINDOW + Duration::from_secs(1)));
        assert!(!state.is_expired(now + Duration::from_secs(3600)));
        assert!(state.is_expired(now + Duration::from_secs(3601)));
    }

    #[test]
    fn test_slots_expire_after_timeout() {
        let now = Instant::now();
        let timeout = Duration::from_secs(30);
        let mut state = ClientState::fresh(now, WINDOW, 1);

        assert_eq!(state.concurrent(now + Duration::from_secs(29), timeout), 1);
        assert_eq!(state.concurrent(now + timeout, timeout), 0);

        state.prune_slots(now + timeout, timeout);
        assert!(state.in_flight.is_empty());
    }

    #[test]
    fn test_release_unknown_ticket_is_noop() {
        let now = Instant::now();
        let mut state = ClientState::fresh(now, WINDOW, 1);
        state.release(99);
        assert_eq!(state.in_flight.len(), 1);
        state.release(1);
        assert!(state.in_flight.is_empty());
    }

    #[test]
    fn test_global_window_counts_rejected_hits() {
        let now = Instant::now();
        let window = Duration::from_secs(60);
        let mut global = GlobalWindow::new(now, window);

        assert!(global.hit(now, window, 2));
        assert!(global.hit(now, window, 2));
        assert!(!global.hit(now, window, 2));
        assert_eq!(global.count, 3);

        // A new window starts strictly after the old one ends.
        assert!(global.hit(now + window + Duration::from_millis(1), window, 2));
        assert_eq!(global.count, 1);
    }
}
