//! The admission decision for the contact endpoint.
//!
//! [`AbuseGuard::admit`] runs an ordered list of checks and the first one
//! that fails decides the rejection reason:
//!
//! 1. global request budget (shared by every client)
//! 2. per-client entry missing or expired: start a fresh window and admit
//! 3. client currently blocked
//! 4. too many requests in flight for this client
//! 5. suspicious-attempt threshold reached: block
//! 6. per-window request budget spent: block
//! 7. admit
//!
//! The whole sequence runs under one lock, so each decision is atomic.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::state::{ClientSnapshot, ClientState, GlobalWindow, Slot};

/// Limits enforced by the guard.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Length of a client's request window.
    pub window: Duration,

    /// Requests a client may make per window.
    pub max_requests_per_window: u32,

    /// How long a client stays blocked once penalized.
    pub block_penalty: Duration,

    /// Requests a client may have in flight at once.
    pub max_concurrent_requests: usize,

    /// How long an admission may hold a concurrency slot.
    pub request_timeout: Duration,

    /// Suspicious payloads tolerated before a client is blocked.
    pub suspicious_threshold: u32,

    /// Length of the process-wide window.
    pub global_window: Duration,

    /// Requests admitted across all clients per global window.
    pub global_max_requests: u64,

    /// Upper bound on tracked clients (0 = unbounded).
    pub max_tracked_clients: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(15 * 60),
            max_requests_per_window: 5,
            block_penalty: Duration::from_secs(60 * 60),
            max_concurrent_requests: 3,
            request_timeout: Duration::from_secs(30),
            suspicious_threshold: 3,
            global_window: Duration::from_secs(60),
            global_max_requests: 100,
            max_tracked_clients: 10_000,
        }
    }
}

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// The process-wide budget is exhausted.
    ServiceOverloaded,
    /// The client is serving a block penalty.
    Blocked,
    /// The client has too many requests in flight.
    ConcurrencyLimit,
    /// The client spent its per-window budget.
    RateLimit,
}

impl RejectReason {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ServiceOverloaded => "SERVICE_OVERLOADED",
            Self::Blocked => "BLOCKED",
            Self::ConcurrencyLimit => "CONCURRENCY_LIMIT",
            Self::RateLimit => "RATE_LIMIT",
        }
    }

    /// Whether the rejection is about this client rather than the service.
    pub fn is_client_budget(&self) -> bool {
        !matches!(self, Self::ServiceOverloaded)
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Outcome of [`AbuseGuard::admit`].
#[must_use]
#[derive(Debug)]
pub enum Verdict {
    /// Proceed. The admission holds a concurrency slot until dropped.
    Admit(Admission),
    /// Turn the request away.
    Reject(RejectReason),
}

impl Verdict {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admit(_))
    }

    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Self::Admit(_) => None,
            Self::Reject(reason) => Some(*reason),
        }
    }
}

/// An admitted request's concurrency slot.
///
/// Dropping it frees the slot. A slot that is never dropped still expires
/// after the configured request timeout.
#[derive(Debug)]
pub struct Admission {
    store: Weak<Mutex<Store>>,
    client_id: String,
    ticket: u64,
}

impl Admission {
    /// The client this admission was granted to.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            let mut store = store.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = store.clients.get_mut(&self.client_id) {
                entry.release(self.ticket);
            }
        }
    }
}

#[derive(Debug)]
struct Store {
    clients: HashMap<String, ClientState>,
    global: GlobalWindow,
    next_ticket: u64,
}

impl Store {
    /// Keep the client map under `cap` before inserting a new identifier.
    fn make_room(&mut self, now: Instant, cap: usize, timeout: Duration) {
        if cap == 0 || self.clients.len() < cap {
            return;
        }
        self.clients.retain(|_, c| !c.is_stale(now, timeout));
        if self.clients.len() < cap {
            return;
        }

        // Idle before busy, then unblocked before blocked, then clean before
        // suspicious, then oldest first.
        let victim = self
            .clients
            .iter()
            .min_by_key(|(_, c)| {
                (
                    c.concurrent(now, timeout) > 0,
                    c.is_blocked(),
                    c.suspicious_attempts > 0,
                    c.last_request_at,
                )
            })
            .map(|(id, _)| id.clone());

        if let Some(id) = victim {
            debug!(client = %id, "Evicting least recently seen client");
            self.clients.remove(&id);
        }
    }
}

/// Per-client and global request budgets for the contact endpoint.
///
/// State is in-memory and per-process; a restart forgets every counter and
/// block.
pub struct AbuseGuard {
    config: GuardConfig,
    clock: Arc<dyn Clock>,
    store: Arc<Mutex<Store>>,
}

impl AbuseGuard {
    /// Create a guard reading time from `clock`.
    pub fn new(config: GuardConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        let store = Store {
            clients: HashMap::new(),
            global: GlobalWindow::new(now, config.global_window),
            next_ticket: 0,
        };
        Self {
            config,
            clock,
            store: Arc::new(Mutex::new(store)),
        }
    }

    /// Create a guard backed by the system clock.
    pub fn with_system_clock(config: GuardConfig) -> Self {
        Self::new(config, Arc::new(SystemClock))
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Decide whether a request from `client_id` may proceed.
    pub fn admit(&self, client_id: &str) -> Verdict {
        let now = self.clock.now();
        let mut guard = self.lock();
        let store = &mut *guard;

        if !store.global.hit(
            now,
            self.config.global_window,
            self.config.global_max_requests,
        ) {
            warn!(
                client = %client_id,
                count = store.global.count,
                "Global request budget exhausted"
            );
            return Verdict::Reject(RejectReason::ServiceOverloaded);
        }

        if !store.clients.contains_key(client_id) {
            store.make_room(
                now,
                self.config.max_tracked_clients,
                self.config.request_timeout,
            );
        }

        let ticket = store.next_ticket;
        let outcome = match store.clients.entry(client_id.to_owned()) {
            Entry::Occupied(mut slot) if !slot.get().is_expired(now) => {
                self.check_tracked(slot.get_mut(), ticket, now)
            }
            Entry::Occupied(mut slot) => {
                let previous = slot.get();
                // A block expiry wipes everything; a plain window rollover
                // keeps the suspicion count.
                let carried = if previous.is_blocked() {
                    0
                } else {
                    previous.suspicious_attempts
                };
                let mut fresh = ClientState::fresh(now, self.config.window, ticket);
                fresh.suspicious_attempts = carried;
                fresh.in_flight.extend(
                    previous
                        .in_flight
                        .iter()
                        .filter(|s| now < s.admitted_at + self.config.request_timeout),
                );
                slot.insert(fresh);
                debug!(client = %client_id, "Client window reset");
                Ok(())
            }
            Entry::Vacant(slot) => {
                slot.insert(ClientState::fresh(now, self.config.window, ticket));
                debug!(client = %client_id, "Tracking new client");
                Ok(())
            }
        };

        match outcome {
            Ok(()) => {
                store.next_ticket += 1;
                Verdict::Admit(Admission {
                    store: Arc::downgrade(&self.store),
                    client_id: client_id.to_owned(),
                    ticket,
                })
            }
            Err(reason) => {
                warn!(client = %client_id, reason = %reason, "Request rejected");
                Verdict::Reject(reason)
            }
        }
    }

    /// Block, concurrency, suspicion and rate checks for a live entry.
    fn check_tracked(
        &self,
        entry: &mut ClientState,
        ticket: u64,
        now: Instant,
    ) -> Result<(), RejectReason> {
        let cfg = &self.config;
        entry.prune_slots(now, cfg.request_timeout);

        if entry.is_blocked() {
            return Err(RejectReason::Blocked);
        }

        if entry.in_flight.len() >= cfg.max_concurrent_requests {
            return Err(RejectReason::ConcurrencyLimit);
        }

        if entry.suspicious_attempts >= cfg.suspicious_threshold {
            entry.block(now, cfg.block_penalty);
            info!(
                attempts = entry.suspicious_attempts,
                "Client blocked after repeated suspicious submissions"
            );
            return Err(RejectReason::Blocked);
        }

        if entry.request_count >= cfg.max_requests_per_window {
            entry.block(now, cfg.block_penalty);
            info!(
                requests = entry.request_count,
                "Client blocked after exceeding its request window"
            );
            return Err(RejectReason::RateLimit);
        }

        entry.request_count += 1;
        entry.last_request_at = now;
        entry.in_flight.push(Slot {
            ticket,
            admitted_at: now,
        });
        Ok(())
    }

    /// Count a suspicious payload against `client_id`.
    ///
    /// Does nothing for a client that has never been admitted.
    pub fn record_suspicious(&self, client_id: &str) {
        let mut store = self.lock();
        if let Some(entry) = store.clients.get_mut(client_id) {
            entry.suspicious_attempts += 1;
            warn!(
                client = %client_id,
                attempts = entry.suspicious_attempts,
                "Suspicious submission recorded"
            );
        }
    }

    /// Remove entries whose window or block has expired and that have no
    /// request in flight.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let timeout = self.config.request_timeout;
        let mut store = self.lock();
        let before = store.clients.len();
        store.clients.retain(|_, c| !c.is_stale(now, timeout));
        let removed = before - store.clients.len();
        if removed > 0 {
            debug!(removed, remaining = store.clients.len(), "Swept expired clients");
        }
        removed
    }

    /// A copy of the counters tracked for `client_id`.
    pub fn snapshot(&self, client_id: &str) -> Option<ClientSnapshot> {
        let now = self.clock.now();
        let store = self.lock();
        store
            .clients
            .get(client_id)
            .map(|c| ClientSnapshot::capture(c, now, self.config.request_timeout))
    }

    /// Number of client identifiers currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.lock().clients.len()
    }
}

impl Default for AbuseGuard {
    fn default() -> Self {
        Self::with_system_clock(GuardConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use pretty_assertions::assert_eq;

    fn guard_with(config: GuardConfig) -> (AbuseGuard, ManualClock) {
        let clock = ManualClock::new();
        let guard = AbuseGuard::new(config, Arc::new(clock.clone()));
        (guard, clock)
    }

    fn reason(verdict: Verdict) -> Option<RejectReason> {
        verdict.reject_reason()
    }

    #[test]
    fn test_admits_full_window_budget() {
        let (guard, _clock) = guard_with(GuardConfig::default());
        for _ in 0..5 {
            assert!(guard.admit("203.0.113.7").is_admitted());
        }
        assert_eq!(guard.snapshot("203.0.113.7").unwrap().request_count, 5);
    }

    #[test_log::test]
    fn test_request_over_budget_blocks_client() {
        let (guard, clock) = guard_with(GuardConfig::default());
        for _ in 0..5 {
            assert!(guard.admit("a").is_admitted());
        }

        assert_eq!(reason(guard.admit("a")), Some(RejectReason::RateLimit));
        let snap = guard.snapshot("a").unwrap();
        assert!(snap.blocked);

        // Ten minutes later the block still applies.
        clock.advance(Duration::from_secs(10 * 60));
        assert_eq!(reason(guard.admit("a")), Some(RejectReason::Blocked));
    }

    #[test]
    fn test_block_lasts_full_penalty() {
        let (guard, clock) = guard_with(GuardConfig::default());
        for _ in 0..5 {
            assert!(guard.admit("a").is_admitted());
        }
        assert_eq!(reason(guard.admit("a")), Some(RejectReason::RateLimit));

        // Stop requesting; the window ends but the block does not.
        clock.advance(Duration::from_secs(60 * 60));
        assert_eq!(reason(guard.admit("a")), Some(RejectReason::Blocked));

        clock.advance(Duration::from_millis(1));
        assert!(guard.admit("a").is_admitted());

        let snap = guard.snapshot("a").unwrap();
        assert!(!snap.blocked);
        assert_eq!(snap.request_count, 1);
        assert_eq!(snap.suspicious_attempts, 0);
    }

    #[test]
    fn test_window_rollover_restores_budget() {
        let (guard, clock) = guard_with(GuardConfig::default());
        for _ in 0..5 {
            assert!(guard.admit("a").is_admitted());
        }
        clock.advance(Duration::from_secs(15 * 60) + Duration::from_millis(1));
        for _ in 0..5 {
            assert!(guard.admit("a").is_admitted());
        }
    }

    #[test]
    fn test_suspicious_threshold_blocks_next_request() {
        let (guard, _clock) = guard_with(GuardConfig::default());
        assert!(guard.admit("a").is_admitted());

        guard.record_suspicious("a");
        guard.record_suspicious("a");
        assert!(guard.admit("a").is_admitted());

        guard.record_suspicious("a");
        assert_eq!(reason(guard.admit("a")), Some(RejectReason::Blocked));

        let snap = guard.snapshot("a").unwrap();
        assert!(snap.blocked);
        assert_eq!(snap.suspicious_attempts, 3);
        // Rate budget was not the trigger.
        assert_eq!(snap.request_count, 2);
    }

    #[test]
    fn test_suspicion_survives_window_rollover() {
        let (guard, clock) = guard_with(GuardConfig::default());
        assert!(guard.admit("a").is_admitted());
        guard.record_suspicious("a");

        clock.advance(Duration::from_secs(16 * 60));
        assert!(guard.admit("a").is_admitted());
        assert_eq!(guard.snapshot("a").unwrap().suspicious_attempts, 1);
    }

    #[test]
    fn test_record_suspicious_for_unknown_client_is_noop() {
        let (guard, _clock) = guard_with(GuardConfig::default());
        guard.record_suspicious("never-seen");
        assert!(guard.snapshot("never-seen").is_none());
        assert_eq!(guard.tracked_clients(), 0);
    }

    #[test]
    fn test_concurrency_limit_until_slot_released() {
        let (guard, _clock) = guard_with(GuardConfig::default());
        let mut held = Vec::new();
        for _ in 0..3 {
            match guard.admit("a") {
                Verdict::Admit(admission) => held.push(admission),
                Verdict::Reject(r) => panic!("unexpected rejection: {r}"),
            }
        }

        assert_eq!(reason(guard.admit("a")), Some(RejectReason::ConcurrencyLimit));
        assert_eq!(guard.snapshot("a").unwrap().concurrent_requests, 3);

        held.pop();
        assert!(guard.admit("a").is_admitted());
        // A concurrency rejection is not a penalty.
        assert!(!guard.snapshot("a").unwrap().blocked);
    }

    #[test]
    fn test_concurrency_slot_expires_after_timeout() {
        let (guard, clock) = guard_with(GuardConfig::default());
        let held: Vec<_> = (0..3).map(|_| guard.admit("a")).collect();
        assert!(held.iter().all(Verdict::is_admitted));

        clock.advance(Duration::from_secs(30));
        assert!(guard.admit("a").is_admitted());
        drop(held);
    }

    #[test]
    fn test_global_budget_applies_to_every_client() {
        let config = GuardConfig {
            global_max_requests: 3,
            ..GuardConfig::default()
        };
        let (guard, clock) = guard_with(config);

        assert!(guard.admit("a").is_admitted());
        assert!(guard.admit("b").is_admitted());
        assert!(guard.admit("c").is_admitted());
        assert_eq!(
            reason(guard.admit("fresh-client")),
            Some(RejectReason::ServiceOverloaded)
        );
        // Overload is not recorded against the client.
        assert!(guard.snapshot("fresh-client").is_none());

        clock.advance(Duration::from_secs(61));
        assert!(guard.admit("fresh-client").is_admitted());
    }

    #[test]
    fn test_clients_are_independent() {
        let config = GuardConfig {
            max_requests_per_window: 1,
            ..GuardConfig::default()
        };
        let (guard, _clock) = guard_with(config);

        assert!(guard.admit("a").is_admitted());
        assert_eq!(reason(guard.admit("a")), Some(RejectReason::RateLimit));
        assert!(guard.admit("b").is_admitted());
    }

    #[test]
    fn test_sweep_removes_expired_but_keeps_blocked() {
        let config = GuardConfig {
            max_requests_per_window: 1,
            ..GuardConfig::default()
        };
        let (guard, clock) = guard_with(config);

        assert!(guard.admit("idle").is_admitted());
        assert!(guard.admit("abuser").is_admitted());
        assert_eq!(reason(guard.admit("abuser")), Some(RejectReason::RateLimit));

        clock.advance(Duration::from_secs(20 * 60));
        assert_eq!(guard.sweep(), 1);
        assert!(guard.snapshot("idle").is_none());
        assert!(guard.snapshot("abuser").is_some());

        clock.advance(Duration::from_secs(60 * 60));
        assert_eq!(guard.sweep(), 1);
        assert_eq!(guard.tracked_clients(), 0);
    }

    #[test]
    fn test_cap_evicts_least_recently_seen_unblocked_client() {
        let config = GuardConfig {
            max_requests_per_window: 1,
            max_tracked_clients: 2,
            ..GuardConfig::default()
        };
        let (guard, clock) = guard_with(config);

        assert!(guard.admit("blocked").is_admitted());
        assert_eq!(reason(guard.admit("blocked")), Some(RejectReason::RateLimit));
        clock.advance(Duration::from_secs(1));
        assert!(guard.admit("older").is_admitted());
        clock.advance(Duration::from_secs(1));
        assert!(guard.admit("newest").is_admitted());

        assert_eq!(guard.tracked_clients(), 2);
        assert!(guard.snapshot("blocked").is_some());
        assert!(guard.snapshot("older").is_none());
    }

    #[test]
    fn test_sweep_keeps_expired_entry_with_request_in_flight() {
        let config = GuardConfig {
            window: Duration::from_secs(10),
            ..GuardConfig::default()
        };
        let (guard, clock) = guard_with(config);

        let held = guard.admit("slow");
        assert!(held.is_admitted());
        clock.advance(Duration::from_secs(11));
        assert_eq!(guard.sweep(), 0);

        // A new window still sees the slot.
        let second = guard.admit("slow");
        assert!(second.is_admitted());
        assert_eq!(guard.snapshot("slow").unwrap().concurrent_requests, 2);

        drop(held);
        assert_eq!(guard.snapshot("slow").unwrap().concurrent_requests, 1);
        drop(second);
        assert_eq!(guard.snapshot("slow").unwrap().concurrent_requests, 0);
    }

    #[test]
    fn test_cap_never_evicts_client_with_request_in_flight() {
        let config = GuardConfig {
            max_tracked_clients: 2,
            ..GuardConfig::default()
        };
        let (guard, clock) = guard_with(config);

        let held = guard.admit("busy");
        assert!(held.is_admitted());
        clock.advance(Duration::from_secs(1));
        assert!(guard.admit("idle").is_admitted());
        clock.advance(Duration::from_secs(1));
        assert!(guard.admit("newcomer").is_admitted());

        assert!(guard.snapshot("idle").is_none());
        guard.record_suspicious("busy");
        assert_eq!(guard.snapshot("busy").unwrap().suspicious_attempts, 1);
        drop(held);
    }

    #[test]
    fn test_cap_prefers_evicting_clients_without_suspicion() {
        let config = GuardConfig {
            max_tracked_clients: 2,
            ..GuardConfig::default()
        };
        let (guard, clock) = guard_with(config);

        assert!(guard.admit("prober").is_admitted());
        guard.record_suspicious("prober");
        clock.advance(Duration::from_secs(1));
        assert!(guard.admit("visitor").is_admitted());
        clock.advance(Duration::from_secs(1));
        assert!(guard.admit("rotated-id").is_admitted());

        assert!(guard.snapshot("visitor").is_none());
        assert_eq!(guard.snapshot("prober").unwrap().suspicious_attempts, 1);
    }

    #[test]
    fn test_admission_outliving_entry_is_harmless() {
        let config = GuardConfig {
            max_requests_per_window: 1,
            ..GuardConfig::default()
        };
        let (guard, clock) = guard_with(config);

        let first = guard.admit("a");
        clock.advance(Duration::from_secs(16 * 60));
        assert_eq!(guard.sweep(), 1);
        drop(first);
        assert_eq!(guard.tracked_clients(), 0);
    }

    #[test]
    fn test_reject_reason_codes() {
        assert_eq!(RejectReason::ServiceOverloaded.code(), "SERVICE_OVERLOADED");
        assert_eq!(RejectReason::RateLimit.to_string(), "RATE_LIMIT");
        assert!(RejectReason::Blocked.is_client_budget());
        assert!(RejectReason::ConcurrencyLimit.is_client_budget());
        assert!(!RejectReason::ServiceOverloaded.is_client_budget());
    }
}
