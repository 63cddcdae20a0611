#![deny(unsafe_code)]

//! In-process abuse protection for the folio contact endpoint.
//!
//! [`AbuseGuard`] owns every rate-limit counter in the process: a coarse
//! global window shared by all callers and a per-client record keyed by the
//! client identifier the HTTP edge resolves from proxy headers. Callers only
//! see verdicts; counters cannot be mutated from outside.
//!
//! ```
//! use folio_guard::{AbuseGuard, GuardConfig, Verdict};
//!
//! let guard = AbuseGuard::with_system_clock(GuardConfig::default());
//! match guard.admit("198.51.100.4") {
//!     Verdict::Admit(_slot) => { /* handle the request while holding the slot */ }
//!     Verdict::Reject(reason) => eprintln!("rejected: {reason}"),
//! }
//! ```
//!
//! State is single-process and never persisted.

/// Time sources (system and manually driven).
pub mod clock;
/// Admission checks, verdicts, and the guard itself.
pub mod guard;
mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use guard::{AbuseGuard, Admission, GuardConfig, RejectReason, Verdict};
pub use state::ClientSnapshot;
