#![deny(unsafe_code)]

//! Shared test utilities for the folio workspace.
//!
//! Provides config builders, notification sinks that record or fail, an
//! in-process harness driven by a manual clock, and a daemon fixture that
//! serves over real TCP.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! folio-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod daemon;
pub mod harness;
pub mod sinks;
pub mod tracing_setup;

pub use config::TestConfigBuilder;
pub use daemon::TestDaemon;
pub use harness::{TestApp, TestResponse};
pub use sinks::{FailingSink, RecordingSink};
