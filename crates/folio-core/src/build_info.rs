//! Build metadata embedded by the build script, reported by `/healthz`
//! and the daemon's startup log.

/// Short git commit hash, or `unknown` outside a checkout.
pub const GIT_HASH: &str = env!("FOLIO_GIT_HASH");

/// Unix epoch seconds at build time.
pub const BUILD_TIMESTAMP: &str = env!("FOLIO_BUILD_TIMESTAMP");

/// `debug` or `release`.
pub const BUILD_PROFILE: &str = env!("FOLIO_BUILD_PROFILE");

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version with commit and profile, e.g. `"0.1.0 (abc1234, release)"`.
pub fn version_string() -> String {
    format!("{VERSION} ({GIT_HASH}, {BUILD_PROFILE})")
}
