//! HTTP edge for the contact endpoint.
//!
//! Resolves the client identifier, asks the [`AbuseGuard`](folio_guard::AbuseGuard)
//! for admission, decodes and validates the body, and dispatches accepted
//! submissions. Every response carries the CORS and security header set.
//!
//! ## Routes
//!
//! ```text
//! POST    /api/contact   submit the form
//! GET     /api/contact   configured limits
//! OPTIONS /api/contact   CORS preflight
//! GET     /healthz       liveness
//! ```

pub mod client_id;
pub mod error;
pub mod headers;
pub mod server;
pub mod types;

pub use client_id::{UNKNOWN_CLIENT, client_id};
pub use error::ApiError;
pub use headers::EdgeHeaders;
pub use server::{AppState, router, serve};
pub use types::*;
