//! Fuzz target for field sanitization and validation.
//!
//! Run with: cargo +nightly fuzz run fuzz_sanitize
//!
//! Checks that sanitizing is idempotent, respects the length cap, and never
//! leaves angle brackets behind.

#![no_main]

use std::sync::OnceLock;

use folio_config::ValidationConfig;
use folio_core::{ContactRequest, ContentValidator};
use libfuzzer_sys::fuzz_target;

static VALIDATOR: OnceLock<ContentValidator> = OnceLock::new();

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let validator = VALIDATOR.get_or_init(|| {
        ContentValidator::new(ValidationConfig::default()).expect("patterns compile")
    });

    let max = 200;
    let once = validator.sanitize(input, max);
    assert!(once.chars().count() <= max);
    assert!(!once.contains('<') && !once.contains('>'));
    assert_eq!(validator.sanitize(&once, max), once);

    let _ = validator.validate(&ContactRequest::new(input, "fuzz@example.com", input));
});
