// Copyright (C) Microsoft Corporation. All rights reserved.

//! `#[test]` replacement that routes `tracing` output to the test harness.
//!
//! ```ignore
//! use test_with_tracing::test;
//!
//! #[test]
//! fn test_something() {
//!     tracing::debug!("captured per test");
//! }
//! ```
//!
//! The filter defaults to `debug` and can be overridden with `RUST_LOG`.

// Test-only crate; a broken RUST_LOG should fail loudly.
#![allow(clippy::expect_used)]

#[cfg(test)]
extern crate self as test_with_tracing;

pub use test_with_tracing_macro::test;
use tracing_subscriber::EnvFilter;

#[doc(hidden)]
/// Installs the test subscriber once per process.
pub fn init() {
    static ONCE: std::sync::Once = std::sync::Once::new();

    ONCE.call_once(|| {
        let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
            Ok(var) => EnvFilter::try_new(var).expect("Failed to parse RUST_LOG"),
            Err(_) => EnvFilter::new("debug"),
        };

        // Another harness may already own the global subscriber.
        let _ = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_test_writer()
            .with_thread_ids(true)
            .with_env_filter(filter)
            .try_init();
    });
}
