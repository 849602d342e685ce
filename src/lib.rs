//! depwatch keeps rendered artifacts synchronized with live data in
//! external coordination services.
//!
//! A template declares dependencies (service lookups, key/value reads,
//! secret leases); the [`Watcher`] resolves each to a view poll loop,
//! shared across templates when the dependency allows it, which runs
//! blocking queries against the backend, detects change through the
//! version cursor, retries failures with capped jittered backoff, and
//! emits ordered change notifications the renderer consumes.

pub mod clients;
pub mod config;
pub mod dep;
mod errors;
pub mod watch;

pub use errors::*;
pub use watch::TemplateId;
pub use watch::WatchEvent;
pub use watch::Watcher;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
