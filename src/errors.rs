//! Error taxonomy for the dependency watch engine.
//!
//! Errors are split by where they can occur: query-string parsing at
//! dependency construction, fetch failures inside a poll loop, and
//! configuration loading at startup.

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed dependency query string, raised at construction.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Failure inside a fetch cycle.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Settings loading / validation failures.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Watcher lifecycle violations (double shutdown, use after shutdown).
    #[error("watcher error: {0}")]
    Watcher(String),
}

/// Query strings are validated against the grammar
/// `[<tag>.]<name>[@<region>]` when a dependency is constructed.
/// A parse failure is never retried.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("{kind}: invalid format: {input:?}")]
    InvalidFormat { kind: &'static str, input: String },

    #[error("{kind}: missing required name component: {input:?}")]
    MissingName { kind: &'static str, input: String },

    #[error("{kind}: illegal character {ch:?} in {component}: {input:?}")]
    IllegalCharacter {
        kind: &'static str,
        component: &'static str,
        ch: char,
        input: String,
    },
}

/// Outcome classification for a single fetch attempt.
///
/// `Stopped` is not a failure: it reports that cancellation was observed
/// before or during the attempt, and callers must neither log it as an
/// error nor apply backoff to it.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Cancellation observed; the dependency will never fetch again.
    #[error("dependency stopped")]
    Stopped,

    /// Backend unreachable or overloaded; expected to heal on its own.
    /// Retried with backoff by the owning view.
    #[error("{dependency}: transient backend error: {reason}")]
    Transient { dependency: String, reason: String },

    /// Authorization, not-found or validation failure. The backend may
    /// still become reachable later (policies change, keys appear), so
    /// the view retries with the same backoff, but logs distinctly.
    #[error("{dependency}: permanent backend error: {reason}")]
    Permanent {
        dependency: String,
        reason: String,
        /// True when the failed call may have had backend side effects
        /// (e.g. a secret lease was issued but the response was lost).
        side_effect: bool,
    },
}

impl FetchError {
    /// Whether this error is the cancellation marker.
    pub fn is_stopped(&self) -> bool {
        matches!(self, FetchError::Stopped)
    }

    /// Whether the failed attempt may have mutated backend state.
    pub fn has_side_effect(&self) -> bool {
        matches!(self, FetchError::Permanent { side_effect: true, .. })
    }
}
