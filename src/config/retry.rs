use serde::Deserialize;
use serde::Serialize;

/// Backoff policy applied by a view after a failed fetch.
///
/// The delay for attempt `n` (1-based) is
/// `min(base_delay_ms * multiplier^(n-1), max_delay_ms)`, with up to
/// `jitter_fraction` of the computed delay added or subtracted at random
/// so that many views retrying against the same backend do not
/// synchronize into retry storms.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct BackoffPolicy {
    /// Backoff base (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Growth factor between consecutive failed attempts
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Fraction of the computed delay used as randomized jitter, in [0, 1]
    #[serde(default = "default_jitter_fraction")]
    pub jitter_fraction: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            jitter_fraction: default_jitter_fraction(),
        }
    }
}

impl BackoffPolicy {
    /// Deterministic delay for the given consecutive-failure count,
    /// before jitter. `attempts` is the number of failures already
    /// observed, so the first retry uses the base delay.
    pub fn delay_ms(&self, attempts: u32) -> u64 {
        let exp = attempts.saturating_sub(1).min(63);
        let raw = (self.base_delay_ms as f64) * self.multiplier.powi(exp as i32);
        if raw >= self.max_delay_ms as f64 {
            self.max_delay_ms
        } else {
            raw as u64
        }
    }
}

fn default_base_delay_ms() -> u64 {
    500
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_max_delay_ms() -> u64 {
    60_000
}
fn default_jitter_fraction() -> f64 {
    0.25
}
