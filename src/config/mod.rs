//! Configuration for the watch engine and its backend clients.
//!
//! Sources are layered with increasing priority:
//! 1. Default values (hardcoded)
//! 2. Optional TOML settings file
//! 3. Environment variables (`DEPWATCH_*`, highest priority)
//!
//! Environment overrides use `__` as the section separator, e.g.
//! `DEPWATCH_NOMAD__ADDRESS=http://nomad.service:4646` or
//! `DEPWATCH_RETRY__MAX_DELAY_MS=30000`.

mod nomad;
mod retry;
mod vault;
mod watch;
pub use nomad::*;
pub use retry::*;
pub use vault::*;
pub use watch::*;


use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    /// Watch engine tuning: buffers, wait budget, concurrency cap
    #[serde(default)]
    pub watch: WatchConfig,

    /// Backoff policy shared by every view
    #[serde(default)]
    pub retry: BackoffPolicy,

    /// Scheduler backend connection parameters
    #[serde(default)]
    pub nomad: NomadConfig,

    /// Secret backend connection parameters
    #[serde(default)]
    pub vault: VaultConfig,
}

impl Settings {
    /// Load configuration with priority: defaults, then the optional
    /// settings file, then `DEPWATCH_*` environment variables.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }

        let settings: Settings = builder
            .add_source(
                Environment::with_prefix("DEPWATCH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.watch.validate()?;

        if self.retry.base_delay_ms == 0 {
            return Err(config::ConfigError::Message(
                "retry.base_delay_ms must be greater than 0".into(),
            )
            .into());
        }
        if self.retry.multiplier < 1.0 {
            return Err(config::ConfigError::Message(
                "retry.multiplier must be at least 1.0".into(),
            )
            .into());
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(config::ConfigError::Message(
                "retry.max_delay_ms must not be smaller than retry.base_delay_ms".into(),
            )
            .into());
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_fraction) {
            return Err(config::ConfigError::Message(
                "retry.jitter_fraction must be within [0, 1]".into(),
            )
            .into());
        }

        Ok(())
    }
}
