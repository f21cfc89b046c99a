//! Runtime configuration for a [`crate::core::BookCore`] (spec.md §6).
//!
//! Loaded the way the teacher loads `AppConfig`: layered defaults, then an
//! optional config file, then environment variables (`MATCHER_*`), via the
//! `config` crate rather than hand-rolled `env::var` parsing.

use serde::{Deserialize, Serialize};

/// Recognized options (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BookCoreConfig {
    /// Number of journaled events between snapshot triggers. Higher means
    /// less I/O but slower recovery.
    pub snapshot_interval: u64,
    /// Expiry scan period, in milliseconds.
    pub order_cleanup_interval_ms: u64,
    /// If true, recovery republishes events so downstream indexes rebuild.
    pub recover_order_history: bool,
    pub max_price: u64,
    pub min_price: u64,
    pub price_tick: u64,
    /// Bounded mailbox capacity; overflow is a retryable `CoreError::MailboxFull`.
    pub mailbox_capacity: usize,
}

impl Default for BookCoreConfig {
    fn default() -> Self {
        Self {
            snapshot_interval: 1_000,
            order_cleanup_interval_ms: 60_000,
            recover_order_history: false,
            max_price: u64::MAX,
            min_price: 1,
            price_tick: 1,
            mailbox_capacity: 1_024,
        }
    }
}

impl BookCoreConfig {
    /// Layered load: built-in defaults -> optional `matcher.toml` in the
    /// working directory -> `MATCHER_*` environment variables. Missing
    /// file/env layers are not an error; only a malformed present layer is.
    pub fn load() -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&BookCoreConfig::default())?)
            .add_source(config::File::with_name("matcher").required(false))
            .add_source(config::Environment::with_prefix("MATCHER"))
            .build()?;
        settings.try_deserialize()
    }

    pub fn price_in_bounds(&self, price: u64) -> bool {
        price >= self.min_price && price <= self.max_price
    }

    pub fn price_on_tick(&self, price: u64) -> bool {
        self.price_tick == 0 || price % self.price_tick == 0
    }
}
