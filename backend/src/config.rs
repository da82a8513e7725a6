//! Runtime settings loaded via OrthoConfig.
//!
//! Every field can be set through a `FARMLAND_*` environment variable or a
//! configuration file. Missing values fall back to the defaults exposed by
//! the accessors.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;

use crate::domain::{FarmServiceConfig, OverlapPolicy, RetryPolicy};
use crate::outbound::persistence::PoolConfig;

/// Settings for the farm service and its PostgreSQL store.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "FARMLAND")]
pub struct FarmlandSettings {
    /// PostgreSQL connection URL.
    pub database_url: Option<String>,
    /// Maximum pooled connections.
    pub pool_max_size: Option<u32>,
    /// Commit attempts per mutation, including the first.
    pub retry_max_attempts: Option<u32>,
    /// Delay before the first retry, in milliseconds.
    pub retry_initial_backoff_ms: Option<u64>,
    /// Cap on any single retry delay, in milliseconds.
    pub retry_max_backoff_ms: Option<u64>,
    /// Refuse boundaries that overlap active farms.
    #[ortho_config(default = false)]
    pub reject_overlaps: bool,
}

impl FarmlandSettings {
    /// Retry policy with unset fields taken from [`RetryPolicy::default`].
    pub fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            max_attempts: self.retry_max_attempts.unwrap_or(defaults.max_attempts),
            initial_backoff: self
                .retry_initial_backoff_ms
                .map_or(defaults.initial_backoff, Duration::from_millis),
            max_backoff: self
                .retry_max_backoff_ms
                .map_or(defaults.max_backoff, Duration::from_millis),
        }
    }

    pub fn overlap_policy(&self) -> OverlapPolicy {
        if self.reject_overlaps {
            OverlapPolicy::Reject
        } else {
            OverlapPolicy::Allow
        }
    }

    pub fn service_config(&self) -> FarmServiceConfig {
        FarmServiceConfig {
            retry: self.retry_policy(),
            overlap_policy: self.overlap_policy(),
        }
    }

    /// Pool settings, or `None` when no non-blank database URL is configured.
    pub fn pool_config(&self) -> Option<PoolConfig> {
        let url = self
            .database_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())?;
        let config = PoolConfig::new(url);
        Some(match self.pool_max_size {
            Some(max_size) => config.with_max_size(max_size),
            None => config,
        })
    }
}
