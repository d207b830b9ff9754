//! Scanner and cache configuration.
//!
//! Hosts may load these from JSON; missing fields take their defaults.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Seven days in milliseconds.
pub const DEFAULT_TTL_MILLIS: i64 = 7 * 24 * 60 * 60 * 1000;

pub const DEFAULT_MEMORY_CAPACITY: usize = 50;

pub const DEFAULT_PERSISTENT_CAPACITY: usize = 200;

/// Upper bound on 16-byte reads from an NDEF tag (1 KiB of user memory).
pub const DEFAULT_NDEF_MAX_BLOCKS: u8 = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub memory_capacity: usize,
    pub persistent_capacity: usize,
    /// Maximum age of a persistent entry, measured from its creation time.
    pub ttl_millis: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            persistent_capacity: DEFAULT_PERSISTENT_CAPACITY,
            ttl_millis: DEFAULT_TTL_MILLIS,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_capacity == 0 {
            return Err(ConfigError::Invalid("memory_capacity must be > 0".into()));
        }
        if self.persistent_capacity == 0 {
            return Err(ConfigError::Invalid(
                "persistent_capacity must be > 0".into(),
            ));
        }
        if self.ttl_millis <= 0 {
            return Err(ConfigError::Invalid("ttl_millis must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScannerConfig {
    pub cache: CacheConfig,
    /// Retry a rejected sector with key variant B.
    pub try_key_b: bool,
    /// Insert a zero block when a single block read fails.
    pub zero_fill_failed_blocks: bool,
    pub ndef_max_blocks: u8,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            try_key_b: true,
            zero_fill_failed_blocks: true,
            ndef_max_blocks: DEFAULT_NDEF_MAX_BLOCKS,
        }
    }
}

impl ScannerConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: ScannerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cache.validate()?;
        if self.ndef_max_blocks == 0 {
            return Err(ConfigError::Invalid("ndef_max_blocks must be > 0".into()));
        }
        Ok(())
    }
}
