//! Cache configuration.
//!
//! Loaded from YAML; every field is optional.
//!
//! ```yaml
//! tiers: [l1, l2]
//! tier_errors: tolerate
//! codec:
//!   escaping: percent
//!   malformed_pairs: reject
//! ```

use crate::cache::{KeyCodecConfig, TierErrorPolicy};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable naming the configuration file used by the CLI.
pub const CONFIG_ENV_VAR: &str = "QUERY_CACHE_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub codec: KeyCodecConfig,
    pub tier_errors: TierErrorPolicy,
    /// Names of in-memory tiers, in probe order.
    pub tiers: Vec<String>,
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_codec(mut self, codec: KeyCodecConfig) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_tier_errors(mut self, policy: TierErrorPolicy) -> Self {
        self.tier_errors = policy;
        self
    }

    pub fn with_tiers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tiers = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content).map_err(|e| match e {
            Error::Yaml(inner) => Error::configuration_with_context(
                inner.to_string(),
                ErrorContext::new()
                    .with_details(path.as_ref().display().to_string())
                    .with_source("config_loader"),
            ),
            other => other,
        })
    }

    /// Tier names must be non-empty and unique.
    pub fn validate(&self) -> Result<()> {
        for (i, name) in self.tiers.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(Error::configuration_with_context(
                    "tier name must not be empty",
                    ErrorContext::new()
                        .with_field_path(format!("tiers[{}]", i))
                        .with_source("config_loader"),
                ));
            }
            if self.tiers[..i].contains(name) {
                return Err(Error::configuration_with_context(
                    format!("duplicate tier name '{}'", name),
                    ErrorContext::new()
                        .with_field_path(format!("tiers[{}]", i))
                        .with_source("config_loader"),
                ));
            }
        }
        Ok(())
    }
}
