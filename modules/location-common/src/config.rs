use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::error::LocationError;

/// Search store endpoint and credentials, loaded from environment variables.
/// Secrets never live in the TOML file.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl SearchConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            url: env::var("ES_URL").unwrap_or_else(|_| "http://localhost:9200".to_string()),
            user: env::var("ES_USER").ok().filter(|s| !s.is_empty()),
            password: env::var("ES_PASSWORD").ok().filter(|s| !s.is_empty()),
        }
    }

    /// Log the effective settings with the password masked.
    pub fn log_redacted(&self) {
        info!(
            url = self.url.as_str(),
            user = self.user.as_deref().unwrap_or("<none>"),
            password = if self.password.is_some() { "********" } else { "<none>" },
            "Search store config"
        );
    }
}

/// TOML-backed settings for the summary job: tunables plus the site table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SummaryConfig {
    /// Organizations whose traffic is never summarized.
    pub ignore_organizations: Vec<String>,
    pub store: StoreConfig,
    pub backfill: BackfillConfig,
    /// Organization identifier -> static site metadata.
    pub sites: BTreeMap<String, SiteProfile>,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            ignore_organizations: vec!["N/A".to_string(), "ISI-AS".to_string()],
            store: StoreConfig::default(),
            backfill: BackfillConfig::default(),
            sites: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub raw_index_pattern: String,
    pub summary_index_prefix: String,
    /// Maximum distinct (organization, subdomain) groups requested per day.
    pub group_cap: usize,
    pub request_timeout_secs: u64,
    pub max_write_attempts: u32,
    pub retry_base_delay_ms: u64,
    /// Estimate the distinct-group total when a day overflows the cap.
    /// Needs inline scripting on the cluster.
    pub estimate_group_count: bool,
}

impl StoreConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            raw_index_pattern: "job-locations-*".to_string(),
            summary_index_prefix: "aggregated-job-locations".to_string(),
            group_cap: 10_000,
            request_timeout_secs: 180,
            max_write_attempts: 3,
            retry_base_delay_ms: 1_000,
            estimate_group_count: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackfillConfig {
    /// Most recent days (today included) processed on every run.
    pub recent_days: u32,
    /// Older days re-processed per run so site table changes reach history.
    pub sample_count: u32,
    pub sampling: SamplingStrategy,
    /// Days processed concurrently. One day is never split across workers.
    pub workers: usize,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            recent_days: 5,
            sample_count: 30,
            sampling: SamplingStrategy::default(),
            workers: 1,
        }
    }
}

/// How older days are chosen for re-processing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum SamplingStrategy {
    /// `today - i * stride_days` for `i in 0..sample_count`.
    Stride { stride_days: u32 },
    /// Uniform draws of "days ago" from `min_days_ago..=max_days_ago`.
    Random { min_days_ago: u32, max_days_ago: u32 },
}

impl Default for SamplingStrategy {
    fn default() -> Self {
        Self::Stride { stride_days: 30 }
    }
}

/// Static metadata for one organization. Coordinates are all-or-none.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteProfile {
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub geohash: Option<String>,
    #[serde(default)]
    pub tag_rules: Vec<TagRule>,
}

impl SiteProfile {
    pub fn has_coordinates(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some() && self.geohash.is_some()
    }
}

/// Tag a record when its subdomain contains `subdomain_contains`
/// (case-insensitive). Without a substring the rule always fires.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagRule {
    pub tag: String,
    #[serde(default)]
    pub subdomain_contains: Option<String>,
}

impl SummaryConfig {
    /// Load, parse and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LocationError> {
        for (organization, site) in &self.sites {
            let set = [&site.latitude, &site.longitude, &site.geohash]
                .iter()
                .filter(|v| v.is_some())
                .count();
            if set != 0 && set != 3 {
                return Err(LocationError::Config(format!(
                    "site '{organization}' must set latitude, longitude and geohash together"
                )));
            }
            if site.tag_rules.iter().any(|r| r.tag.trim().is_empty()) {
                return Err(LocationError::Config(format!(
                    "site '{organization}' has a tag rule with an empty tag"
                )));
            }
        }

        if self.store.group_cap == 0 {
            return Err(LocationError::Config("store.group_cap must be > 0".into()));
        }
        if self.store.max_write_attempts == 0 {
            return Err(LocationError::Config(
                "store.max_write_attempts must be >= 1".into(),
            ));
        }
        if self.backfill.workers == 0 {
            return Err(LocationError::Config("backfill.workers must be >= 1".into()));
        }

        match self.backfill.sampling {
            SamplingStrategy::Stride { stride_days: 0 } if self.backfill.sample_count > 0 => {
                Err(LocationError::Config(
                    "backfill.sampling.stride_days must be > 0".into(),
                ))
            }
            SamplingStrategy::Random {
                min_days_ago,
                max_days_ago,
            } if min_days_ago > max_days_ago => Err(LocationError::Config(format!(
                "backfill.sampling.min_days_ago ({min_days_ago}) exceeds max_days_ago ({max_days_ago})"
            ))),
            _ => Ok(()),
        }
    }
}
