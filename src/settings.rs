use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

const CONFIG_FILE: &str = "ld_tracker";
const ENV_PREFIX: &str = "LDT";

/// Runtime settings: defaults, then `ld_tracker.toml`, then `LDT_*` env vars.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub db_path: PathBuf,
    pub concurrency: usize,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/ld_tracker.sqlite"),
            concurrency: 10,
            max_retries: 3,
            base_backoff_ms: 2000,
            request_timeout_secs: 30,
            user_agent: format!("ld_tracker/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize::<Settings>()
            .context("Invalid configuration")?;
        Ok(settings.sanitized())
    }

    fn sanitized(mut self) -> Self {
        self.concurrency = self.concurrency.max(1);
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = Settings::default();
        assert_eq!(s.concurrency, 10);
        assert_eq!(s.max_retries, 3);
        assert_eq!(s.db_path, PathBuf::from("data/ld_tracker.sqlite"));
        assert!(s.user_agent.starts_with("ld_tracker/"));
    }

    #[test]
    fn partial_overrides_keep_defaults() {
        let s: Settings = Config::builder()
            .set_override("concurrency", 0i64)
            .unwrap()
            .set_override("db_path", "/tmp/events.sqlite")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize::<Settings>()
            .unwrap()
            .sanitized();
        assert_eq!(s.concurrency, 1);
        assert_eq!(s.db_path, PathBuf::from("/tmp/events.sqlite"));
        assert_eq!(s.max_retries, 3);
    }
}
