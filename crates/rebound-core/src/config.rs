//! Runtime configuration.
//!
//! Sources, lowest precedence first: built-in defaults, an optional JSON file,
//! environment variables. The binary applies its own flags on top.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{BackoffPolicy, DEFAULT_MAX_RETRIES};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for {name}: {value:?}")]
    Env { name: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Deployment stage. Only `prod` hides internal error details from clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    Local,
    Dev,
    Prod,
}

impl Stage {
    pub fn exposes_error_details(self) -> bool {
        !matches!(self, Stage::Prod)
    }
}

impl FromStr for Stage {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Stage::Local),
            "dev" => Ok(Stage::Dev),
            "prod" => Ok(Stage::Prod),
            _ => Err(ConfigError::Env {
                name: "STAGE",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff: BackoffPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Worker tasks per queue.
    pub concurrency: usize,
    pub batch_size: usize,

    /// Delay before a batch that failed with an infrastructure error is visible again.
    pub visibility_timeout_secs: u64,

    /// Longest a worker waits on an empty queue before polling again.
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            batch_size: 10,
            visibility_timeout_secs: 30,
            poll_interval_ms: 250,
        }
    }
}

impl WorkerConfig {
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub failure_rate: f64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            failure_rate: 0.6,
            min_latency_ms: 100,
            max_latency_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub stage: Stage,
    pub retry: RetryConfig,
    pub worker: WorkerConfig,
    pub log: LogConfig,
    pub executor: ExecutorConfig,
}

impl Config {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Defaults, then `path` if given, then the process environment. Validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`; unset or blank variables are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(value) = get("STAGE") {
            self.stage = value.parse()?;
        }
        if let Some(value) = get("LOG_LEVEL") {
            self.log.level = value.trim().to_string();
        }
        if let Some(value) = get("REBOUND_MAX_RETRIES") {
            self.retry.max_retries = parse_env("REBOUND_MAX_RETRIES", &value)?;
        }
        if let Some(value) = get("REBOUND_BATCH_SIZE") {
            self.worker.batch_size = parse_env("REBOUND_BATCH_SIZE", &value)?;
        }
        if let Some(value) = get("REBOUND_FAILURE_RATE") {
            self.executor.failure_rate = parse_env("REBOUND_FAILURE_RATE", &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_retries == 0 {
            return Err(ConfigError::Invalid("retry.max_retries must be >= 1".into()));
        }
        let backoff = &self.retry.backoff;
        if backoff.base < 1 {
            return Err(ConfigError::Invalid("retry.backoff.base must be >= 1".into()));
        }
        if !(backoff.jitter_ratio >= 0.0 && backoff.jitter_ratio.is_finite()) {
            return Err(ConfigError::Invalid(
                "retry.backoff.jitter_ratio must be a finite value >= 0".into(),
            ));
        }
        if self.worker.batch_size == 0 {
            return Err(ConfigError::Invalid("worker.batch_size must be >= 1".into()));
        }
        if self.worker.concurrency == 0 {
            return Err(ConfigError::Invalid("worker.concurrency must be >= 1".into()));
        }
        if !(0.0..=1.0).contains(&self.executor.failure_rate) {
            return Err(ConfigError::Invalid(
                "executor.failure_rate must be within [0, 1]".into(),
            ));
        }
        if self.executor.min_latency_ms > self.executor.max_latency_ms {
            return Err(ConfigError::Invalid(
                "executor.min_latency_ms must not exceed executor.max_latency_ms".into(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        name,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.stage, Stage::Local);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.backoff, BackoffPolicy::default());
        assert_eq!(config.worker.batch_size, 10);
        assert_eq!(config.worker.visibility_timeout(), Duration::from_secs(30));
        assert_eq!(config.log.level, "info");
        assert_eq!(config.executor.failure_rate, 0.6);
        config.validate().unwrap();
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let config = Config::from_json_str(
            r#"{"stage":"prod","retry":{"backoff":{"max_delay_secs":60}},"log":{"json":true}}"#,
        )
        .unwrap();
        assert_eq!(config.stage, Stage::Prod);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.backoff.max_delay_secs, 60);
        assert_eq!(config.retry.backoff.base, 2);
        assert!(config.log.json);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn unknown_stage_in_json_is_rejected() {
        assert!(matches!(
            Config::from_json_str(r#"{"stage":"staging"}"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = Config::from_json_str(r#"{"retry":{"max_retries":7}}"#).unwrap();
        config
            .apply_env_from(env(&[
                ("STAGE", "PROD"),
                ("LOG_LEVEL", "debug"),
                ("REBOUND_MAX_RETRIES", "5"),
                ("REBOUND_BATCH_SIZE", " 20 "),
                ("REBOUND_FAILURE_RATE", "0.25"),
            ]))
            .unwrap();

        assert_eq!(config.stage, Stage::Prod);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.worker.batch_size, 20);
        assert_eq!(config.executor.failure_rate, 0.25);
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut config = Config::default();
        config
            .apply_env_from(env(&[("STAGE", ""), ("REBOUND_MAX_RETRIES", "  ")]))
            .unwrap();
        assert_eq!(config, Config::default());
    }

    #[rstest]
    #[case("STAGE", "staging")]
    #[case("REBOUND_MAX_RETRIES", "three")]
    #[case("REBOUND_BATCH_SIZE", "-1")]
    #[case("REBOUND_FAILURE_RATE", "often")]
    fn bad_env_values_name_the_variable(#[case] name: &str, #[case] value: &str) {
        let mut config = Config::default();
        let err = config.apply_env_from(env(&[(name, value)])).unwrap_err();
        assert!(err.to_string().contains(name), "{err}");
    }

    #[rstest]
    #[case::zero_retries(r#"{"retry":{"max_retries":0}}"#)]
    #[case::zero_base(r#"{"retry":{"backoff":{"base":0}}}"#)]
    #[case::negative_jitter(r#"{"retry":{"backoff":{"jitter_ratio":-0.1}}}"#)]
    #[case::zero_batch(r#"{"worker":{"batch_size":0}}"#)]
    #[case::zero_workers(r#"{"worker":{"concurrency":0}}"#)]
    #[case::failure_rate_above_one(r#"{"executor":{"failure_rate":1.5}}"#)]
    #[case::inverted_latency(r#"{"executor":{"min_latency_ms":500,"max_latency_ms":100}}"#)]
    fn validation_rejects(#[case] raw: &str) {
        let config = Config::from_json_str(raw).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = Config::from_json_file(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[rstest]
    #[case(Stage::Local, true)]
    #[case(Stage::Dev, true)]
    #[case(Stage::Prod, false)]
    fn only_prod_hides_details(#[case] stage: Stage, #[case] exposed: bool) {
        assert_eq!(stage.exposes_error_details(), exposed);
    }
}
