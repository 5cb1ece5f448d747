//! Config - 階層化された設定
//!
//! Precedence, lowest first:
//! 1. built-in defaults
//! 2. an optional TOML file
//! 3. environment variables `ALP__<SECTION>__<KEY>`
//!    (e.g. `ALP__TERMINATION__MAX_ITERATIONS=20`)
//!
//! `config` はキーを小文字化するため、`[parameters]` のキーはファイル上の
//! 表記に戻してから返す。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::domain::{Attributes, TerminationEvaluator};
use crate::retry::{BackoffPolicy, BackoffStrategy, RetryOptions};

pub const ENV_PREFIX: &str = "ALP";
const ENV_SEPARATOR: &str = "__";
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("failed to read configuration file {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse configuration parameters: {0}")]
    Parameters(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlpConfig {
    pub termination: TerminationConfig,
    pub retry: RetryConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,

    /// Free-form parameters copied into each iteration's `configuration`.
    pub parameters: Attributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminationConfig {
    pub max_iterations: u32,
    pub performance_threshold: f64,
}

impl Default for TerminationConfig {
    fn default() -> Self {
        Self {
            max_iterations: TerminationEvaluator::DEFAULT_MAX_ITERATIONS,
            performance_threshold: TerminationEvaluator::DEFAULT_PERFORMANCE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per operation, the first one included.
    pub max_retries: u32,
    pub initial_delay_secs: f64,
    pub strategy: BackoffStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: RetryOptions::DEFAULT_MAX_ATTEMPTS,
            initial_delay_secs: 1.0,
            strategy: BackoffStrategy::Exponential,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub state_dir: PathBuf,
    pub log_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("iteration_states"),
            log_path: PathBuf::from("logs/iterations.jsonl"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AlpConfig {
    /// Defaults, then `path` (must exist when given), then `ALP__*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, Self::environment())
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            if !path.is_file() {
                return Err(ConfigError::FileNotFound(path.to_path_buf()));
            }
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        let mut config: AlpConfig = builder.add_source(env).build()?.try_deserialize()?;
        if let Some(path) = path {
            let raw = Self::raw_parameters(path)?;
            config.parameters = restore_key_case(config.parameters, &raw);
        }
        config.validate()?;

        tracing::debug!(
            file = ?path,
            max_iterations = config.termination.max_iterations,
            max_retries = config.retry.max_retries,
            "configuration loaded"
        );
        Ok(config)
    }

    /// `[parameters]` exactly as written in the file.
    fn raw_parameters(path: &Path) -> Result<Attributes, ConfigError> {
        #[derive(Deserialize)]
        struct RawFile {
            #[serde(default)]
            parameters: Attributes,
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawFile = toml::from_str(&content)?;
        Ok(raw.parameters)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| -> Result<(), ConfigError> { Err(ConfigError::Invalid(msg)) };

        if self.termination.max_iterations == 0 {
            return invalid("termination.max_iterations must be at least 1".into());
        }
        if !self.termination.performance_threshold.is_finite() {
            return invalid(format!(
                "termination.performance_threshold must be finite, got {}",
                self.termination.performance_threshold
            ));
        }
        if self.retry.max_retries == 0 {
            return invalid("retry.max_retries must be at least 1".into());
        }
        let delay = self.retry.initial_delay_secs;
        if !delay.is_finite() || delay <= 0.0 {
            return invalid(format!(
                "retry.initial_delay_secs must be a positive number, got {delay}"
            ));
        }
        if Duration::try_from_secs_f64(delay).is_err() {
            return invalid(format!("retry.initial_delay_secs is out of range: {delay}"));
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return invalid(format!(
                "logging.level must be one of {}, got {:?}",
                LOG_LEVELS.join(", "),
                self.logging.level
            ));
        }
        Ok(())
    }

    pub fn termination_evaluator(&self) -> TerminationEvaluator {
        TerminationEvaluator::new(
            self.termination.max_iterations,
            self.termination.performance_threshold,
        )
    }

    pub fn retry_options(&self) -> RetryOptions {
        let initial_delay =
            Duration::try_from_secs_f64(self.retry.initial_delay_secs).unwrap_or(Duration::ZERO);
        RetryOptions::new(
            self.retry.max_retries,
            BackoffPolicy::new(initial_delay, self.retry.strategy),
        )
    }

    /// The effective configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Gives lowercased top-level keys back the spelling they have in `raw`.
///
/// A value still equal to the file's (modulo key case) is taken from the
/// file, so nested tables keep their case too. Values overridden from the
/// environment are kept under the file's key.
fn restore_key_case(layered: Attributes, raw: &Attributes) -> Attributes {
    layered
        .into_iter()
        .map(|(key, value)| {
            match raw.iter().find(|(raw_key, _)| raw_key.to_lowercase() == key) {
                Some((raw_key, raw_value)) if lowercase_keys(raw_value) == value => {
                    (raw_key.clone(), raw_value.clone())
                }
                Some((raw_key, _)) => (raw_key.clone(), value),
                None => (key, value),
            }
        })
        .collect()
}

fn lowercase_keys(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(k, v)| (k.to_lowercase(), lowercase_keys(v)))
            .collect::<Attributes>()
            .into(),
        serde_json::Value::Array(items) => items.iter().map(lowercase_keys).collect(),
        other => other.clone(),
    }
}
