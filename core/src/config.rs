use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use dirs::home_dir;
use serde::Deserialize;

use crate::error::Result;
use crate::error::VischatErr;
use crate::flags::VISCHAT_API_BASE;
use crate::flags::VISCHAT_API_KEY_ENV;
use crate::flags::VISCHAT_DEFAULT_MODEL;
use crate::flags::VISCHAT_REQUEST_MAX_RETRIES;
use crate::flags::VISCHAT_REQUEST_TIMEOUT_MS;

/// Embedded fallback system preamble, used when the user has not created
/// `~/.vischat/instructions.md`.
const EMBEDDED_INSTRUCTIONS: &str = include_str!("../prompt.md");

const CONFIG_TOML_FILE: &str = "config.toml";
const INSTRUCTIONS_FILE: &str = "instructions.md";

pub const DEFAULT_CIRCUIT_BREAKER_THRESHOLD: u32 = 3;
pub const DEFAULT_ERROR_JOURNAL_CAPACITY: usize = 20;

/// Application configuration loaded from disk and merged with overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Model slug sent to the completion service.
    pub model: String,

    /// Base URL of an OpenAI-compatible Chat Completions endpoint.
    pub base_url: String,

    /// Environment variable that holds the API key. The key itself is never
    /// stored in the config.
    pub api_key_env: String,

    pub request_max_retries: u64,
    pub request_timeout: Duration,

    /// Consecutive tool failures that end a turn.
    pub circuit_breaker_threshold: u32,

    /// Number of error records retained by the journal.
    pub error_journal_capacity: usize,

    /// Surface raw tool diagnostics to the model and in `/errors`.
    pub debug: bool,

    /// Log tool arguments and results at `info` instead of `trace`.
    pub verbose: bool,

    /// System preamble sent ahead of the message log.
    pub instructions: String,

    /// Directory holding `config.toml` and `instructions.md`.
    pub vischat_home: PathBuf,
}

/// On-disk shape of `config.toml`. Every field is optional.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ConfigToml {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key_env: Option<String>,
    pub request_max_retries: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub circuit_breaker_threshold: Option<u32>,
    pub error_journal_capacity: Option<usize>,
    pub debug: Option<bool>,
    pub verbose: Option<bool>,
}

/// Optional overrides for user configuration (e.g., from CLI flags).
#[derive(Default, Debug, Clone)]
pub struct ConfigOverrides {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub circuit_breaker_threshold: Option<u32>,
    pub debug: Option<bool>,
    pub verbose: Option<bool>,
}

impl Config {
    /// Load configuration from `$VISCHAT_HOME` (default `~/.vischat`), then
    /// apply `overrides`, which take precedence.
    pub fn load_with_overrides(overrides: ConfigOverrides) -> Result<Self> {
        let vischat_home = find_vischat_home()?;
        let cfg = load_config_as_toml(&vischat_home)?;
        Self::load_from_base_config_with_overrides(cfg, overrides, vischat_home)
    }

    /// Meant to be used exclusively for tests: `load_with_overrides()` should
    /// be used in all other cases.
    pub fn load_from_base_config_with_overrides(
        cfg: ConfigToml,
        overrides: ConfigOverrides,
        vischat_home: PathBuf,
    ) -> Result<Self> {
        let instructions = load_instructions(&vischat_home)
            .unwrap_or_else(|| EMBEDDED_INSTRUCTIONS.to_string());

        let config = Self {
            model: overrides
                .model
                .or(cfg.model)
                .unwrap_or_else(|| VISCHAT_DEFAULT_MODEL.to_string()),
            base_url: overrides
                .base_url
                .or(cfg.base_url)
                .unwrap_or_else(|| VISCHAT_API_BASE.to_string()),
            api_key_env: cfg
                .api_key_env
                .unwrap_or_else(|| VISCHAT_API_KEY_ENV.to_string()),
            request_max_retries: cfg
                .request_max_retries
                .unwrap_or(*VISCHAT_REQUEST_MAX_RETRIES),
            request_timeout: cfg
                .request_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(*VISCHAT_REQUEST_TIMEOUT_MS),
            circuit_breaker_threshold: overrides
                .circuit_breaker_threshold
                .or(cfg.circuit_breaker_threshold)
                .unwrap_or(DEFAULT_CIRCUIT_BREAKER_THRESHOLD),
            error_journal_capacity: cfg
                .error_journal_capacity
                .unwrap_or(DEFAULT_ERROR_JOURNAL_CAPACITY),
            debug: overrides.debug.or(cfg.debug).unwrap_or(false),
            verbose: overrides.verbose.or(cfg.verbose).unwrap_or(false),
            instructions,
            vischat_home,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.circuit_breaker_threshold == 0 {
            return Err(VischatErr::Config(
                "circuit_breaker_threshold must be at least 1".to_string(),
            ));
        }
        if self.error_journal_capacity == 0 {
            return Err(VischatErr::Config(
                "error_journal_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Reads the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

/// Reads `config.toml` from `vischat_home`. A missing file yields the
/// default (empty) config; a malformed one is an error.
pub fn load_config_as_toml(vischat_home: &Path) -> Result<ConfigToml> {
    let path = vischat_home.join(CONFIG_TOML_FILE);
    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config.toml found; using defaults");
            Ok(ConfigToml::default())
        }
        Err(e) => {
            tracing::warn!(error = %e, path = %path.display(), "failed to read config.toml");
            Err(e.into())
        }
    }
}

fn load_instructions(vischat_home: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(vischat_home.join(INSTRUCTIONS_FILE)).ok()?;
    let trimmed = contents.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Returns the path to the configuration directory: `$VISCHAT_HOME` when set,
/// otherwise `~/.vischat`. Does not verify that the directory exists.
pub fn find_vischat_home() -> std::io::Result<PathBuf> {
    if let Some(val) = std::env::var_os("VISCHAT_HOME").filter(|val| !val.is_empty()) {
        return Ok(PathBuf::from(val));
    }

    let mut p = home_dir().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not find home directory",
        )
    })?;
    p.push(".vischat");
    Ok(p)
}
