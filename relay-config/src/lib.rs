//! Configuration loading for the relay task engine.
//!
//! Configuration is resolved in three layers: built-in defaults, an optional
//! config file (TOML, YAML or JSON, inferred from the extension), and
//! `RELAY_*` environment variables, which take precedence over everything.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Raw, all-optional shape of a config file.
#[derive(Debug, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub logging: Option<LoggingSection>,
    #[serde(default)]
    pub queue: Option<QueueSection>,
    #[serde(default)]
    pub handler: Option<HandlerSection>,
    #[serde(default)]
    pub worker: Option<WorkerSection>,
    #[serde(default)]
    pub supervisor: Option<SupervisorSection>,
}

#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub json: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct QueueSection {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HandlerSection {
    #[serde(default)]
    pub run_in_production: Option<bool>,
    #[serde(default)]
    pub reuse_tasks: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct WorkerSection {
    #[serde(default)]
    pub exit_on_error: Option<bool>,
    #[serde(default)]
    pub error_log_file: Option<String>,
    #[serde(default)]
    pub idle_poll_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct SupervisorSection {
    #[serde(default)]
    pub pid_dir: Option<String>,
    #[serde(default)]
    pub pid_prefix: Option<String>,
    #[serde(default)]
    pub workers: Option<usize>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Load a RawConfigFile from a path. The format is inferred from the extension: .toml, .yaml/.yml, .json
pub fn load_raw_from_file<P: AsRef<Path>>(path: P) -> Result<RawConfigFile, ConfigError> {
    let path = path.as_ref();
    let s = fs::read_to_string(path)?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase());
    parse_config_str(&s, ext.as_deref())
}

/// Parse configuration from a string with optional format hint
#[inline]
fn parse_config_str(s: &str, ext: Option<&str>) -> Result<RawConfigFile, ConfigError> {
    match ext {
        #[cfg(feature = "toml")]
        Some("toml") => toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string())),
        #[cfg(feature = "yaml")]
        Some("yaml" | "yml") => {
            serde_yaml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
        }
        #[cfg(feature = "json")]
        Some("json") => serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string())),
        _ => parse_config_auto(s),
    }
}

/// Try to parse config by attempting each enabled format
#[inline]
fn parse_config_auto(s: &str) -> Result<RawConfigFile, ConfigError> {
    #[cfg(feature = "yaml")]
    if let Ok(cfg) = serde_yaml::from_str(s) {
        return Ok(cfg);
    }

    #[cfg(feature = "toml")]
    if let Ok(cfg) = toml::from_str(s) {
        return Ok(cfg);
    }

    #[cfg(feature = "json")]
    if let Ok(cfg) = serde_json::from_str(s) {
        return Ok(cfg);
    }

    #[cfg(any(feature = "yaml", feature = "toml", feature = "json"))]
    {
        Err(ConfigError::Parse(
            "failed to parse config as any supported format".into(),
        ))
    }

    #[cfg(not(any(feature = "yaml", feature = "toml", feature = "json")))]
    {
        let _ = s; // suppress unused warning
        Err(ConfigError::Parse("no config format enabled".into()))
    }
}

/// Concrete application configuration with defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub logging: LoggingConfig,
    pub queue: QueueConfig,
    pub handler: HandlerConfig,
    pub worker: WorkerConfig,
    pub supervisor: SupervisorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueConfig {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerConfig {
    /// Fail hard on unresolved commands instead of falling back to the
    /// logging-only null task.
    pub run_in_production: bool,
    /// Cache tasks per command class and version and reuse them.
    pub reuse_tasks: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerConfig {
    /// Stop the worker on the first recoverable handler error instead of
    /// requeueing the command.
    pub exit_on_error: bool,
    /// File receiving one durable record per handling error.
    pub error_log_file: String,
    /// Sleep between empty non-blocking pulls in the supervised loop.
    pub idle_poll_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupervisorConfig {
    /// Directory holding one pid file per running worker process.
    pub pid_dir: String,
    /// Filename prefix of the pid files.
    pub pid_prefix: String,
    /// Worker processes to start per `--run` invocation.
    pub workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig {
                level: "info".to_string(),
                json: false,
            },
            queue: QueueConfig {
                name: "relay_commands".to_string(),
            },
            handler: HandlerConfig {
                run_in_production: false,
                reuse_tasks: false,
            },
            worker: WorkerConfig {
                exit_on_error: false,
                error_log_file: "relay-errors.log".to_string(),
                idle_poll_ms: 200,
            },
            supervisor: SupervisorConfig {
                pid_dir: ".".to_string(),
                pid_prefix: "queue_worker_".to_string(),
                workers: 1,
            },
        }
    }
}

#[inline]
fn parse_bool(s: &str) -> Result<bool, ()> {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" => Ok(true),
        "0" | "false" | "no" | "n" => Ok(false),
        _ => Err(()),
    }
}

/// Helper macro to apply optional value if present
macro_rules! apply_opt {
    ($target:expr, $source:expr) => {
        if let Some(v) = $source {
            $target = v;
        }
    };
}

/// Load concrete `Config` from optional file and environment variables.
/// Environment variables take precedence over file values and defaults.
pub fn load_config<P: AsRef<Path>>(path: Option<P>) -> Result<Config, ConfigError> {
    let mut cfg = Config::default();

    // Start with file values if provided
    if let Some(p) = path {
        let raw = load_raw_from_file(p)?;
        if let Some(logging) = raw.logging {
            apply_opt!(cfg.logging.level, logging.level);
            apply_opt!(cfg.logging.json, logging.json);
        }
        if let Some(queue) = raw.queue {
            apply_opt!(cfg.queue.name, queue.name);
        }
        if let Some(handler) = raw.handler {
            apply_opt!(cfg.handler.run_in_production, handler.run_in_production);
            apply_opt!(cfg.handler.reuse_tasks, handler.reuse_tasks);
        }
        if let Some(worker) = raw.worker {
            apply_opt!(cfg.worker.exit_on_error, worker.exit_on_error);
            apply_opt!(cfg.worker.error_log_file, worker.error_log_file);
            apply_opt!(cfg.worker.idle_poll_ms, worker.idle_poll_ms);
        }
        if let Some(supervisor) = raw.supervisor {
            apply_opt!(cfg.supervisor.pid_dir, supervisor.pid_dir);
            apply_opt!(cfg.supervisor.pid_prefix, supervisor.pid_prefix);
            apply_opt!(cfg.supervisor.workers, supervisor.workers);
        }
    }

    // Apply environment variable overrides (env takes precedence)
    apply_env_overrides(&mut cfg)?;

    Ok(cfg)
}

/// Helper to parse env var as a specific type
#[inline]
fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Parse(format!("invalid {}: {}", key, e))),
        Err(_) => Ok(None),
    }
}

/// Helper to parse env var as bool
#[inline]
fn env_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    match env::var(key) {
        Ok(v) => parse_bool(&v)
            .map(Some)
            .map_err(|_| ConfigError::Parse(format!("invalid {}", key))),
        Err(_) => Ok(None),
    }
}

/// Helper to get env var as string
#[inline]
fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

/// Apply all environment variable overrides to config
fn apply_env_overrides(cfg: &mut Config) -> Result<(), ConfigError> {
    // Logging
    if let Some(v) = env_str("RELAY_LOG_LEVEL") {
        cfg.logging.level = v;
    }
    if let Some(v) = env_bool("RELAY_LOG_JSON")? {
        cfg.logging.json = v;
    }

    // Queue
    if let Some(v) = env_str("RELAY_QUEUE_NAME") {
        cfg.queue.name = v;
    }

    // Handler
    if let Some(v) = env_bool("RELAY_HANDLER_RUN_IN_PRODUCTION")? {
        cfg.handler.run_in_production = v;
    }
    if let Some(v) = env_bool("RELAY_HANDLER_REUSE_TASKS")? {
        cfg.handler.reuse_tasks = v;
    }

    // Worker
    if let Some(v) = env_bool("RELAY_WORKER_EXIT_ON_ERROR")? {
        cfg.worker.exit_on_error = v;
    }
    if let Some(v) = env_str("RELAY_WORKER_ERROR_LOG_FILE") {
        cfg.worker.error_log_file = v;
    }
    if let Some(v) = env_parse::<u64>("RELAY_WORKER_IDLE_POLL_MS")? {
        cfg.worker.idle_poll_ms = v;
    }

    // Supervisor
    if let Some(v) = env_str("RELAY_SUPERVISOR_PID_DIR") {
        cfg.supervisor.pid_dir = v;
    }
    if let Some(v) = env_str("RELAY_SUPERVISOR_PID_PREFIX") {
        cfg.supervisor.pid_prefix = v;
    }
    if let Some(v) = env_parse::<usize>("RELAY_SUPERVISOR_WORKERS")? {
        cfg.supervisor.workers = v;
    }

    Ok(())
}

/// Validate higher-level constraints on the resolved configuration.
pub fn validate_config(cfg: &Config) -> Result<(), ConfigError> {
    match cfg.logging.level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        other => {
            // Directive syntax like "relay_worker=debug,info" is handed to
            // the tracing filter as-is; only single-token typos are caught.
            if !other.contains('=') && !other.contains(',') {
                return Err(ConfigError::Validation(format!(
                    "unsupported log level: {}",
                    other
                )));
            }
        }
    }

    if cfg.queue.name.is_empty() {
        return Err(ConfigError::Validation("queue.name must not be empty".into()));
    }

    if cfg.worker.error_log_file.is_empty() {
        return Err(ConfigError::Validation(
            "worker.error_log_file must not be empty".into(),
        ));
    }

    if cfg.supervisor.pid_dir.is_empty() {
        return Err(ConfigError::Validation(
            "supervisor.pid_dir must not be empty".into(),
        ));
    }
    if cfg.supervisor.pid_prefix.is_empty() {
        return Err(ConfigError::Validation(
            "supervisor.pid_prefix must not be empty".into(),
        ));
    }
    if cfg.supervisor.workers == 0 {
        return Err(ConfigError::Validation(
            "supervisor.workers must be at least 1".into(),
        ));
    }

    Ok(())
}
