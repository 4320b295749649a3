use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ConfigError;

const DEFAULT_MODEL: &str = "llama3.2";
const DEFAULT_BASE_URL: &str = "http://localhost";
const DEFAULT_PORT: &str = "11434";
const DEFAULT_API_VERSION: &str = "v1";

// ── Backend process section ───────────────────────────────────────────────────

/// How to probe for, and if needed launch, the local model server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct BackendSection {
    /// Command + args used to start the server when it is not reachable
    pub command: Vec<String>,
    /// Timeout of the liveness probe request
    pub probe_timeout_secs: u64,
    /// How long to wait for a freshly launched server to answer the probe
    pub startup_timeout_secs: u64,
    /// Delay between probes while waiting for startup
    pub poll_interval_ms: u64,
    /// Terminate a server we launched when termpilot exits
    pub stop_on_exit: bool,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            command: vec!["ollama".to_string(), "serve".to_string()],
            probe_timeout_secs: 5,
            startup_timeout_secs: 10,
            poll_interval_ms: 1000,
            stop_on_exit: true,
        }
    }
}

// ── Config file ───────────────────────────────────────────────────────────────

/// Contents of `~/.termpilot.yaml`. Every key is optional.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct ConfigFile {
    pub model: Option<String>,
    pub base_url: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub port: Option<String>,
    pub version: Option<String>,
    /// SQLite database file
    pub database: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub backend: BackendSection,
}

impl ConfigFile {
    /// Load from an explicit path (which must exist) or from the default
    /// location (which may be absent).
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::read(path),
            None => {
                let path = default_config_path()?;
                if !path.exists() {
                    return Ok(Self::default());
                }
                Self::read(&path)
            }
        }
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        // An empty file parses as YAML null
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Accept `port: 8080` as well as `port: "8080"`.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    }))
}

// ── Overrides from CLI / environment ──────────────────────────────────────────

/// Values given on the command line or through `TERMPILOT_*` variables.
/// clap already applies flag-over-env precedence before these reach us.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub port: Option<String>,
    pub version: Option<String>,
    pub database: Option<PathBuf>,
}

// ── Resolved runtime config ───────────────────────────────────────────────────

/// Everything the backend client needs to reach the server.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    pub base_url: String,
    pub port: String,
    pub version: String,
    pub model: String,
    pub command: Vec<String>,
    pub probe_timeout: Duration,
    pub startup_timeout: Duration,
    pub poll_interval: Duration,
    pub stop_on_exit: bool,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub backend: BackendConfig,
    pub database: PathBuf,
    pub log_file: PathBuf,
}

impl ResolvedConfig {
    /// Merge the config file with CLI/env overrides.
    /// Priority: CLI args > env vars (handled by clap) > config file > built-in defaults
    pub fn resolve(file: &ConfigFile, overrides: &Overrides, data_dir: PathBuf) -> Self {
        fn pick(over: &Option<String>, file: &Option<String>, default: &str) -> String {
            over.clone()
                .or_else(|| file.clone())
                .unwrap_or_else(|| default.to_string())
        }

        let section = &file.backend;
        let backend = BackendConfig {
            base_url: pick(&overrides.base_url, &file.base_url, DEFAULT_BASE_URL),
            port: pick(&overrides.port, &file.port, DEFAULT_PORT),
            version: pick(&overrides.version, &file.version, DEFAULT_API_VERSION),
            model: pick(&overrides.model, &file.model, DEFAULT_MODEL),
            command: section.command.clone(),
            probe_timeout: Duration::from_secs(section.probe_timeout_secs),
            startup_timeout: Duration::from_secs(section.startup_timeout_secs),
            poll_interval: Duration::from_millis(section.poll_interval_ms.max(1)),
            stop_on_exit: section.stop_on_exit,
        };

        Self {
            backend,
            database: overrides
                .database
                .clone()
                .or_else(|| file.database.clone())
                .unwrap_or_else(|| data_dir.join("conversations.db")),
            log_file: file
                .log_file
                .clone()
                .unwrap_or_else(|| data_dir.join("termpilot.log")),
        }
    }
}

// ── Paths ─────────────────────────────────────────────────────────────────────

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    std::env::var("HOME")
        .ok()
        .filter(|h| !h.is_empty())
        .map(|h| PathBuf::from(h).join(".termpilot.yaml"))
        .ok_or(ConfigError::NoHomeDir)
}

/// XDG_DATA_HOME/termpilot, or ~/.local/share/termpilot.
pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .ok()
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            std::env::var("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(".local/share")
        })
        .join("termpilot")
}
