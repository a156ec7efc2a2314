//! Engine and CLI configuration.
//!
//! Layering: built-in defaults, then the TOML file, then `REPOSCOPE_*`
//! environment variables. Environment errors are collected and reported
//! together.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::errors::ScopeError;

/// Largest page the catalog endpoint will serve.
pub const MAX_PAGE_SIZE: usize = 500;
/// Default catalog freshness window.
pub const DEFAULT_CACHE_TTL_MS: u64 = 300_000;

const ENV_PREFIX: &str = "REPOSCOPE_";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tree: TreeLabels,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Projects requested per catalog page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Cached snapshots older than this are refetched.
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,
    /// Upper bound on pages per fetch.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    /// Persist the catalog cache to this JSON file. In-memory when unset.
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
}

impl CatalogConfig {
    /// Page size clamped to what the catalog endpoint accepts.
    pub fn effective_page_size(&self) -> usize {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            ttl_ms: default_ttl_ms(),
            max_pages: default_max_pages(),
            cache_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bitbucket base URL, e.g. `https://bitbucket.example.com`.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Personal access token sent as a bearer token.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Display labels for the non-leaf tree nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeLabels {
    #[serde(default = "default_all_label")]
    pub all: String,
    #[serde(default = "default_org_label")]
    pub org_group: String,
    #[serde(default = "default_personal_label")]
    pub personal_group: String,
}

impl Default for TreeLabels {
    fn default() -> Self {
        Self {
            all: default_all_label(),
            org_group: default_org_label(),
            personal_group: default_personal_label(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_page_size() -> usize {
    200
}

fn default_ttl_ms() -> u64 {
    DEFAULT_CACHE_TTL_MS
}

fn default_max_pages() -> usize {
    1000
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_all_label() -> String {
    "All repositories (current and future)".to_string()
}

fn default_org_label() -> String {
    "All project repositories".to_string()
}

fn default_personal_label() -> String {
    "All personal repositories".to_string()
}

impl ScopeConfig {
    /// Default config file location (`~/.config/reposcope/config.toml` on Linux).
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "reposcope", "reposcope")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Parse a TOML document.
    pub fn from_toml(raw: &str, origin: &Path) -> Result<Self, ScopeError> {
        toml::from_str(raw).map_err(|e| ScopeError::ConfigParse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load `path` (or the default location) and apply the environment.
    ///
    /// A missing file at the default location is not an error; a missing
    /// file that was asked for explicitly is.
    pub fn load(path: Option<&Path>) -> Result<Self, ScopeError> {
        let (path, explicit) = match path {
            Some(p) => (Some(p.to_path_buf()), true),
            None => (Self::default_path(), false),
        };

        let mut config = match path {
            Some(ref p) if p.exists() || explicit => {
                let raw = std::fs::read_to_string(p).map_err(|e| ScopeError::ConfigRead {
                    path: p.clone(),
                    message: e.to_string(),
                })?;
                debug!("Loaded config from {:?}", p);
                Self::from_toml(&raw, p)?
            }
            _ => Self::default(),
        };

        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Overlay `REPOSCOPE_*` variables supplied by `lookup`.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ScopeError> {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let mut errors = Vec::new();

        if let Some(url) = var("BASE_URL") {
            self.server.base_url = Some(url);
        }
        if let Some(token) = var("TOKEN") {
            self.server.token = Some(token);
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.general.log_level = level;
        }
        if let Some(raw) = var("PAGE_SIZE") {
            match raw.trim().parse::<usize>() {
                Ok(n) if (1..=MAX_PAGE_SIZE).contains(&n) => self.catalog.page_size = n,
                _ => errors.push(format!(
                    "{ENV_PREFIX}PAGE_SIZE: expected 1..={MAX_PAGE_SIZE}, got '{raw}'"
                )),
            }
        }
        if let Some(raw) = var("CACHE_TTL_MS") {
            match raw.trim().parse::<u64>() {
                Ok(n) => self.catalog.ttl_ms = n,
                Err(_) => errors.push(format!(
                    "{ENV_PREFIX}CACHE_TTL_MS: expected milliseconds, got '{raw}'"
                )),
            }
        }
        if let Some(raw) = var("CACHE_PATH") {
            self.catalog.cache_path = Some(PathBuf::from(raw));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ScopeError::ConfigEnv {
                message: errors.join("; "),
            })
        }
    }
}
