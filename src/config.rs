//! TOML configuration parsing and validation.
//!
//! The configuration is loaded once at startup and shared as an
//! `Arc<Config>`. Keys follow the documented camelCase names:
//!
//! ```toml
//! dataDir = "./data"
//! gitUrl = "https://github.com/acme/docs"
//! gitRef = "main"
//! autoUpdateInterval = 30
//! ignorePatterns = ["*.tmp", "drafts/**"]
//!
//! [tool]
//! name = "search_docs"
//! description = "Search the Acme documentation"
//! ```
//!
//! The provisioning engine never sees this struct directly; it works on the
//! narrower [`ProvisioningConfig`] produced by [`Config::provisioning`].

use anyhow::{bail, Context, Result};
use globset::Glob;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub include_dir: Option<PathBuf>,
    #[serde(default)]
    pub git_url: Option<String>,
    #[serde(default = "default_git_ref")]
    pub git_ref: String,
    #[serde(default)]
    pub auto_update_interval: u64,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    #[serde(default)]
    pub tool: ToolConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ToolConfig {
    #[serde(default = "default_tool_name")]
    pub name: String,
    #[serde(default = "default_tool_description")]
    pub description: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            name: default_tool_name(),
            description: default_tool_description(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_git_ref() -> String {
    "main".to_string()
}
fn default_shutdown_grace_secs() -> u64 {
    10
}
fn default_tool_name() -> String {
    "search_docs".to_string()
}
fn default_tool_description() -> String {
    "Search the documentation with a natural-language query.".to_string()
}

/// Where the documentation snapshot comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// Nothing to provision; the data directory stays empty.
    None,
    /// Copy files from a local directory.
    StaticDir { path: PathBuf },
    /// Download or clone a remote git repository.
    Repository { url: String, git_ref: String },
}

/// Immutable view of the configuration consumed by the provisioning engine.
#[derive(Debug, Clone)]
pub struct ProvisioningConfig {
    pub target_dir: PathBuf,
    pub source: SourceKind,
    pub ignore_patterns: Vec<String>,
    /// Zero disables the update scheduler.
    pub refresh_interval_minutes: u64,
}

impl ProvisioningConfig {
    pub fn refresh_interval(&self) -> Option<Duration> {
        match self.refresh_interval_minutes {
            0 => None,
            minutes => Some(Duration::from_secs(minutes * 60)),
        }
    }
}

impl Config {
    pub fn provisioning(&self) -> ProvisioningConfig {
        let source = match (&self.git_url, &self.include_dir) {
            (Some(url), _) => SourceKind::Repository {
                url: url.clone(),
                git_ref: self.git_ref.clone(),
            },
            (None, Some(path)) => SourceKind::StaticDir { path: path.clone() },
            (None, None) => SourceKind::None,
        };

        ProvisioningConfig {
            target_dir: self.data_dir.clone(),
            source,
            ignore_patterns: self.ignore_patterns.clone(),
            refresh_interval_minutes: self.auto_update_interval,
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Read, parse and validate a configuration file.
///
/// Relative `dataDir` and `includeDir` are resolved against the directory
/// containing the file, so a config works regardless of the caller's cwd.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = parse_config(&content)?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    config.data_dir = resolve(base, &config.data_dir);
    config.include_dir = config.include_dir.as_deref().map(|dir| resolve(base, dir));

    Ok(config)
}

/// Parse and validate configuration text without touching the filesystem.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if let Some(url) = &config.git_url {
        if url.trim().is_empty() {
            bail!("gitUrl must not be empty");
        }
        if config.git_ref.trim().is_empty() {
            bail!("gitRef must not be empty");
        }
        if config.include_dir.is_some() {
            tracing::warn!("both gitUrl and includeDir are set; includeDir is ignored");
        }
    }

    if config.tool.name.trim().is_empty() {
        bail!("tool.name must not be empty");
    }

    for pattern in &config.ignore_patterns {
        Glob::new(pattern).with_context(|| format!("Invalid ignore pattern: '{}'", pattern))?;
    }

    Ok(config)
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
