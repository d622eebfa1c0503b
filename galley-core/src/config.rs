//! User configuration at `~/.galley/config.yaml`.
//!
//! # API pattern
//!
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - [`home`]: the current user's home from `dirs::home_dir()`, passed to
//!   the `_at` functions by the CLI
//!
//! A missing config file is not an error: defaults are returned.

use std::path::{Path, PathBuf};

use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};

pub const REMOTE_URL_ENV: &str = "GALLEY_REMOTE_URL";
pub const TOKEN_ENV: &str = "GALLEY_TOKEN";

/// Name of the per-recipe metadata directory; always ignored.
pub const META_DIR: &str = ".galley";

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// On-disk configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the remote recipe store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    /// Bearer token sent with every remote request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Tera template for the external merge tool (`left`, `base`, `right`, `merge`).
    #[serde(default = "default_merge_tool")]
    pub merge_tool: String,
    /// Tera template for the external diff tool (`local`, `remote`).
    #[serde(default = "default_diff_tool")]
    pub diff_tool: String,
    /// Root of kitchen-merge staging directories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_dir: Option<PathBuf>,
    /// Scratch directory for `file-diff` remote copies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_dir: Option<PathBuf>,
    /// Glob patterns matched against single file or directory names.
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,
    /// Poll period for `watch-servings`.
    #[serde(default = "default_watch_interval")]
    pub watch_interval_secs: u64,
}

fn default_merge_tool() -> String {
    "git merge-file -p {{left}} {{base}} {{right}} > {{merge}}".to_string()
}

fn default_diff_tool() -> String {
    "diff -u {{local}} {{remote}}".to_string()
}

fn default_ignore() -> Vec<String> {
    vec![
        META_DIR.to_string(),
        ".DS_Store".to_string(),
        "*.pyc".to_string(),
        "__pycache__".to_string(),
    ]
}

fn default_watch_interval() -> u64 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote_url: None,
            token: None,
            merge_tool: default_merge_tool(),
            diff_tool: default_diff_tool(),
            merge_dir: None,
            diff_dir: None,
            ignore: default_ignore(),
            watch_interval_secs: default_watch_interval(),
        }
    }
}

impl Config {
    /// Staging root for kitchen merges.
    pub fn merge_dir_at(&self, home: &Path) -> PathBuf {
        self.merge_dir
            .clone()
            .unwrap_or_else(|| galley_root(home).join("merge"))
    }

    /// Scratch root for `file-diff`.
    pub fn diff_dir_at(&self, home: &Path) -> PathBuf {
        self.diff_dir
            .clone()
            .unwrap_or_else(|| galley_root(home).join("diff"))
    }

    /// The configured remote URL, or [`ConfigError::MissingRemote`].
    pub fn require_remote_url(&self, home: &Path) -> Result<&str, ConfigError> {
        self.remote_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRemote {
                path: config_path_at(home),
            })
    }

    /// Compile the ignore patterns; the metadata directory is always included.
    pub fn ignore_rules(&self) -> Result<IgnoreRules, ConfigError> {
        IgnoreRules::new(&self.ignore)
    }

    /// Apply `GALLEY_REMOTE_URL` / `GALLEY_TOKEN` when set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(REMOTE_URL_ENV) {
            if !url.is_empty() {
                self.remote_url = Some(url);
            }
        }
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.is_empty() {
                self.token = Some(token);
            }
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Ignore rules
// ---------------------------------------------------------------------------

/// Compiled ignore patterns.
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    patterns: Vec<Pattern>,
}

impl IgnoreRules {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ConfigError> {
        let mut compiled = vec![Pattern::new(META_DIR).map_err(|source| {
            ConfigError::InvalidIgnorePattern {
                pattern: META_DIR.to_string(),
                source,
            }
        })?];
        for pattern in patterns {
            let pattern = pattern.as_ref();
            compiled.push(Pattern::new(pattern).map_err(|source| {
                ConfigError::InvalidIgnorePattern {
                    pattern: pattern.to_string(),
                    source,
                }
            })?);
        }
        Ok(Self { patterns: compiled })
    }

    /// True when a single file or directory name should be skipped.
    pub fn ignores(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(name))
    }

    /// True when any segment of a `/`-separated path is ignored.
    pub fn ignores_path(&self, path: &str) -> bool {
        path.split('/').any(|segment| self.ignores(segment))
    }
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self {
            patterns: default_ignore()
                .iter()
                .filter_map(|p| Pattern::new(p).ok())
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// `<home>/.galley/`
pub fn galley_root(home: &Path) -> PathBuf {
    home.join(META_DIR)
}

/// `<home>/.galley/config.yaml`
pub fn config_path_at(home: &Path) -> PathBuf {
    galley_root(home).join("config.yaml")
}

pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Load the config file under `home`, returning defaults when absent.
pub fn load_at(home: &Path) -> Result<Config, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })
}

/// Atomically save the config: `.yaml.tmp` sibling, then rename.
pub fn save_at(home: &Path, config: &Config) -> Result<(), ConfigError> {
    let dir = galley_root(home);
    std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    let path = config_path_at(home);
    let tmp = path.with_extension("yaml.tmp");
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

// The file may carry a token.
#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
