//! Per-invocation state shared by every command: home directory, loaded
//! config and the collaborators built from it.

use std::path::PathBuf;

use anyhow::{Context, Result};

use galley_core::{config, Config, IgnoreRules};
use galley_remote::HttpRemote;
use galley_tools::ToolLauncher;

pub struct AppContext {
    pub home: PathBuf,
    pub config: Config,
    pub ignore: IgnoreRules,
}

impl AppContext {
    pub fn load() -> Result<Self> {
        let home = config::home()?;
        let config = config::load_at(&home)
            .context("failed to load galley config")?
            .with_env_overrides();
        let ignore = config.ignore_rules()?;
        tracing::debug!(home = %home.display(), "loaded configuration");
        Ok(Self {
            home,
            config,
            ignore,
        })
    }

    pub fn remote(&self) -> Result<HttpRemote> {
        let url = self.config.require_remote_url(&self.home)?;
        let remote = HttpRemote::new(url, self.config.token.clone(), self.ignore.clone())
            .with_context(|| format!("invalid remote_url '{url}'"))?;
        Ok(remote)
    }

    pub fn launcher(&self) -> Result<ToolLauncher> {
        ToolLauncher::new(&self.config.merge_tool, &self.config.diff_tool)
            .context("invalid merge_tool or diff_tool template")
    }

    pub fn merge_dir(&self) -> PathBuf {
        self.config.merge_dir_at(&self.home)
    }

    pub fn diff_dir(&self) -> PathBuf {
        self.config.diff_dir_at(&self.home)
    }
}
