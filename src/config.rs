//! Runtime configuration
//!
//! Values come from (lowest to highest precedence) the built-in defaults, an
//! optional TOML file and the environment. Author identity is read from the
//! same `GIT_AUTHOR_*` variables git uses.

use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_BRANCH: &str = "master";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub author_name: String,
    pub author_email: String,
    pub default_branch: String,
    pub agent: String,
    /// Maximum number of symbolic hops followed when resolving a reference.
    pub max_ref_depth: usize,
    /// Maximum nesting of trees walked before the data is treated as corrupt.
    pub max_tree_depth: usize,
    /// Encrypt vault contents at rest.
    pub encrypt: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            author_name: "vaults".to_string(),
            author_email: "vaults@localhost".to_string(),
            default_branch: DEFAULT_BRANCH.to_string(),
            agent: format!("bit-vaults/{}", env!("CARGO_PKG_VERSION")),
            max_ref_depth: 10,
            max_tree_depth: 256,
            encrypt: true,
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Config::default(),
        };

        Ok(config.with_env_overrides())
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Unable to read config file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(name) = std::env::var("GIT_AUTHOR_NAME") {
            self.author_name = name;
        }
        if let Ok(email) = std::env::var("GIT_AUTHOR_EMAIL") {
            self.author_email = email;
        }
        if let Ok(agent) = std::env::var("BIT_VAULTS_AGENT") {
            self.agent = agent;
        }
        self
    }
}
