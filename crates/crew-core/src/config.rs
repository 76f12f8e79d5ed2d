//! Configuration parsing
//!
//! Parses `crew.toml`. Every section is optional; a missing file yields the
//! built-in defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::constants;
use crate::registry::SpecialistTemplate;

/// Top-level configuration from `crew.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CrewConfig {
    pub tools: ToolsConfig,
    pub interaction: InteractionConfig,
    pub agent: AgentRuntimeConfig,
    /// Additional specialist templates; a template with the same type name as
    /// a built-in replaces it.
    pub specialists: Vec<SpecialistTemplate>,
}

/// `[tools]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub timeout_secs: u64,
    /// Allow a whitelist pattern to match any tool name containing it.
    pub substring_fallback: bool,
    pub default_exclusions: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: constants::tools::DEFAULT_TIMEOUT.as_secs(),
            substring_fallback: true,
            default_exclusions: constants::tools::DEFAULT_EXCLUSIONS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl ToolsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `[interaction]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    pub default_timeout_secs: u64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: constants::interaction::DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

impl InteractionConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

/// `[agent]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentRuntimeConfig {
    pub max_iterations: usize,
}

impl Default for AgentRuntimeConfig {
    fn default() -> Self {
        Self {
            max_iterations: constants::agent::MAX_ITERATIONS,
        }
    }
}

impl CrewConfig {
    /// Load config from a TOML file. A missing file is not an error.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {:?}", path))?;

        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse {:?}", path))?;

        tracing::info!(
            "Loaded config with {} specialist templates from {:?}",
            config.specialists.len(),
            path
        );

        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
