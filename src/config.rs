use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::settings::PageforgeToml;
use crate::usage::Rates;

/// Values given on the command line. They win over the environment and the
/// config file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub claude_cmd: Option<String>,
    pub timeout_secs: Option<u64>,
    pub theme: Option<String>,
    pub output_dir: Option<String>,
    pub verbose: bool,
}

/// Runtime configuration for pageforge.
///
/// Resolved once per invocation from `pageforge.toml`, then `PAGEFORGE_*`
/// environment variables, then CLI flags.
#[derive(Debug, Clone)]
pub struct Config {
    /// Working directory; holds `pageforge.toml` and the project directories
    pub project_dir: PathBuf,
    pub claude_cmd: String,
    pub skip_permissions: bool,
    /// Deadline for a single agent call
    pub timeout: Duration,
    pub max_retries: u32,
    pub rates: Rates,
    /// Base name for new project directories
    pub output_dir: String,
    pub default_theme: String,
    pub default_sections: Vec<String>,
    pub include_forms: bool,
    pub verbose: bool,
}

impl Config {
    /// Load `pageforge.toml` from `project_dir` and layer the process
    /// environment and `overrides` on top.
    pub fn new(project_dir: PathBuf, overrides: &CliOverrides) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let toml = PageforgeToml::load_or_default(&project_dir)?;

        Self::resolve(project_dir, &toml, overrides, |key| std::env::var(key).ok())
    }

    /// Layer `env` and `overrides` over the file values.
    pub fn resolve(
        project_dir: PathBuf,
        toml: &PageforgeToml,
        overrides: &CliOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let claude_cmd = overrides
            .claude_cmd
            .clone()
            .or_else(|| env("PAGEFORGE_CLAUDE_CMD"))
            .or_else(|| toml.project.claude_cmd.clone())
            .unwrap_or_else(|| "claude".to_string());

        let timeout_secs = match overrides.timeout_secs {
            Some(secs) => secs,
            None => match env("PAGEFORGE_TIMEOUT_SECS") {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .with_context(|| format!("PAGEFORGE_TIMEOUT_SECS is not a number: {}", raw))?,
                None => toml.agent.timeout_secs,
            },
        };
        if timeout_secs == 0 {
            bail!("Agent timeout must be at least one second");
        }

        let default_theme = overrides
            .theme
            .clone()
            .or_else(|| env("PAGEFORGE_DEFAULT_THEME"))
            .unwrap_or_else(|| toml.defaults.theme.clone());

        let output_dir = overrides
            .output_dir
            .clone()
            .or_else(|| env("PAGEFORGE_OUTPUT_DIR"))
            .or_else(|| toml.project.output_dir.clone())
            .unwrap_or_else(|| "output".to_string());

        Ok(Self {
            project_dir,
            claude_cmd,
            skip_permissions: toml.agent.skip_permissions,
            timeout: Duration::from_secs(timeout_secs),
            max_retries: toml.agent.max_retries,
            rates: toml.rates.into(),
            output_dir,
            default_theme,
            default_sections: toml.defaults.sections.clone(),
            include_forms: toml.defaults.include_forms,
            verbose: overrides.verbose,
        })
    }

    /// Resolve a project directory argument relative to the working directory.
    pub fn project_path(&self, project: &Path) -> PathBuf {
        if project.is_absolute() {
            project.to_path_buf()
        } else {
            self.project_dir.join(project)
        }
    }
}
