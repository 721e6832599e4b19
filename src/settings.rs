//! File configuration read from `pageforge.toml` in the working directory.
//!
//! Every key is optional; a missing file means all defaults.
//!
//! ```toml
//! [project]
//! claude_cmd = "claude"
//! output_dir = "output"
//!
//! [defaults]
//! theme = "minimal"
//! sections = ["hero", "features", "pricing", "footer"]
//! include_forms = false
//!
//! [agent]
//! timeout_secs = 300
//! max_retries = 1
//! skip_permissions = true
//!
//! [rates]
//! input_per_million = 3.0
//! output_per_million = 15.0
//! ```

use crate::usage::{DEFAULT_INPUT_RATE, DEFAULT_OUTPUT_RATE, Rates};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_FILE: &str = "pageforge.toml";

/// Where projects live and how the agent is launched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectSection {
    /// Claude CLI command (default: "claude")
    #[serde(default)]
    pub claude_cmd: Option<String>,
    /// Base name of project directories (default: "output")
    #[serde(default)]
    pub output_dir: Option<String>,
}

/// Defaults for new pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultsSection {
    #[serde(default = "default_theme")]
    pub theme: String,
    /// Sections requested for a fast-mode page
    #[serde(default = "default_sections")]
    pub sections: Vec<String>,
    #[serde(default)]
    pub include_forms: bool,
}

fn default_theme() -> String {
    "minimal".to_string()
}

fn default_sections() -> Vec<String> {
    ["hero", "features", "pricing", "footer"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            theme: default_theme(),
            sections: default_sections(),
            include_forms: false,
        }
    }
}

/// Agent invocation limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSection {
    /// Deadline for one agent call, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Extra attempts after a rejected response
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Pass `--dangerously-skip-permissions` to the CLI
    #[serde(default = "default_skip_permissions")]
    pub skip_permissions: bool,
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    1
}

fn default_skip_permissions() -> bool {
    true
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            skip_permissions: default_skip_permissions(),
        }
    }
}

/// Pricing used when the agent does not report a cost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatesSection {
    #[serde(default = "default_input_rate")]
    pub input_per_million: f64,
    #[serde(default = "default_output_rate")]
    pub output_per_million: f64,
}

fn default_input_rate() -> f64 {
    DEFAULT_INPUT_RATE
}

fn default_output_rate() -> f64 {
    DEFAULT_OUTPUT_RATE
}

impl Default for RatesSection {
    fn default() -> Self {
        Self {
            input_per_million: DEFAULT_INPUT_RATE,
            output_per_million: DEFAULT_OUTPUT_RATE,
        }
    }
}

impl From<RatesSection> for Rates {
    fn from(section: RatesSection) -> Self {
        Rates {
            input_per_million: section.input_per_million,
            output_per_million: section.output_per_million,
        }
    }
}

/// Parsed `pageforge.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageforgeToml {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub defaults: DefaultsSection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub rates: RatesSection,
}

impl PageforgeToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse pageforge.toml")
    }

    /// Load `pageforge.toml` from `dir`, or defaults when it does not exist.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize pageforge.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Return any warnings about suspicious values.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.agent.timeout_secs == 0 {
            warnings.push("agent.timeout_secs is 0: every agent call will time out".to_string());
        }
        if self.agent.max_retries > 5 {
            warnings.push(format!(
                "agent.max_retries is {}: each retry is a full agent call",
                self.agent.max_retries
            ));
        }
        for (name, rate) in [
            ("rates.input_per_million", self.rates.input_per_million),
            ("rates.output_per_million", self.rates.output_per_million),
        ] {
            if !rate.is_finite() || rate < 0.0 {
                warnings.push(format!("{} must be a non-negative number, got {}", name, rate));
            }
        }
        if self.defaults.sections.is_empty() {
            warnings.push("defaults.sections is empty".to_string());
        }
        for section in &self.defaults.sections {
            if section.is_empty()
                || !section
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                warnings.push(format!(
                    "defaults.sections entry '{}' is not a valid section name",
                    section
                ));
            }
        }
        if let Some(dir) = &self.project.output_dir
            && (dir.is_empty() || dir.contains(['/', '\\']))
        {
            warnings.push(format!(
                "project.output_dir '{}' should be a plain directory name",
                dir
            ));
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_empty() {
        let config = PageforgeToml::parse("").unwrap();
        assert_eq!(config, PageforgeToml::default());
        assert_eq!(config.agent.timeout_secs, 300);
        assert_eq!(config.agent.max_retries, 1);
        assert!(config.agent.skip_permissions);
        assert_eq!(config.defaults.theme, "minimal");
        assert_eq!(config.rates.input_per_million, 3.0);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_parse_partial_tables() {
        let config = PageforgeToml::parse(
            r#"
[project]
claude_cmd = "/opt/claude"

[agent]
timeout_secs = 60

[rates]
output_per_million = 75.0
"#,
        )
        .unwrap();
        assert_eq!(config.project.claude_cmd.as_deref(), Some("/opt/claude"));
        assert_eq!(config.project.output_dir, None);
        assert_eq!(config.agent.timeout_secs, 60);
        assert_eq!(config.agent.max_retries, 1);
        assert_eq!(config.rates.input_per_million, 3.0);
        assert_eq!(Rates::from(config.rates).output_per_million, 75.0);
    }

    #[test]
    fn test_parse_rejects_bad_types() {
        assert!(PageforgeToml::parse("[agent]\ntimeout_secs = \"soon\"").is_err());
    }

    #[test]
    fn test_validate_warnings() {
        let config = PageforgeToml::parse(
            r#"
[project]
output_dir = "sites/out"

[defaults]
sections = ["hero", "bad name"]

[agent]
timeout_secs = 0
"#,
        )
        .unwrap();
        let warnings = config.validate();
        assert_eq!(warnings.len(), 3, "{:?}", warnings);
        assert!(warnings.iter().any(|w| w.contains("timeout_secs")));
        assert!(warnings.iter().any(|w| w.contains("bad name")));
        assert!(warnings.iter().any(|w| w.contains("output_dir")));
    }

    #[test]
    fn test_load_or_default_and_save() {
        let dir = tempdir().unwrap();
        assert_eq!(
            PageforgeToml::load_or_default(dir.path()).unwrap(),
            PageforgeToml::default()
        );

        let mut config = PageforgeToml::default();
        config.defaults.theme = "brutalist".to_string();
        config.save(&dir.path().join(CONFIG_FILE)).unwrap();

        let loaded = PageforgeToml::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded.defaults.theme, "brutalist");
    }
}
