//! Configuration view and validation commands: `pageforge config`.

use anyhow::Result;
use std::path::Path;

use pageforge::config::{CliOverrides, Config};
use pageforge::settings::{CONFIG_FILE, PageforgeToml};

use super::super::ConfigCommands;

fn print_toml(toml: &PageforgeToml) {
    println!("[project]");
    if let Some(cmd) = &toml.project.claude_cmd {
        println!("  claude_cmd = \"{}\"", cmd);
    }
    if let Some(dir) = &toml.project.output_dir {
        println!("  output_dir = \"{}\"", dir);
    }
    println!();

    println!("[defaults]");
    println!("  theme = \"{}\"", toml.defaults.theme);
    println!("  sections = {:?}", toml.defaults.sections);
    println!("  include_forms = {}", toml.defaults.include_forms);
    println!();

    println!("[agent]");
    println!("  timeout_secs = {}", toml.agent.timeout_secs);
    println!("  max_retries = {}", toml.agent.max_retries);
    println!("  skip_permissions = {}", toml.agent.skip_permissions);
    println!();

    println!("[rates]");
    println!("  input_per_million = {}", toml.rates.input_per_million);
    println!("  output_per_million = {}", toml.rates.output_per_million);
    println!();
}

pub fn cmd_config(project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = project_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Pageforge Configuration");
            println!("=======================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
                println!();
                print_toml(&PageforgeToml::load(&config_path)?);
            } else {
                println!("No {} found at {}", CONFIG_FILE, config_path.display());
                println!();
                println!("Using default configuration:");
                print_toml(&PageforgeToml::default());
                println!("Run 'pageforge config init' to create one.");
                println!();
            }

            // Effective values include PAGEFORGE_* overrides
            let config = Config::new(project_dir.to_path_buf(), &CliOverrides::default())?;
            println!("Effective values (with env overrides):");
            println!("  claude_cmd = \"{}\"", config.claude_cmd);
            println!("  output_dir = \"{}\"", config.output_dir);
            println!("  theme = \"{}\"", config.default_theme);
            println!("  timeout_secs = {}", config.timeout.as_secs());
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No {} found. Using defaults (valid).", CONFIG_FILE);
                return Ok(());
            }

            let toml = PageforgeToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("{} already exists at {}", CONFIG_FILE, config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            PageforgeToml::default().save(&config_path)?;

            println!("Created {} at {}", CONFIG_FILE, config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [project] claude_cmd, output_dir");
            println!("  - [defaults] theme, sections, include_forms");
            println!("  - [agent] timeout_secs, max_retries");
            println!();
        }
    }

    Ok(())
}
