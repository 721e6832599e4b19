use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use pageforge::errors::PipelineError;

mod cmd;

#[derive(Parser)]
#[command(name = "pageforge")]
#[command(version, about = "Section-addressable landing page generator driven by the Claude CLI")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Working directory holding pageforge.toml and the generated projects
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Project directory to operate on (defaults to the newest project)
    #[arg(short, long, global = true)]
    pub project: Option<PathBuf>,

    /// Claude CLI command. Overrides pageforge.toml and PAGEFORGE_CLAUDE_CMD.
    #[arg(long, global = true)]
    pub claude_cmd: Option<String>,

    /// Per-call agent timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Base name for new project directories
    #[arg(long, global = true)]
    pub output_dir: Option<String>,

    /// Append log events to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Answer agent calls from a JSON replay file instead of the Claude CLI
    #[arg(long, global = true, hide = true)]
    pub replay: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a new landing page from a product description
    Gen {
        /// Product description
        description: String,
        /// Single landing-page pass instead of the full design pipeline
        #[arg(long)]
        fast: bool,
        /// Visual theme (defaults to pageforge.toml / PAGEFORGE_DEFAULT_THEME)
        #[arg(long)]
        theme: Option<String>,
        /// Include lead-capture forms
        #[arg(long)]
        forms: bool,
        /// Target framework for the page markup
        #[arg(long, default_value = "html")]
        framework: String,
        /// Reference site URLs (repeatable)
        #[arg(long = "reference")]
        references: Vec<String>,
    },
    /// Regenerate one or more sections in place
    Regen {
        /// Section names (comma-separated or repeated)
        #[arg(required = true, value_delimiter = ',')]
        sections: Vec<String>,
        /// Extra guidance for the new content
        #[arg(short, long)]
        context: Option<String>,
    },
    /// Apply a free-form edit instruction
    Edit {
        instruction: String,
        /// Limit the edit to these sections (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        sections: Option<Vec<String>>,
    },
    /// Re-run the visual phases under a new theme
    Theme { theme: String },
    /// Add, remove or reconfigure lead-capture forms
    Form {
        #[command(subcommand)]
        command: FormCommands,
    },
    /// List the sections of a project
    Sections,
    /// Show the operation history of a project
    History {
        /// Show at most this many operations, newest first
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Show token usage and estimated cost
    Usage {
        /// Aggregate across every project in the working directory
        #[arg(long)]
        all: bool,
        /// Only count this kind of operation
        #[arg(long)]
        kind: Option<String>,
        /// Only count operations from the last N days
        #[arg(long)]
        days: Option<i64>,
    },
    /// List generated projects
    Projects,
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum FormCommands {
    /// Add forms that fit the page
    Add,
    /// Remove every form
    Remove,
    /// Replace forms with a configured one
    Edit {
        /// contact, newsletter, signup or custom
        #[arg(long = "type", default_value = "contact")]
        form_type: String,
        /// Fields (comma-separated); defaults to the type's fields
        #[arg(long)]
        fields: Option<String>,
        /// inline, modal, sidebar or fullpage
        #[arg(long)]
        style: Option<String>,
        /// Call-to-action label
        #[arg(long)]
        cta: Option<String>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default pageforge.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = pageforge::logging::init_logging(cli.verbose, cli.log_file.as_deref())?;

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let result = match &cli.command {
        Commands::Gen {
            description,
            fast,
            theme,
            forms,
            framework,
            references,
        } => {
            let options = cmd::GenOptions {
                description: description.clone(),
                fast: *fast,
                theme: theme.clone(),
                forms: *forms,
                framework: framework.clone(),
                references: references.clone(),
            };
            cmd::cmd_gen(&cli, &project_dir, options, cancel).await
        }
        Commands::Regen { sections, context } => {
            cmd::cmd_regen(&cli, &project_dir, sections, context.as_deref(), cancel).await
        }
        Commands::Edit {
            instruction,
            sections,
        } => cmd::cmd_edit(&cli, &project_dir, instruction, sections.as_deref(), cancel).await,
        Commands::Theme { theme } => cmd::cmd_theme(&cli, &project_dir, theme, cancel).await,
        Commands::Form { command } => {
            cmd::cmd_form(&cli, &project_dir, command.clone(), cancel).await
        }
        Commands::Sections => cmd::cmd_sections(&cli, &project_dir),
        Commands::History { limit } => cmd::cmd_history(&cli, &project_dir, *limit),
        Commands::Usage { all, kind, days } => {
            cmd::cmd_usage(&cli, &project_dir, *all, kind.as_deref(), *days)
        }
        Commands::Projects => cmd::cmd_projects(&cli, &project_dir),
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone()),
    };

    if let Err(e) = &result
        && matches!(e.downcast_ref::<PipelineError>(), Some(PipelineError::Cancelled))
    {
        eprintln!("Cancelled. Nothing was saved.");
        std::process::exit(130);
    }
    result
}

/// First Ctrl-C cancels the running operation; a second one exits at once.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!("\nCancelling... press Ctrl-C again to exit immediately");
        cancel.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}
