//! Pipeline commands: `pageforge gen`, `regen`, `edit`, `theme` and `form`.

use anyhow::{Result, bail};
use console::style;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use pageforge::agent::claude::ActivityCallback;
use pageforge::agent::{Agent, ClaudeAgent, ScriptedAgent};
use pageforge::config::{CliOverrides, Config};
use pageforge::pipeline::{
    FormChange, FormStyle, FormType, GenerateRequest, GenerationOrchestrator, OperationReport,
    OrchestratorConfig, detect_forms, parse_fields,
};
use pageforge::project::{
    GenerationMode, Outcome, ProjectStore, discover_projects, next_output_dir, project_name,
};
use pageforge::sections::{Document, related_sections};
use pageforge::ui::PipelineUI;
use pageforge::ui::icons::{FOLDER, MONEY, WARN};
use pageforge::usage::{format_cost, format_tokens};

use super::super::{Cli, FormCommands};

/// Arguments of `pageforge gen`.
pub struct GenOptions {
    pub description: String,
    pub fast: bool,
    pub theme: Option<String>,
    pub forms: bool,
    pub framework: String,
    pub references: Vec<String>,
}

pub fn load_config(cli: &Cli, project_dir: &Path) -> Result<Config> {
    let overrides = CliOverrides {
        claude_cmd: cli.claude_cmd.clone(),
        timeout_secs: cli.timeout,
        theme: None,
        output_dir: cli.output_dir.clone(),
        verbose: cli.verbose,
    };
    Config::new(project_dir.to_path_buf(), &overrides)
}

/// The project named by `--project`, or the newest one in the working directory.
pub fn select_project(cli: &Cli, config: &Config) -> Result<ProjectStore> {
    if let Some(project) = &cli.project {
        let store = ProjectStore::new(config.project_path(project));
        if !store.exists() {
            bail!("No project found at {}", store.dir().display());
        }
        return Ok(store);
    }

    match discover_projects(&config.project_dir, &config.output_dir).pop() {
        Some(summary) => Ok(ProjectStore::new(summary.dir)),
        None => bail!(
            "No projects found in {}. Run 'pageforge gen' first.",
            config.project_dir.display()
        ),
    }
}

fn build_agent(cli: &Cli, config: &Config, ui: &Arc<PipelineUI>) -> Result<Arc<dyn Agent>> {
    if let Some(path) = &cli.replay {
        return Ok(Arc::new(ScriptedAgent::from_file(path)?));
    }
    let ui = ui.clone();
    let activity: ActivityCallback = Arc::new(move |note: &str| ui.show_activity(note));
    Ok(Arc::new(ClaudeAgent::from_config(config).with_activity(activity)))
}

fn orchestrator(
    cli: &Cli,
    config: &Config,
    store: ProjectStore,
    cancel: CancellationToken,
) -> Result<(GenerationOrchestrator, Arc<PipelineUI>)> {
    let ui = Arc::new(PipelineUI::new(0, cli.verbose));
    let agent = build_agent(cli, config, &ui)?;
    let orchestrator =
        GenerationOrchestrator::new(agent, store, OrchestratorConfig::from_config(config))
            .with_ui(ui.clone())
            .with_cancellation(cancel);
    Ok((orchestrator, ui))
}

fn join(names: &BTreeSet<String>) -> String {
    if names.is_empty() {
        "-".to_string()
    } else {
        names.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}

/// Print the outcome of an operation and turn a phase failure into an error.
fn finish(ui: &PipelineUI, store: &ProjectStore, report: OperationReport) -> Result<()> {
    let usage = report.usage();
    let headline = format!(
        "{} {}",
        report.operation.kind,
        match report.outcome() {
            Outcome::Success => style("succeeded".to_string()).green(),
            Outcome::Partial => style("partially completed".to_string()).yellow(),
            Outcome::Failed => style("failed".to_string()).red(),
        }
    );
    ui.finish(report.is_success(), &headline);

    println!();
    println!("  Updated:   {}", join(&report.updated));
    println!("  Untouched: {}", join(&report.untouched));
    if !report.failed.is_empty() {
        println!("  Failed:    {}", style(join(&report.failed)).red());
    }
    println!(
        "  {}{} in / {} out, {}",
        MONEY,
        format_tokens(usage.input_tokens),
        format_tokens(usage.output_tokens),
        format_cost(usage.estimated_cost)
    );
    if report.persisted {
        println!("  {}{}", FOLDER, store.document_path().display());
    } else {
        println!("  {}{}", WARN, style("Nothing was saved").yellow());
    }
    println!();

    report.into_result()?;
    Ok(())
}

pub async fn cmd_gen(
    cli: &Cli,
    project_dir: &Path,
    options: GenOptions,
    cancel: CancellationToken,
) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let target = match &cli.project {
        Some(project) => config.project_path(project),
        None => next_output_dir(&config.project_dir, &config.output_dir),
    };
    let store = ProjectStore::new(target);
    if store.exists() {
        bail!(
            "{} already holds a project. Use 'pageforge regen' or 'pageforge edit' to change it.",
            store.dir().display()
        );
    }

    let mode = if options.fast {
        GenerationMode::Fast
    } else {
        GenerationMode::Full
    };
    let request = GenerateRequest::new(options.description)
        .with_mode(mode)
        .with_theme(options.theme.unwrap_or_else(|| config.default_theme.clone()))
        .with_forms(options.forms || config.include_forms)
        .with_reference_urls(options.references);
    let request = GenerateRequest {
        framework: options.framework,
        ..request
    };

    println!(
        "{}Generating {} page into {}",
        FOLDER,
        mode,
        style(store.dir().display()).cyan()
    );
    let (orchestrator, ui) = orchestrator(cli, &config, store.clone(), cancel)?;
    let report = orchestrator.generate(request).await?;
    finish(&ui, &store, report)?;
    println!("Project: {}", project_name(store.dir()));
    Ok(())
}

pub async fn cmd_regen(
    cli: &Cli,
    project_dir: &Path,
    sections: &[String],
    context: Option<&str>,
    cancel: CancellationToken,
) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let store = select_project(cli, &config)?;
    let (orchestrator, ui) = orchestrator(cli, &config, store.clone(), cancel)?;
    let report = orchestrator.regenerate_sections(sections, context).await?;
    finish(&ui, &store, report)?;

    let names = Document::parse(&store.load()?.document)?.names();
    let mut hints: BTreeSet<String> = BTreeSet::new();
    for section in sections {
        hints.extend(related_sections(section, &names));
    }
    for section in sections {
        hints.remove(&section.to_ascii_lowercase());
    }
    if !hints.is_empty() {
        let hints: Vec<String> = hints.into_iter().collect();
        println!(
            "Related sections you may want to review: {}",
            style(hints.join(", ")).cyan()
        );
    }
    Ok(())
}

pub async fn cmd_edit(
    cli: &Cli,
    project_dir: &Path,
    instruction: &str,
    sections: Option<&[String]>,
    cancel: CancellationToken,
) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let store = select_project(cli, &config)?;
    let (orchestrator, ui) = orchestrator(cli, &config, store.clone(), cancel)?;
    let report = orchestrator.edit_content(instruction, sections).await?;
    finish(&ui, &store, report)
}

pub async fn cmd_theme(
    cli: &Cli,
    project_dir: &Path,
    theme: &str,
    cancel: CancellationToken,
) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let store = select_project(cli, &config)?;
    let (orchestrator, ui) = orchestrator(cli, &config, store.clone(), cancel)?;
    let report = orchestrator.change_theme(theme).await?;
    finish(&ui, &store, report)
}

/// Turn `form` arguments into a [`FormChange`].
pub fn form_change(command: FormCommands) -> Result<FormChange> {
    Ok(match command {
        FormCommands::Add => FormChange::Add,
        FormCommands::Remove => FormChange::Remove,
        FormCommands::Edit {
            form_type,
            fields,
            style,
            cta,
        } => FormChange::Edit {
            form_type: form_type.parse::<FormType>()?,
            fields: match fields {
                Some(list) => parse_fields(&list)?,
                None => Vec::new(),
            },
            style: style.map(|s| s.parse::<FormStyle>()).transpose()?,
            cta,
        },
    })
}

pub async fn cmd_form(
    cli: &Cli,
    project_dir: &Path,
    command: FormCommands,
    cancel: CancellationToken,
) -> Result<()> {
    let change = form_change(command)?;
    let config = load_config(cli, project_dir)?;
    let store = select_project(cli, &config)?;
    let (orchestrator, ui) = orchestrator(cli, &config, store.clone(), cancel)?;
    let report = orchestrator.change_forms(change).await?;
    finish(&ui, &store, report)?;

    let forms = detect_forms(&store.load()?.document);
    if forms.has_forms() {
        let fields: Vec<&str> = forms.fields.iter().map(String::as_str).collect();
        println!("Forms on page: {} (fields: {})", forms.form_count, fields.join(", "));
    } else {
        println!("Forms on page: none");
    }
    Ok(())
}
