//! Read-only project views: `pageforge sections`, `history`, `usage` and `projects`.

use anyhow::Result;
use chrono::{Duration, Utc};
use console::style;
use std::path::Path;

use pageforge::project::{OperationKind, Outcome, discover_projects, project_name};
use pageforge::sections::{Document, describe, inspect};
use pageforge::ui::icons::{CHECK, CROSS, FOLDER, MONEY, WARN};
use pageforge::usage::{LedgerFilter, UsageEntry, UsageLedger, format_cost, format_tokens};

use super::super::Cli;
use super::generate::{load_config, select_project};

fn usage_line(usage: &UsageEntry) -> String {
    format!(
        "{} in / {} out, {}",
        format_tokens(usage.input_tokens),
        format_tokens(usage.output_tokens),
        format_cost(usage.estimated_cost)
    )
}

pub fn cmd_sections(cli: &Cli, project_dir: &Path) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let store = select_project(cli, &config)?;
    let record = store.load()?;

    println!();
    println!("{}{}", FOLDER, style(project_name(store.dir())).bold());
    println!();

    let report = inspect(&record.document);
    if !report.valid {
        println!("{}Section markers need attention:", WARN);
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        println!();
    }

    let document = Document::parse(&record.document)?;
    if document.is_empty() {
        println!("No sections found.");
        return Ok(());
    }

    for section in document.sections() {
        let meta = describe(section);
        let mut traits = Vec::new();
        if meta.has_forms {
            traits.push("forms");
        }
        if meta.has_images {
            traits.push("images");
        }
        if meta.has_links {
            traits.push("links");
        }
        println!(
            "  {:>2}. {:<16} {:>6} chars  {}",
            meta.order + 1,
            style(&meta.name).cyan(),
            meta.length,
            style(traits.join(", ")).dim()
        );
        if cli.verbose {
            for heading in &meta.headings {
                println!("        {}", style(heading).dim());
            }
        }
    }
    println!();
    Ok(())
}

pub fn cmd_history(cli: &Cli, project_dir: &Path, limit: usize) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let store = select_project(cli, &config)?;
    let record = store.load()?;

    println!();
    println!("History of {}", style(project_name(store.dir())).bold());
    println!();

    if record.history.is_empty() {
        println!("No operations recorded.");
        return Ok(());
    }

    for op in record.history.iter().rev().take(limit) {
        let icon = match op.outcome {
            Outcome::Success => CHECK,
            Outcome::Partial => WARN,
            Outcome::Failed => CROSS,
        };
        println!(
            "{}{} {} {}",
            icon,
            style(op.timestamp.format("%Y-%m-%d %H:%M")).dim(),
            style(op.kind).bold(),
            op.outcome
        );
        if !op.affected_sections.is_empty() {
            let names: Vec<&str> = op.affected_sections.iter().map(String::as_str).collect();
            println!("     sections: {}", names.join(", "));
        }
        if let Some(detail) = &op.detail {
            println!("     {}", style(detail).dim());
        }
        if let Some(failure) = &op.failure {
            println!(
                "     {} {} ({}): {}",
                style("failed at").red(),
                failure.phase,
                failure.kind,
                failure.message
            );
        }
        println!("     {}{}", MONEY, usage_line(&op.usage));
    }
    println!();
    Ok(())
}

pub fn cmd_usage(
    cli: &Cli,
    project_dir: &Path,
    all: bool,
    kind: Option<&str>,
    days: Option<i64>,
) -> Result<()> {
    let config = load_config(cli, project_dir)?;

    let mut ledger = UsageLedger::new();
    if all {
        for summary in discover_projects(&config.project_dir, &config.output_dir) {
            let store = pageforge::project::ProjectStore::new(&summary.dir);
            match store.load() {
                Ok(record) => ledger.record_all(&summary.dir_name, &record.history),
                Err(e) => tracing::warn!(project = %summary.dir_name, error = %e, "Skipping unreadable project"),
            }
        }
    } else {
        let store = select_project(cli, &config)?;
        let record = store.load()?;
        ledger.record_all(&store.project_name(), &record.history);
    }

    let mut filter = LedgerFilter::all();
    if let Some(kind) = kind {
        filter = filter.kind(kind.parse::<OperationKind>()?);
    }
    if let Some(days) = days {
        filter = filter.since(Utc::now() - Duration::days(days));
    }

    let total = ledger.aggregate(&filter);
    println!();
    println!("{}Total: {}", MONEY, style(usage_line(&total)).bold());
    println!();

    let by_kind = ledger.by_kind(&filter);
    if !by_kind.is_empty() {
        println!("By operation:");
        for (kind, (count, usage)) in &by_kind {
            println!("  {:<14} {:>3}x  {}", kind.as_str(), count, usage_line(usage));
        }
        println!();
    }

    if all {
        let by_project = ledger.by_project(&filter);
        if !by_project.is_empty() {
            println!("By project:");
            for (project, usage) in &by_project {
                println!("  {:<14} {}", project, usage_line(usage));
            }
            println!();
        }
    }
    Ok(())
}

pub fn cmd_projects(cli: &Cli, project_dir: &Path) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    let projects = discover_projects(&config.project_dir, &config.output_dir);

    println!();
    if projects.is_empty() {
        println!("No projects found in {}", config.project_dir.display());
        println!("Run 'pageforge gen \"<description>\"' to create one.");
        println!();
        return Ok(());
    }

    for summary in &projects {
        println!(
            "{}{:<12} {}",
            FOLDER,
            style(&summary.dir_name).cyan(),
            summary.name
        );
    }
    println!();
    Ok(())
}
