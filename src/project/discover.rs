//! Finding project directories under a working directory.

use super::store::{DOCUMENT_FILE, ProjectStore, RECORD_FILE};
use crate::util::truncate_chars;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Highest numbered sibling probed (`output1` .. `output99`).
const MAX_NUMBERED_DIRS: u32 = 99;

static TITLE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());

static H1_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>").unwrap());

static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

/// A project found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSummary {
    pub dir: PathBuf,
    pub dir_name: String,
    pub name: String,
}

/// True when `dir` holds both a record and a document.
pub fn is_project_dir(dir: &Path) -> bool {
    dir.join(RECORD_FILE).is_file() && dir.join(DOCUMENT_FILE).is_file()
}

fn candidate_dirs(root: &Path, base: &str) -> impl Iterator<Item = PathBuf> {
    let root = root.to_path_buf();
    let base = base.to_string();
    std::iter::once(root.join(&base))
        .chain((1..=MAX_NUMBERED_DIRS).map(move |i| root.join(format!("{}{}", base, i))))
}

/// Projects named `<base>`, `<base>1` .. `<base>99` under `root`, in that order.
pub fn discover_projects(root: &Path, base: &str) -> Vec<ProjectSummary> {
    candidate_dirs(root, base)
        .filter(|dir| is_project_dir(dir))
        .map(|dir| {
            let dir_name = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let name = project_name(&dir);
            ProjectSummary {
                dir,
                dir_name,
                name,
            }
        })
        .collect()
}

/// First of `<base>`, `<base>1` .. `<base>99` that does not exist yet.
pub fn next_output_dir(root: &Path, base: &str) -> PathBuf {
    candidate_dirs(root, base)
        .find(|dir| !dir.exists())
        .unwrap_or_else(|| {
            root.join(format!(
                "{}-{}",
                base,
                chrono::Utc::now().timestamp()
            ))
        })
}

/// Name for listings: brand or description from the record, else the page
/// title or first heading, else a placeholder naming the directory.
pub fn project_name(dir: &Path) -> String {
    let store = ProjectStore::new(dir);
    if let Ok(record) = store.load() {
        if let Some(name) = record.display_name() {
            return name;
        }
        if let Some(caps) = TITLE_REGEX
            .captures(&record.document)
            .or_else(|| H1_REGEX.captures(&record.document))
        {
            let text = TAG_REGEX.replace_all(&caps[1], "");
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if !text.is_empty() {
                return truncate_chars(&text, 30);
            }
        }
    }
    format!("Project in {}", store.project_name())
}
