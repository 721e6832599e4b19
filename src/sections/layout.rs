//! Landing-page conventions layered on top of raw sections: canonical
//! ordering, related-section hints, per-section metadata and a structure
//! report that never fails.

use super::{Document, Section, scan_markers};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

/// Conventional top-to-bottom order of landing page sections.
pub const SECTION_ORDER: &[&str] = &[
    "header",
    "nav",
    "hero",
    "features",
    "benefits",
    "testimonials",
    "pricing",
    "cta",
    "about",
    "faq",
    "contact",
    "footer",
];

/// Sections that usually need to stay consistent with each other.
const RELATED: &[(&str, &[&str])] = &[
    ("hero", &["cta"]),
    ("pricing", &["cta"]),
    ("features", &["benefits"]),
    ("testimonials", &["cta"]),
];

static HEADING_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h([1-6])\b[^>]*>(.*?)</h[1-6]\s*>").unwrap());

static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

static FORM_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<form\b").unwrap());

static IMAGE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(img|svg|picture)\b").unwrap());

static LINK_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<a\s[^>]*href").unwrap());

/// Sort section names by [`SECTION_ORDER`]; unknown names follow in input order.
pub fn semantic_order<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ordered: Vec<(usize, usize, String)> = names
        .iter()
        .map(|name| name.as_ref().to_ascii_lowercase())
        .filter(|name| seen.insert(name.clone()))
        .enumerate()
        .map(|(i, name)| {
            let rank = SECTION_ORDER
                .iter()
                .position(|known| *known == name)
                .unwrap_or(SECTION_ORDER.len());
            (rank, i, name)
        })
        .collect();
    ordered.sort();
    ordered.into_iter().map(|(_, _, name)| name).collect()
}

/// Sections related to `name` that exist in `available`.
pub fn related_sections<S: AsRef<str>>(name: &str, available: &[S]) -> Vec<String> {
    let name = name.to_ascii_lowercase();
    RELATED
        .iter()
        .filter(|(source, _)| *source == name)
        .flat_map(|(_, targets)| targets.iter())
        .filter(|target| available.iter().any(|a| a.as_ref().eq_ignore_ascii_case(target)))
        .map(|target| target.to_string())
        .collect()
}

/// Summary of what a section contains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionMetadata {
    pub name: String,
    pub order: usize,
    pub length: usize,
    pub has_forms: bool,
    pub has_images: bool,
    pub has_links: bool,
    pub headings: Vec<String>,
}

pub fn describe(section: &Section) -> SectionMetadata {
    let body = &section.body;
    let headings = HEADING_REGEX
        .captures_iter(body)
        .map(|caps| {
            let text = TAG_REGEX.replace_all(&caps[2], "");
            text.split_whitespace().collect::<Vec<_>>().join(" ")
        })
        .filter(|text| !text.is_empty())
        .collect();

    SectionMetadata {
        name: section.name.clone(),
        order: section.order,
        length: body.len(),
        has_forms: FORM_REGEX.is_match(body),
        has_images: IMAGE_REGEX.is_match(body),
        has_links: LINK_REGEX.is_match(body),
        headings,
    }
}

/// Result of a lenient structure check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StructureReport {
    pub valid: bool,
    /// Names in order of their first START marker
    pub sections: Vec<String>,
    pub issues: Vec<String>,
}

/// Check marker structure without failing; every problem becomes an issue.
pub fn inspect(text: &str) -> StructureReport {
    let mut counts: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    let mut sections = Vec::new();

    for (_, is_start, name, _) in scan_markers(text) {
        let entry = counts.entry(name.clone()).or_default();
        if is_start {
            if entry.0 == 0 {
                sections.push(name);
            }
            entry.0 += 1;
        } else {
            entry.1 += 1;
        }
    }

    let mut issues = Vec::new();
    for (name, (starts, ends)) in &counts {
        if *starts == 0 {
            issues.push(format!("Missing START marker for section '{}'", name));
        } else if *ends == 0 {
            issues.push(format!("Missing END marker for section '{}'", name));
        } else if starts != ends {
            issues.push(format!(
                "Unbalanced markers for section '{}' ({} START, {} END)",
                name, starts, ends
            ));
        }
        if *starts > 1 {
            issues.push(format!("Duplicate section '{}'", name));
        }
    }

    if issues.is_empty()
        && let Err(e) = Document::parse(text)
    {
        issues.push(e.to_string());
    }

    StructureReport {
        valid: issues.is_empty(),
        sections,
        issues,
    }
}
