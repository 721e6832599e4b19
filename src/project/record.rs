use crate::errors::FailureKind;
use crate::usage::{LedgerFilter, UsageEntry, UsageLedger};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Kind of a mutating operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    Generate,
    Regenerate,
    Edit,
    ThemeChange,
    FormChange,
}

impl OperationKind {
    pub const ALL: [OperationKind; 5] = [
        OperationKind::Generate,
        OperationKind::Regenerate,
        OperationKind::Edit,
        OperationKind::ThemeChange,
        OperationKind::FormChange,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Generate => "generate",
            OperationKind::Regenerate => "regenerate",
            OperationKind::Edit => "edit",
            OperationKind::ThemeChange => "theme-change",
            OperationKind::FormChange => "form-change",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OperationKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_lowercase().replace('_', "-");
        match normalized.as_str() {
            "generate" | "gen" => Ok(OperationKind::Generate),
            "regenerate" | "regen" => Ok(OperationKind::Regenerate),
            "edit" => Ok(OperationKind::Edit),
            "theme-change" | "theme" => Ok(OperationKind::ThemeChange),
            "form-change" | "form" => Ok(OperationKind::FormChange),
            _ => anyhow::bail!(
                "Invalid operation kind '{}'. Valid values: generate, regenerate, edit, theme-change, form-change",
                s
            ),
        }
    }
}

/// How an operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Every phase completed
    Success,
    /// A phase failed after at least one earlier phase committed
    Partial,
    /// The first phase to change anything failed
    Failed,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::Partial => write!(f, "partial"),
            Outcome::Failed => write!(f, "failed"),
        }
    }
}

/// Full multi-phase design pipeline or a single landing-page pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    #[default]
    Full,
    Fast,
}

impl std::fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationMode::Full => write!(f, "full"),
            GenerationMode::Fast => write!(f, "fast"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    Completed,
    Failed,
}

/// Per-phase result kept inside an [`OperationRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSummary {
    pub phase: String,
    pub status: PhaseStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub usage: UsageEntry,
}

/// The phase that stopped an operation and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseFailure {
    pub phase: String,
    pub kind: FailureKind,
    pub message: String,
}

/// One completed operation. Never modified after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub kind: OperationKind,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub affected_sections: BTreeSet<String>,
    #[serde(default)]
    pub usage: UsageEntry,
    #[serde(default = "default_outcome")]
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phases: Vec<PhaseSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<PhaseFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

fn default_outcome() -> Outcome {
    Outcome::Success
}

impl OperationRecord {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            affected_sections: BTreeSet::new(),
            usage: UsageEntry::default(),
            outcome: Outcome::Success,
            phases: Vec::new(),
            failure: None,
            detail: None,
        }
    }
}

/// Descriptive fields of a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    #[serde(default)]
    pub product_description: String,
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default)]
    pub generation_mode: GenerationMode,
    #[serde(default = "default_framework")]
    pub framework: String,
    #[serde(default)]
    pub include_forms: bool,
    #[serde(default)]
    pub reference_urls: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    /// Fields this version does not know about, kept across load/save
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_theme() -> String {
    "minimal".to_string()
}

fn default_framework() -> String {
    "html".to_string()
}

impl Default for ProjectMetadata {
    fn default() -> Self {
        Self {
            product_description: String::new(),
            theme: default_theme(),
            generation_mode: GenerationMode::default(),
            framework: default_framework(),
            include_forms: false,
            reference_urls: Vec::new(),
            created_at: None,
            last_updated: None,
            extra: Map::new(),
        }
    }
}

/// Durable state of one project: the page, its analysis artifacts and the
/// operation history.
///
/// `document` is stored next to the record as its own file and is skipped by
/// serde; `total_usage` is always the ledger aggregate of `history`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    #[serde(skip)]
    pub document: String,
    #[serde(default)]
    pub metadata: ProjectMetadata,
    #[serde(default)]
    pub sections: Vec<String>,
    #[serde(default)]
    pub artifacts: BTreeMap<String, Value>,
    #[serde(default)]
    pub history: Vec<OperationRecord>,
    #[serde(default)]
    pub total_usage: UsageEntry,
    #[serde(default, skip_serializing)]
    pub(crate) document_sha256: Option<String>,
    #[serde(default, skip_serializing)]
    pub(crate) format_version: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProjectRecord {
    pub fn new(document: String, metadata: ProjectMetadata) -> Self {
        Self {
            document,
            metadata,
            ..Default::default()
        }
    }

    /// Append an operation and refresh the derived usage total.
    pub fn append_operation(&mut self, op: OperationRecord) {
        self.history.push(op);
        self.total_usage = self.recompute_total_usage();
    }

    pub fn recompute_total_usage(&self) -> UsageEntry {
        UsageLedger::from_history("", &self.history).aggregate(&LedgerFilter::all())
    }

    pub fn last_operation(&self) -> Option<&OperationRecord> {
        self.history.last()
    }

    /// Short human-readable name for listings.
    pub fn display_name(&self) -> Option<String> {
        if let Some(Value::String(brand)) = self
            .metadata
            .extra
            .get("brand_name")
            .or_else(|| self.extra.get("brand_name"))
            && !brand.trim().is_empty()
        {
            return Some(crate::util::truncate_chars(brand.trim(), 30));
        }
        let description = self.metadata.product_description.trim();
        if description.is_empty() {
            None
        } else {
            Some(crate::util::truncate_chars(description, 33))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(input: u64, cost: f64) -> UsageEntry {
        UsageEntry {
            input_tokens: input,
            output_tokens: 0,
            estimated_cost: cost,
        }
    }

    #[test]
    fn test_operation_kind_roundtrip_names() {
        for kind in OperationKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
            assert_eq!(kind.as_str().parse::<OperationKind>().unwrap(), kind);
        }
        assert_eq!("theme".parse::<OperationKind>().unwrap(), OperationKind::ThemeChange);
        assert!("publish".parse::<OperationKind>().is_err());
    }

    #[test]
    fn test_append_operation_updates_total_usage() {
        let mut record = ProjectRecord::new("<html></html>".to_string(), ProjectMetadata::default());
        let mut first = OperationRecord::new(OperationKind::Generate);
        first.usage = usage(100, 0.5);
        let mut second = OperationRecord::new(OperationKind::Regenerate);
        second.usage = usage(50, 0.25);

        record.append_operation(first.clone());
        record.append_operation(second.clone());

        assert_eq!(record.history, vec![first, second]);
        assert_eq!(record.total_usage.input_tokens, 150);
        assert_eq!(record.total_usage.estimated_cost, 0.75);
        assert_eq!(record.last_operation().unwrap().kind, OperationKind::Regenerate);
    }

    #[test]
    fn test_metadata_defaults_and_keeps_unknown_fields() {
        let meta: ProjectMetadata =
            serde_json::from_str(r#"{"product_description": "AI notes", "brand_name": "Notely"}"#)
                .unwrap();
        assert_eq!(meta.theme, "minimal");
        assert_eq!(meta.framework, "html");
        assert_eq!(meta.generation_mode, GenerationMode::Full);
        assert_eq!(meta.extra.get("brand_name"), Some(&Value::String("Notely".into())));

        let back = serde_json::to_value(&meta).unwrap();
        assert_eq!(back["brand_name"], "Notely");
    }

    #[test]
    fn test_operation_record_defaults_missing_fields() {
        let op: OperationRecord = serde_json::from_str(r#"{"kind": "edit"}"#).unwrap();
        assert_eq!(op.kind, OperationKind::Edit);
        assert_eq!(op.outcome, Outcome::Success);
        assert!(op.affected_sections.is_empty());
        assert!(op.usage.is_zero());
    }

    #[test]
    fn test_display_name_prefers_brand() {
        let mut record = ProjectRecord::default();
        assert_eq!(record.display_name(), None);
        record.metadata.product_description = "A tool for tracking habits".to_string();
        assert_eq!(record.display_name().unwrap(), "A tool for tracking habits");
        record
            .metadata
            .extra
            .insert("brand_name".to_string(), Value::String("Habitual".to_string()));
        assert_eq!(record.display_name().unwrap(), "Habitual");
    }
}
