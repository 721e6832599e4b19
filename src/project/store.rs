use super::record::ProjectRecord;
use crate::errors::StoreError;
use crate::usage::UsageEntry;
use crate::validate::{ArtifactKind, ContentValidator, Verdict};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// File holding the serialized [`ProjectRecord`].
pub const RECORD_FILE: &str = "design_analysis.json";
/// File holding the generated page.
pub const DOCUMENT_FILE: &str = "index.html";
/// Record layout written by this version.
pub const FORMAT_VERSION: u64 = 2;

const LEGACY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Top-level keys that older records kept beside the analysis output.
const LEGACY_METADATA_KEYS: &[&str] = &[
    "product_description",
    "theme",
    "generation_mode",
    "framework",
    "include_forms",
    "reference_urls",
    "created_at",
    "last_updated",
];

/// Analysis outputs that older records stored at the top level.
const LEGACY_ARTIFACT_KEYS: &[&str] = &[
    "product_summary",
    "reference_discovery",
    "product_understanding",
    "ux_analysis",
    "user_research",
    "site_flow",
    "content_strategy",
    "wireframes",
    "design_system",
    "hifi_design",
    "final_copy",
];

/// Phase names of older `design_phases` entries and the artifact each one fed.
const LEGACY_PHASE_ARTIFACTS: &[(&str, &str)] = &[
    ("summarize", "product_summary"),
    ("reference_discovery", "reference_discovery"),
    ("product_understanding", "product_understanding"),
    ("ux_analysis", "ux_analysis"),
    ("empathy_mapping", "user_research"),
    ("site_flow", "site_flow"),
    ("content_strategy", "content_strategy"),
    ("wireframe", "wireframes"),
    ("design_system", "design_system"),
    ("high_fidelity", "hifi_design"),
    ("prototype", "final_copy"),
];

/// Reads and writes the record of one project directory.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    dir: PathBuf,
}

impl ProjectStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self) -> PathBuf {
        self.dir.join(RECORD_FILE)
    }

    pub fn document_path(&self) -> PathBuf {
        self.dir.join(DOCUMENT_FILE)
    }

    /// True when both the record and the document exist.
    pub fn exists(&self) -> bool {
        self.record_path().is_file() && self.document_path().is_file()
    }

    /// Project name used in ledgers: the directory's file name.
    pub fn project_name(&self) -> String {
        self.dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.dir.display().to_string())
    }

    /// Load the record and its document.
    ///
    /// Missing fields are defaulted and older layouts migrated; only a file
    /// that is not a JSON object at all is reported as corrupt.
    pub fn load(&self) -> Result<ProjectRecord, StoreError> {
        self.finish_interrupted_save();
        let record_path = self.record_path();
        let raw = match fs::read_to_string(&record_path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound { path: record_path });
            }
            Err(source) => {
                return Err(StoreError::Io {
                    action: "read",
                    path: record_path,
                    source,
                });
            }
        };

        let value: Value = serde_json::from_str(&raw).map_err(|e| StoreError::CorruptRecord {
            path: record_path.clone(),
            reason: e.to_string(),
        })?;
        let Value::Object(root) = value else {
            return Err(StoreError::CorruptRecord {
                path: record_path,
                reason: "top-level value is not an object".to_string(),
            });
        };

        let migrated = migrate_legacy(root);
        let mut record: ProjectRecord = serde_json::from_value(Value::Object(migrated))
            .map_err(|e| StoreError::CorruptRecord {
                path: record_path.clone(),
                reason: e.to_string(),
            })?;

        let document_path = self.document_path();
        record.document = match fs::read_to_string(&document_path) {
            Ok(document) => document,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::MissingDocument {
                    path: document_path,
                });
            }
            Err(source) => {
                return Err(StoreError::Io {
                    action: "read",
                    path: document_path,
                    source,
                });
            }
        };

        if let Some(expected) = &record.document_sha256 {
            let actual = fingerprint(&record.document);
            if *expected != actual {
                tracing::warn!(
                    dir = %self.dir.display(),
                    expected = %expected,
                    actual = %actual,
                    "document changed outside pageforge since the last save"
                );
            }
        }

        record.total_usage = record.recompute_total_usage();
        tracing::debug!(
            dir = %self.dir.display(),
            operations = record.history.len(),
            "project record loaded"
        );
        Ok(record)
    }

    /// Write the document and the record.
    ///
    /// Both files are written to temporaries and fsynced first, then
    /// published by rename (document, then record). If `cancel` fires before
    /// publishing, the temporaries are removed and the previous files stay.
    ///
    /// A crash between the two renames leaves the new document beside the
    /// old record and a complete record temporary; the next [`load`] finishes
    /// that publish.
    ///
    /// [`load`]: ProjectStore::load
    pub fn save(&self, record: &ProjectRecord, cancel: &CancellationToken) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            action: "create",
            path: self.dir.clone(),
            source,
        })?;

        let json = encode_record(record)?;

        let document_path = self.document_path();
        let record_path = self.record_path();
        let document_tmp = tmp_path(&document_path);
        let record_tmp = tmp_path(&record_path);

        let result = (|| {
            write_synced(&document_tmp, record.document.as_bytes())?;
            write_synced(&record_tmp, json.as_bytes())?;
            if cancel.is_cancelled() {
                return Err(StoreError::Cancelled);
            }
            publish(&document_tmp, &document_path)?;
            publish(&record_tmp, &record_path)
        })();

        if result.is_err() {
            let _ = fs::remove_file(&document_tmp);
            let _ = fs::remove_file(&record_tmp);
        } else {
            tracing::info!(
                dir = %self.dir.display(),
                operations = record.history.len(),
                "project record saved"
            );
        }
        result
    }

    /// Publish a record temporary left behind by a save that stopped after
    /// renaming the document. A temporary whose fingerprint does not match
    /// the document on disk is stale and removed.
    fn finish_interrupted_save(&self) {
        let record_tmp = tmp_path(&self.record_path());
        let Ok(raw) = fs::read_to_string(&record_tmp) else {
            return;
        };
        let staged = serde_json::from_str::<Value>(&raw)
            .ok()
            .and_then(|v| v.get("document_sha256").and_then(Value::as_str).map(str::to_string));
        let current = fs::read_to_string(self.document_path()).ok().map(|d| fingerprint(&d));

        if staged.is_some() && staged == current {
            match publish(&record_tmp, &self.record_path()) {
                Ok(()) => tracing::warn!(
                    dir = %self.dir.display(),
                    "finished publishing a record from an interrupted save"
                ),
                Err(e) => tracing::warn!(dir = %self.dir.display(), error = %e, "could not finish interrupted save"),
            }
        } else {
            tracing::debug!(dir = %self.dir.display(), "removing stale record temporary");
            let _ = fs::remove_file(&record_tmp);
        }
    }
}

/// Serialize `record` with the format version and document fingerprint.
fn encode_record(record: &ProjectRecord) -> Result<String, StoreError> {
    let mut value = serde_json::to_value(record).map_err(StoreError::Serialize)?;
    if let Value::Object(map) = &mut value {
        map.insert("format_version".to_string(), FORMAT_VERSION.into());
        map.insert(
            "document_sha256".to_string(),
            fingerprint(&record.document).into(),
        );
    }
    serde_json::to_string_pretty(&value).map_err(StoreError::Serialize)
}

/// Hex SHA-256 of a document.
pub fn fingerprint(document: &str) -> String {
    format!("{:x}", Sha256::digest(document.as_bytes()))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        action: "write",
        path: path.to_path_buf(),
        source,
    };
    let mut file = fs::File::create(path).map_err(io_err)?;
    file.write_all(bytes).map_err(io_err)?;
    file.sync_all().map_err(io_err)
}

fn publish(tmp: &Path, target: &Path) -> Result<(), StoreError> {
    fs::rename(tmp, target).map_err(|source| StoreError::Io {
        action: "publish",
        path: target.to_path_buf(),
        source,
    })
}

/// Accept RFC 3339 or the older `YYYY-MM-DD HH:MM:SS` form (taken as UTC).
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, LEGACY_TIMESTAMP_FORMAT)
                .ok()
                .map(|naive| naive.and_utc())
        })
}

fn normalize_timestamp(value: Option<&Value>) -> Option<Value> {
    let raw = value?.as_str()?;
    parse_timestamp(raw).map(|dt| Value::String(dt.to_rfc3339()))
}

fn take_object(root: &mut Map<String, Value>, key: &str) -> Map<String, Value> {
    match root.remove(key) {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

fn take_array(root: &mut Map<String, Value>, key: &str) -> Vec<Value> {
    match root.remove(key) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

/// Object entries of an older per-kind history array.
fn take_objects(root: &mut Map<String, Value>, key: &str) -> Vec<Map<String, Value>> {
    take_array(root, key)
        .into_iter()
        .filter_map(|e| match e {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect()
}

/// Move `design_phases.<phase>.output` into `artifacts` and collect the
/// per-phase summaries and summed usage for the migrated `generate` entry.
fn migrate_design_phases(
    phases: Map<String, Value>,
    artifacts: &mut Map<String, Value>,
) -> (Vec<Value>, Option<Value>) {
    if phases.is_empty() {
        return (Vec::new(), None);
    }

    let validator = ContentValidator::new();
    let mut summaries = Vec::new();
    let mut total = UsageEntry::default();
    for (phase, data) in phases {
        let Value::Object(mut data) = data else {
            continue;
        };
        let usage: UsageEntry = data
            .remove("stats")
            .and_then(|stats| serde_json::from_value(stats).ok())
            .unwrap_or_default();
        total += usage;

        let key = LEGACY_PHASE_ARTIFACTS
            .iter()
            .find(|(name, _)| *name == phase)
            .map(|(_, key)| *key);
        if let (Some(key), Some(output)) = (key, data.get("output").and_then(Value::as_str)) {
            let artifact = match validator.check_artifact(output, ArtifactKind::Json) {
                Verdict::Accepted(value) => value,
                Verdict::Rejected(_) => Value::String(output.trim().to_string()),
            };
            artifacts.entry(key.to_string()).or_insert(artifact);
        }

        summaries.push(serde_json::json!({
            "phase": phase,
            "status": "completed",
            "attempts": 1,
            "usage": usage,
        }));
    }
    let usage = serde_json::to_value(total).ok();
    (summaries, usage)
}

/// Build a history entry from an older per-kind history item.
fn legacy_operation(
    kind: &str,
    timestamp: Option<&Value>,
    usage: Option<Value>,
    sections: Option<Value>,
    detail: Option<String>,
) -> Value {
    let mut op = Map::new();
    op.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
    op.insert("kind".to_string(), Value::String(kind.to_string()));
    if let Some(ts) = normalize_timestamp(timestamp) {
        op.insert("timestamp".to_string(), ts);
    }
    if let Some(usage @ Value::Object(_)) = usage {
        op.insert("usage".to_string(), usage);
    }
    if let Some(sections @ Value::Array(_)) = sections {
        op.insert("affected_sections".to_string(), sections);
    }
    if let Some(detail) = detail {
        op.insert("detail".to_string(), Value::String(detail));
    }
    Value::Object(op)
}

/// Rewrite a record written before `format_version` existed into the
/// current layout. Records that already carry a version pass through.
fn migrate_legacy(mut root: Map<String, Value>) -> Map<String, Value> {
    if root.contains_key("format_version") {
        return root;
    }

    let mut metadata = take_object(&mut root, "metadata");
    for (key, value) in take_object(&mut root, "project_metadata") {
        match key.as_str() {
            "generated_at" => {
                metadata.entry("created_at".to_string()).or_insert(value);
            }
            "sections" => {
                root.entry("sections".to_string()).or_insert(value);
            }
            _ => {
                metadata.entry(key).or_insert(value);
            }
        }
    }
    if let Some(theme) = root.remove("current_theme") {
        metadata.insert("theme".to_string(), theme);
    }
    for key in LEGACY_METADATA_KEYS {
        if let Some(value) = root.remove(*key) {
            metadata.entry(key.to_string()).or_insert(value);
        }
    }
    for key in ["created_at", "last_updated"] {
        match normalize_timestamp(metadata.get(key)) {
            Some(ts) => {
                metadata.insert(key.to_string(), ts);
            }
            None => {
                metadata.remove(key);
            }
        }
    }

    let mut artifacts = take_object(&mut root, "artifacts");
    for key in LEGACY_ARTIFACT_KEYS {
        if let Some(value) = root.remove(*key) {
            artifacts.entry(key.to_string()).or_insert(value);
        }
    }

    let phases = take_object(&mut root, "design_phases");
    if !phases.is_empty() {
        metadata
            .entry("generation_mode".to_string())
            .or_insert_with(|| Value::String("full".to_string()));
    }
    let (phase_summaries, phase_usage) = migrate_design_phases(phases, &mut artifacts);

    let mut history = take_array(&mut root, "history");
    let generation_stats = root.remove("generation_stats");
    let legacy_total = root.remove("total_usage");
    let regenerations = take_objects(&mut root, "regeneration_history");
    let theme_changes = take_objects(&mut root, "theme_history");
    let edits = take_objects(&mut root, "edit_history");
    let form_changes = take_objects(&mut root, "form_history");

    if history.is_empty() {
        let later_ops = !(regenerations.is_empty()
            && theme_changes.is_empty()
            && edits.is_empty()
            && form_changes.is_empty());
        let base_usage = generation_stats
            .or(phase_usage)
            .or_else(|| (!later_ops).then_some(legacy_total).flatten());
        if let Some(usage) = base_usage {
            let mut op = legacy_operation(
                "generate",
                metadata.get("created_at"),
                Some(usage),
                None,
                Some("migrated".to_string()),
            );
            if let Value::Object(map) = &mut op
                && !phase_summaries.is_empty()
            {
                map.insert("phases".to_string(), Value::Array(phase_summaries));
            }
            history.push(op);
        }
    }

    for mut entry in regenerations {
        let detail = entry
            .get("method")
            .and_then(Value::as_str)
            .map(str::to_string);
        let timestamp = entry.remove("timestamp");
        history.push(legacy_operation(
            "regenerate",
            timestamp.as_ref(),
            entry.remove("usage_stats"),
            entry.remove("sections_updated"),
            detail,
        ));
    }

    for mut entry in theme_changes {
        let from = entry.get("from_theme").and_then(Value::as_str).unwrap_or("?");
        let to = entry.get("to_theme").and_then(Value::as_str).unwrap_or("?");
        let detail = format!("theme {} -> {}", from, to);
        let timestamp = entry.remove("timestamp");
        history.push(legacy_operation(
            "theme-change",
            timestamp.as_ref(),
            entry.remove("usage_stats"),
            None,
            Some(detail),
        ));
    }

    for mut entry in edits {
        let detail = entry
            .get("instruction")
            .and_then(Value::as_str)
            .map(str::to_string);
        let timestamp = entry.remove("timestamp");
        history.push(legacy_operation(
            "edit",
            timestamp.as_ref(),
            entry.remove("usage_stats"),
            entry.remove("affected_sections"),
            detail,
        ));
    }

    for mut entry in form_changes {
        let action = entry.get("operation").and_then(Value::as_str).unwrap_or("change");
        let detail = match entry.get("form_type").and_then(Value::as_str) {
            Some(form_type) => format!("form {} ({})", action, form_type),
            None => format!("form {}", action),
        };
        let timestamp = entry.remove("timestamp");
        history.push(legacy_operation(
            "form-change",
            timestamp.as_ref(),
            entry.remove("usage_stats"),
            None,
            Some(detail),
        ));
    }

    history.sort_by_key(|op| {
        op.get("timestamp")
            .and_then(Value::as_str)
            .and_then(parse_timestamp)
    });

    root.insert("metadata".to_string(), Value::Object(metadata));
    root.insert("artifacts".to_string(), Value::Object(artifacts));
    root.insert("history".to_string(), Value::Array(history));
    root
}
