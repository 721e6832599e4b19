//! Append-only ledger of operation usage.

use super::UsageEntry;
use crate::project::{OperationKind, OperationRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// One operation's usage, attributed to a project.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub project: String,
    pub operation_id: Uuid,
    pub kind: OperationKind,
    pub timestamp: DateTime<Utc>,
    pub usage: UsageEntry,
}

/// Selects ledger entries; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct LedgerFilter {
    pub project: Option<String>,
    pub kind: Option<OperationKind>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl LedgerFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn kind(mut self, kind: OperationKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        self.project.as_ref().is_none_or(|p| *p == entry.project)
            && self.kind.is_none_or(|k| k == entry.kind)
            && self.since.is_none_or(|since| entry.timestamp >= since)
            && self.until.is_none_or(|until| entry.timestamp < until)
    }
}

/// Usage of completed operations. Entries are only ever appended.
#[derive(Debug, Clone, Default)]
pub struct UsageLedger {
    entries: Vec<LedgerEntry>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from one project's operation history.
    pub fn from_history(project: &str, history: &[OperationRecord]) -> Self {
        let mut ledger = Self::new();
        ledger.record_all(project, history);
        ledger
    }

    pub fn record(&mut self, project: &str, op: &OperationRecord) {
        self.entries.push(LedgerEntry {
            project: project.to_string(),
            operation_id: op.id,
            kind: op.kind,
            timestamp: op.timestamp,
            usage: op.usage,
        });
    }

    pub fn record_all(&mut self, project: &str, history: &[OperationRecord]) {
        for op in history {
            self.record(project, op);
        }
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of the usage of every entry the filter selects.
    pub fn aggregate(&self, filter: &LedgerFilter) -> UsageEntry {
        self.entries
            .iter()
            .filter(|e| filter.matches(e))
            .map(|e| e.usage)
            .sum()
    }

    /// Per-kind totals of the selected entries, with operation counts.
    pub fn by_kind(&self, filter: &LedgerFilter) -> BTreeMap<OperationKind, (usize, UsageEntry)> {
        let mut totals: BTreeMap<OperationKind, (usize, UsageEntry)> = BTreeMap::new();
        for entry in self.entries.iter().filter(|e| filter.matches(e)) {
            let slot = totals.entry(entry.kind).or_default();
            slot.0 += 1;
            slot.1 += entry.usage;
        }
        totals
    }

    /// Per-project totals of the selected entries.
    pub fn by_project(&self, filter: &LedgerFilter) -> BTreeMap<String, UsageEntry> {
        let mut totals: BTreeMap<String, UsageEntry> = BTreeMap::new();
        for entry in self.entries.iter().filter(|e| filter.matches(e)) {
            *totals.entry(entry.project.clone()).or_default() += entry.usage;
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::Outcome;
    use chrono::{Duration, TimeZone};
    use std::collections::BTreeSet;

    fn op(kind: OperationKind, timestamp: DateTime<Utc>, input: u64, cost: f64) -> OperationRecord {
        OperationRecord {
            id: Uuid::new_v4(),
            kind,
            timestamp,
            affected_sections: BTreeSet::new(),
            usage: UsageEntry {
                input_tokens: input,
                output_tokens: input / 2,
                estimated_cost: cost,
            },
            outcome: Outcome::Success,
            phases: Vec::new(),
            failure: None,
            detail: None,
        }
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn sample_ledger() -> UsageLedger {
        let t = base_time();
        let mut ledger = UsageLedger::new();
        ledger.record("output", &op(OperationKind::Generate, t, 1000, 1.0));
        ledger.record("output", &op(OperationKind::Regenerate, t + Duration::hours(1), 200, 0.25));
        ledger.record("output1", &op(OperationKind::Regenerate, t + Duration::hours(2), 400, 0.5));
        ledger.record("output1", &op(OperationKind::ThemeChange, t + Duration::days(1), 800, 2.0));
        ledger
    }

    #[test]
    fn test_aggregate_all_equals_sum_of_entries() {
        let ledger = sample_ledger();
        let total = ledger.aggregate(&LedgerFilter::all());
        let manual: UsageEntry = ledger.entries().iter().map(|e| e.usage).sum();
        assert_eq!(total, manual);
        assert_eq!(total.input_tokens, 2400);
        assert_eq!(total.estimated_cost, 3.75);
    }

    #[test]
    fn test_aggregate_by_project() {
        let ledger = sample_ledger();
        let total = ledger.aggregate(&LedgerFilter::all().project("output1"));
        assert_eq!(total.input_tokens, 1200);
    }

    #[test]
    fn test_aggregate_by_kind() {
        let ledger = sample_ledger();
        let total = ledger.aggregate(&LedgerFilter::all().kind(OperationKind::Regenerate));
        assert_eq!(total.input_tokens, 600);
        assert_eq!(total.estimated_cost, 0.75);
    }

    #[test]
    fn test_aggregate_by_time_range_is_half_open() {
        let ledger = sample_ledger();
        let t = base_time();
        let filter = LedgerFilter::all()
            .since(t + Duration::hours(1))
            .until(t + Duration::days(1));
        let total = ledger.aggregate(&filter);
        assert_eq!(total.input_tokens, 600);
    }

    #[test]
    fn test_filters_combine() {
        let ledger = sample_ledger();
        let filter = LedgerFilter::all()
            .project("output")
            .kind(OperationKind::Regenerate);
        assert_eq!(ledger.aggregate(&filter).input_tokens, 200);
    }

    #[test]
    fn test_partitions_sum_to_total() {
        let ledger = sample_ledger();
        let all = LedgerFilter::all();
        let by_kind: UsageEntry = ledger.by_kind(&all).values().map(|(_, u)| *u).sum();
        let by_project: UsageEntry = ledger.by_project(&all).values().sum();
        let total = ledger.aggregate(&all);
        assert_eq!(by_kind.input_tokens, total.input_tokens);
        assert_eq!(by_project.input_tokens, total.input_tokens);
        assert_eq!(ledger.by_kind(&all)[&OperationKind::Regenerate].0, 2);
    }

    #[test]
    fn test_from_history_preserves_order() {
        let t = base_time();
        let history = vec![
            op(OperationKind::Generate, t, 10, 0.1),
            op(OperationKind::Edit, t + Duration::minutes(5), 20, 0.2),
        ];
        let ledger = UsageLedger::from_history("output", &history);
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.entries()[0].operation_id, history[0].id);
        assert_eq!(ledger.entries()[1].kind, OperationKind::Edit);
    }
}
