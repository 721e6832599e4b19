use super::forms::FormChange;
use super::phase::{self, PhaseId, PhaseSpec, PhaseTarget};
use super::prompts::{self, PromptContext};
use super::state::{PhaseMachine, PhaseState};
use crate::agent::{Agent, AgentRequest, AgentResponse};
use crate::config::Config;
use crate::errors::{AgentError, FailureKind, PipelineError, SectionError, StoreError};
use crate::project::{
    GenerationMode, OperationKind, OperationRecord, Outcome, PhaseFailure, PhaseStatus,
    PhaseSummary, ProjectMetadata, ProjectRecord, ProjectStore,
};
use crate::sections::Document;
use crate::ui::PipelineUI;
use crate::usage::{Rates, UsageEntry};
use crate::util::{extract_urls, word_count};
use crate::validate::{ContentValidator, Verdict};
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Tunables for a pipeline run.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Deadline for a single agent call
    pub timeout: Duration,
    /// Extra attempts after a rejected response
    pub max_retries: u32,
    pub rates: Rates,
    /// Descriptions longer than this many words are summarized first
    pub summarize_threshold: usize,
    /// Sections requested for a fast-mode page
    pub default_sections: Vec<String>,
    /// How long a timed-out agent gets to clean up after cancellation
    pub cancel_grace: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            max_retries: 1,
            rates: Rates::default(),
            summarize_threshold: 100,
            default_sections: ["hero", "features", "pricing", "footer"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            cancel_grace: Duration::from_secs(5),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.timeout,
            max_retries: config.max_retries,
            rates: config.rates,
            default_sections: config.default_sections.clone(),
            ..Default::default()
        }
    }
}

/// Input to [`GenerationOrchestrator::generate`].
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub description: String,
    pub mode: GenerationMode,
    pub theme: String,
    pub framework: String,
    pub include_forms: bool,
    /// Reference products; when empty the full pipeline discovers some
    pub reference_urls: Vec<String>,
}

impl GenerateRequest {
    pub fn new(description: impl Into<String>) -> Self {
        let defaults = ProjectMetadata::default();
        Self {
            description: description.into(),
            mode: GenerationMode::Full,
            theme: defaults.theme,
            framework: defaults.framework,
            include_forms: false,
            reference_urls: Vec::new(),
        }
    }

    pub fn with_mode(mut self, mode: GenerationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = theme.into();
        self
    }

    pub fn with_forms(mut self, include_forms: bool) -> Self {
        self.include_forms = include_forms;
        self
    }

    pub fn with_reference_urls(mut self, urls: Vec<String>) -> Self {
        self.reference_urls = urls;
        self
    }
}

/// Result of one caller-facing operation.
#[derive(Debug, Clone)]
pub struct OperationReport {
    /// The history entry for this operation
    pub operation: OperationRecord,
    /// Sections whose content was replaced
    pub updated: BTreeSet<String>,
    /// Sections left exactly as they were
    pub untouched: BTreeSet<String>,
    /// Sections a failed phase was meant to change
    pub failed: BTreeSet<String>,
    /// Project state after the operation (saved only when `persisted`)
    pub record: ProjectRecord,
    pub persisted: bool,
}

impl OperationReport {
    pub fn outcome(&self) -> Outcome {
        self.operation.outcome
    }

    pub fn is_success(&self) -> bool {
        self.operation.outcome == Outcome::Success
    }

    pub fn usage(&self) -> UsageEntry {
        self.operation.usage
    }

    pub fn phases(&self) -> &[PhaseSummary] {
        &self.operation.phases
    }

    pub fn failure(&self) -> Option<&PhaseFailure> {
        self.operation.failure.as_ref()
    }

    /// Turn a phase failure into `PipelineError::PhaseFailed`.
    pub fn into_result(self) -> Result<Self, PipelineError> {
        match self.operation.failure.clone() {
            Some(failure) => Err(PipelineError::PhaseFailed {
                phase: failure.phase,
                kind: failure.kind,
                message: failure.message,
            }),
            None => Ok(self),
        }
    }
}

/// Checked-out project state threaded through a plan.
struct Working {
    record: ProjectRecord,
    document: Option<Document>,
    description: String,
    theme: String,
    instruction: Option<String>,
    form_change: Option<FormChange>,
}

impl Working {
    fn new(record: ProjectRecord, document: Option<Document>) -> Self {
        let description = match record.artifacts.get("product_summary") {
            Some(Value::String(summary)) if !summary.trim().is_empty() => summary.clone(),
            _ => record.metadata.product_description.clone(),
        };
        let theme = record.metadata.theme.clone();
        Self {
            record,
            document,
            description,
            theme,
            instruction: None,
            form_change: None,
        }
    }

    fn section_names(&self) -> Vec<String> {
        self.document.as_ref().map(|d| d.names()).unwrap_or_default()
    }
}

/// Accepted payload of a phase, by target.
enum Accepted {
    Artifact(Value),
    Document(String),
    Sections(BTreeMap<String, String>),
}

/// How a single phase ended.
struct PhaseRun {
    summary: PhaseSummary,
    updated: BTreeSet<String>,
    failure: Option<PhaseFailure>,
}

/// Aggregate of a plan.
#[derive(Default)]
struct PlanRun {
    phases: Vec<PhaseSummary>,
    usage: UsageEntry,
    updated: BTreeSet<String>,
    failure: Option<PhaseFailure>,
    failed_sections: BTreeSet<String>,
    committed: usize,
    document_committed: bool,
}

impl PlanRun {
    fn outcome(&self) -> Outcome {
        match (&self.failure, self.committed) {
            (None, _) => Outcome::Success,
            (Some(_), 0) => Outcome::Failed,
            (Some(_), _) => Outcome::Partial,
        }
    }
}

/// Drives phases against the agent and keeps the project record consistent.
pub struct GenerationOrchestrator {
    agent: Arc<dyn Agent>,
    store: ProjectStore,
    config: OrchestratorConfig,
    validator: ContentValidator,
    cancel: CancellationToken,
    ui: Option<Arc<PipelineUI>>,
}

impl GenerationOrchestrator {
    pub fn new(agent: Arc<dyn Agent>, store: ProjectStore, config: OrchestratorConfig) -> Self {
        Self {
            agent,
            store,
            config,
            validator: ContentValidator::new(),
            cancel: CancellationToken::new(),
            ui: None,
        }
    }

    pub fn with_ui(mut self, ui: Arc<PipelineUI>) -> Self {
        self.ui = Some(ui);
        self
    }

    /// Use `cancel` to abort in-flight agent calls and unpublished saves.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn store(&self) -> &ProjectStore {
        &self.store
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run the generation pipeline and create the project.
    ///
    /// The project is saved only when the document phase succeeds; otherwise
    /// the report carries the partial artifacts and usage.
    pub async fn generate(&self, request: GenerateRequest) -> Result<OperationReport, PipelineError> {
        let now = Utc::now();
        let metadata = ProjectMetadata {
            product_description: request.description.clone(),
            theme: request.theme.clone(),
            generation_mode: request.mode,
            framework: request.framework.clone(),
            include_forms: request.include_forms,
            reference_urls: request.reference_urls.clone(),
            created_at: Some(now),
            last_updated: Some(now),
            ..Default::default()
        };
        let mut working = Working::new(ProjectRecord::new(String::new(), metadata), None);

        let summarize = word_count(&request.description) > self.config.summarize_threshold;
        let plan = match request.mode {
            GenerationMode::Full => phase::full_plan(summarize, request.reference_urls.is_empty()),
            GenerationMode::Fast => phase::fast_plan(summarize),
        };
        info!(mode = %request.mode, phases = plan.len(), "Starting generation");

        let run = self.run_plan(&plan, &mut working).await?;
        let mut op = self.operation(OperationKind::Generate, &run);
        op.affected_sections = run.updated.clone();
        op.detail = Some(format!("{} mode, {} theme", request.mode, request.theme));

        if run.document_committed {
            working.record.append_operation(op.clone());
            self.save(&working.record)?;
            Ok(self.report(op, &run, &BTreeSet::new(), working.record, true))
        } else {
            warn!("Generation produced no document; nothing saved");
            Ok(self.report(op, &run, &BTreeSet::new(), working.record, false))
        }
    }

    /// Regenerate the named sections in one atomic merge.
    pub async fn regenerate_sections<S: AsRef<str>>(
        &self,
        names: &[S],
        context: Option<&str>,
    ) -> Result<OperationReport, PipelineError> {
        let mut working = self.checkout()?;
        let names = self.resolve_sections(&working, names)?;
        working.instruction = context.map(str::to_string);

        let plan = [PhaseSpec::sections(PhaseId::Regenerate, names)];
        self.run_mutation(OperationKind::Regenerate, &plan, working, context.map(str::to_string))
            .await
    }

    /// Apply a free-form instruction to the page, or only to `scope`.
    pub async fn edit_content(
        &self,
        instruction: &str,
        scope: Option<&[String]>,
    ) -> Result<OperationReport, PipelineError> {
        let mut working = self.checkout()?;
        let plan = match scope {
            Some(names) => {
                let names = self.resolve_sections(&working, names)?;
                [PhaseSpec::sections(PhaseId::Edit, names)]
            }
            None => [PhaseSpec::document(PhaseId::Edit)],
        };
        working.instruction = Some(instruction.to_string());
        self.run_mutation(OperationKind::Edit, &plan, working, Some(instruction.to_string()))
            .await
    }

    /// Re-run the visual phases under `theme`.
    ///
    /// The stored theme changes only when the new page is merged.
    pub async fn change_theme(&self, theme: &str) -> Result<OperationReport, PipelineError> {
        let mut working = self.checkout()?;
        let previous = working.record.metadata.theme.clone();
        working.theme = theme.to_string();
        self.run_mutation(
            OperationKind::ThemeChange,
            &phase::theme_plan(),
            working,
            Some(format!("{} -> {}", previous, theme)),
        )
        .await
    }

    pub async fn change_forms(&self, change: FormChange) -> Result<OperationReport, PipelineError> {
        let mut working = self.checkout()?;
        let detail = change.describe();
        working.form_change = Some(change);
        self.run_mutation(
            OperationKind::FormChange,
            &[PhaseSpec::document(PhaseId::Forms)],
            working,
            Some(detail),
        )
        .await
    }

    fn checkout(&self) -> Result<Working, PipelineError> {
        let record = self.store.load()?;
        let document = Document::parse(&record.document)?;
        Ok(Working::new(record, Some(document)))
    }

    /// Lowercase, dedupe and check every name against the current page.
    fn resolve_sections<S: AsRef<str>>(
        &self,
        working: &Working,
        names: &[S],
    ) -> Result<Vec<String>, PipelineError> {
        let mut resolved: Vec<String> = Vec::new();
        for name in names {
            let name = name.as_ref().trim().to_ascii_lowercase();
            if name.is_empty() || resolved.contains(&name) {
                continue;
            }
            resolved.push(name);
        }
        if resolved.is_empty() {
            return Err(PipelineError::NoSections);
        }
        let available = working.section_names();
        if let Some(missing) = resolved.iter().find(|n| !available.contains(n)) {
            return Err(PipelineError::UnknownSection {
                name: missing.clone(),
                available,
            });
        }
        Ok(resolved)
    }

    /// Run a plan against an existing project and always record the attempt.
    async fn run_mutation(
        &self,
        kind: OperationKind,
        plan: &[PhaseSpec],
        mut working: Working,
        detail: Option<String>,
    ) -> Result<OperationReport, PipelineError> {
        let before = working.document.clone().unwrap_or_default();
        let before_names: BTreeSet<String> = before.names().into_iter().collect();
        info!(kind = %kind, phases = plan.len(), "Starting operation");

        let run = self.run_plan(plan, &mut working).await?;

        if run.document_committed {
            match kind {
                OperationKind::ThemeChange => working.record.metadata.theme = working.theme.clone(),
                OperationKind::FormChange => {
                    if let Some(change) = &working.form_change {
                        working.record.metadata.include_forms = change.include_forms();
                    }
                }
                _ => {}
            }
        }
        working.record.metadata.last_updated = Some(Utc::now());

        let mut op = self.operation(kind, &run);
        op.affected_sections = run.updated.clone();
        op.detail = detail;

        working.record.append_operation(op.clone());
        self.save(&working.record)?;
        Ok(self.report(op, &run, &before_names, working.record, true))
    }

    fn save(&self, record: &ProjectRecord) -> Result<(), PipelineError> {
        match self.store.save(record, &self.cancel) {
            Ok(()) => Ok(()),
            Err(StoreError::Cancelled) => Err(PipelineError::Cancelled),
            Err(e) => Err(e.into()),
        }
    }

    fn operation(&self, kind: OperationKind, run: &PlanRun) -> OperationRecord {
        let mut op = OperationRecord::new(kind);
        op.usage = run.usage;
        op.outcome = run.outcome();
        op.phases = run.phases.clone();
        op.failure = run.failure.clone();
        op
    }

    fn report(
        &self,
        operation: OperationRecord,
        run: &PlanRun,
        before: &BTreeSet<String>,
        record: ProjectRecord,
        persisted: bool,
    ) -> OperationReport {
        let untouched = before
            .iter()
            .filter(|n| !run.updated.contains(*n) && !run.failed_sections.contains(*n))
            .cloned()
            .collect();
        OperationReport {
            operation,
            updated: run.updated.clone(),
            untouched,
            failed: run.failed_sections.clone(),
            record,
            persisted,
        }
    }

    async fn run_plan(&self, plan: &[PhaseSpec], working: &mut Working) -> Result<PlanRun, PipelineError> {
        let mut run = PlanRun::default();
        if let Some(ui) = &self.ui {
            ui.set_total(plan.len() as u64);
        }
        for spec in plan {
            let phase_run = self.run_phase(spec, working).await?;
            run.usage += phase_run.summary.usage;
            run.phases.push(phase_run.summary);

            match phase_run.failure {
                None => {
                    run.committed += 1;
                    run.updated.extend(phase_run.updated);
                    if spec.is_document_phase() {
                        run.document_committed = true;
                    }
                }
                Some(failure) if spec.optional => {
                    warn!(phase = %spec.id, reason = %failure.message, "Optional phase failed, continuing");
                }
                Some(failure) => {
                    run.failed_sections = match &spec.target {
                        PhaseTarget::Sections(names) => names.iter().cloned().collect(),
                        PhaseTarget::Document => working.section_names().into_iter().collect(),
                        PhaseTarget::Artifact(_) => BTreeSet::new(),
                    };
                    run.failure = Some(failure);
                    break;
                }
            }
        }
        Ok(run)
    }

    async fn run_phase(&self, spec: &PhaseSpec, working: &mut Working) -> Result<PhaseRun, PipelineError> {
        let mut machine = PhaseMachine::new(spec.id.as_str());
        let mut usage = UsageEntry::default();
        let max_attempts = self.config.max_retries + 1;
        if let Some(ui) = &self.ui {
            ui.start_phase(spec.id.as_str(), spec.id.label());
        }

        machine.advance(PhaseState::BuildingPrompt)?;
        let base_prompt = self.build_prompt(spec, working)?;
        let mut prompt = base_prompt.clone();

        loop {
            machine.advance(PhaseState::AwaitingAgent)?;
            if let Some(ui) = &self.ui {
                ui.start_attempt(machine.attempts(), max_attempts);
            }
            debug!(phase = %spec.id, attempt = machine.attempts(), "Invoking agent");

            let response = match self.call_agent(spec.id, &prompt).await {
                Ok(response) => response,
                Err(AgentError::Cancelled) => return Err(PipelineError::Cancelled),
                Err(e) => {
                    machine.advance(PhaseState::Failed)?;
                    let kind = match e {
                        AgentError::Timeout { .. } => FailureKind::AgentTimeout,
                        _ => FailureKind::AgentError,
                    };
                    return Ok(self.failed_phase(spec, &machine, usage, kind, e.to_string()));
                }
            };
            usage += UsageEntry::from_tokens(
                response.input_tokens,
                response.output_tokens,
                response.cost,
                &self.config.rates,
            );

            machine.advance(PhaseState::Validating)?;
            if let Some(ui) = &self.ui {
                ui.log_step("validating response");
            }
            let accepted = match self.validate(spec, &response.content) {
                Verdict::Accepted(accepted) => accepted,
                Verdict::Rejected(reason) => {
                    if machine.attempts() < max_attempts {
                        info!(phase = %spec.id, reason = %reason, "Response rejected, retrying");
                        if let Some(ui) = &self.ui {
                            ui.attempt_rejected(&reason);
                        }
                        machine.advance(PhaseState::BuildingPrompt)?;
                        prompt = prompts::amend(&base_prompt, &reason, &spec.target);
                        continue;
                    }
                    machine.advance(PhaseState::Failed)?;
                    return Ok(self.failed_phase(
                        spec,
                        &machine,
                        usage,
                        FailureKind::ValidationRejected,
                        reason,
                    ));
                }
            };

            machine.advance(PhaseState::Merging)?;
            let updated = match self.apply(spec, accepted, working) {
                Ok(updated) => updated,
                Err(e) => {
                    machine.advance(PhaseState::Failed)?;
                    return Ok(self.failed_phase(
                        spec,
                        &machine,
                        usage,
                        FailureKind::MergeInvariantViolation,
                        e.to_string(),
                    ));
                }
            };

            machine.advance(PhaseState::Recording)?;
            let summary = PhaseSummary {
                phase: spec.id.as_str().to_string(),
                status: PhaseStatus::Completed,
                attempts: machine.attempts(),
                usage,
            };
            if let Some(ui) = &self.ui {
                ui.phase_complete(spec.id.as_str(), &usage);
            }
            info!(phase = %spec.id, attempts = machine.attempts(), updated = updated.len(), "Phase complete");
            machine.advance(PhaseState::Idle)?;

            return Ok(PhaseRun {
                summary,
                updated,
                failure: None,
            });
        }
    }

    fn failed_phase(
        &self,
        spec: &PhaseSpec,
        machine: &PhaseMachine,
        usage: UsageEntry,
        kind: FailureKind,
        message: String,
    ) -> PhaseRun {
        warn!(phase = %spec.id, kind = %kind, message = %message, "Phase failed");
        if let Some(ui) = &self.ui {
            ui.phase_failed(spec.id.as_str(), &message);
        }
        PhaseRun {
            summary: PhaseSummary {
                phase: spec.id.as_str().to_string(),
                status: PhaseStatus::Failed,
                attempts: machine.attempts(),
                usage,
            },
            updated: BTreeSet::new(),
            failure: Some(PhaseFailure {
                phase: spec.id.as_str().to_string(),
                kind,
                message,
            }),
        }
    }

    fn build_prompt(&self, spec: &PhaseSpec, working: &Working) -> Result<String, PipelineError> {
        let current_bodies = match (&spec.target, &working.document) {
            (PhaseTarget::Sections(names), Some(document)) => Some(document.extract(names)?),
            _ => None,
        };
        let metadata = &working.record.metadata;
        let ctx = PromptContext {
            description: &working.description,
            theme: &working.theme,
            framework: &metadata.framework,
            include_forms: metadata.include_forms,
            reference_urls: &metadata.reference_urls,
            artifacts: &working.record.artifacts,
            default_sections: &self.config.default_sections,
            document: (!working.record.document.is_empty()).then_some(working.record.document.as_str()),
            current_bodies: current_bodies.as_ref(),
            instruction: working.instruction.as_deref(),
            form_change: working.form_change.as_ref(),
        };
        Ok(prompts::build(spec, &ctx))
    }

    /// Invoke the agent under the per-call deadline.
    ///
    /// On expiry the attempt's token is cancelled so the agent kills its
    /// process, and the call gets `cancel_grace` to wind down.
    async fn call_agent(&self, phase: PhaseId, prompt: &str) -> Result<AgentResponse, AgentError> {
        let request = AgentRequest::new(phase.as_str(), prompt);
        let attempt = self.cancel.child_token();
        let started = Instant::now();

        let elapsed_task = self.ui.clone().map(|ui| {
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(1));
                interval.tick().await;
                loop {
                    interval.tick().await;
                    ui.update_elapsed(started.elapsed());
                }
            })
        });

        let call = self.agent.invoke(&request, &attempt);
        tokio::pin!(call);
        let deadline = tokio::time::sleep(self.config.timeout);
        tokio::pin!(deadline);

        let result = tokio::select! {
            result = &mut call => result,
            _ = &mut deadline => {
                warn!(phase = %phase, timeout_secs = self.config.timeout.as_secs(), "Agent call timed out");
                attempt.cancel();
                if tokio::time::timeout(self.config.cancel_grace, &mut call).await.is_err() {
                    warn!(phase = %phase, "Agent did not stop within the grace period");
                }
                Err(AgentError::Timeout { after: self.config.timeout })
            }
        };

        if let Some(task) = elapsed_task {
            task.abort();
        }
        debug!(phase = %phase, elapsed_ms = started.elapsed().as_millis() as u64, ok = result.is_ok(), "Agent call finished");
        result
    }

    fn validate(&self, spec: &PhaseSpec, raw: &str) -> Verdict<Accepted> {
        match &spec.target {
            PhaseTarget::Artifact(kind) => self.validator.check_artifact(raw, *kind).map(Accepted::Artifact),
            PhaseTarget::Document => self.validator.check_document(raw).map(Accepted::Document),
            PhaseTarget::Sections(names) => self.validator.check_sections(raw, names).map(Accepted::Sections),
        }
    }

    /// Commit an accepted payload into the working state; returns the
    /// sections it changed.
    fn apply(
        &self,
        spec: &PhaseSpec,
        accepted: Accepted,
        working: &mut Working,
    ) -> Result<BTreeSet<String>, SectionError> {
        match accepted {
            Accepted::Artifact(value) => {
                match spec.id {
                    PhaseId::Summarize => {
                        if let Value::String(summary) = &value {
                            working.description = summary.clone();
                        }
                    }
                    PhaseId::ReferenceDiscovery => {
                        if let Value::String(text) = &value {
                            let urls = extract_urls(text);
                            if !urls.is_empty() {
                                working.record.metadata.reference_urls = urls;
                            }
                        }
                    }
                    _ => {}
                }
                if let Some(key) = spec.id.artifact_key() {
                    working.record.artifacts.insert(key.to_string(), value);
                }
                Ok(BTreeSet::new())
            }
            Accepted::Document(html) => {
                let document = Document::parse(&html)?;
                let updated = match &working.document {
                    Some(previous) => previous.changed_sections(&document),
                    None => document.names().into_iter().collect(),
                };
                working.record.sections = document.names();
                working.record.document = html;
                working.document = Some(document);
                Ok(updated)
            }
            Accepted::Sections(bodies) => {
                let Some(current) = &working.document else {
                    return Err(SectionError::MergeInvariantViolation {
                        reason: "no document to merge into".to_string(),
                    });
                };
                let merged = current.merge(&bodies)?;
                working.record.document = merged.render();
                working.record.sections = merged.names();
                working.document = Some(merged);
                Ok(bodies.into_keys().collect())
            }
        }
    }
}
