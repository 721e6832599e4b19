//! End-to-end pipeline tests against scripted agents.

use std::sync::Arc;
use std::time::Duration;

use pageforge::agent::{ScriptedAgent, ScriptedReply};
use pageforge::errors::{FailureKind, PipelineError};
use pageforge::pipeline::{
    FormChange, FormType, GenerateRequest, GenerationOrchestrator, OrchestratorConfig,
};
use pageforge::project::{
    GenerationMode, OperationKind, Outcome, PhaseStatus, ProjectMetadata, ProjectRecord,
    ProjectStore,
};
use pageforge::sections::Document;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const PAGE: &str = "<!DOCTYPE html>\n<html>\n<head><title>Acme</title></head>\n<body>\n<!-- START: hero -->\n<section><h1>H1</h1></section>\n<!-- END: hero -->\n<!-- START: features -->\n<ul><li>Fast</li></ul>\n<!-- END: features -->\n<!-- START: pricing -->\n<section><p>$9 / month</p></section>\n<!-- END: pricing -->\n</body>\n</html>\n";

const NEW_PAGE: &str = "<html><head><title>Acme</title></head><body>\n<!-- START: hero -->\n<section><h1>Bold</h1></section>\n<!-- END: hero -->\n<!-- START: features -->\n<ul><li>Fast</li></ul>\n<!-- END: features -->\n<!-- START: pricing -->\n<section><p>$9 / month</p></section>\n<!-- END: pricing -->\n</body></html>";

/// Project directory seeded with `PAGE`.
fn seeded_project() -> (TempDir, ProjectStore) {
    let dir = TempDir::new().unwrap();
    let store = ProjectStore::new(dir.path().join("output"));
    let metadata = ProjectMetadata {
        product_description: "Acme rockets for hobbyists".to_string(),
        ..Default::default()
    };
    store
        .save(
            &ProjectRecord::new(PAGE.to_string(), metadata),
            &CancellationToken::new(),
        )
        .unwrap();
    (dir, store)
}

fn orchestrator(agent: Arc<ScriptedAgent>, store: &ProjectStore) -> GenerationOrchestrator {
    GenerationOrchestrator::new(agent, store.clone(), OrchestratorConfig::default())
}

fn body<'a>(doc: &'a Document, name: &str) -> &'a str {
    doc.section(name).unwrap().body.as_str()
}

#[tokio::test]
async fn test_regenerate_changes_only_requested_section() {
    let (_dir, store) = seeded_project();
    let agent = Arc::new(ScriptedAgent::new([ScriptedReply::with_usage(
        "<section><h1>H2</h1></section>",
        1200,
        300,
    )]));

    let report = orchestrator(agent.clone(), &store)
        .regenerate_sections(&["hero"], None)
        .await
        .unwrap();

    assert_eq!(report.outcome(), Outcome::Success);
    assert_eq!(report.updated.iter().collect::<Vec<_>>(), vec!["hero"]);
    assert!(report.untouched.contains("pricing"));
    assert!(report.untouched.contains("features"));
    assert!(report.failed.is_empty());

    let saved = store.load().unwrap();
    let before = Document::parse(PAGE).unwrap();
    let after = Document::parse(&saved.document).unwrap();
    assert!(body(&after, "hero").contains("H2"));
    assert!(!body(&after, "hero").contains("H1"));
    assert_eq!(body(&after, "pricing"), body(&before, "pricing"));
    assert_eq!(body(&after, "features"), body(&before, "features"));

    assert_eq!(saved.history.len(), 1);
    let op = &saved.history[0];
    assert_eq!(op.kind, OperationKind::Regenerate);
    assert_eq!(op.affected_sections.iter().collect::<Vec<_>>(), vec!["hero"]);
    assert_eq!(op.usage.input_tokens, 1200);
    assert_eq!(saved.total_usage, op.usage);

    let requests = agent.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].phase, "regenerate");
    assert!(requests[0].prompt.contains("H1"));
}

#[tokio::test]
async fn test_multi_section_regenerate_is_atomic() {
    let (_dir, store) = seeded_project();
    // Second reply still lacks pricing, so the phase fails after the retry.
    let partial = "<!-- START: hero -->\n<h1>New hero</h1>\n<!-- END: hero -->";
    let agent = Arc::new(ScriptedAgent::new([
        ScriptedReply::respond(partial),
        ScriptedReply::respond(partial),
    ]));

    let report = orchestrator(agent.clone(), &store)
        .regenerate_sections(&["hero", "pricing"], None)
        .await
        .unwrap();

    assert_eq!(report.outcome(), Outcome::Failed);
    assert!(report.updated.is_empty());
    assert_eq!(report.failed.len(), 2);
    assert_eq!(agent.calls(), 2);

    let saved = store.load().unwrap();
    assert_eq!(saved.document, PAGE);
    assert_eq!(saved.history.len(), 1);
    let failure = saved.history[0].failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::ValidationRejected);
    assert!(failure.message.contains("pricing"));
}

#[tokio::test]
async fn test_multi_section_regenerate_merges_together() {
    let (_dir, store) = seeded_project();
    let reply = "Here you go:\n```html\n<!-- START: hero -->\n<h1>New hero</h1>\n<!-- END: hero -->\n<!-- START: pricing -->\n<p>$19</p>\n<!-- END: pricing -->\n```";
    let agent = Arc::new(ScriptedAgent::new([ScriptedReply::respond(reply)]));

    let report = orchestrator(agent, &store)
        .regenerate_sections(&["pricing", "HERO"], Some("make it punchier"))
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.updated.len(), 2);
    let after = Document::parse(&store.load().unwrap().document).unwrap();
    assert_eq!(body(&after, "hero").trim(), "<h1>New hero</h1>");
    assert_eq!(body(&after, "pricing").trim(), "<p>$19</p>");
    assert_eq!(after.names(), vec!["hero", "features", "pricing"]);
}

#[tokio::test]
async fn test_fenced_response_accepted() {
    let (_dir, store) = seeded_project();
    let agent = Arc::new(ScriptedAgent::new([ScriptedReply::respond(
        "```html\n<section><h1>Launch day</h1></section>\n```",
    )]));

    let report = orchestrator(agent.clone(), &store)
        .regenerate_sections(&["hero"], None)
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.phases()[0].attempts, 1);
    let after = Document::parse(&store.load().unwrap().document).unwrap();
    assert_eq!(body(&after, "hero"), "<section><h1>Launch day</h1></section>");
    assert!(!store.load().unwrap().document.contains("```"));
}

#[tokio::test]
async fn test_malformed_response_rejected_twice_leaves_document() {
    let (_dir, store) = seeded_project();
    let agent = Arc::new(ScriptedAgent::new([
        ScriptedReply::respond("<section><h1>Broken</section>"),
        ScriptedReply::respond("<!-- START: hero --><div>nested <!-- START: x --></div>"),
    ]));

    let report = orchestrator(agent.clone(), &store)
        .regenerate_sections(&["hero"], None)
        .await
        .unwrap();

    assert_eq!(report.outcome(), Outcome::Failed);
    let failure = report.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::ValidationRejected);
    assert_eq!(report.phases()[0].status, PhaseStatus::Failed);
    assert_eq!(report.phases()[0].attempts, 2);

    let requests = agent.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].prompt.contains("YOUR PREVIOUS RESPONSE WAS REJECTED"));

    let saved = store.load().unwrap();
    assert_eq!(saved.document, PAGE);
    assert_eq!(saved.history.len(), 1);
    assert_eq!(saved.history[0].outcome, Outcome::Failed);
    assert!(saved.history[0].affected_sections.is_empty());
}

#[tokio::test]
async fn test_theme_change_timeout_keeps_earlier_phases() {
    let (_dir, store) = seeded_project();
    let agent = Arc::new(
        ScriptedAgent::new([])
            .with_phase(
                "design_system",
                [ScriptedReply::respond(r##"{"palette": ["#000", "#fff"]}"##)],
            )
            .with_phase(
                "high_fidelity",
                [ScriptedReply::respond(r#"{"hero": {"layout": "split"}}"#)],
            )
            .with_phase("implementation", [ScriptedReply::Hang]),
    );
    let config = OrchestratorConfig {
        timeout: Duration::from_millis(200),
        cancel_grace: Duration::from_secs(2),
        ..Default::default()
    };
    let orchestrator = GenerationOrchestrator::new(agent.clone(), store.clone(), config);

    let report = orchestrator.change_theme("brutalist").await.unwrap();

    assert_eq!(report.outcome(), Outcome::Partial);
    assert_eq!(report.failure().unwrap().kind, FailureKind::AgentTimeout);
    assert_eq!(report.failure().unwrap().phase, "implementation");
    assert_eq!(agent.cancelled_hangs(), 1);
    assert_eq!(report.failed.len(), 3);

    let saved = store.load().unwrap();
    assert_eq!(saved.document, PAGE);
    assert_eq!(saved.metadata.theme, "minimal");
    assert!(saved.artifacts.contains_key("design_system"));
    assert!(saved.artifacts.contains_key("hifi_design"));
    let op = saved.last_operation().unwrap();
    assert_eq!(op.kind, OperationKind::ThemeChange);
    assert_eq!(op.phases.len(), 3);
    assert_eq!(op.detail.as_deref(), Some("minimal -> brutalist"));
}

#[tokio::test]
async fn test_theme_change_success_updates_theme() {
    let (_dir, store) = seeded_project();
    let agent = Arc::new(ScriptedAgent::new([
        ScriptedReply::respond(r##"{"palette": ["#111"]}"##),
        ScriptedReply::respond(r#"{"hero": {}}"#),
        ScriptedReply::respond(NEW_PAGE),
    ]));

    let report = orchestrator(agent, &store).change_theme("bold").await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.updated.iter().collect::<Vec<_>>(), vec!["hero"]);
    assert!(report.untouched.contains("pricing"));
    let saved = store.load().unwrap();
    assert_eq!(saved.metadata.theme, "bold");
    assert!(saved.document.contains("Bold"));
}

#[tokio::test]
async fn test_unscoped_edit_replaces_document() {
    let (_dir, store) = seeded_project();
    let agent = Arc::new(ScriptedAgent::new([ScriptedReply::respond(NEW_PAGE)]));

    let report = orchestrator(agent.clone(), &store)
        .edit_content("Make the headline bolder", None)
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.updated.iter().collect::<Vec<_>>(), vec!["hero"]);
    let saved = store.load().unwrap();
    assert_eq!(saved.history[0].kind, OperationKind::Edit);
    assert_eq!(
        saved.history[0].detail.as_deref(),
        Some("Make the headline bolder")
    );
    assert!(agent.requests()[0].prompt.contains("Make the headline bolder"));
}

#[tokio::test]
async fn test_scoped_edit_unknown_section() {
    let (_dir, store) = seeded_project();
    let agent = Arc::new(ScriptedAgent::new([]));

    let scope = vec!["faq".to_string()];
    let err = orchestrator(agent.clone(), &store)
        .edit_content("Shorter", Some(&scope))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::UnknownSection { .. }));
    assert_eq!(agent.calls(), 0);
    assert!(store.load().unwrap().history.is_empty());
}

#[tokio::test]
async fn test_agent_failure_is_recorded() {
    let (_dir, store) = seeded_project();
    let agent = Arc::new(ScriptedAgent::new([ScriptedReply::fail("rate limited")]));

    let report = orchestrator(agent.clone(), &store)
        .regenerate_sections(&["pricing"], None)
        .await
        .unwrap();

    assert_eq!(report.outcome(), Outcome::Failed);
    assert_eq!(report.failure().unwrap().kind, FailureKind::AgentError);
    assert_eq!(agent.calls(), 1);
    assert!(matches!(
        report.into_result(),
        Err(PipelineError::PhaseFailed { .. })
    ));
}

#[tokio::test]
async fn test_form_change_sets_include_forms() {
    let (_dir, store) = seeded_project();
    let with_form = NEW_PAGE.replace(
        "<section><p>$9 / month</p></section>",
        "<form><input name=\"email\"><button>Join</button></form>",
    );
    let agent = Arc::new(ScriptedAgent::new([ScriptedReply::respond(with_form)]));

    let change = FormChange::Edit {
        form_type: FormType::Newsletter,
        fields: Vec::new(),
        style: None,
        cta: Some("Join".to_string()),
    };
    let report = orchestrator(agent.clone(), &store)
        .change_forms(change)
        .await
        .unwrap();

    assert!(report.is_success());
    let saved = store.load().unwrap();
    assert!(saved.metadata.include_forms);
    assert_eq!(saved.history[0].kind, OperationKind::FormChange);
    assert!(agent.requests()[0].phase == "forms");
}

#[tokio::test]
async fn test_generate_fast_mode() {
    let dir = TempDir::new().unwrap();
    let store = ProjectStore::new(dir.path().join("output"));
    let agent = Arc::new(ScriptedAgent::new([ScriptedReply::with_usage(
        format!("```html\n{}\n```", PAGE),
        2000,
        1500,
    )]));

    let report = orchestrator(agent.clone(), &store)
        .generate(GenerateRequest::new("Rockets for hobbyists").with_mode(GenerationMode::Fast))
        .await
        .unwrap();

    assert!(report.is_success());
    assert!(report.persisted);
    assert_eq!(agent.calls(), 1);
    assert_eq!(agent.requests()[0].phase, "landing_page");

    let saved = store.load().unwrap();
    assert_eq!(saved.sections, vec!["hero", "features", "pricing"]);
    assert_eq!(saved.metadata.generation_mode, GenerationMode::Fast);
    assert_eq!(saved.history.len(), 1);
    assert_eq!(saved.history[0].kind, OperationKind::Generate);
    assert_eq!(saved.history[0].affected_sections.len(), 3);
    assert_eq!(saved.total_usage.input_tokens, 2000);
}

#[tokio::test]
async fn test_generate_full_mode_runs_every_phase() {
    let dir = TempDir::new().unwrap();
    let store = ProjectStore::new(dir.path().join("output"));
    let mut replies: Vec<ScriptedReply> = (0..8)
        .map(|i| ScriptedReply::with_usage(format!(r#"{{"step": {}}}"#, i), 100, 50))
        .collect();
    replies.push(ScriptedReply::with_usage(PAGE, 100, 50));
    let agent = Arc::new(ScriptedAgent::new(replies));

    let request = GenerateRequest::new("Rockets for hobbyists")
        .with_reference_urls(vec!["https://example.com".to_string()]);
    let report = orchestrator(agent.clone(), &store)
        .generate(request)
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(agent.calls(), 9);
    assert_eq!(report.phases().len(), 9);
    assert_eq!(report.usage().input_tokens, 900);

    let saved = store.load().unwrap();
    for key in [
        "product_understanding",
        "user_research",
        "site_flow",
        "content_strategy",
        "wireframes",
        "design_system",
        "hifi_design",
        "final_copy",
    ] {
        assert!(saved.artifacts.contains_key(key), "missing artifact {}", key);
    }
    assert_eq!(saved.metadata.reference_urls, vec!["https://example.com"]);
}

#[tokio::test]
async fn test_generate_failure_saves_nothing() {
    let dir = TempDir::new().unwrap();
    let store = ProjectStore::new(dir.path().join("output"));
    let agent = Arc::new(ScriptedAgent::new([
        ScriptedReply::respond("no page here"),
        ScriptedReply::respond("still no page"),
    ]));

    let report = orchestrator(agent, &store)
        .generate(GenerateRequest::new("Rockets").with_mode(GenerationMode::Fast))
        .await
        .unwrap();

    assert_eq!(report.outcome(), Outcome::Failed);
    assert!(!report.persisted);
    assert!(!store.exists());
}
