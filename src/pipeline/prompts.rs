//! Prompt builders for each phase.
//!
//! Prompts are deliberately short: each names its inputs, the prior phase
//! outputs it builds on, and the exact shape the validator will accept.

use super::forms::FormChange;
use super::phase::{PhaseId, PhaseSpec, PhaseTarget};
use crate::sections::semantic_order;
use crate::validate::ArtifactKind;
use serde_json::Value;
use std::collections::BTreeMap;

/// Everything a prompt may draw on.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub description: &'a str,
    pub theme: &'a str,
    pub framework: &'a str,
    pub include_forms: bool,
    pub reference_urls: &'a [String],
    /// Outputs of earlier phases, keyed by artifact key
    pub artifacts: &'a BTreeMap<String, Value>,
    /// Section names for a fresh page
    pub default_sections: &'a [String],
    /// Current page, when one exists
    pub document: Option<&'a str>,
    /// Current bodies of the sections being rewritten
    pub current_bodies: Option<&'a BTreeMap<String, String>>,
    /// Edit instruction or regeneration guidance
    pub instruction: Option<&'a str>,
    pub form_change: Option<&'a FormChange>,
}

const DOCUMENT_SHAPE: &str = "Return one complete HTML document with <html>, <head> and <body>. \
Wrap every top-level section in markers: <!-- START: name --> ... <!-- END: name -->, \
names lowercase, each used once, never nested. Output only the HTML.";

fn artifact_block(ctx: &PromptContext<'_>, keys: &[&str]) -> String {
    let mut out = String::new();
    for key in keys {
        if let Some(value) = ctx.artifacts.get(*key) {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => serde_json::to_string(other).unwrap_or_default(),
            };
            out.push_str(&format!("\n## {}\n{}\n", key, rendered));
        }
    }
    out
}

fn json_task(ctx: &PromptContext<'_>, task: &str, shape: &str, keys: &[&str]) -> String {
    let references = if ctx.reference_urls.is_empty() {
        String::new()
    } else {
        format!("References: {}\n", ctx.reference_urls.join(", "))
    };
    format!(
        "Product: {}\n{}{}\nTask: {}\nRespond with JSON only, shaped like:\n{}",
        ctx.description,
        references,
        artifact_block(ctx, keys),
        task,
        shape
    )
}

fn forms_line(include_forms: bool) -> &'static str {
    if include_forms {
        "Include a working contact form (action=\"#\" method=\"POST\")."
    } else {
        "Do not include forms; CTAs use links."
    }
}

fn sections_shape(names: &[String]) -> String {
    let wrapped: Vec<String> = names
        .iter()
        .map(|n| format!("<!-- START: {n} -->\n...\n<!-- END: {n} -->"))
        .collect();
    format!(
        "Return only these sections, each wrapped in its markers, nothing else:\n{}",
        wrapped.join("\n")
    )
}

fn current_sections(ctx: &PromptContext<'_>) -> String {
    ctx.current_bodies
        .map(|bodies| {
            bodies
                .iter()
                .map(|(name, body)| format!("<!-- START: {name} -->{body}<!-- END: {name} -->"))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

/// Prompt for the first attempt of a phase.
pub fn build(spec: &PhaseSpec, ctx: &PromptContext<'_>) -> String {
    match (&spec.target, spec.id) {
        (_, PhaseId::Summarize) => format!(
            "Summarize this product description in 100-150 words, keeping every key feature and benefit:\n\n{}\n\nReturn only the summary.",
            ctx.description
        ),
        (_, PhaseId::ReferenceDiscovery) => format!(
            "Given this product: '{}', find 3 live product URLs of similar tools. Only list working websites, not blogs. Format: Name - URL - short note.",
            ctx.description
        ),
        (_, PhaseId::ProductUnderstanding) => json_task(
            ctx,
            "Analyse the product. Be concise and focus on user pain.",
            r#"{"problem": "", "user": "", "differentiator": "", "best_feature": "", "risks": ""}"#,
            &["reference_discovery"],
        ),
        (_, PhaseId::EmpathyMapping) => json_task(
            ctx,
            "Build an empathy map and two user personas.",
            r#"{"empathy_map": {"says": [], "thinks": [], "does": [], "feels": []}, "personas": [], "pain_points": []}"#,
            &["product_understanding"],
        ),
        (_, PhaseId::SiteFlow) => json_task(
            ctx,
            "Define the value proposition and the page flow from first visit to conversion.",
            r#"{"value_proposition": "", "sections": [], "user_journey": []}"#,
            &["product_understanding", "user_research"],
        ),
        (_, PhaseId::ContentStrategy) => json_task(
            ctx,
            "Plan the messaging for every section of the flow.",
            r#"{"headline": "", "subheadline": "", "sections": {}}"#,
            &["user_research", "site_flow"],
        ),
        (_, PhaseId::Wireframe) => json_task(
            ctx,
            "Describe a mobile-first wireframe for each section.",
            r#"{"layout": "", "sections": {}}"#,
            &["site_flow", "content_strategy"],
        ),
        (_, PhaseId::DesignSystem) => json_task(
            ctx,
            &format!("Define a design system for the '{}' theme.", ctx.theme),
            r#"{"colors": {}, "typography": {}, "spacing": {}, "components": {}}"#,
            &["wireframes", "content_strategy"],
        ),
        (_, PhaseId::HighFidelity) => json_task(
            ctx,
            "Refine the wireframes into a high-fidelity design using the design system.",
            r#"{"sections": {}, "interactions": []}"#,
            &["design_system", "wireframes"],
        ),
        (_, PhaseId::Prototype) => json_task(
            ctx,
            "Write the final copy for every section.",
            r#"{"sections": {}, "cta": {}}"#,
            &["content_strategy", "hifi_design"],
        ),
        (_, PhaseId::Implementation) => format!(
            "Product: {}\nTheme: {}\nFramework: {} with Tailwind CSS\n{}\nTask: Implement the landing page from the design above. {}\n{}",
            ctx.description,
            ctx.theme,
            ctx.framework,
            artifact_block(ctx, &["final_copy", "design_system", "hifi_design"]),
            forms_line(ctx.include_forms),
            DOCUMENT_SHAPE
        ),
        (_, PhaseId::LandingPage) => format!(
            "Product: {}\nTheme: {}\nFramework: {} with Tailwind CSS\nSections: {}\nTask: Write a complete, responsive landing page. {}\n{}",
            ctx.description,
            ctx.theme,
            ctx.framework,
            semantic_order(ctx.default_sections).join(", "),
            forms_line(ctx.include_forms),
            DOCUMENT_SHAPE
        ),
        (PhaseTarget::Sections(names), PhaseId::Edit) => format!(
            "Product: {}\nTheme: {}\nEdit instruction: {}\n\nCurrent sections:\n{}\n\nApply the instruction to these sections only, keeping their style.\n{}",
            ctx.description,
            ctx.theme,
            ctx.instruction.unwrap_or_default(),
            current_sections(ctx),
            sections_shape(names)
        ),
        (PhaseTarget::Sections(names), _) => format!(
            "Product: {}\nTheme: {}\nFramework: {}\n{}\nCurrent sections:\n{}\n\nRegenerate these sections with fresh content that matches the rest of the page.\n{}",
            ctx.description,
            ctx.theme,
            ctx.framework,
            ctx.instruction
                .map(|i| format!("Guidance: {}\n", i))
                .unwrap_or_default(),
            current_sections(ctx),
            sections_shape(names)
        ),
        (_, PhaseId::Forms) => format!(
            "Theme: {}\nTask: {}\n\nCurrent page:\n{}\n\nKeep everything else unchanged, including section markers.\n{}",
            ctx.theme,
            forms_task(ctx),
            ctx.document.unwrap_or_default(),
            DOCUMENT_SHAPE
        ),
        (_, _) => format!(
            "Product: {}\nTheme: {}\nEdit instruction: {}\n\nCurrent page:\n{}\n\nApply the instruction, keeping everything else unchanged, including section markers.\n{}",
            ctx.description,
            ctx.theme,
            ctx.instruction.unwrap_or_default(),
            ctx.document.unwrap_or_default(),
            DOCUMENT_SHAPE
        ),
    }
}

fn forms_task(ctx: &PromptContext<'_>) -> String {
    match ctx.form_change {
        Some(FormChange::Add) | None => format!(
            "Add a contact or signup form that suits the product ({}) where it fits the page flow.",
            ctx.description
        ),
        Some(FormChange::Remove) => {
            "Remove every form, replacing form CTAs with mailto or anchor links.".to_string()
        }
        Some(change @ FormChange::Edit {
            form_type,
            style,
            cta,
            ..
        }) => {
            let fields = change
                .effective_fields()
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            let mut task = format!(
                "Replace the existing forms with one {} form ({}) with fields: {}.",
                form_type,
                form_type.describe(),
                fields
            );
            if let Some(style) = style {
                task.push_str(&format!(" Present it {} ({}).", style, style.describe()));
            }
            if let Some(cta) = cta {
                task.push_str(&format!(" Submit button text: \"{}\".", cta));
            }
            task
        }
    }
}

/// Retry prompt: the original plus the rejection reason and the required shape.
pub fn amend(prompt: &str, reason: &str, target: &PhaseTarget) -> String {
    let shape = match target {
        PhaseTarget::Artifact(ArtifactKind::Json) => "a single JSON object and nothing else".to_string(),
        PhaseTarget::Artifact(ArtifactKind::Text) => "plain text".to_string(),
        PhaseTarget::Document => {
            "one complete HTML document with balanced tags and well-formed section markers".to_string()
        }
        PhaseTarget::Sections(names) => format!(
            "exactly these marker-wrapped sections with balanced tags: {}",
            names.join(", ")
        ),
    };
    format!(
        "{}\n\nYOUR PREVIOUS RESPONSE WAS REJECTED: {}.\nRespond again with {}.",
        prompt, reason, shape
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::forms::{FormField, FormStyle, FormType};
    use crate::pipeline::phase::{PhaseSpec, full_plan};

    fn ctx<'a>(artifacts: &'a BTreeMap<String, Value>, sections: &'a [String]) -> PromptContext<'a> {
        PromptContext {
            description: "AI note taking app",
            theme: "minimal",
            framework: "html",
            include_forms: false,
            reference_urls: &[],
            artifacts,
            default_sections: sections,
            document: None,
            current_bodies: None,
            instruction: None,
            form_change: None,
        }
    }

    #[test]
    fn test_every_full_plan_phase_has_a_prompt() {
        let artifacts = BTreeMap::new();
        let sections = vec!["hero".to_string()];
        for spec in full_plan(true, true) {
            let prompt = build(&spec, &ctx(&artifacts, &sections));
            assert!(!prompt.is_empty());
            assert!(prompt.contains("AI note taking app"), "{} omits product", spec.id);
        }
    }

    #[test]
    fn test_prompts_carry_prior_artifacts() {
        let mut artifacts = BTreeMap::new();
        artifacts.insert("user_research".to_string(), serde_json::json!({"personas": ["Ana"]}));
        let sections = Vec::new();
        let spec = PhaseSpec::artifact(PhaseId::SiteFlow, ArtifactKind::Json);
        let prompt = build(&spec, &ctx(&artifacts, &sections));
        assert!(prompt.contains("## user_research"));
        assert!(prompt.contains("Ana"));
    }

    #[test]
    fn test_sections_prompt_lists_markers() {
        let artifacts = BTreeMap::new();
        let sections = Vec::new();
        let bodies = BTreeMap::from([("hero".to_string(), "<h1>Old</h1>".to_string())]);
        let mut context = ctx(&artifacts, &sections);
        context.current_bodies = Some(&bodies);
        let spec = PhaseSpec::sections(PhaseId::Regenerate, vec!["hero".to_string()]);
        let prompt = build(&spec, &context);
        assert!(prompt.contains("<!-- START: hero -->\n...\n<!-- END: hero -->"));
        assert!(prompt.contains("<h1>Old</h1>"));
    }

    #[test]
    fn test_form_edit_prompt() {
        let artifacts = BTreeMap::new();
        let sections = Vec::new();
        let change = FormChange::Edit {
            form_type: FormType::Newsletter,
            fields: vec![FormField::Email, FormField::Name],
            style: Some(FormStyle::Modal),
            cta: Some("Join".to_string()),
        };
        let mut context = ctx(&artifacts, &sections);
        context.form_change = Some(&change);
        context.document = Some("<html></html>");
        let prompt = build(&PhaseSpec::document(PhaseId::Forms), &context);
        assert!(prompt.contains("newsletter form"));
        assert!(prompt.contains("fields: email, name"));
        assert!(prompt.contains("Present it modal"));
        assert!(prompt.contains("\"Join\""));
    }

    #[test]
    fn test_amend_names_reason_and_shape() {
        let target = PhaseTarget::Sections(vec!["hero".to_string(), "cta".to_string()]);
        let amended = amend("base", "response is missing section 'cta'", &target);
        assert!(amended.starts_with("base\n\n"));
        assert!(amended.contains("missing section 'cta'"));
        assert!(amended.contains("hero, cta"));
    }
}
