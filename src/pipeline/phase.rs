//! Phase catalogue and plan builders.

use crate::validate::ArtifactKind;

/// Every phase the orchestrator knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseId {
    Summarize,
    ReferenceDiscovery,
    ProductUnderstanding,
    EmpathyMapping,
    SiteFlow,
    ContentStrategy,
    Wireframe,
    DesignSystem,
    HighFidelity,
    Prototype,
    Implementation,
    LandingPage,
    Regenerate,
    Edit,
    Forms,
}

impl PhaseId {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseId::Summarize => "summarize",
            PhaseId::ReferenceDiscovery => "reference_discovery",
            PhaseId::ProductUnderstanding => "product_understanding",
            PhaseId::EmpathyMapping => "empathy_mapping",
            PhaseId::SiteFlow => "site_flow",
            PhaseId::ContentStrategy => "content_strategy",
            PhaseId::Wireframe => "wireframe",
            PhaseId::DesignSystem => "design_system",
            PhaseId::HighFidelity => "high_fidelity",
            PhaseId::Prototype => "prototype",
            PhaseId::Implementation => "implementation",
            PhaseId::LandingPage => "landing_page",
            PhaseId::Regenerate => "regenerate",
            PhaseId::Edit => "edit",
            PhaseId::Forms => "forms",
        }
    }

    /// Key under which the phase output is stored in the project artifacts.
    pub fn artifact_key(&self) -> Option<&'static str> {
        match self {
            PhaseId::Summarize => Some("product_summary"),
            PhaseId::ReferenceDiscovery => Some("reference_discovery"),
            PhaseId::ProductUnderstanding => Some("product_understanding"),
            PhaseId::EmpathyMapping => Some("user_research"),
            PhaseId::SiteFlow => Some("site_flow"),
            PhaseId::ContentStrategy => Some("content_strategy"),
            PhaseId::Wireframe => Some("wireframes"),
            PhaseId::DesignSystem => Some("design_system"),
            PhaseId::HighFidelity => Some("hifi_design"),
            PhaseId::Prototype => Some("final_copy"),
            _ => None,
        }
    }

    /// Progress label.
    pub fn label(&self) -> &'static str {
        match self {
            PhaseId::Summarize => "Summarizing product description",
            PhaseId::ReferenceDiscovery => "Discovering reference products",
            PhaseId::ProductUnderstanding => "Understanding the product",
            PhaseId::EmpathyMapping => "Mapping user empathy",
            PhaseId::SiteFlow => "Defining site flow",
            PhaseId::ContentStrategy => "Planning content strategy",
            PhaseId::Wireframe => "Sketching wireframes",
            PhaseId::DesignSystem => "Building design system",
            PhaseId::HighFidelity => "Refining high-fidelity design",
            PhaseId::Prototype => "Writing final copy",
            PhaseId::Implementation => "Implementing landing page",
            PhaseId::LandingPage => "Generating landing page",
            PhaseId::Regenerate => "Regenerating sections",
            PhaseId::Edit => "Applying edit",
            PhaseId::Forms => "Updating forms",
        }
    }
}

impl std::fmt::Display for PhaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What an accepted phase output replaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseTarget {
    /// Stored as a project artifact, document untouched
    Artifact(ArtifactKind),
    /// Replaces the whole document
    Document,
    /// Merged into the named sections in one step
    Sections(Vec<String>),
}

/// One step of a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseSpec {
    pub id: PhaseId,
    pub target: PhaseTarget,
    /// A failed optional phase is recorded but does not stop the plan.
    pub optional: bool,
}

impl PhaseSpec {
    pub fn artifact(id: PhaseId, kind: ArtifactKind) -> Self {
        Self {
            id,
            target: PhaseTarget::Artifact(kind),
            optional: false,
        }
    }

    pub fn document(id: PhaseId) -> Self {
        Self {
            id,
            target: PhaseTarget::Document,
            optional: false,
        }
    }

    pub fn sections(id: PhaseId, names: Vec<String>) -> Self {
        Self {
            id,
            target: PhaseTarget::Sections(names),
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn is_document_phase(&self) -> bool {
        matches!(self.target, PhaseTarget::Document)
    }
}

/// Full design pipeline ending in the implementation phase.
pub fn full_plan(summarize: bool, discover_references: bool) -> Vec<PhaseSpec> {
    let mut plan = Vec::new();
    if summarize {
        plan.push(PhaseSpec::artifact(PhaseId::Summarize, ArtifactKind::Text).optional());
    }
    if discover_references {
        plan.push(PhaseSpec::artifact(PhaseId::ReferenceDiscovery, ArtifactKind::Text).optional());
    }
    plan.extend(
        [
            PhaseId::ProductUnderstanding,
            PhaseId::EmpathyMapping,
            PhaseId::SiteFlow,
            PhaseId::ContentStrategy,
            PhaseId::Wireframe,
            PhaseId::DesignSystem,
            PhaseId::HighFidelity,
            PhaseId::Prototype,
        ]
        .into_iter()
        .map(|id| PhaseSpec::artifact(id, ArtifactKind::Json)),
    );
    plan.push(PhaseSpec::document(PhaseId::Implementation));
    plan
}

/// Single landing-page pass.
pub fn fast_plan(summarize: bool) -> Vec<PhaseSpec> {
    let mut plan = Vec::new();
    if summarize {
        plan.push(PhaseSpec::artifact(PhaseId::Summarize, ArtifactKind::Text).optional());
    }
    plan.push(PhaseSpec::document(PhaseId::LandingPage));
    plan
}

/// Re-run the visual phases under a new theme.
pub fn theme_plan() -> Vec<PhaseSpec> {
    vec![
        PhaseSpec::artifact(PhaseId::DesignSystem, ArtifactKind::Json),
        PhaseSpec::artifact(PhaseId::HighFidelity, ArtifactKind::Json),
        PhaseSpec::document(PhaseId::Implementation),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(plan: &[PhaseSpec]) -> Vec<&'static str> {
        plan.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn test_full_plan_order() {
        let plan = full_plan(true, true);
        assert_eq!(
            ids(&plan),
            vec![
                "summarize",
                "reference_discovery",
                "product_understanding",
                "empathy_mapping",
                "site_flow",
                "content_strategy",
                "wireframe",
                "design_system",
                "high_fidelity",
                "prototype",
                "implementation"
            ]
        );
        assert!(plan[0].optional && plan[1].optional);
        assert!(!plan[2].optional);
        assert!(plan.last().unwrap().is_document_phase());
        assert_eq!(plan.iter().filter(|p| p.is_document_phase()).count(), 1);
    }

    #[test]
    fn test_conditional_phases_are_skipped() {
        assert_eq!(full_plan(false, false).len(), 9);
        assert_eq!(ids(&fast_plan(false)), vec!["landing_page"]);
        assert_eq!(ids(&fast_plan(true)), vec!["summarize", "landing_page"]);
    }

    #[test]
    fn test_artifact_keys() {
        assert_eq!(PhaseId::EmpathyMapping.artifact_key(), Some("user_research"));
        assert_eq!(PhaseId::Prototype.artifact_key(), Some("final_copy"));
        assert_eq!(PhaseId::Implementation.artifact_key(), None);
        for spec in full_plan(true, true) {
            if let PhaseTarget::Artifact(_) = spec.target {
                assert!(spec.id.artifact_key().is_some(), "{} has no key", spec.id);
            }
        }
    }

    #[test]
    fn test_theme_plan_reuses_research() {
        assert_eq!(
            ids(&theme_plan()),
            vec!["design_system", "high_fidelity", "implementation"]
        );
    }
}
