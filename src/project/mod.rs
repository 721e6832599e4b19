//! Durable project state.
//!
//! A project directory holds the generated page (`index.html`) and its record
//! (`design_analysis.json`): metadata, analysis artifacts and the append-only
//! operation history.

pub mod discover;
pub mod record;
pub mod store;

pub use discover::{ProjectSummary, discover_projects, is_project_dir, next_output_dir, project_name};
pub use record::{
    GenerationMode, OperationKind, OperationRecord, Outcome, PhaseFailure, PhaseStatus,
    PhaseSummary, ProjectMetadata, ProjectRecord,
};
pub use store::{DOCUMENT_FILE, FORMAT_VERSION, ProjectStore, RECORD_FILE, fingerprint};
