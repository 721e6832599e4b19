//! Generation pipeline: phases, prompts and the orchestrator that runs them.
//!
//! Each phase goes through [`PhaseState`]: a prompt is built from the outputs
//! of earlier phases, the agent is invoked under a deadline, the response is
//! validated (and retried with an amended prompt when rejected), merged into
//! the checked-out project, and recorded. A failed phase stops the remaining
//! phases; earlier phases stay committed.

pub mod forms;
pub mod orchestrator;
pub mod phase;
pub mod prompts;
pub mod state;

pub use forms::{FormChange, FormField, FormStyle, FormType, detect_forms, parse_fields};
pub use orchestrator::{GenerateRequest, GenerationOrchestrator, OperationReport, OrchestratorConfig};
pub use phase::{PhaseId, PhaseSpec, PhaseTarget};
pub use state::{PhaseMachine, PhaseState};
