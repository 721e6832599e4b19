//! The external generative agent.
//!
//! The pipeline only ever talks to an [`Agent`]. [`ClaudeAgent`] drives the
//! `claude` CLI as a subprocess; [`ScriptedAgent`] replays canned responses for
//! tests and dry runs.

pub mod claude;
pub mod scripted;
pub mod stream;

pub use claude::ClaudeAgent;
pub use scripted::{ScriptedAgent, ScriptedReply};

use crate::errors::AgentError;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// One prompt for the agent, tagged with the phase that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRequest {
    pub phase: String,
    pub prompt: String,
}

impl AgentRequest {
    pub fn new(phase: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            prompt: prompt.into(),
        }
    }
}

/// What the agent returned, with its token counts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentResponse {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Cost in USD when the agent reports one
    pub cost: Option<f64>,
}

impl AgentResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// Contract for the external agent.
///
/// Implementations must return [`AgentError::Cancelled`] promptly once `cancel`
/// fires and must not leave a child process running afterwards. Deadlines are
/// enforced by the caller through the same token.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn invoke(
        &self,
        request: &AgentRequest,
        cancel: &CancellationToken,
    ) -> Result<AgentResponse, AgentError>;
}
