use super::{Agent, AgentRequest, AgentResponse};
use crate::errors::AgentError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

/// One canned agent outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScriptedReply {
    Respond {
        content: String,
        #[serde(default)]
        input_tokens: u64,
        #[serde(default)]
        output_tokens: u64,
        #[serde(default)]
        cost: Option<f64>,
    },
    Fail {
        message: String,
    },
    /// Never answers; returns only once cancelled.
    Hang,
}

impl ScriptedReply {
    pub fn respond(content: impl Into<String>) -> Self {
        Self::with_usage(content, 0, 0)
    }

    pub fn with_usage(content: impl Into<String>, input_tokens: u64, output_tokens: u64) -> Self {
        ScriptedReply::Respond {
            content: content.into(),
            input_tokens,
            output_tokens,
            cost: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        ScriptedReply::Fail {
            message: message.into(),
        }
    }
}

/// Replay file layout: one queue for every call, or one queue per phase.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReplayFile {
    Sequence(Vec<ScriptedReply>),
    ByPhase(BTreeMap<String, Vec<ScriptedReply>>),
}

/// Agent that answers from prepared queues.
///
/// A reply queued for the request's phase wins over the shared queue.
#[derive(Debug, Default)]
pub struct ScriptedAgent {
    shared: Mutex<VecDeque<ScriptedReply>>,
    by_phase: Mutex<BTreeMap<String, VecDeque<ScriptedReply>>>,
    requests: Mutex<Vec<AgentRequest>>,
    cancelled_hangs: AtomicUsize,
}

impl ScriptedAgent {
    pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            shared: Mutex::new(replies.into_iter().collect()),
            ..Default::default()
        }
    }

    /// Queue replies for one phase.
    pub fn with_phase(self, phase: &str, replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        if let Ok(mut by_phase) = self.by_phase.lock() {
            by_phase
                .entry(phase.to_string())
                .or_default()
                .extend(replies);
        }
        self
    }

    /// Load a replay file (JSON array, or object of phase → array).
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay file {}", path.display()))?;
        let replay: ReplayFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse replay file {}", path.display()))?;
        Ok(match replay {
            ReplayFile::Sequence(replies) => Self::new(replies),
            ReplayFile::ByPhase(phases) => phases
                .into_iter()
                .fold(Self::default(), |agent, (phase, replies)| {
                    agent.with_phase(&phase, replies)
                }),
        })
    }

    /// Number of invocations so far.
    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<AgentRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Hanging replies that were released by cancellation.
    pub fn cancelled_hangs(&self) -> usize {
        self.cancelled_hangs.load(Ordering::SeqCst)
    }

    fn next_reply(&self, phase: &str) -> Option<ScriptedReply> {
        let from_phase = self
            .by_phase
            .lock()
            .ok()
            .and_then(|mut by_phase| by_phase.get_mut(phase).and_then(VecDeque::pop_front));
        from_phase.or_else(|| self.shared.lock().ok().and_then(|mut q| q.pop_front()))
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn invoke(
        &self,
        request: &AgentRequest,
        cancel: &CancellationToken,
    ) -> Result<AgentResponse, AgentError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        match self.next_reply(&request.phase) {
            Some(ScriptedReply::Respond {
                content,
                input_tokens,
                output_tokens,
                cost,
            }) => Ok(AgentResponse {
                content,
                input_tokens,
                output_tokens,
                cost,
            }),
            Some(ScriptedReply::Fail { message }) => Err(AgentError::Reported(message)),
            Some(ScriptedReply::Hang) => {
                cancel.cancelled().await;
                self.cancelled_hangs.fetch_add(1, Ordering::SeqCst);
                Err(AgentError::Cancelled)
            }
            None => Err(AgentError::Reported(format!(
                "no scripted reply left for phase '{}'",
                request.phase
            ))),
        }
    }
}
