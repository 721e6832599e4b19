use serde::Deserialize;
use serde_json::Value;

use super::AgentResponse;

/// Events from Claude CLI's stream-json output format
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "assistant")]
    Assistant { message: AssistantMessage },

    #[serde(rename = "result")]
    Result {
        #[serde(default)]
        subtype: String,
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        usage: Option<StreamUsage>,
        #[serde(default)]
        total_cost_usd: Option<f64>,
    },

    #[serde(rename = "system")]
    System {
        #[serde(default)]
        subtype: String,
    },

    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "tool_use")]
    ToolUse {
        name: String,
        #[serde(default)]
        input: Value,
    },

    #[serde(rename = "text")]
    Text { text: String },

    #[serde(other)]
    Other,
}

/// Token counts from the final `result` event.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct StreamUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
}

impl StreamUsage {
    /// Input tokens including prompt-cache reads and writes.
    pub fn total_input(&self) -> u64 {
        self.input_tokens + self.cache_creation_input_tokens + self.cache_read_input_tokens
    }
}

/// Folds stream-json lines into one response.
#[derive(Debug, Default)]
pub struct StreamSummary {
    accumulated_text: String,
    final_result: Option<String>,
    usage: StreamUsage,
    cost: Option<f64>,
    error: Option<String>,
}

impl StreamSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one stdout line. Returns a short activity note for display,
    /// if the line carried one.
    pub fn feed_line(&mut self, line: &str) -> Option<String> {
        if line.trim().is_empty() {
            return None;
        }
        match serde_json::from_str::<StreamEvent>(line) {
            Ok(StreamEvent::Assistant { message }) => {
                let mut activity = None;
                for block in message.content {
                    match block {
                        ContentBlock::Text { text } => {
                            let snippet = truncate_thinking(&text, 60);
                            if !snippet.is_empty() {
                                activity = Some(snippet);
                            }
                            self.accumulated_text.push_str(&text);
                            self.accumulated_text.push('\n');
                        }
                        ContentBlock::ToolUse { name, input } => {
                            activity = Some(describe_tool_use(&name, &input));
                        }
                        ContentBlock::Other => {}
                    }
                }
                activity
            }
            Ok(StreamEvent::Result {
                subtype,
                result,
                is_error,
                usage,
                total_cost_usd,
            }) => {
                if is_error {
                    self.error = Some(
                        result
                            .clone()
                            .filter(|r| !r.trim().is_empty())
                            .unwrap_or(subtype),
                    );
                }
                self.final_result = result;
                if let Some(usage) = usage {
                    self.usage = usage;
                }
                self.cost = total_cost_usd;
                None
            }
            Ok(StreamEvent::System { .. }) | Ok(StreamEvent::Other) => None,
            Err(_) => {
                // Not stream-json; plain `--print` output
                self.accumulated_text.push_str(line);
                self.accumulated_text.push('\n');
                None
            }
        }
    }

    /// Error message when the final result event was flagged as an error.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn finish(self) -> AgentResponse {
        AgentResponse {
            content: self.final_result.unwrap_or(self.accumulated_text),
            input_tokens: self.usage.total_input(),
            output_tokens: self.usage.output_tokens,
            cost: self.cost,
        }
    }
}

/// Extract a human-readable description from a tool use event
pub fn describe_tool_use(name: &str, input: &Value) -> String {
    let field = |key: &str| input.get(key).and_then(|v| v.as_str());
    match name {
        "Read" => format!("Reading: {}", field("file_path").map(shorten_path).unwrap_or_else(|| "file".into())),
        "Write" => format!("Creating: {}", field("file_path").map(shorten_path).unwrap_or_else(|| "file".into())),
        "WebFetch" => format!("Fetching: {}", field("url").map(|u| truncate_str(u, 40)).unwrap_or_else(|| "page".into())),
        "WebSearch" => format!("Searching: {}", field("query").map(|q| truncate_str(q, 40)).unwrap_or_else(|| "web".into())),
        _ => name.to_string(),
    }
}

/// Shorten a file path to just the last 2 components
fn shorten_path(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() <= 2 {
        path.to_string()
    } else {
        parts[parts.len() - 2..].join("/")
    }
}

fn truncate_str(s: &str, max_len: usize) -> String {
    crate::util::truncate_chars(s, max_len)
}

/// First line of a text block, shortened for a spinner message.
pub fn truncate_thinking(text: &str, max_len: usize) -> String {
    let first_line = text.lines().next().unwrap_or(text);
    truncate_str(first_line.trim(), max_len)
}
