//! Results returned by capability invocations.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Arguments passed to a tool or prompt.
pub type ToolArguments = Map<String, Value>;

/// Successful result of a tool call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallOutput {
    /// Content blocks as returned by the server.
    pub content: Vec<Value>,
    /// Optional structured result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
}

impl ToolCallOutput {
    /// Creates an output holding a single text block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![serde_json::json!({"type": "text", "text": text.into()})],
            structured_content: None,
        }
    }
}

/// Contents of a read resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceReadOutput {
    /// Requested URI.
    pub uri: String,
    /// Content entries as returned by the server.
    pub contents: Vec<Value>,
}

/// Rendered prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptOutput {
    /// Optional prompt description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Rendered messages.
    pub messages: Vec<Value>,
}
