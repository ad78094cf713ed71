//! Provider-independent call options.

use serde_json::Value;

/// A tool advertised to the model, in neutral form. Codecs emit the
/// provider-native shape (`tools[].function`, `input_schema`,
/// `functionDeclarations`).
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema for the tool parameters.
    pub parameters: Value,
}

/// Options recognized by every provider. Anything provider-specific goes
/// through [`CallOptions::provider_options`], whose schema is the concern
/// of the wire codec.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub max_output_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub tools: Vec<ToolDefinition>,
    pub provider_options: serde_json::Map<String, Value>,
}

impl CallOptions {
    /// Reasoning token budget, when set. Maps to Anthropic
    /// `thinking.budget_tokens` and Google `thinkingConfig.thinkingBudget`.
    pub fn thinking_budget(&self) -> Option<u32> {
        self.provider_options
            .get("thinking_budget")
            .and_then(Value::as_u64)
            .map(|value| value as u32)
    }

    /// OpenAI-style reasoning effort, passed through as-is.
    pub fn reasoning_effort(&self) -> Option<&str> {
        self.provider_options
            .get("reasoning_effort")
            .and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn reasoning_knobs_read_from_provider_options() {
        let mut options = CallOptions::default();
        assert_eq!(options.thinking_budget(), None);

        options
            .provider_options
            .insert("thinking_budget".to_string(), json!(2048));
        options
            .provider_options
            .insert("reasoning_effort".to_string(), json!("high"));

        assert_eq!(options.thinking_budget(), Some(2048));
        assert_eq!(options.reasoning_effort(), Some("high"));
    }
}
