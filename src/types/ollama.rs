//! Ollama-compatible request/response types
//!
//! `stream`, `options` and friends are accepted so stock Ollama clients can
//! talk to the server, but responses are always returned in one piece.

use serde::{Deserialize, Serialize};

use super::chat::Role;
use crate::gateway::AnalysisResult;

// ============================================================================
// Chat
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct OllamaChatRequest {
    #[serde(default)]
    pub model: Option<String>,
    pub messages: Vec<OllamaMessage>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OllamaMessage {
    pub role: Role,
    pub content: OllamaContent,
    /// Base64 images (or URLs) attached to a plain-string message
    #[serde(default)]
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OllamaContent {
    Text(String),
    Parts(Vec<OllamaContentPart>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OllamaContentPart {
    Text { text: String },
    /// Base64 blob or absolute URL
    Image { image: String },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Serialize)]
pub struct OllamaChatResponse {
    pub model: String,
    pub created_at: String,
    pub message: OllamaResponseMessage,
    pub done: bool,
    pub done_reason: String,
    pub total_duration: u64,
    pub prompt_eval_count: u32,
    pub eval_count: u32,
}

#[derive(Debug, Serialize)]
pub struct OllamaResponseMessage {
    pub role: Role,
    pub content: String,
}

impl OllamaChatResponse {
    pub fn from_analysis(model: String, result: &AnalysisResult) -> Self {
        Self {
            model,
            created_at: crate::utils::utc_timestamp(),
            message: OllamaResponseMessage {
                role: Role::Assistant,
                content: result.text.clone(),
            },
            done: true,
            done_reason: "stop".to_string(),
            total_duration: result.elapsed_nanos,
            prompt_eval_count: result.prompt_token_estimate,
            eval_count: result.completion_token_estimate,
        }
    }
}

// ============================================================================
// Generate
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct OllamaGenerateRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub prompt: String,
    /// Base64-encoded images; each one is analyzed with the same prompt
    #[serde(default)]
    pub images: Option<Vec<String>>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub options: Option<serde_json::Value>,
}

/// Durations are in nanoseconds, counts are character lengths
#[derive(Debug, Serialize)]
pub struct OllamaGenerateResponse {
    pub model: String,
    pub created_at: String,
    pub response: String,
    pub done: bool,
    pub context: Vec<u32>,
    pub total_duration: u64,
    pub load_duration: u64,
    pub prompt_eval_count: usize,
    pub prompt_eval_duration: u64,
    pub eval_count: usize,
    pub eval_duration: u64,
}

/// Wall-clock phases of a generate call
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateTimings {
    pub total: u64,
    pub load: u64,
    pub prompt_eval: u64,
}

impl OllamaGenerateResponse {
    pub fn new(model: String, prompt: &str, answer: String, timings: GenerateTimings) -> Self {
        Self {
            model,
            created_at: crate::utils::utc_timestamp(),
            prompt_eval_count: prompt.chars().count(),
            eval_count: answer.chars().count(),
            response: answer,
            done: true,
            context: Vec::new(),
            total_duration: timings.total,
            load_duration: timings.load,
            prompt_eval_duration: timings.prompt_eval,
            eval_duration: timings
                .total
                .saturating_sub(timings.load)
                .saturating_sub(timings.prompt_eval),
        }
    }
}

// ============================================================================
// Show
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct OllamaShowRequest {
    #[serde(alias = "name")]
    pub model: String,
    #[serde(default)]
    pub verbose: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaShowResponse {
    pub license: String,
    pub modelfile: String,
    pub parameters: String,
    pub template: String,
    pub details: OllamaModelDetails,
    pub model_info: serde_json::Value,
    pub modified_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaModelDetails {
    pub parent_model: String,
    pub format: String,
    pub family: String,
    pub families: Vec<String>,
    pub parameter_size: String,
    pub quantization_level: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_string_content_with_images() {
        let request: OllamaChatRequest = serde_json::from_value(json!({
            "model": "moondream",
            "messages": [{"role": "user", "content": "describe this", "images": ["aGVsbG8="]}]
        }))
        .unwrap();

        let message = &request.messages[0];
        assert!(matches!(&message.content, OllamaContent::Text(t) if t == "describe this"));
        assert_eq!(message.images.as_deref(), Some(&["aGVsbG8=".to_string()][..]));
    }

    #[test]
    fn parses_typed_parts() {
        let request: OllamaChatRequest = serde_json::from_value(json!({
            "messages": [{"role": "user", "content": [
                {"type": "image", "image": "https://example.com/cat.png"},
                {"type": "text", "text": "what is it?"},
                {"type": "thinking", "thinking": "hmm"}
            ]}]
        }))
        .unwrap();

        let OllamaContent::Parts(parts) = &request.messages[0].content else {
            panic!("expected parts");
        };
        assert!(matches!(&parts[0], OllamaContentPart::Image { image } if image.starts_with("https://")));
        assert!(matches!(&parts[1], OllamaContentPart::Text { text } if text == "what is it?"));
        assert!(matches!(parts[2], OllamaContentPart::Unsupported));
    }

    #[test]
    fn generate_eval_duration_is_the_remainder() {
        let response = OllamaGenerateResponse::new(
            "moondream".to_string(),
            "héllo",
            "a dog".to_string(),
            GenerateTimings {
                total: 1_000,
                load: 100,
                prompt_eval: 850,
            },
        );
        assert_eq!(response.eval_duration, 50);
        assert_eq!(response.prompt_eval_count, 5);
        assert_eq!(response.eval_count, 5);
        assert!(response.done);
        assert!(response.context.is_empty());
    }

    #[test]
    fn show_request_accepts_name_alias() {
        let request: OllamaShowRequest = serde_json::from_value(json!({"name": "moondream"})).unwrap();
        assert_eq!(request.model, "moondream");
    }
}
