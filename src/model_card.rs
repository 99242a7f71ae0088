//! Mocked Ollama model metadata served by `/api/show`

use serde_json::json;

use crate::types::{OllamaModelDetails, OllamaShowResponse};

/// Names `/api/show` answers for, besides the configured model
const ALIASES: [&str; 2] = ["moondream", "moondream2"];

/// Metadata for `requested` if it names the served model.
///
/// A trailing `:latest` tag is ignored, as Ollama does.
pub fn lookup(requested: &str, configured: &str) -> Option<OllamaShowResponse> {
    let name = requested.strip_suffix(":latest").unwrap_or(requested);
    if ALIASES.contains(&name) || name == configured {
        Some(card(configured))
    } else {
        None
    }
}

fn card(configured: &str) -> OllamaShowResponse {
    let parameter_size = if configured.contains("2b") { "1.9B" } else { "0.5B" };

    OllamaShowResponse {
        license: "Apache License 2.0".to_string(),
        modelfile: format!(
            "# Modelfile generated by \"ollama show\"\nFROM {}\nTEMPLATE \"{{{{ .Prompt }}}}\"\nPARAMETER temperature 0\n",
            configured
        ),
        parameters: "temperature 0".to_string(),
        template: "{{ .Prompt }}".to_string(),
        details: OllamaModelDetails {
            parent_model: String::new(),
            format: "gguf".to_string(),
            family: "moondream".to_string(),
            families: vec!["moondream".to_string(), "clip".to_string()],
            parameter_size: parameter_size.to_string(),
            quantization_level: "Q8_0".to_string(),
        },
        model_info: json!({
            "general.architecture": "moondream",
            "general.basename": configured,
            "general.file_type": 7,
            "general.quantization_version": 2,
            "moondream.vision.image_size": 378,
            "moondream.vision.patch_size": 14,
            "moondream.context_length": 2048,
        }),
        modified_at: "2025-01-09T00:00:00Z".to_string(),
    }
}
