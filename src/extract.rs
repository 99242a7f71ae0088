//! Request normalization
//!
//! Turns the two wire formats into one `(image, prompt)` pair. Both policies
//! are pure: they only look at the last message and never touch the network.
//! Loading the referenced image happens afterwards in [`crate::image`].

use thiserror::Error;

use crate::types::{
    ChatCompletionRequest, ContentPart, MessageContent, OllamaChatRequest, OllamaContent,
    OllamaContentPart, OllamaGenerateRequest,
};

/// Client errors raised while normalizing or loading a request
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Invalid request body: {0}")]
    InvalidBody(String),
    #[error("No messages provided")]
    NoMessages,
    #[error("No image provided")]
    NoImage,
    #[error("No image URL provided")]
    NoImageUrl,
    #[error("No text prompt provided")]
    NoPrompt,
    /// Fetching or decoding an OpenAI image URL failed
    #[error("Failed to load image: {0}")]
    ImageLoad(String),
    /// Decoding or fetching an Ollama chat image failed
    #[error("Invalid image data: {0}")]
    InvalidImage(String),
    /// Decoding an Ollama generate image failed
    #[error("Invalid image format: {0}")]
    InvalidImageFormat(String),
}

/// Where the image bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Absolute `http(s)` URL to fetch
    Url(String),
    /// Inline base64 payload (data-URL prefix already stripped)
    Base64(String),
}

impl ImageSource {
    /// Classify a raw image value by its scheme prefix.
    pub fn classify(value: &str) -> Self {
        let value = value.trim();
        if value.starts_with("http://") || value.starts_with("https://") {
            return Self::Url(value.to_string());
        }
        if let Some(rest) = value.strip_prefix("data:") {
            if let Some((_, payload)) = rest.split_once(";base64,") {
                return Self::Base64(payload.to_string());
            }
        }
        Self::Base64(value.to_string())
    }
}

/// Canonical form of a single-image request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRequest {
    pub image: ImageSource,
    pub prompt: String,
    pub model_hint: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// OpenAI policy: last `image_url` part and last `text` part of the last message.
pub fn extract_openai(request: &ChatCompletionRequest) -> Result<NormalizedRequest, ExtractError> {
    let last = request.messages.last().ok_or(ExtractError::NoMessages)?;

    let mut image_url = None;
    let mut prompt = None;
    if let MessageContent::Parts(parts) = &last.content {
        for part in parts {
            match part {
                ContentPart::ImageUrl { image_url: url } => image_url = Some(url.url().to_string()),
                ContentPart::Text { text } => prompt = Some(text.clone()),
                ContentPart::Unsupported => {}
            }
        }
    }

    let image_url = non_empty(image_url).ok_or(ExtractError::NoImageUrl)?;
    let prompt = non_empty(prompt).ok_or(ExtractError::NoPrompt)?;

    Ok(NormalizedRequest {
        image: ImageSource::classify(&image_url),
        prompt,
        model_hint: request.model.clone(),
    })
}

/// Ollama policy: string content plus `images[0]`, or last `image`/`text` parts.
pub fn extract_ollama(request: &OllamaChatRequest) -> Result<NormalizedRequest, ExtractError> {
    let last = request.messages.last().ok_or(ExtractError::NoMessages)?;

    let (image, prompt) = match &last.content {
        OllamaContent::Text(text) => {
            let image = last.images.as_ref().and_then(|images| images.first()).cloned();
            (image, Some(text.clone()))
        }
        OllamaContent::Parts(parts) => {
            let mut image = None;
            let mut prompt = None;
            for part in parts {
                match part {
                    OllamaContentPart::Image { image: value } => image = Some(value.clone()),
                    OllamaContentPart::Text { text } => prompt = Some(text.clone()),
                    OllamaContentPart::Unsupported => {}
                }
            }
            (image, prompt)
        }
    };

    let image = non_empty(image).ok_or(ExtractError::NoImage)?;
    let prompt = non_empty(prompt).ok_or(ExtractError::NoPrompt)?;

    Ok(NormalizedRequest {
        image: ImageSource::classify(&image),
        prompt,
        model_hint: request.model.clone(),
    })
}

/// Generate policy: one prompt, one or more base64 images.
///
/// Every entry is kept, empty ones included, so a blank image fails to
/// decode instead of being skipped.
pub fn extract_generate(
    request: &OllamaGenerateRequest,
) -> Result<(String, Vec<ImageSource>), ExtractError> {
    if request.prompt.is_empty() {
        return Err(ExtractError::NoPrompt);
    }
    let images: Vec<ImageSource> = request
        .images
        .iter()
        .flatten()
        .map(|value| ImageSource::classify(value))
        .collect();
    if images.is_empty() {
        return Err(ExtractError::NoImage);
    }
    Ok((request.prompt.clone(), images))
}
