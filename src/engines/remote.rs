//! Moondream cloud API backend
//!
//! Used when an API key is configured. Images are sent inline as a JPEG
//! data URL; there is no local encode step and no local memory footprint.

use std::time::Duration;

use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use super::{char_count, BackendMode, MemoryUsage, TokenUsage, VisionBackend};

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    image_url: String,
    question: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    answer: String,
}

pub struct RemoteEngine {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl RemoteEngine {
    pub fn new(endpoint: &str, api_key: &str, timeout: Duration) -> eyre::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("moondream-api/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let endpoint = endpoint.trim_end_matches('/').to_string();
        tracing::info!("Moondream API client configured: endpoint={}", endpoint);

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl VisionBackend for RemoteEngine {
    fn mode(&self) -> BackendMode {
        BackendMode::Remote
    }

    async fn analyze(&self, image: DynamicImage, prompt: &str) -> eyre::Result<String> {
        let encoded = crate::image::encode_jpeg_base64(&image)?;
        let body = QueryRequest {
            image_url: format!("data:image/jpeg;base64,{}", encoded),
            question: prompt,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/query", self.endpoint))
            .header("X-Moondream-Auth", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| eyre::eyre!("Moondream API request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(eyre::eyre!("Moondream API HTTP {}: {}", status, text));
        }

        let reply: QueryResponse = response
            .json()
            .await
            .map_err(|e| eyre::eyre!("Failed to parse Moondream API response: {}", e))?;
        Ok(reply.answer)
    }

    /// The remote tokenizer is unavailable, so both sides are character counts
    fn token_cost(&self, prompt: &str, answer: &str) -> TokenUsage {
        TokenUsage {
            prompt_tokens: char_count(prompt),
            completion_tokens: char_count(answer),
        }
    }

    fn memory_usage(&self) -> MemoryUsage {
        MemoryUsage::default()
    }
}
