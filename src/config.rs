use std::path::PathBuf;
use std::time::Duration;

/// Longest image edge accepted by the model, in pixels.
pub const MAX_IMAGE_EDGE: u32 = 2048;

/// Configuration from environment
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Model artifact name, e.g. `moondream-0_5b-int8` or `moondream-2b-int8`
    pub model_name: String,
    pub model_cache_dir: PathBuf,
    pub moondream_2b_url: String,
    pub moondream_500m_url: String,
    /// Switches the service to remote-API mode when set
    pub api_key: Option<String>,
    pub api_url: String,
    /// Executable that loads the local model artifact
    pub runtime_command: String,
    pub inference_timeout: Duration,
    pub image_fetch_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            model_name: std::env::var("MODEL_NAME")
                .unwrap_or_else(|_| "moondream-0_5b-int8".to_string()),
            model_cache_dir: PathBuf::from(crate::utils::expand_tilde(
                &std::env::var("MODEL_CACHE_DIR").unwrap_or_else(|_| "../model_cache".to_string()),
            )),
            moondream_2b_url: std::env::var("MOONDREAM_2B_URL").unwrap_or_default(),
            moondream_500m_url: std::env::var("MOONDREAM_500M_URL").unwrap_or_default(),
            api_key: std::env::var("MOONDREAM_API_KEY")
                .ok()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            api_url: std::env::var("MOONDREAM_API_URL")
                .unwrap_or_else(|_| "https://api.moondream.ai/v1".to_string()),
            runtime_command: std::env::var("MOONDREAM_RUNTIME")
                .unwrap_or_else(|_| "moondream-runtime".to_string()),
            inference_timeout: secs_from_env("INFERENCE_TIMEOUT_SECS", 300),
            image_fetch_timeout: secs_from_env("IMAGE_FETCH_TIMEOUT_SECS", 30),
        }
    }

    /// Download URL configured for the selected model, if the model is known.
    pub fn download_url(&self, model_name: &str) -> Option<&str> {
        match model_name {
            "moondream-2b-int8" => Some(self.moondream_2b_url.as_str()),
            "moondream-0_5b-int8" => Some(self.moondream_500m_url.as_str()),
            _ => None,
        }
    }
}

fn secs_from_env(key: &str, default: u64) -> Duration {
    Duration::from_secs(
        std::env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default),
    )
}

#[cfg(test)]
impl Config {
    /// Configuration with defaults and no environment lookups
    pub fn for_tests() -> Self {
        Self {
            port: 0,
            model_name: "moondream-0_5b-int8".to_string(),
            model_cache_dir: PathBuf::from("model_cache"),
            moondream_2b_url: String::new(),
            moondream_500m_url: String::new(),
            api_key: None,
            api_url: "https://api.moondream.ai/v1".to_string(),
            runtime_command: "moondream-runtime".to_string(),
            inference_timeout: Duration::from_secs(5),
            image_fetch_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_url_is_selected_by_model_name() {
        let mut config = Config::for_tests();
        config.moondream_2b_url = "https://example.com/2b.gz".to_string();
        config.moondream_500m_url = "https://example.com/500m.gz".to_string();

        assert_eq!(config.download_url("moondream-2b-int8"), Some("https://example.com/2b.gz"));
        assert_eq!(config.download_url("moondream-0_5b-int8"), Some("https://example.com/500m.gz"));
        assert_eq!(config.download_url("llava"), None);
    }
}
