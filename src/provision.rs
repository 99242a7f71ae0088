//! Model provisioning
//!
//! Resolves the model artifact once at startup: either a cached file under
//! the model cache directory (downloaded and gunzipped on first use), or
//! remote-API mode when an API key is configured.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use flate2::read::GzDecoder;

use crate::config::Config;
use crate::error::VisionError;
use crate::utils::to_mb;

/// Overall limit for the artifact download
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(3600);

/// Outcome of provisioning
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provisioned {
    /// Model file on local disk
    Local(PathBuf),
    /// Hosted model behind an API key
    Remote { endpoint: String, api_key: String },
}

/// Resolve the model for `config`, downloading it if needed.
pub async fn provision(config: &Config) -> Result<Provisioned, VisionError> {
    if let Some(api_key) = &config.api_key {
        tracing::info!("API key configured, using remote Moondream API at {}", config.api_url);
        return Ok(Provisioned::Remote {
            endpoint: config.api_url.clone(),
            api_key: api_key.clone(),
        });
    }

    let config = config.clone();
    tokio::task::spawn_blocking(move || ensure_local(&config))
        .await
        .map_err(|e| VisionError::ModelDownload(format!("provisioning task failed: {}", e)))?
        .map(Provisioned::Local)
}

/// Return `cache_dir/model_name`, downloading and decompressing it first if
/// it does not exist yet. Existing files are trusted as is.
///
/// Blocking; call from a blocking context.
pub fn ensure_local(config: &Config) -> Result<PathBuf, VisionError> {
    let model_path = config.model_cache_dir.join(&config.model_name);
    if model_path.exists() {
        tracing::info!("Using cached model at {:?}", model_path);
        return Ok(model_path);
    }

    let url = config
        .download_url(&config.model_name)
        .ok_or_else(|| {
            VisionError::Configuration(format!("Unsupported model name: {}", config.model_name))
        })?;
    if url.is_empty() {
        return Err(VisionError::Configuration(format!(
            "Model URL not found in environment variables for {}",
            config.model_name
        )));
    }

    std::fs::create_dir_all(&config.model_cache_dir).map_err(|e| {
        VisionError::ModelDownload(format!(
            "Failed to create model cache {:?}: {}",
            config.model_cache_dir, e
        ))
    })?;

    let archive_path = gz_path(&model_path);
    tracing::info!("Downloading model from {}", url);
    let mut tracker = DownloadTracker::new(&config.model_name);
    download_file_streaming(url, &archive_path, &mut tracker)?;
    tracker.finish();

    tracing::info!("Decompressing {:?}", archive_path);
    if let Err(e) = decompress(&archive_path, &model_path) {
        let _ = std::fs::remove_file(&model_path);
        return Err(VisionError::ModelDownload(format!(
            "Failed to decompress {:?}: {}",
            archive_path, e
        )));
    }
    std::fs::remove_file(&archive_path).map_err(|e| {
        VisionError::ModelDownload(format!("Failed to remove {:?}: {}", archive_path, e))
    })?;

    tracing::info!("Model ready at {:?}", model_path);
    Ok(model_path)
}

fn gz_path(model_path: &Path) -> PathBuf {
    let mut name = model_path.as_os_str().to_owned();
    name.push(".gz");
    PathBuf::from(name)
}

// ============================================================================
// Progress tracker
// ============================================================================

struct DownloadTracker {
    model_name: String,
    downloaded_bytes: u64,
    total_bytes: u64,
    started: Instant,
    last_event_time: Instant,
}

impl DownloadTracker {
    fn new(model_name: &str) -> Self {
        let now = Instant::now();
        Self {
            model_name: model_name.to_string(),
            downloaded_bytes: 0,
            total_bytes: 0,
            started: now,
            last_event_time: now,
        }
    }

    fn percent(&self) -> u64 {
        if self.total_bytes > 0 {
            self.downloaded_bytes * 100 / self.total_bytes
        } else {
            0
        }
    }

    fn send_progress(&mut self) {
        tracing::info!(
            "Downloading {}: {}% ({:.2} MB / {:.2} MB)",
            self.model_name,
            self.percent(),
            to_mb(self.downloaded_bytes),
            to_mb(self.total_bytes)
        );
        self.last_event_time = Instant::now();
    }

    fn add_bytes(&mut self, bytes: u64) {
        self.downloaded_bytes += bytes;
        // Log progress at most every 500ms
        if self.last_event_time.elapsed() > Duration::from_millis(500) {
            self.send_progress();
        }
    }

    fn finish(&self) {
        tracing::info!(
            "Downloaded {} ({:.2} MB) in {:.1}s",
            self.model_name,
            to_mb(self.downloaded_bytes),
            self.started.elapsed().as_secs_f64()
        );
    }
}

// ============================================================================
// Download logic
// ============================================================================

fn download_file_streaming(
    url: &str,
    local_path: &Path,
    tracker: &mut DownloadTracker,
) -> Result<(), VisionError> {
    let fail = |msg: String| VisionError::ModelDownload(msg);

    let client = reqwest::blocking::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()
        .map_err(|e| fail(format!("Failed to create HTTP client: {}", e)))?;

    let mut response = client
        .get(url)
        .header("User-Agent", concat!("moondream-api/", env!("CARGO_PKG_VERSION")))
        .send()
        .map_err(|e| fail(format!("Failed to download: {}", e)))?;

    if !response.status().is_success() {
        return Err(fail(format!("Failed to download: HTTP {}", response.status())));
    }
    tracker.total_bytes = response.content_length().unwrap_or(0);

    let mut file = BufWriter::new(
        File::create(local_path).map_err(|e| fail(format!("Failed to create file: {}", e)))?,
    );
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = response
            .read(&mut buffer)
            .map_err(|e| fail(format!("Failed to read data: {}", e)))?;

        if bytes_read == 0 {
            break;
        }

        file.write_all(&buffer[..bytes_read])
            .map_err(|e| fail(format!("Failed to write data: {}", e)))?;

        tracker.add_bytes(bytes_read as u64);
    }

    file.flush()
        .map_err(|e| fail(format!("Failed to write data: {}", e)))?;
    Ok(())
}

fn decompress(archive: &Path, dest: &Path) -> std::io::Result<u64> {
    let mut decoder = GzDecoder::new(BufReader::new(File::open(archive)?));
    let mut out = BufWriter::new(File::create(dest)?);
    let written = std::io::copy(&mut decoder, &mut out)?;
    out.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn config_in(dir: &Path) -> Config {
        let mut config = Config::for_tests();
        config.model_cache_dir = dir.join("cache");
        config
    }

    async fn ensure_local_blocking(config: Config) -> Result<PathBuf, VisionError> {
        tokio::task::spawn_blocking(move || ensure_local(&config))
            .await
            .unwrap()
    }

    #[test]
    fn existing_artifact_is_returned_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        std::fs::create_dir_all(&config.model_cache_dir).unwrap();
        let cached = config.model_cache_dir.join(&config.model_name);
        std::fs::write(&cached, b"cached weights").unwrap();

        // no URL configured: the cached file must short-circuit before any lookup
        let path = ensure_local(&config).unwrap();
        assert_eq!(path, cached);
        assert_eq!(std::fs::read(&path).unwrap(), b"cached weights");
    }

    #[test]
    fn missing_url_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        assert!(matches!(ensure_local(&config), Err(VisionError::Configuration(_))));
    }

    #[test]
    fn unsupported_model_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.model_name = "llava-13b".to_string();
        let err = ensure_local(&config).unwrap_err();
        assert!(matches!(&err, VisionError::Configuration(msg) if msg.contains("llava-13b")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn downloads_and_decompresses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/moondream-0_5b-int8.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip(b"model weights")))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.moondream_500m_url = format!("{}/moondream-0_5b-int8.gz", server.uri());

        let path = ensure_local_blocking(config.clone()).await.unwrap();
        assert_eq!(path, config.model_cache_dir.join("moondream-0_5b-int8"));
        assert_eq!(std::fs::read(&path).unwrap(), b"model weights");
        assert!(!gz_path(&path).exists());

        // second call hits the cache; the mock expects exactly one request
        ensure_local_blocking(config).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn http_failure_is_a_download_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.moondream_500m_url = format!("{}/missing.gz", server.uri());

        let err = ensure_local_blocking(config.clone()).await.unwrap_err();
        assert!(matches!(&err, VisionError::ModelDownload(msg) if msg.contains("404")));
        assert!(!config.model_cache_dir.join(&config.model_name).exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn corrupt_archive_leaves_no_artifact() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"not gzip at all".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.moondream_500m_url = format!("{}/broken.gz", server.uri());

        let err = ensure_local_blocking(config.clone()).await.unwrap_err();
        assert!(matches!(err, VisionError::ModelDownload(_)));
        assert!(!config.model_cache_dir.join(&config.model_name).exists());
    }

    #[tokio::test]
    async fn api_key_selects_remote_mode() {
        let mut config = Config::for_tests();
        config.api_key = Some("key".to_string());
        assert_eq!(
            provision(&config).await.unwrap(),
            Provisioned::Remote {
                endpoint: "https://api.moondream.ai/v1".to_string(),
                api_key: "key".to_string(),
            }
        );
    }
}
