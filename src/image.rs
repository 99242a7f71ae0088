//! Image loading and normalization
//!
//! Images arrive as URLs or base64 payloads and are decoded into
//! [`DynamicImage`]s before being bounded to [`MAX_IMAGE_EDGE`].

use std::io::Cursor;
use std::time::Duration;

use base64::Engine as _;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use thiserror::Error;

use crate::config::MAX_IMAGE_EDGE;
use crate::extract::ImageSource;

#[derive(Debug, Error)]
pub enum ImageLoadError {
    #[error("request failed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("{0}")]
    Decode(#[from] image::ImageError),
    #[error("decode task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Scale `image` down so its longest edge is at most [`MAX_IMAGE_EDGE`].
///
/// Aspect ratio is preserved; images already within bounds are returned as is.
pub fn resize(image: DynamicImage) -> DynamicImage {
    resize_to(image, MAX_IMAGE_EDGE)
}

fn resize_to(image: DynamicImage, max_edge: u32) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    let longest = width.max(height);
    if longest <= max_edge {
        return image;
    }

    let scale = max_edge as f64 / longest as f64;
    let new_width = ((width as f64 * scale).round() as u32).max(1);
    let new_height = ((height as f64 * scale).round() as u32).max(1);
    tracing::debug!(
        "Resizing image {}x{} -> {}x{}",
        width,
        height,
        new_width,
        new_height
    );
    image.resize_exact(new_width, new_height, FilterType::Lanczos3)
}

pub fn decode_bytes(bytes: &[u8]) -> Result<DynamicImage, ImageLoadError> {
    Ok(image::load_from_memory(bytes)?)
}

pub fn decode_base64(payload: &str) -> Result<DynamicImage, ImageLoadError> {
    let cleaned: String = payload.split_whitespace().collect();
    let bytes = base64::engine::general_purpose::STANDARD.decode(cleaned)?;
    decode_bytes(&bytes)
}

/// JPEG-encode an image and return it as base64.
pub fn encode_jpeg_base64(image: &DynamicImage) -> Result<String, image::ImageError> {
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut buf = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(buf))
}

/// Downloads images referenced by URL, with a bounded timeout
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    client: reqwest::Client,
}

impl ImageFetcher {
    pub fn new(timeout: Duration) -> eyre::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("moondream-api/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    pub async fn fetch(&self, url: &str) -> Result<DynamicImage, ImageLoadError> {
        tracing::debug!("Fetching image: {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ImageLoadError::Status(status));
        }
        let bytes = response.bytes().await?;
        tokio::task::spawn_blocking(move || decode_bytes(&bytes)).await?
    }

    /// Resolve an [`ImageSource`] into decoded pixels.
    ///
    /// Decoding runs on the blocking pool.
    pub async fn load(&self, source: &ImageSource) -> Result<DynamicImage, ImageLoadError> {
        match source {
            ImageSource::Url(url) => self.fetch(url).await,
            ImageSource::Base64(payload) => {
                let payload = payload.clone();
                tokio::task::spawn_blocking(move || decode_base64(&payload)).await?
            }
        }
    }
}
