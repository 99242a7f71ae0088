use std::sync::Arc;

use crate::gateway::VisionGateway;
use crate::image::ImageFetcher;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Owner of the model backend
    pub gateway: Arc<VisionGateway>,
    /// Client for images referenced by URL
    pub fetcher: ImageFetcher,
}
