//! Application state for the API server

use crate::{ChapterIngestor, Config};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request (cheap Arc clones) and provides access to the
/// ingestor instance and configuration.
#[derive(Clone)]
pub struct AppState {
    /// The main ChapterIngestor instance
    pub ingestor: Arc<ChapterIngestor>,

    /// Configuration (read access)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(ingestor: Arc<ChapterIngestor>, config: Arc<Config>) -> Self {
        Self { ingestor, config }
    }
}
