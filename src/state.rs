use std::sync::Arc;

use crate::repo::Repository;
use crate::ws::Broadcaster;

/// Shared handles for the HTTP and WebSocket layers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    pub broadcaster: Broadcaster,
}
