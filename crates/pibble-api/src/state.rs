use std::sync::Arc;

use pibble_gateway::dispatcher::Dispatcher;
use pibble_gateway::identity::IdentityResolver;
use pibble_gateway::store::SharedStore;

use crate::media::MediaStorage;

/// 50 MiB upload ceiling
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub identity: IdentityResolver,
    pub dispatcher: Dispatcher,
    pub media: MediaStorage,
    pub max_upload_bytes: usize,
}

impl AppStateInner {
    pub fn store(&self) -> &SharedStore {
        self.identity.store()
    }
}
