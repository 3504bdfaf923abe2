use std::sync::Arc;

use anyhow::anyhow;

use pibble_db::SocialStore;

pub type SharedStore = Arc<dyn SocialStore>;

/// Run a blocking store call off the async runtime.
pub async fn call<T, F>(store: &SharedStore, f: F) -> anyhow::Result<T>
where
    F: FnOnce(&dyn SocialStore) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| anyhow!("spawn_blocking join error: {}", e))?
}
