use std::sync::Arc;

use crate::config::AppConfig;
use crate::mail::Mailer;
use crate::media::MediaStorage;
use crate::store::Store;

/// Shared handles every handler receives through axum's `State`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub mailer: Arc<dyn Mailer>,
    pub media: MediaStorage,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let media = MediaStorage::new(config.media_root.clone(), config.media_url.clone());
        Self {
            config: Arc::new(config),
            store,
            mailer,
            media,
        }
    }
}
