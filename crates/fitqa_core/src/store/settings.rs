//! crates/fitqa_core/src/store/settings.rs

use super::{AppStore, KEY_SETTINGS};
use crate::domain::Settings;

impl AppStore {
    pub async fn settings(&self) -> Settings {
        self.state.lock().await.settings.clone()
    }

    /// Replaces the whole record and persists it locally. Keys are not
    /// validated; whatever comes in is echoed back.
    pub async fn update_settings(&self, settings: Settings) -> Settings {
        self.state.lock().await.settings = settings.clone();
        self.write_json(KEY_SETTINGS, &settings).await;
        settings
    }
}
