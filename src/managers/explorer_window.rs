//! The stand-alone explorer window: one popup at most, reopened at the
//! size the user last gave it.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::managers::PolicyHandler;
use crate::services::settings_store::{load, save_unchecked, SettingsStore};
use crate::services::tab_host::TabHost;
use crate::types::errors::{HostError, PolicyError, SettingsError};
use crate::types::event::TabEvent;
use crate::types::settings::{ExplorerSettings, EXPLORER_MIN_SIZE};
use crate::types::tab::{WindowId, WindowSize};

/// Extension page shown in the explorer window.
pub const EXPLORER_PAGE: &str = "popup.html?standalone=1";

#[derive(Clone)]
pub struct ExplorerWindow {
    host: Arc<dyn TabHost>,
    store: Arc<dyn SettingsStore>,
    window_id: Arc<Mutex<Option<WindowId>>>,
}

impl ExplorerWindow {
    pub fn new(host: Arc<dyn TabHost>, store: Arc<dyn SettingsStore>) -> Self {
        Self {
            host,
            store,
            window_id: Arc::new(Mutex::new(None)),
        }
    }

    fn tracked(&self) -> MutexGuard<'_, Option<WindowId>> {
        self.window_id.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn window_id(&self) -> Option<WindowId> {
        *self.tracked()
    }

    /// Focuses the open explorer window, or creates one.
    pub async fn open(&self) -> Result<WindowId, HostError> {
        let current = self.window_id();
        if let Some(window_id) = current {
            match self.host.focus_window(window_id).await {
                Ok(()) => return Ok(window_id),
                Err(e) => {
                    tracing::debug!(window_id, error = %e, "explorer window is gone, reopening");
                    self.tracked().take();
                }
            }
        }

        let settings: ExplorerSettings = load(self.store.as_ref()).await;
        let size = WindowSize {
            width: settings.size.width.max(EXPLORER_MIN_SIZE.width),
            height: settings.size.height.max(EXPLORER_MIN_SIZE.height),
        };
        let window_id = self.host.create_popup_window(EXPLORER_PAGE, size).await?;
        *self.tracked() = Some(window_id);
        tracing::info!(window_id, width = size.width, height = size.height, "explorer window opened");
        Ok(window_id)
    }

    pub async fn save_size(&self, size: WindowSize) -> Result<(), SettingsError> {
        save_unchecked(self.store.as_ref(), &ExplorerSettings { size }).await
    }
}

#[async_trait]
impl PolicyHandler for ExplorerWindow {
    fn name(&self) -> &'static str {
        "explorer"
    }

    async fn handle(&self, event: &TabEvent) -> Result<(), PolicyError> {
        match event {
            TabEvent::WindowBoundsChanged { window_id, size } if self.window_id() == Some(*window_id) => {
                self.save_size(*size).await?;
            }
            TabEvent::WindowRemoved { window_id } => {
                let mut tracked = self.tracked();
                if *tracked == Some(*window_id) {
                    *tracked = None;
                }
            }
            _ => {}
        }
        Ok(())
    }
}
