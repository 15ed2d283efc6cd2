//! Per-window labels, the `[label]` title prefix, and the toolbar badge.

use std::sync::Arc;

use async_trait::async_trait;

use crate::managers::PolicyHandler;
use crate::services::settings_store::{load, save_unchecked, SettingsStore};
use crate::services::tab_host::TabHost;
use crate::types::errors::{HostError, PolicyError};
use crate::types::event::{LoadStatus, TabEvent};
use crate::types::settings::{WindowLabels, WindowPrefixFlags};
use crate::types::tab::{is_internal_url, BadgeUpdate, PageScript, TabId, TabQuery, WindowId};

pub const BADGE_COLOR_COUNT: &str = "#4285f4";
pub const BADGE_COLOR_ATTENTION: &str = "#ef4444";
pub const BADGE_TEXT_ATTENTION: &str = "!";

fn window_key(window_id: WindowId) -> String {
    window_id.to_string()
}

#[derive(Clone)]
pub struct WindowLabeler {
    host: Arc<dyn TabHost>,
    store: Arc<dyn SettingsStore>,
}

impl WindowLabeler {
    pub fn new(host: Arc<dyn TabHost>, store: Arc<dyn SettingsStore>) -> Self {
        Self { host, store }
    }

    pub async fn labels(&self) -> WindowLabels {
        load(self.store.as_ref()).await
    }

    /// The window's label, or `""` when it has none.
    pub async fn label(&self, window_id: WindowId) -> String {
        self.labels()
            .await
            .labels
            .get(&window_key(window_id))
            .cloned()
            .unwrap_or_default()
    }

    /// Sets or (with an empty label) removes a window's label, then updates
    /// the title prefixes of its tabs and the badge.
    pub async fn set_label(&self, window_id: WindowId, label: &str) -> Result<(), PolicyError> {
        let mut labels = self.labels().await;
        let key = window_key(window_id);
        if label.is_empty() {
            labels.labels.remove(&key);
            save_unchecked(self.store.as_ref(), &labels).await?;
            self.clear_prefix_in_window(window_id).await?;
        } else {
            labels.labels.insert(key, label.to_string());
            save_unchecked(self.store.as_ref(), &labels).await?;
            self.apply_prefix_to_window(window_id, label).await?;
        }
        tracing::info!(window_id, label, "window label set");
        self.refresh_badge().await?;
        Ok(())
    }

    pub async fn prefix_enabled(&self, window_id: WindowId) -> bool {
        let flags: WindowPrefixFlags = load(self.store.as_ref()).await;
        flags.is_enabled(&window_key(window_id))
    }

    /// Turns title prefixing on or off for one window.
    pub async fn set_prefix_enabled(&self, window_id: WindowId, enabled: bool) -> Result<(), PolicyError> {
        let mut flags: WindowPrefixFlags = load(self.store.as_ref()).await;
        flags.enabled.insert(window_key(window_id), enabled);
        save_unchecked(self.store.as_ref(), &flags).await?;
        if enabled {
            let label = self.label(window_id).await;
            if !label.is_empty() {
                self.apply_prefix_to_window(window_id, &label).await?;
            }
        } else {
            self.clear_prefix_in_window(window_id).await?;
        }
        Ok(())
    }

    /// Injects the prefix into every web page of the window, if prefixing
    /// is enabled there. Pages that refuse injection are skipped.
    pub async fn apply_prefix_to_window(&self, window_id: WindowId, label: &str) -> Result<usize, HostError> {
        if !self.prefix_enabled(window_id).await {
            return Ok(0);
        }
        let script = PageScript::SetTitlePrefix {
            label: label.to_string(),
        };
        self.inject_into_window(window_id, &script).await
    }

    pub async fn clear_prefix_in_window(&self, window_id: WindowId) -> Result<usize, HostError> {
        self.inject_into_window(window_id, &PageScript::ClearTitlePrefix).await
    }

    async fn inject_into_window(&self, window_id: WindowId, script: &PageScript) -> Result<usize, HostError> {
        let tabs = self.host.query_tabs(&TabQuery::in_window(window_id)).await?;
        let mut injected = 0;
        for tab in tabs.iter().filter(|t| !is_internal_url(&t.url)) {
            match self.host.inject(tab.id, script).await {
                Ok(()) => injected += 1,
                Err(e) => tracing::trace!(tab_id = tab.id, error = %e, "title prefix not injected"),
            }
        }
        Ok(injected)
    }

    /// Re-applies the window's prefix to a single tab.
    async fn reapply_to_tab(&self, tab_id: TabId, window_id: WindowId, url: &str) {
        if is_internal_url(url) {
            return;
        }
        let label = self.label(window_id).await;
        if label.is_empty() || !self.prefix_enabled(window_id).await {
            return;
        }
        if let Err(e) = self.host.inject(tab_id, &PageScript::SetTitlePrefix { label }).await {
            tracing::trace!(tab_id, error = %e, "title prefix not reapplied");
        }
    }

    /// Drops the label and prefix flag of a closed window.
    pub async fn on_window_removed(&self, window_id: WindowId) -> Result<(), PolicyError> {
        let key = window_key(window_id);
        let mut labels = self.labels().await;
        if labels.labels.remove(&key).is_some() {
            save_unchecked(self.store.as_ref(), &labels).await?;
        }
        let mut flags: WindowPrefixFlags = load(self.store.as_ref()).await;
        if flags.enabled.remove(&key).is_some() {
            save_unchecked(self.store.as_ref(), &flags).await?;
        }
        Ok(())
    }

    /// Global badge: total tab count. The active tab of the focused window
    /// shows `!` instead while that window has no label.
    pub async fn refresh_badge(&self) -> Result<(), HostError> {
        let tabs = self.host.query_tabs(&TabQuery::all()).await?;
        let count = tabs.len().to_string();
        self.host
            .set_badge(&BadgeUpdate {
                tab_id: None,
                text: count.clone(),
                color: BADGE_COLOR_COUNT.to_string(),
            })
            .await?;

        let active = self.host.query_tabs(&TabQuery::active_in_focused_window()).await?;
        let Some(active) = active.first() else {
            return Ok(());
        };
        let labelled = !self.label(active.window_id).await.is_empty();
        let badge = if labelled {
            BadgeUpdate {
                tab_id: Some(active.id),
                text: count,
                color: BADGE_COLOR_COUNT.to_string(),
            }
        } else {
            BadgeUpdate {
                tab_id: Some(active.id),
                text: BADGE_TEXT_ATTENTION.to_string(),
                color: BADGE_COLOR_ATTENTION.to_string(),
            }
        };
        self.host.set_badge(&badge).await
    }
}

#[async_trait]
impl PolicyHandler for WindowLabeler {
    fn name(&self) -> &'static str {
        "window_labels"
    }

    async fn handle(&self, event: &TabEvent) -> Result<(), PolicyError> {
        match event {
            TabEvent::TabUpdated { tab_id, change, tab } if change.status == Some(LoadStatus::Complete) => {
                self.reapply_to_tab(*tab_id, tab.window_id, &tab.url).await;
            }
            TabEvent::TabActivated { tab_id, window_id } => {
                if let Ok(tab) = self.host.get_tab(*tab_id).await {
                    self.reapply_to_tab(*tab_id, *window_id, &tab.url).await;
                }
            }
            TabEvent::WindowRemoved { window_id } => self.on_window_removed(*window_id).await?,
            _ => {}
        }
        Ok(())
    }
}
