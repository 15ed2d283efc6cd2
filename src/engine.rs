//! The policy engine: owns every policy and fans Tab Host events out to them.
//!
//! All engine state is rebuilt on start; only settings persist.

use std::sync::Arc;

use futures_util::future::join_all;

use crate::managers::auto_close_scheduler::AutoCloseScheduler;
use crate::managers::collapse_scheduler::CollapseScheduler;
use crate::managers::duplicate_resolver::DuplicateResolver;
use crate::managers::explorer_window::ExplorerWindow;
use crate::managers::group_assignment::GroupAssignment;
use crate::managers::url_registry::UrlRegistry;
use crate::managers::window_labels::WindowLabeler;
use crate::managers::PolicyHandler;
use crate::services::settings_store::SettingsStore;
use crate::services::tab_host::TabHost;
use crate::types::errors::HostError;
use crate::types::event::TabEvent;

pub struct PolicyEngine {
    host: Arc<dyn TabHost>,
    store: Arc<dyn SettingsStore>,
    registry: Arc<UrlRegistry>,
    pub duplicates: DuplicateResolver,
    pub auto_close: AutoCloseScheduler,
    pub grouping: GroupAssignment,
    pub collapse: CollapseScheduler,
    pub labels: WindowLabeler,
    pub explorer: ExplorerWindow,
}

impl PolicyEngine {
    pub fn new(host: Arc<dyn TabHost>, store: Arc<dyn SettingsStore>) -> Self {
        let registry = Arc::new(UrlRegistry::new());
        Self {
            duplicates: DuplicateResolver::new(host.clone(), store.clone(), registry.clone()),
            auto_close: AutoCloseScheduler::new(host.clone(), store.clone()),
            grouping: GroupAssignment::new(host.clone(), store.clone()),
            collapse: CollapseScheduler::new(host.clone(), store.clone()),
            labels: WindowLabeler::new(host.clone(), store.clone()),
            explorer: ExplorerWindow::new(host.clone(), store.clone()),
            host,
            store,
            registry,
        }
    }

    pub fn host(&self) -> &Arc<dyn TabHost> {
        &self.host
    }

    pub fn store(&self) -> &Arc<dyn SettingsStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<UrlRegistry> {
        &self.registry
    }

    /// Rebuilds the URL registry from the open tabs and paints the badge.
    pub async fn init(&self) -> Result<(), HostError> {
        let entries = self.registry.rebuild(self.host.as_ref()).await?;
        if let Err(e) = self.labels.refresh_badge().await {
            tracing::warn!(error = %e, "initial badge update failed");
        }
        tracing::info!(entries, "policy engine initialized");
        Ok(())
    }

    /// Cancels every timer and forgets all in-memory state.
    pub fn reset(&self) {
        self.duplicates.reset();
        self.auto_close.reset();
        self.collapse.reset();
        self.registry.reset();
        tracing::debug!("policy engine reset");
    }

    fn handlers(&self) -> [&dyn PolicyHandler; 6] {
        [
            &self.duplicates,
            &self.auto_close,
            &self.grouping,
            &self.collapse,
            &self.labels,
            &self.explorer,
        ]
    }

    /// Delivers one event to every policy concurrently. A failing policy is
    /// logged and does not affect the others. The badge is refreshed last.
    pub async fn handle_event(&self, event: &TabEvent) {
        tracing::debug!(event = event.kind(), "dispatching event");
        let handlers = self.handlers();
        let results = join_all(handlers.iter().map(|h| h.handle(event))).await;
        for (handler, result) in handlers.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!(policy = handler.name(), event = event.kind(), error = %e, "policy failed");
            }
        }
        if let Err(e) = self.labels.refresh_badge().await {
            tracing::debug!(error = %e, "badge refresh failed");
        }
    }
}

impl Drop for PolicyEngine {
    fn drop(&mut self) {
        self.reset();
    }
}
