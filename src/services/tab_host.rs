//! The browser primitives every policy acts through.
//!
//! Implementations: [`crate::services::memory_host::InMemoryTabHost`] for
//! tests and the demo, [`crate::services::stdio_host::StdioTabHost`] for a
//! real browser reached over the bridge.

use async_trait::async_trait;

use crate::types::errors::HostError;
use crate::types::tab::{
    BadgeUpdate, GroupId, GroupUpdate, PageScript, TabGroup, TabId, TabInfo, TabQuery, WindowId,
    WindowSize,
};

/// Trait defining the tab/window/group interface of the host browser.
///
/// Every call may suspend; callers re-verify state they depend on after
/// each call returns.
#[async_trait]
pub trait TabHost: Send + Sync {
    async fn query_tabs(&self, query: &TabQuery) -> Result<Vec<TabInfo>, HostError>;
    async fn get_tab(&self, tab_id: TabId) -> Result<TabInfo, HostError>;
    async fn activate_tab(&self, tab_id: TabId) -> Result<(), HostError>;
    async fn move_tab(&self, tab_id: TabId, index: usize) -> Result<(), HostError>;
    async fn remove_tab(&self, tab_id: TabId) -> Result<(), HostError>;

    /// Adds `tab_ids` to `group_id`, or to a fresh group when `None`.
    /// Returns the id of the group the tabs ended up in.
    async fn group_tabs(&self, tab_ids: &[TabId], group_id: Option<GroupId>) -> Result<GroupId, HostError>;
    async fn get_group(&self, group_id: GroupId) -> Result<TabGroup, HostError>;
    async fn query_groups(&self, window_id: WindowId) -> Result<Vec<TabGroup>, HostError>;
    async fn update_group(&self, group_id: GroupId, update: &GroupUpdate) -> Result<(), HostError>;

    async fn focus_window(&self, window_id: WindowId) -> Result<(), HostError>;
    async fn create_popup_window(&self, url: &str, size: WindowSize) -> Result<WindowId, HostError>;

    /// Runs `script` in the tab's page. The call returns once the host has
    /// accepted or refused the injection, not when the script finishes.
    async fn inject(&self, tab_id: TabId, script: &PageScript) -> Result<(), HostError>;
    async fn set_badge(&self, badge: &BadgeUpdate) -> Result<(), HostError>;
}

/// Looks a tab up, mapping "gone" to `None`.
pub async fn find_tab(host: &dyn TabHost, tab_id: TabId) -> Result<Option<TabInfo>, HostError> {
    match host.get_tab(tab_id).await {
        Ok(tab) => Ok(Some(tab)),
        Err(e) if e.is_vanished() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Removes a tab, treating "already gone" as success.
pub async fn remove_tab_quietly(host: &dyn TabHost, tab_id: TabId) {
    match host.remove_tab(tab_id).await {
        Ok(()) => tracing::debug!(tab_id, "tab removed"),
        Err(e) if e.is_vanished() => tracing::debug!(tab_id, "tab already gone"),
        Err(e) => tracing::warn!(tab_id, error = %e, "failed to remove tab"),
    }
}
