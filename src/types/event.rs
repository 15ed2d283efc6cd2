use serde::{Deserialize, Serialize};

use super::tab::{GroupId, TabGroup, TabId, TabInfo, WindowId, WindowSize};

/// Page load status reported with tab updates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    Loading,
    Complete,
}

/// The changed fields of a `TabUpdated` event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TabChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<LoadStatus>,
}

/// Lifecycle events emitted by the Tab Host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TabEvent {
    TabCreated { tab: TabInfo },
    #[serde(rename_all = "camelCase")]
    TabUpdated {
        tab_id: TabId,
        change: TabChange,
        tab: TabInfo,
    },
    #[serde(rename_all = "camelCase")]
    TabActivated { tab_id: TabId, window_id: WindowId },
    #[serde(rename_all = "camelCase")]
    TabRemoved { tab_id: TabId, window_id: WindowId },
    #[serde(rename_all = "camelCase")]
    WindowCreated { window_id: WindowId },
    #[serde(rename_all = "camelCase")]
    WindowRemoved { window_id: WindowId },
    #[serde(rename_all = "camelCase")]
    WindowBoundsChanged { window_id: WindowId, size: WindowSize },
    GroupCreated { group: TabGroup },
    GroupUpdated { group: TabGroup },
    #[serde(rename_all = "camelCase")]
    GroupRemoved { group_id: GroupId },
}

impl TabEvent {
    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            TabEvent::TabCreated { .. } => "tab_created",
            TabEvent::TabUpdated { .. } => "tab_updated",
            TabEvent::TabActivated { .. } => "tab_activated",
            TabEvent::TabRemoved { .. } => "tab_removed",
            TabEvent::WindowCreated { .. } => "window_created",
            TabEvent::WindowRemoved { .. } => "window_removed",
            TabEvent::WindowBoundsChanged { .. } => "window_bounds_changed",
            TabEvent::GroupCreated { .. } => "group_created",
            TabEvent::GroupUpdated { .. } => "group_updated",
            TabEvent::GroupRemoved { .. } => "group_removed",
        }
    }

    /// URLs that a navigation-driven policy should evaluate for this event.
    ///
    /// A creation with a known URL yields that URL. An update yields the
    /// changed URL and, on load completion, the tab's current URL when it
    /// differs from the changed one. Internal pages are dropped.
    pub fn navigated_urls(&self) -> Vec<(TabId, String)> {
        let mut urls = Vec::new();
        match self {
            TabEvent::TabCreated { tab } => {
                if !super::tab::is_internal_url(&tab.url) {
                    urls.push((tab.id, tab.url.clone()));
                }
            }
            TabEvent::TabUpdated { tab_id, change, tab } => {
                if let Some(url) = &change.url {
                    if !super::tab::is_internal_url(url) {
                        urls.push((*tab_id, url.clone()));
                    }
                }
                if change.status == Some(LoadStatus::Complete)
                    && !super::tab::is_internal_url(&tab.url)
                    && change.url.as_deref() != Some(tab.url.as_str())
                {
                    urls.push((*tab_id, tab.url.clone()));
                }
            }
            _ => {}
        }
        urls
    }

    /// Only URLs that became known with this event (creation or URL change).
    pub fn url_changes(&self) -> Option<(TabId, String)> {
        match self {
            TabEvent::TabCreated { tab } if !super::tab::is_internal_url(&tab.url) => {
                Some((tab.id, tab.url.clone()))
            }
            TabEvent::TabUpdated {
                tab_id,
                change: TabChange { url: Some(url), .. },
                ..
            } if !super::tab::is_internal_url(url) => Some((*tab_id, url.clone())),
            _ => None,
        }
    }
}
