//! In-memory Tab Host.
//!
//! Models windows, ordered tabs and groups closely enough for the policies
//! to run against it, and records every side effect (removals, injected
//! scripts, badges, popups) so tests and the demo can inspect them.
//! It never emits events itself; callers build [`crate::types::event::TabEvent`]s
//! from the snapshots the helpers return.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::services::tab_host::TabHost;
use crate::types::errors::HostError;
use crate::types::tab::{
    BadgeUpdate, GroupColor, GroupId, GroupUpdate, PageScript, TabGroup, TabId, TabInfo, TabQuery,
    WindowId, WindowSize, GROUP_ID_NONE,
};

/// Base URL the in-memory host resolves extension pages against.
pub const EXTENSION_BASE_URL: &str = "chrome-extension://tabkeeper/";

#[derive(Default)]
struct HostState {
    tabs: HashMap<TabId, TabInfo>,
    /// Per-window tab order; the position is the tab index.
    windows: BTreeMap<WindowId, Vec<TabId>>,
    groups: BTreeMap<GroupId, TabGroup>,
    focused_window: Option<WindowId>,
    next_tab_id: TabId,
    next_group_id: GroupId,
    next_window_id: WindowId,
    refuse_injection: bool,
    injected: Vec<(TabId, PageScript)>,
    badges: Vec<BadgeUpdate>,
    removed: Vec<TabId>,
    popups: Vec<(WindowId, String, WindowSize)>,
}

impl HostState {
    fn snapshot(&self, tab_id: TabId) -> Option<TabInfo> {
        let mut tab = self.tabs.get(&tab_id)?.clone();
        if let Some(order) = self.windows.get(&tab.window_id) {
            tab.index = order.iter().position(|id| *id == tab_id).unwrap_or(0);
        }
        Some(tab)
    }

    fn ensure_window(&mut self, window_id: WindowId) {
        self.windows.entry(window_id).or_default();
        if self.focused_window.is_none() {
            self.focused_window = Some(window_id);
        }
        if window_id >= self.next_window_id {
            self.next_window_id = window_id + 1;
        }
    }

    fn insert_tab(&mut self, window_id: WindowId, url: &str, pinned: bool) -> TabId {
        self.ensure_window(window_id);
        self.next_tab_id += 1;
        let id = self.next_tab_id;
        self.tabs.insert(
            id,
            TabInfo {
                id,
                window_id,
                index: 0,
                url: url.to_string(),
                pinned,
                active: false,
                group_id: GROUP_ID_NONE,
                last_accessed: 0,
            },
        );
        self.windows.entry(window_id).or_default().push(id);
        id
    }

    /// Drops groups that no longer have any member.
    fn prune_groups(&mut self) {
        let tabs = &self.tabs;
        self.groups
            .retain(|group_id, _| tabs.values().any(|t| t.group_id == *group_id));
    }
}

/// Recording in-memory [`TabHost`].
#[derive(Default)]
pub struct InMemoryTabHost {
    state: Mutex<HostState>,
}

impl InMemoryTabHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // === Scenario setup ===

    /// Opens an unpinned tab at the end of `window_id`.
    pub fn open_tab(&self, window_id: WindowId, url: &str) -> TabInfo {
        let mut state = self.state();
        let id = state.insert_tab(window_id, url, false);
        state.snapshot(id).unwrap_or_else(|| unreachable_tab(id, window_id))
    }

    pub fn open_pinned_tab(&self, window_id: WindowId, url: &str) -> TabInfo {
        let mut state = self.state();
        let id = state.insert_tab(window_id, url, true);
        state.snapshot(id).unwrap_or_else(|| unreachable_tab(id, window_id))
    }

    /// Points an open tab at a new URL and returns the updated snapshot.
    pub fn navigate(&self, tab_id: TabId, url: &str) -> Option<TabInfo> {
        let mut state = self.state();
        state.tabs.get_mut(&tab_id)?.url = url.to_string();
        state.snapshot(tab_id)
    }

    /// Closes a tab as if the user did it (not recorded in [`Self::removed_tabs`]).
    pub fn close_externally(&self, tab_id: TabId) -> Option<TabInfo> {
        let mut state = self.state();
        let tab = state.snapshot(tab_id)?;
        state.tabs.remove(&tab_id);
        if let Some(order) = state.windows.get_mut(&tab.window_id) {
            order.retain(|id| *id != tab_id);
        }
        state.prune_groups();
        Some(tab)
    }

    /// Creates a group holding `tab_ids` with the given title and color.
    pub fn create_group(&self, title: &str, color: GroupColor, tab_ids: &[TabId]) -> Option<GroupId> {
        let mut state = self.state();
        let window_id = state.tabs.get(tab_ids.first()?)?.window_id;
        state.next_group_id += 1;
        let group_id = state.next_group_id;
        state.groups.insert(
            group_id,
            TabGroup {
                id: group_id,
                window_id,
                title: title.to_string(),
                color,
                collapsed: false,
            },
        );
        for tab_id in tab_ids {
            if let Some(tab) = state.tabs.get_mut(tab_id) {
                tab.group_id = group_id;
            }
        }
        state.prune_groups();
        Some(group_id)
    }

    pub fn set_last_accessed(&self, tab_id: TabId, millis: i64) {
        if let Some(tab) = self.state().tabs.get_mut(&tab_id) {
            tab.last_accessed = millis;
        }
    }

    pub fn set_group_collapsed(&self, group_id: GroupId, collapsed: bool) {
        if let Some(group) = self.state().groups.get_mut(&group_id) {
            group.collapsed = collapsed;
        }
    }

    pub fn set_focused_window(&self, window_id: WindowId) {
        let mut state = self.state();
        state.ensure_window(window_id);
        state.focused_window = Some(window_id);
    }

    /// Makes every subsequent `inject` call fail.
    pub fn set_refuse_injection(&self, refuse: bool) {
        self.state().refuse_injection = refuse;
    }

    // === Inspection ===

    pub fn tab(&self, tab_id: TabId) -> Option<TabInfo> {
        self.state().snapshot(tab_id)
    }

    pub fn group(&self, group_id: GroupId) -> Option<TabGroup> {
        self.state().groups.get(&group_id).cloned()
    }

    pub fn groups_in(&self, window_id: WindowId) -> Vec<TabGroup> {
        self.state()
            .groups
            .values()
            .filter(|g| g.window_id == window_id)
            .cloned()
            .collect()
    }

    /// Tab ids of `window_id` in index order.
    pub fn tab_order(&self, window_id: WindowId) -> Vec<TabId> {
        self.state().windows.get(&window_id).cloned().unwrap_or_default()
    }

    pub fn tab_count(&self) -> usize {
        self.state().tabs.len()
    }

    pub fn focused_window(&self) -> Option<WindowId> {
        self.state().focused_window
    }

    /// Tabs removed through [`TabHost::remove_tab`], in call order.
    pub fn removed_tabs(&self) -> Vec<TabId> {
        self.state().removed.clone()
    }

    pub fn injected(&self) -> Vec<(TabId, PageScript)> {
        self.state().injected.clone()
    }

    pub fn injected_into(&self, tab_id: TabId) -> Vec<PageScript> {
        self.state()
            .injected
            .iter()
            .filter(|(id, _)| *id == tab_id)
            .map(|(_, script)| script.clone())
            .collect()
    }

    pub fn badges(&self) -> Vec<BadgeUpdate> {
        self.state().badges.clone()
    }

    pub fn last_badge_for(&self, tab_id: Option<TabId>) -> Option<BadgeUpdate> {
        self.state()
            .badges
            .iter()
            .rev()
            .find(|b| b.tab_id == tab_id)
            .cloned()
    }

    pub fn popups(&self) -> Vec<(WindowId, String, WindowSize)> {
        self.state().popups.clone()
    }
}

fn unreachable_tab(id: TabId, window_id: WindowId) -> TabInfo {
    TabInfo {
        id,
        window_id,
        index: 0,
        url: String::new(),
        pinned: false,
        active: false,
        group_id: GROUP_ID_NONE,
        last_accessed: 0,
    }
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[async_trait]
impl TabHost for InMemoryTabHost {
    async fn query_tabs(&self, query: &TabQuery) -> Result<Vec<TabInfo>, HostError> {
        let state = self.state();
        let mut found = Vec::new();
        for (window_id, order) in &state.windows {
            if query.window_id.is_some_and(|w| w != *window_id) {
                continue;
            }
            if query.focused_window && state.focused_window != Some(*window_id) {
                continue;
            }
            for tab_id in order {
                let Some(tab) = state.snapshot(*tab_id) else { continue };
                if query.group_id.is_some_and(|g| g != tab.group_id) {
                    continue;
                }
                if query.active.is_some_and(|a| a != tab.active) {
                    continue;
                }
                found.push(tab);
            }
        }
        Ok(found)
    }

    async fn get_tab(&self, tab_id: TabId) -> Result<TabInfo, HostError> {
        self.state().snapshot(tab_id).ok_or(HostError::TabNotFound(tab_id))
    }

    async fn activate_tab(&self, tab_id: TabId) -> Result<(), HostError> {
        let mut state = self.state();
        let window_id = state
            .tabs
            .get(&tab_id)
            .map(|t| t.window_id)
            .ok_or(HostError::TabNotFound(tab_id))?;
        let now = now_millis();
        for tab in state.tabs.values_mut().filter(|t| t.window_id == window_id) {
            tab.active = tab.id == tab_id;
            if tab.active {
                tab.last_accessed = now;
            }
        }
        Ok(())
    }

    async fn move_tab(&self, tab_id: TabId, index: usize) -> Result<(), HostError> {
        let mut state = self.state();
        let window_id = state
            .tabs
            .get(&tab_id)
            .map(|t| t.window_id)
            .ok_or(HostError::TabNotFound(tab_id))?;
        let order = state
            .windows
            .get_mut(&window_id)
            .ok_or(HostError::WindowNotFound(window_id))?;
        order.retain(|id| *id != tab_id);
        let index = index.min(order.len());
        order.insert(index, tab_id);
        Ok(())
    }

    async fn remove_tab(&self, tab_id: TabId) -> Result<(), HostError> {
        let mut state = self.state();
        let tab = state.tabs.remove(&tab_id).ok_or(HostError::TabNotFound(tab_id))?;
        if let Some(order) = state.windows.get_mut(&tab.window_id) {
            order.retain(|id| *id != tab_id);
        }
        state.prune_groups();
        state.removed.push(tab_id);
        Ok(())
    }

    async fn group_tabs(&self, tab_ids: &[TabId], group_id: Option<GroupId>) -> Result<GroupId, HostError> {
        let mut state = self.state();
        let first = tab_ids
            .first()
            .ok_or_else(|| HostError::Bridge("group_tabs called without tabs".to_string()))?;
        for tab_id in tab_ids {
            if !state.tabs.contains_key(tab_id) {
                return Err(HostError::TabNotFound(*tab_id));
            }
        }
        let target = match group_id {
            Some(group_id) => {
                if !state.groups.contains_key(&group_id) {
                    return Err(HostError::GroupNotFound(group_id));
                }
                group_id
            }
            None => {
                let window_id = state
                    .tabs
                    .get(first)
                    .map(|t| t.window_id)
                    .ok_or(HostError::TabNotFound(*first))?;
                state.next_group_id += 1;
                let group_id = state.next_group_id;
                state.groups.insert(
                    group_id,
                    TabGroup {
                        id: group_id,
                        window_id,
                        title: String::new(),
                        color: GroupColor::Grey,
                        collapsed: false,
                    },
                );
                group_id
            }
        };
        for tab_id in tab_ids {
            if let Some(tab) = state.tabs.get_mut(tab_id) {
                tab.group_id = target;
            }
        }
        state.prune_groups();
        Ok(target)
    }

    async fn get_group(&self, group_id: GroupId) -> Result<TabGroup, HostError> {
        self.state()
            .groups
            .get(&group_id)
            .cloned()
            .ok_or(HostError::GroupNotFound(group_id))
    }

    async fn query_groups(&self, window_id: WindowId) -> Result<Vec<TabGroup>, HostError> {
        Ok(self.groups_in(window_id))
    }

    async fn update_group(&self, group_id: GroupId, update: &GroupUpdate) -> Result<(), HostError> {
        let mut state = self.state();
        let group = state
            .groups
            .get_mut(&group_id)
            .ok_or(HostError::GroupNotFound(group_id))?;
        if let Some(title) = &update.title {
            group.title = title.clone();
        }
        if let Some(color) = update.color {
            group.color = color;
        }
        if let Some(collapsed) = update.collapsed {
            group.collapsed = collapsed;
        }
        Ok(())
    }

    async fn focus_window(&self, window_id: WindowId) -> Result<(), HostError> {
        let mut state = self.state();
        if !state.windows.contains_key(&window_id) {
            return Err(HostError::WindowNotFound(window_id));
        }
        state.focused_window = Some(window_id);
        Ok(())
    }

    async fn create_popup_window(&self, url: &str, size: WindowSize) -> Result<WindowId, HostError> {
        let mut state = self.state();
        let window_id = state.next_window_id.max(1);
        let full_url = format!("{}{}", EXTENSION_BASE_URL, url);
        state.insert_tab(window_id, &full_url, false);
        state.focused_window = Some(window_id);
        state.popups.push((window_id, url.to_string(), size));
        Ok(window_id)
    }

    async fn inject(&self, tab_id: TabId, script: &PageScript) -> Result<(), HostError> {
        let mut state = self.state();
        if !state.tabs.contains_key(&tab_id) {
            return Err(HostError::TabNotFound(tab_id));
        }
        if state.refuse_injection {
            return Err(HostError::InjectionRefused {
                tab_id,
                reason: "page does not accept scripts".to_string(),
            });
        }
        state.injected.push((tab_id, script.clone()));
        Ok(())
    }

    async fn set_badge(&self, badge: &BadgeUpdate) -> Result<(), HostError> {
        self.state().badges.push(badge.clone());
        Ok(())
    }
}
