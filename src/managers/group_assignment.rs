//! Rule-based tab grouping.
//!
//! Incremental path: a navigated tab joins the same-named group of its
//! window at the configured side, or founds a new group. Bulk path: every
//! matching open tab is merged into its window's group for the rule.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::managers::PolicyHandler;
use crate::services::settings_store::{load, SettingsStore};
use crate::services::tab_host::{find_tab, TabHost};
use crate::types::errors::{HostError, PolicyError};
use crate::types::event::TabEvent;
use crate::types::settings::{GroupRule, GroupingPolicy, InsertPosition};
use crate::types::tab::{is_internal_url, GroupColor, GroupId, GroupUpdate, TabId, TabInfo, TabQuery, WindowId};

#[derive(Debug, Clone, PartialEq)]
pub enum GroupingOutcome {
    /// Disabled, no rule matched, or the tab is excluded (pinned/grouped/gone).
    Skipped,
    /// The tab already sits in the rule's group.
    AlreadyInGroup { group_id: GroupId },
    AddedToGroup { group_id: GroupId, index: usize },
    CreatedGroup { group_id: GroupId, color: GroupColor },
}

#[derive(Clone)]
pub struct GroupAssignment {
    host: Arc<dyn TabHost>,
    store: Arc<dyn SettingsStore>,
}

impl GroupAssignment {
    pub fn new(host: Arc<dyn TabHost>, store: Arc<dyn SettingsStore>) -> Self {
        Self { host, store }
    }

    /// Routes one tab that navigated to `url`.
    pub async fn assign(&self, tab_id: TabId, url: &str) -> Result<GroupingOutcome, PolicyError> {
        let policy: GroupingPolicy = load(self.store.as_ref()).await;
        if !policy.enabled || policy.rules.is_empty() {
            return Ok(GroupingOutcome::Skipped);
        }
        let host = self.host.as_ref();
        let Some(tab) = find_tab(host, tab_id).await? else {
            return Ok(GroupingOutcome::Skipped);
        };
        if policy.ignore_pinned_tabs && tab.pinned {
            tracing::trace!(tab_id, "pinned tab not grouped");
            return Ok(GroupingOutcome::Skipped);
        }
        if !policy.apply_to_grouped_tabs && tab.is_grouped() {
            tracing::trace!(tab_id, group_id = tab.group_id, "tab already grouped");
            return Ok(GroupingOutcome::Skipped);
        }
        let Some(rule) = policy.matching_rule(url) else {
            return Ok(GroupingOutcome::Skipped);
        };

        let groups = host.query_groups(tab.window_id).await?;
        match groups.iter().find(|g| g.title == rule.group_name) {
            Some(group) if group.id == tab.group_id => Ok(GroupingOutcome::AlreadyInGroup { group_id: group.id }),
            Some(group) => {
                let members = host.query_tabs(&TabQuery::in_group(group.id)).await?;
                let index = insertion_index(&members, policy.insert_position);
                host.move_tab(tab_id, index).await?;
                host.group_tabs(&[tab_id], Some(group.id)).await?;
                tracing::info!(tab_id, group_id = group.id, index, group = %rule.group_name, "tab added to group");
                Ok(GroupingOutcome::AddedToGroup { group_id: group.id, index })
            }
            None => {
                let group_id = host.group_tabs(&[tab_id], None).await?;
                let color = rule.color().unwrap_or_else(GroupColor::random);
                host.update_group(group_id, &GroupUpdate::title_and_color(&rule.group_name, Some(color)))
                    .await?;
                tracing::info!(tab_id, group_id, group = %rule.group_name, color = color.as_str(), "group created");
                Ok(GroupingOutcome::CreatedGroup { group_id, color })
            }
        }
    }

    /// Merges every open tab matching `rule` into the rule's group, window
    /// by window. Returns how many tabs were grouped.
    pub async fn group_existing_tabs_for_rule(&self, rule: &GroupRule) -> Result<usize, HostError> {
        if rule.patterns.is_empty() {
            return Ok(0);
        }
        let host = self.host.as_ref();
        let tabs = host.query_tabs(&TabQuery::all()).await?;

        let mut by_window: BTreeMap<WindowId, Vec<TabId>> = BTreeMap::new();
        for tab in tabs.iter().filter(|t| !is_internal_url(&t.url) && rule.matches(&t.url)) {
            by_window.entry(tab.window_id).or_default().push(tab.id);
        }

        let mut grouped = 0;
        for (window_id, tab_ids) in by_window {
            let groups = host.query_groups(window_id).await?;
            match groups.iter().find(|g| g.title == rule.group_name) {
                Some(group) => {
                    host.group_tabs(&tab_ids, Some(group.id)).await?;
                    let update = GroupUpdate::title_and_color(&rule.group_name, rule.color());
                    if let Err(e) = host.update_group(group.id, &update).await {
                        tracing::debug!(group_id = group.id, error = %e, "group restyle failed");
                    }
                }
                None => {
                    let group_id = host.group_tabs(&tab_ids, None).await?;
                    let color = rule.color().unwrap_or_else(GroupColor::random);
                    host.update_group(group_id, &GroupUpdate::title_and_color(&rule.group_name, Some(color)))
                        .await?;
                }
            }
            tracing::info!(window_id, tabs = tab_ids.len(), group = %rule.group_name, "existing tabs grouped");
            grouped += tab_ids.len();
        }
        Ok(grouped)
    }

    /// Runs [`Self::group_existing_tabs_for_rule`] for every configured rule.
    pub async fn group_all_existing_tabs(&self) -> Result<usize, HostError> {
        let policy: GroupingPolicy = load(self.store.as_ref()).await;
        if !policy.enabled || policy.rules.is_empty() {
            return Ok(0);
        }
        let mut grouped = 0;
        for rule in &policy.rules {
            grouped += self.group_existing_tabs_for_rule(rule).await?;
        }
        Ok(grouped)
    }
}

/// Left: the group's first index. Right: one past its last index.
fn insertion_index(members: &[TabInfo], position: InsertPosition) -> usize {
    match position {
        InsertPosition::Left => members.iter().map(|t| t.index).min().unwrap_or(0),
        InsertPosition::Right => members.iter().map(|t| t.index + 1).max().unwrap_or(0),
    }
}

#[async_trait]
impl PolicyHandler for GroupAssignment {
    fn name(&self) -> &'static str {
        "grouping"
    }

    async fn handle(&self, event: &TabEvent) -> Result<(), PolicyError> {
        for (tab_id, url) in event.navigated_urls() {
            self.assign(tab_id, &url).await?;
        }
        Ok(())
    }
}
