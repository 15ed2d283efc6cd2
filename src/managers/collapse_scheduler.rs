//! Inactivity collapse: switching into a different group expands it and,
//! after a short delay, collapses the other idle groups of the focused window.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::managers::PolicyHandler;
use crate::services::settings_store::{load, SettingsStore};
use crate::services::tab_host::{find_tab, TabHost};
use crate::types::errors::{HostError, PolicyError};
use crate::types::event::TabEvent;
use crate::types::settings::{CollapsePolicy, MAX_COLLAPSE_DELAY_SECONDS};
use crate::types::tab::{GroupId, GroupUpdate, TabId, TabQuery, GROUP_ID_NONE};

/// A group with a member accessed this recently is left expanded.
pub const RECENT_ACTIVITY_THRESHOLD: Duration = Duration::from_secs(5);

#[derive(Default)]
struct CollapseState {
    /// `None` until the first activation is seen.
    last_active_group: Option<GroupId>,
    sweep: Option<(u64, JoinHandle<()>)>,
}

#[derive(Clone)]
pub struct CollapseScheduler {
    host: Arc<dyn TabHost>,
    store: Arc<dyn SettingsStore>,
    state: Arc<Mutex<CollapseState>>,
    generations: Arc<AtomicU64>,
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

impl CollapseScheduler {
    pub fn new(host: Arc<dyn TabHost>, store: Arc<dyn SettingsStore>) -> Self {
        Self {
            host,
            store,
            state: Arc::new(Mutex::new(CollapseState::default())),
            generations: Arc::new(AtomicU64::new(0)),
        }
    }

    fn state(&self) -> MutexGuard<'_, CollapseState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn last_active_group(&self) -> Option<GroupId> {
        self.state().last_active_group
    }

    pub fn has_pending_sweep(&self) -> bool {
        self.state().sweep.is_some()
    }

    /// Reacts to a tab becoming active. Returns true when a sweep was scheduled.
    pub async fn on_activated(&self, tab_id: TabId) -> Result<bool, PolicyError> {
        let policy: CollapsePolicy = load(self.store.as_ref()).await;
        if !policy.enabled {
            return Ok(false);
        }
        let host = self.host.as_ref();
        let Some(tab) = find_tab(host, tab_id).await? else {
            return Ok(false);
        };
        if self.last_active_group() == Some(tab.group_id) {
            return Ok(false);
        }

        if tab.group_id != GROUP_ID_NONE {
            match host.get_group(tab.group_id).await {
                Ok(group) if group.collapsed => {
                    host.update_group(group.id, &GroupUpdate::collapsed(false)).await?;
                    tracing::debug!(group_id = group.id, "expanded newly active group");
                }
                Ok(_) => {}
                Err(e) if e.is_vanished() => {}
                Err(e) => return Err(e.into()),
            }
        }

        let delay = policy.collapse_delay_seconds.clamp(1, MAX_COLLAPSE_DELAY_SECONDS);
        self.schedule_sweep(Duration::from_secs(delay));
        self.state().last_active_group = Some(tab.group_id);
        Ok(true)
    }

    fn schedule_sweep(&self, delay: Duration) {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let this = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut state = this.state();
                if state.sweep.as_ref().is_some_and(|(g, _)| *g == generation) {
                    state.sweep = None;
                }
            }
            match this.collapse_inactive_groups().await {
                Ok(collapsed) if collapsed > 0 => tracing::info!(collapsed, "collapsed inactive groups"),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "collapse sweep failed"),
            }
        });
        let previous = self.state().sweep.replace((generation, handle));
        if let Some((_, handle)) = previous {
            handle.abort();
        }
    }

    /// Collapses every expanded group of the focused window except the
    /// active tab's group and groups with recent activity. Returns how many
    /// groups were collapsed.
    pub async fn collapse_inactive_groups(&self) -> Result<usize, HostError> {
        let host = self.host.as_ref();
        let active = host.query_tabs(&TabQuery::active_in_focused_window()).await?;
        let Some(active) = active.into_iter().next() else {
            return Ok(0);
        };

        let threshold = RECENT_ACTIVITY_THRESHOLD.as_millis() as i64;
        let mut collapsed = 0;
        for group in host.query_groups(active.window_id).await? {
            if group.id == active.group_id || group.collapsed {
                continue;
            }
            let members = host.query_tabs(&TabQuery::in_group(group.id)).await?;
            let now = now_millis();
            if members.iter().any(|t| now - t.last_accessed < threshold) {
                continue;
            }
            match host.update_group(group.id, &GroupUpdate::collapsed(true)).await {
                Ok(()) => collapsed += 1,
                Err(e) if e.is_vanished() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(collapsed)
    }

    pub fn reset(&self) {
        let mut state = self.state();
        if let Some((_, handle)) = state.sweep.take() {
            handle.abort();
        }
        state.last_active_group = None;
    }
}

#[async_trait]
impl PolicyHandler for CollapseScheduler {
    fn name(&self) -> &'static str {
        "collapse"
    }

    async fn handle(&self, event: &TabEvent) -> Result<(), PolicyError> {
        if let TabEvent::TabActivated { tab_id, .. } = event {
            self.on_activated(*tab_id).await?;
        }
        Ok(())
    }
}
