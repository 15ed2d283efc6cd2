//! Auto-close: tabs whose URL matches a close pattern are closed after a
//! delay, optionally behind a countdown banner that lets the user keep them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::managers::PolicyHandler;
use crate::services::pattern_matcher::matches_any;
use crate::services::settings_store::{load, SettingsStore};
use crate::services::tab_host::{find_tab, remove_tab_quietly, TabHost};
use crate::types::decision::{new_token, AutoCloseDecision, PendingAutoCloseDecision};
use crate::types::errors::{DecisionError, PolicyError};
use crate::types::event::TabEvent;
use crate::types::settings::AutoClosePolicy;
use crate::types::tab::{PageScript, TabId};

#[derive(Debug, Clone, PartialEq)]
pub enum AutoCloseOutcome {
    /// Disabled, no patterns, or no pattern matched.
    Skipped,
    /// The user opted out recently.
    Suppressed,
    /// A countdown banner is waiting under this token.
    BannerShown { token: String },
    /// A plain close timer is running.
    TimerScheduled,
}

/// What a tab's timer does when it fires.
enum TimerAction {
    /// Plain timer: close unless suppressed meanwhile.
    Close,
    /// Banner countdown ran out: resolve the pending decision as "close".
    Expire(String),
}

struct ArmedTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Clone)]
pub struct AutoCloseScheduler {
    host: Arc<dyn TabHost>,
    store: Arc<dyn SettingsStore>,
    timers: Arc<Mutex<HashMap<TabId, ArmedTimer>>>,
    generations: Arc<AtomicU64>,
    pending: Arc<Mutex<HashMap<String, PendingAutoCloseDecision>>>,
    suppressed: Arc<Mutex<HashMap<TabId, Instant>>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AutoCloseScheduler {
    pub fn new(host: Arc<dyn TabHost>, store: Arc<dyn SettingsStore>) -> Self {
        Self {
            host,
            store,
            timers: Arc::new(Mutex::new(HashMap::new())),
            generations: Arc::new(AtomicU64::new(0)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            suppressed: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Evaluates a tab that just navigated to `url`.
    pub async fn on_navigation(&self, tab_id: TabId, url: &str) -> Result<AutoCloseOutcome, PolicyError> {
        let policy: AutoClosePolicy = load(self.store.as_ref()).await;
        if !policy.enabled || policy.patterns.is_empty() || !matches_any(&policy.patterns, url) {
            return Ok(AutoCloseOutcome::Skipped);
        }
        if self.is_suppressed(tab_id) {
            tracing::debug!(tab_id, "auto-close suppressed");
            return Ok(AutoCloseOutcome::Suppressed);
        }

        self.cancel_timer(tab_id);
        let delay_seconds = policy.close_delay();

        if !policy.banner_enabled {
            self.arm(tab_id, delay_seconds, TimerAction::Close);
            tracing::info!(tab_id, delay_seconds, "auto-close scheduled");
            return Ok(AutoCloseOutcome::TimerScheduled);
        }

        let token = new_token("ac");
        self.replace_pending(PendingAutoCloseDecision {
            token: token.clone(),
            tab_id,
            initial_url: url.to_string(),
            delay_seconds,
        });
        self.arm(tab_id, delay_seconds, TimerAction::Expire(token.clone()));

        let script = PageScript::AutoCloseBanner {
            token: token.clone(),
            delay_seconds,
        };
        match self.host.inject(tab_id, &script).await {
            Ok(()) => {
                tracing::info!(tab_id, token = %token, delay_seconds, "auto-close banner shown");
                Ok(AutoCloseOutcome::BannerShown { token })
            }
            Err(e) => {
                tracing::warn!(tab_id, error = %e, "auto-close banner injection failed, using timer");
                // The decision may already have been answered or dropped.
                if locked(&self.pending).remove(&token).is_some() {
                    self.cancel_timer(tab_id);
                    self.arm(tab_id, delay_seconds, TimerAction::Close);
                }
                Ok(AutoCloseOutcome::TimerScheduled)
            }
        }
    }

    /// Answers a banner. Each token is accepted once.
    pub async fn decide(&self, token: &str, decision: AutoCloseDecision) -> Result<(), DecisionError> {
        let pending = locked(&self.pending)
            .remove(token)
            .ok_or_else(|| DecisionError::UnknownToken(token.to_string()))?;
        self.cancel_timer(pending.tab_id);
        match decision {
            AutoCloseDecision::Close => self.close_if_still_matching(pending.tab_id).await,
            AutoCloseDecision::Keep => {
                let policy: AutoClosePolicy = load(self.store.as_ref()).await;
                let seconds = policy.suppression_seconds();
                locked(&self.suppressed).insert(pending.tab_id, Instant::now() + Duration::from_secs(seconds));
                tracing::info!(tab_id = pending.tab_id, seconds, "auto-close suppressed by user");
            }
        }
        Ok(())
    }

    /// Checks the suppression table, purging the entry once it has expired.
    pub fn is_suppressed(&self, tab_id: TabId) -> bool {
        let mut suppressed = locked(&self.suppressed);
        match suppressed.get(&tab_id) {
            Some(expires) if Instant::now() < *expires => true,
            Some(_) => {
                suppressed.remove(&tab_id);
                false
            }
            None => false,
        }
    }

    /// Closes the tab if it is still open and its current URL still matches
    /// a configured pattern.
    async fn close_if_still_matching(&self, tab_id: TabId) {
        let policy: AutoClosePolicy = load(self.store.as_ref()).await;
        match find_tab(self.host.as_ref(), tab_id).await {
            Ok(Some(tab)) if matches_any(&policy.patterns, &tab.url) => {
                remove_tab_quietly(self.host.as_ref(), tab_id).await;
                tracing::info!(tab_id, url = %tab.url, "auto-closed tab");
            }
            Ok(Some(tab)) => tracing::debug!(tab_id, url = %tab.url, "tab no longer matches, not closing"),
            Ok(None) => tracing::debug!(tab_id, "tab already closed"),
            Err(e) => tracing::warn!(tab_id, error = %e, "could not verify tab before closing"),
        }
    }

    fn arm(&self, tab_id: TabId, delay_seconds: u64, action: TimerAction) {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let this = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(delay_seconds)).await;
            this.release_timer(tab_id, generation);
            match action {
                TimerAction::Close => {
                    if this.is_suppressed(tab_id) {
                        return;
                    }
                    this.close_if_still_matching(tab_id).await;
                }
                TimerAction::Expire(token) => {
                    let expired = locked(&this.pending).remove(&token);
                    if expired.is_some() {
                        tracing::info!(tab_id, token = %token, "auto-close banner timed out");
                        this.close_if_still_matching(tab_id).await;
                    }
                }
            }
        });
        let replaced = locked(&self.timers).insert(tab_id, ArmedTimer { generation, handle });
        if let Some(previous) = replaced {
            previous.handle.abort();
        }
    }

    /// Removes the timer entry only if it still belongs to `generation`.
    fn release_timer(&self, tab_id: TabId, generation: u64) {
        let mut timers = locked(&self.timers);
        if timers.get(&tab_id).is_some_and(|t| t.generation == generation) {
            timers.remove(&tab_id);
        }
    }

    fn cancel_timer(&self, tab_id: TabId) {
        if let Some(timer) = locked(&self.timers).remove(&tab_id) {
            timer.handle.abort();
        }
    }

    fn replace_pending(&self, decision: PendingAutoCloseDecision) {
        let mut pending = locked(&self.pending);
        pending.retain(|_, p| p.tab_id != decision.tab_id);
        pending.insert(decision.token.clone(), decision);
    }

    /// Forgets everything held for a closed tab.
    pub fn on_tab_removed(&self, tab_id: TabId) {
        self.cancel_timer(tab_id);
        locked(&self.pending).retain(|_, p| p.tab_id != tab_id);
        locked(&self.suppressed).remove(&tab_id);
    }

    pub fn has_timer(&self, tab_id: TabId) -> bool {
        locked(&self.timers).contains_key(&tab_id)
    }

    pub fn pending_for(&self, tab_id: TabId) -> Option<PendingAutoCloseDecision> {
        locked(&self.pending).values().find(|p| p.tab_id == tab_id).cloned()
    }

    pub fn reset(&self) {
        for (_, timer) in locked(&self.timers).drain() {
            timer.handle.abort();
        }
        locked(&self.pending).clear();
        locked(&self.suppressed).clear();
    }
}

#[async_trait]
impl PolicyHandler for AutoCloseScheduler {
    fn name(&self) -> &'static str {
        "auto_close"
    }

    async fn handle(&self, event: &TabEvent) -> Result<(), PolicyError> {
        if let TabEvent::TabRemoved { tab_id, .. } = event {
            self.on_tab_removed(*tab_id);
            return Ok(());
        }
        for (tab_id, url) in event.navigated_urls() {
            self.on_navigation(tab_id, &url).await?;
        }
        Ok(())
    }
}
