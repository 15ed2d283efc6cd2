//! Duplicate tab detection and resolution.
//!
//! When a tab navigates to a URL another live tab already shows, the
//! configured default closes either the newer or the older tab. With banners
//! enabled the user first gets a countdown banner in the new tab; an
//! unanswered banner resolves to the default when the countdown runs out.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::managers::url_registry::{normalize_url, UrlRegistry};
use crate::managers::PolicyHandler;
use crate::services::pattern_matcher::matches_any;
use crate::services::settings_store::{load, SettingsStore};
use crate::services::tab_host::{find_tab, remove_tab_quietly, TabHost};
use crate::types::decision::{new_token, DuplicateDecision, PendingDuplicateDecision};
use crate::types::errors::{DecisionError, PolicyError};
use crate::types::event::TabEvent;
use crate::types::settings::DuplicatePolicy;
use crate::types::tab::{PageScript, TabId};

/// What a navigation led to.
#[derive(Debug, Clone, PartialEq)]
pub enum DuplicateOutcome {
    /// No live duplicate (or detection disabled); the URL was recorded.
    Recorded,
    /// The URL matches an allowed-duplicate pattern.
    Allowed,
    /// A banner is waiting for a decision under this token.
    BannerShown { token: String },
    /// The default action ran immediately.
    DefaultApplied,
}

#[derive(Clone)]
pub struct DuplicateResolver {
    host: Arc<dyn TabHost>,
    store: Arc<dyn SettingsStore>,
    registry: Arc<UrlRegistry>,
    pending: Arc<Mutex<HashMap<String, PendingDuplicateDecision>>>,
    countdowns: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl DuplicateResolver {
    pub fn new(host: Arc<dyn TabHost>, store: Arc<dyn SettingsStore>, registry: Arc<UrlRegistry>) -> Self {
        Self {
            host,
            store,
            registry,
            pending: Arc::new(Mutex::new(HashMap::new())),
            countdowns: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn registry(&self) -> &Arc<UrlRegistry> {
        &self.registry
    }

    /// Evaluates a tab that just navigated to `url`.
    pub async fn on_navigation(&self, tab_id: TabId, url: &str) -> Result<DuplicateOutcome, PolicyError> {
        let policy: DuplicatePolicy = load(self.store.as_ref()).await;
        let normalized = normalize_url(url);

        if !policy.enabled {
            self.registry.record_or_update(&normalized, tab_id);
            return Ok(DuplicateOutcome::Recorded);
        }
        if matches_any(&policy.allowed_patterns, url) || matches_any(&policy.allowed_patterns, &normalized) {
            tracing::debug!(tab_id, url, "duplicate allowed by pattern");
            self.registry.record_or_update(&normalized, tab_id);
            return Ok(DuplicateOutcome::Allowed);
        }

        let existing_id = match self.registry.lookup(&normalized) {
            Some(id) if id != tab_id => id,
            _ => {
                self.registry.record_or_update(&normalized, tab_id);
                return Ok(DuplicateOutcome::Recorded);
            }
        };

        let existing = match find_tab(self.host.as_ref(), existing_id).await? {
            Some(tab) => tab,
            None => {
                tracing::debug!(tab_id = existing_id, "registry entry pointed at a closed tab");
                self.registry.evict(&normalized, existing_id);
                self.registry.record_or_update(&normalized, tab_id);
                return Ok(DuplicateOutcome::Recorded);
            }
        };
        if normalize_url(&existing.url) != normalized {
            self.registry.record_or_update(&normalized, tab_id);
            return Ok(DuplicateOutcome::Recorded);
        }

        tracing::info!(tab_id, existing_tab_id = existing_id, url = %normalized, "duplicate tab detected");
        let decision = PendingDuplicateDecision {
            token: new_token("dup"),
            normalized_url: normalized,
            new_tab_id: tab_id,
            existing_tab_id: existing_id,
            default_closes_older: policy.close_older_tab,
        };

        if !policy.banner_enabled {
            self.apply_default(&decision).await;
            return Ok(DuplicateOutcome::DefaultApplied);
        }

        let delay_seconds = policy.banner_delay();
        let token = decision.token.clone();
        let script = PageScript::DuplicateBanner {
            token: token.clone(),
            default_closes_older: decision.default_closes_older,
            delay_seconds,
        };
        self.store_pending(decision);
        self.arm_countdown(&token, delay_seconds);

        match self.host.inject(tab_id, &script).await {
            Ok(()) => Ok(DuplicateOutcome::BannerShown { token }),
            Err(e) => {
                tracing::warn!(tab_id, error = %e, "duplicate banner injection failed, applying default");
                if let Some(decision) = self.take_pending(&token) {
                    self.apply_default(&decision).await;
                }
                Ok(DuplicateOutcome::DefaultApplied)
            }
        }
    }

    /// Answers a banner. Each token is accepted once.
    pub async fn decide(&self, token: &str, decision: DuplicateDecision) -> Result<(), DecisionError> {
        let pending = self
            .take_pending(token)
            .ok_or_else(|| DecisionError::UnknownToken(token.to_string()))?;
        match decision {
            DuplicateDecision::ApplyDefault => self.apply_default(&pending).await,
            DuplicateDecision::KeepBoth => {
                tracing::info!(token, new_tab_id = pending.new_tab_id, "keeping both duplicate tabs");
            }
        }
        Ok(())
    }

    /// Closes whichever tab the default says, provided the tab being kept
    /// is still open.
    async fn apply_default(&self, decision: &PendingDuplicateDecision) {
        let host = self.host.as_ref();
        let (keep_id, close_id) = if decision.default_closes_older {
            (decision.new_tab_id, decision.existing_tab_id)
        } else {
            (decision.existing_tab_id, decision.new_tab_id)
        };

        let kept = match find_tab(host, keep_id).await {
            Ok(kept) => kept,
            Err(e) => {
                tracing::warn!(tab_id = keep_id, error = %e, "could not verify tab to keep");
                return;
            }
        };
        let Some(kept) = kept else {
            tracing::info!(tab_id = keep_id, "tab to keep is gone, leaving duplicate open");
            if let Ok(Some(_)) = find_tab(host, close_id).await {
                self.registry.record_or_update(&decision.normalized_url, close_id);
            }
            return;
        };

        self.registry.record_or_update(&decision.normalized_url, keep_id);
        if !decision.default_closes_older {
            if let Err(e) = host.focus_window(kept.window_id).await {
                tracing::debug!(window_id = kept.window_id, error = %e, "focus failed");
            }
            if let Err(e) = host.activate_tab(keep_id).await {
                tracing::debug!(tab_id = keep_id, error = %e, "activate failed");
            }
        }
        remove_tab_quietly(host, close_id).await;
        tracing::info!(kept = keep_id, closed = close_id, "duplicate resolved");
    }

    /// Drops registry entries and pending decisions that reference a closed tab.
    pub fn on_tab_removed(&self, tab_id: TabId) {
        self.registry.forget(tab_id);
        let dropped: Vec<String> = {
            let mut pending = locked(&self.pending);
            let tokens: Vec<String> = pending
                .values()
                .filter(|p| p.involves(tab_id))
                .map(|p| p.token.clone())
                .collect();
            for token in &tokens {
                pending.remove(token);
            }
            tokens
        };
        for token in &dropped {
            self.cancel_countdown(token);
            tracing::debug!(tab_id, token = %token, "pending duplicate decision dropped");
        }
    }

    fn store_pending(&self, decision: PendingDuplicateDecision) {
        let replaced: Vec<String> = {
            let mut pending = locked(&self.pending);
            let same_pair: Vec<String> = pending
                .values()
                .filter(|p| p.new_tab_id == decision.new_tab_id && p.existing_tab_id == decision.existing_tab_id)
                .map(|p| p.token.clone())
                .collect();
            for token in &same_pair {
                pending.remove(token);
            }
            pending.insert(decision.token.clone(), decision);
            same_pair
        };
        for token in &replaced {
            self.cancel_countdown(token);
        }
    }

    fn take_pending(&self, token: &str) -> Option<PendingDuplicateDecision> {
        let taken = locked(&self.pending).remove(token);
        if taken.is_some() {
            self.cancel_countdown(token);
        }
        taken
    }

    fn arm_countdown(&self, token: &str, delay_seconds: u64) {
        let this = self.clone();
        let owned = token.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(delay_seconds)).await;
            locked(&this.countdowns).remove(&owned);
            let expired = locked(&this.pending).remove(&owned);
            if let Some(decision) = expired {
                tracing::info!(token = %owned, "duplicate banner timed out, applying default");
                this.apply_default(&decision).await;
            }
        });
        if let Some(previous) = locked(&self.countdowns).insert(token.to_string(), handle) {
            previous.abort();
        }
    }

    fn cancel_countdown(&self, token: &str) {
        if let Some(handle) = locked(&self.countdowns).remove(token) {
            handle.abort();
        }
    }

    pub fn pending_count(&self) -> usize {
        locked(&self.pending).len()
    }

    pub fn pending_for(&self, tab_id: TabId) -> Vec<PendingDuplicateDecision> {
        locked(&self.pending)
            .values()
            .filter(|p| p.involves(tab_id))
            .cloned()
            .collect()
    }

    /// Cancels every countdown and forgets all pending decisions.
    pub fn reset(&self) {
        for (_, handle) in locked(&self.countdowns).drain() {
            handle.abort();
        }
        locked(&self.pending).clear();
    }
}

#[async_trait]
impl PolicyHandler for DuplicateResolver {
    fn name(&self) -> &'static str {
        "duplicates"
    }

    async fn handle(&self, event: &TabEvent) -> Result<(), PolicyError> {
        match event {
            TabEvent::TabRemoved { tab_id, .. } => {
                self.on_tab_removed(*tab_id);
                Ok(())
            }
            _ => match event.url_changes() {
                Some((tab_id, url)) => self.on_navigation(tab_id, &url).await.map(drop),
                None => Ok(()),
            },
        }
    }
}
