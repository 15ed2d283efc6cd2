//! Tab Host reached over the bridge's line protocol.
//!
//! Outbound calls: `{"call":7,"method":"tabs.get","params":{"tabId":3}}`
//! Replies:        `{"reply":7,"result":{...}}` or `{"reply":7,"error":...}`
//!
//! An error is either a plain string or `{"kind":"tabNotFound","id":3}`
//! (kinds: `tabNotFound`, `groupNotFound`, `windowNotFound`,
//! `injectionRefused`). The bridge owns the actual stdout writer; this type
//! only queues outbound frames and matches replies to waiting calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};

use crate::services::tab_host::TabHost;
use crate::types::errors::HostError;
use crate::types::tab::{
    BadgeUpdate, GroupId, GroupUpdate, PageScript, TabGroup, TabId, TabInfo, TabQuery, WindowId,
    WindowSize,
};

/// How long a call waits for the browser side to answer.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

type ReplySender = oneshot::Sender<Result<Value, Value>>;

pub struct StdioTabHost {
    outbound: mpsc::UnboundedSender<Value>,
    pending: Mutex<HashMap<u64, ReplySender>>,
    next_call: AtomicU64,
    call_timeout: Duration,
}

impl StdioTabHost {
    pub fn new(outbound: mpsc::UnboundedSender<Value>) -> Self {
        Self::with_timeout(outbound, DEFAULT_CALL_TIMEOUT)
    }

    pub fn with_timeout(outbound: mpsc::UnboundedSender<Value>, call_timeout: Duration) -> Self {
        Self {
            outbound,
            pending: Mutex::new(HashMap::new()),
            next_call: AtomicU64::new(1),
            call_timeout,
        }
    }

    /// Delivers a `{"reply":n,...}` frame to its waiting call.
    ///
    /// Returns false when the frame is not a reply or nobody is waiting
    /// for it (for example after the call timed out).
    pub fn resolve_reply(&self, frame: &Value) -> bool {
        let Some(call_id) = frame.get("reply").and_then(Value::as_u64) else {
            return false;
        };
        let sender = self
            .pending
            .lock()
            .ok()
            .and_then(|mut pending| pending.remove(&call_id));
        let Some(sender) = sender else {
            tracing::debug!(call_id, "reply for unknown or expired call");
            return false;
        };
        let outcome = match frame.get("error") {
            Some(error) if !error.is_null() => Err(error.clone()),
            _ => Ok(frame.get("result").cloned().unwrap_or(Value::Null)),
        };
        sender.send(outcome).is_ok()
    }

    fn forget(&self, call_id: u64) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&call_id);
        }
    }

    async fn call_raw(&self, method: &str, params: Value) -> Result<Value, HostError> {
        let call_id = self.next_call.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .map_err(|e| HostError::Bridge(e.to_string()))?
            .insert(call_id, tx);

        let frame = json!({"call": call_id, "method": method, "params": params});
        if self.outbound.send(frame).is_err() {
            self.forget(call_id);
            return Err(HostError::Bridge("bridge output closed".to_string()));
        }

        match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(error))) => Err(host_error_from(&error)),
            Ok(Err(_)) => Err(HostError::Bridge(format!("{method}: reply channel dropped"))),
            Err(_) => {
                self.forget(call_id);
                Err(HostError::Bridge(format!("{method}: no reply within {:?}", self.call_timeout)))
            }
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, HostError> {
        let result = self.call_raw(method, params).await?;
        serde_json::from_value(result).map_err(|e| HostError::Bridge(format!("{method}: {e}")))
    }
}

/// Maps a wire error to the typed host error.
fn host_error_from(error: &Value) -> HostError {
    let kind = error.get("kind").and_then(Value::as_str).unwrap_or("");
    let id = error.get("id").and_then(Value::as_i64).unwrap_or_default();
    match kind {
        "tabNotFound" => HostError::TabNotFound(id),
        "groupNotFound" => HostError::GroupNotFound(id),
        "windowNotFound" => HostError::WindowNotFound(id),
        "injectionRefused" => HostError::InjectionRefused {
            tab_id: id,
            reason: error
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("refused")
                .to_string(),
        },
        _ => HostError::Bridge(match error.as_str() {
            Some(message) => message.to_string(),
            None => error.to_string(),
        }),
    }
}

#[async_trait]
impl TabHost for StdioTabHost {
    async fn query_tabs(&self, query: &TabQuery) -> Result<Vec<TabInfo>, HostError> {
        self.call("tabs.query", json!(query)).await
    }

    async fn get_tab(&self, tab_id: TabId) -> Result<TabInfo, HostError> {
        self.call("tabs.get", json!({"tabId": tab_id})).await
    }

    async fn activate_tab(&self, tab_id: TabId) -> Result<(), HostError> {
        self.call_raw("tabs.activate", json!({"tabId": tab_id})).await.map(drop)
    }

    async fn move_tab(&self, tab_id: TabId, index: usize) -> Result<(), HostError> {
        self.call_raw("tabs.move", json!({"tabId": tab_id, "index": index}))
            .await
            .map(drop)
    }

    async fn remove_tab(&self, tab_id: TabId) -> Result<(), HostError> {
        self.call_raw("tabs.remove", json!({"tabId": tab_id})).await.map(drop)
    }

    async fn group_tabs(&self, tab_ids: &[TabId], group_id: Option<GroupId>) -> Result<GroupId, HostError> {
        self.call("tabs.group", json!({"tabIds": tab_ids, "groupId": group_id}))
            .await
    }

    async fn get_group(&self, group_id: GroupId) -> Result<TabGroup, HostError> {
        self.call("tabGroups.get", json!({"groupId": group_id})).await
    }

    async fn query_groups(&self, window_id: WindowId) -> Result<Vec<TabGroup>, HostError> {
        self.call("tabGroups.query", json!({"windowId": window_id})).await
    }

    async fn update_group(&self, group_id: GroupId, update: &GroupUpdate) -> Result<(), HostError> {
        self.call_raw("tabGroups.update", json!({"groupId": group_id, "update": update}))
            .await
            .map(drop)
    }

    async fn focus_window(&self, window_id: WindowId) -> Result<(), HostError> {
        self.call_raw("windows.focus", json!({"windowId": window_id}))
            .await
            .map(drop)
    }

    async fn create_popup_window(&self, url: &str, size: WindowSize) -> Result<WindowId, HostError> {
        self.call(
            "windows.createPopup",
            json!({"url": url, "width": size.width, "height": size.height}),
        )
        .await
    }

    async fn inject(&self, tab_id: TabId, script: &PageScript) -> Result<(), HostError> {
        self.call_raw("scripting.inject", json!({"tabId": tab_id, "script": script}))
            .await
            .map(drop)
    }

    async fn set_badge(&self, badge: &BadgeUpdate) -> Result<(), HostError> {
        self.call_raw("action.setBadge", json!(badge)).await.map(drop)
    }
}
