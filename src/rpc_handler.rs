//! Inbound message handler for the popup, the banners and the naming prompt.
//!
//! Kept separate from `rpc_server.rs` so it can be tested without stdio.
//! `handle_message` dispatches one message to the engine and returns either
//! the requested data or an error string; [`respond`] turns that into the
//! `{ok:false,error}` shape the callers expect.

use serde_json::{json, Map, Value};

use crate::engine::PolicyEngine;
use crate::services::settings_store::{export_settings, import_settings, load, save, SettingsStore};
use crate::types::decision::{AutoCloseDecision, DuplicateDecision};
use crate::types::errors::SettingsError;
use crate::types::settings::{
    AutoClosePolicy, CollapsePolicy, DuplicatePolicy, ExplorerSettings, GroupRule, GroupingPolicy,
    SettingsSection, WindowLabels, WindowPrefixFlags,
};
use crate::types::tab::{GroupUpdate, WindowSize, GROUP_ID_NONE};

fn ack() -> Value {
    json!({"ok": true})
}

/// Wraps a handler result: data passes through, errors become `{ok:false,error}`.
pub fn respond(result: Result<Value, String>) -> Value {
    match result {
        Ok(value) => value,
        Err(error) => json!({"ok": false, "error": error}),
    }
}

/// Reads an integer parameter. Numeric strings are accepted too.
fn param_i64(params: &Value, key: &str) -> Result<i64, String> {
    match params.get(key) {
        Some(Value::Number(n)) => n.as_i64().ok_or_else(|| format!("invalid {key}")),
        Some(Value::String(s)) => s.trim().parse().map_err(|_| format!("invalid {key}")),
        _ => Err(format!("missing {key}")),
    }
}

fn param_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("missing {key}"))
}

async fn section_value<S: SettingsSection>(store: &dyn SettingsStore) -> Result<Value, String> {
    let section: S = load(store).await;
    serde_json::to_value(section).map_err(|e| e.to_string())
}

/// Applies `patch` over the current section, validates and stores it.
async fn update_section<S: SettingsSection>(store: &dyn SettingsStore, patch: &Value) -> Result<Value, String> {
    let Value::Object(patch) = patch else {
        return Err("value must be an object".to_string());
    };
    let current: S = load(store).await;
    let mut merged: Map<String, Value> = match serde_json::to_value(current).map_err(|e| e.to_string())? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    merged.extend(patch.clone());
    let updated: S = serde_json::from_value(Value::Object(merged)).map_err(|e| e.to_string())?;
    save(store, &updated).await.map_err(|e| e.to_string())?;
    tracing::info!(section = S::SECTION, "settings updated");
    serde_json::to_value(updated).map_err(|e| e.to_string())
}

async fn get_settings(store: &dyn SettingsStore, section: &str) -> Result<Value, String> {
    match section {
        "duplicatePrevention" => section_value::<DuplicatePolicy>(store).await,
        "autoClose" => section_value::<AutoClosePolicy>(store).await,
        "autoTabGrouping" => section_value::<GroupingPolicy>(store).await,
        "autoCollapse" => section_value::<CollapsePolicy>(store).await,
        "windowLabels" => section_value::<WindowLabels>(store).await,
        "windowPrefix" => section_value::<WindowPrefixFlags>(store).await,
        "explorer" => section_value::<ExplorerSettings>(store).await,
        other => Err(SettingsError::UnknownSection(other.to_string()).to_string()),
    }
}

async fn update_settings(store: &dyn SettingsStore, section: &str, patch: &Value) -> Result<Value, String> {
    match section {
        "duplicatePrevention" => update_section::<DuplicatePolicy>(store, patch).await,
        "autoClose" => update_section::<AutoClosePolicy>(store, patch).await,
        "autoTabGrouping" => update_section::<GroupingPolicy>(store, patch).await,
        "autoCollapse" => update_section::<CollapsePolicy>(store, patch).await,
        "explorer" => update_section::<ExplorerSettings>(store, patch).await,
        other => Err(SettingsError::UnknownSection(other.to_string()).to_string()),
    }
}

/// Dispatch one inbound message to the engine.
///
/// Returns `Ok(Value)` on success or `Err(String)` with an error message.
pub async fn handle_message(engine: &PolicyEngine, message_type: &str, params: &Value) -> Result<Value, String> {
    let store = engine.store().as_ref();
    let host = engine.host().as_ref();
    match message_type {
        // ─── Banners ───
        "duplicateBannerAction" => {
            let token = param_str(params, "token")?;
            let decision = DuplicateDecision::parse(param_str(params, "decision")?).map_err(|e| e.to_string())?;
            engine.duplicates.decide(token, decision).await.map_err(|e| e.to_string())?;
            Ok(ack())
        }
        "autoCloseBannerAction" => {
            let token = param_str(params, "token")?;
            let decision = AutoCloseDecision::parse(param_str(params, "decision")?).map_err(|e| e.to_string())?;
            engine.auto_close.decide(token, decision).await.map_err(|e| e.to_string())?;
            Ok(ack())
        }

        // ─── Window labels ───
        "setWindowLabel" => {
            let window_id = param_i64(params, "windowId")?;
            let label = params.get("label").and_then(|v| v.as_str()).unwrap_or("");
            engine.labels.set_label(window_id, label).await.map_err(|e| e.to_string())?;
            Ok(ack())
        }
        "getWindowLabel" => {
            let window_id = param_i64(params, "windowId")?;
            Ok(json!({"label": engine.labels.label(window_id).await}))
        }
        "getAllWindowLabels" => Ok(json!({"labels": engine.labels.labels().await.labels})),
        "applyWindowLabelPrefix" => {
            let window_id = param_i64(params, "windowId")?;
            let enabled = params.get("enabled").and_then(|v| v.as_bool()).unwrap_or(false);
            engine
                .labels
                .set_prefix_enabled(window_id, enabled)
                .await
                .map_err(|e| e.to_string())?;
            Ok(ack())
        }
        "getWindowLabelPrefixEnabled" => {
            let window_id = param_i64(params, "windowId")?;
            Ok(json!({"ok": true, "enabled": engine.labels.prefix_enabled(window_id).await}))
        }

        // ─── Grouping ───
        "groupExistingTabs" => {
            let grouped = engine.grouping.group_all_existing_tabs().await.map_err(|e| e.to_string())?;
            Ok(json!({"ok": true, "grouped": grouped}))
        }
        "groupExistingTabsForRule" => {
            let rule: GroupRule = params
                .get("rule")
                .cloned()
                .ok_or("missing rule")
                .and_then(|v| serde_json::from_value(v).map_err(|_| "invalid rule"))?;
            let grouped = engine
                .grouping
                .group_existing_tabs_for_rule(&rule)
                .await
                .map_err(|e| e.to_string())?;
            Ok(json!({"ok": true, "grouped": grouped}))
        }

        // ─── Explorer ───
        "activateTab" => {
            if let Ok(group_id) = param_i64(params, "groupId") {
                if group_id != GROUP_ID_NONE {
                    if let Err(e) = host.update_group(group_id, &GroupUpdate::collapsed(false)).await {
                        tracing::debug!(group_id, error = %e, "expand before activation failed");
                    }
                }
            }
            if let Ok(window_id) = param_i64(params, "windowId") {
                if let Err(e) = host.focus_window(window_id).await {
                    tracing::debug!(window_id, error = %e, "focus before activation failed");
                }
            }
            if let Ok(tab_id) = param_i64(params, "tabId") {
                if let Err(e) = host.activate_tab(tab_id).await {
                    tracing::debug!(tab_id, error = %e, "activation failed");
                }
            }
            Ok(ack())
        }
        "closeTab" => {
            let tab_id = param_i64(params, "tabId").map_err(|_| "Invalid tabId".to_string())?;
            host.remove_tab(tab_id).await.map_err(|e| e.to_string())?;
            Ok(ack())
        }
        "openExplorerWindow" => {
            let window_id = engine.explorer.open().await.map_err(|e| e.to_string())?;
            Ok(json!({"ok": true, "windowId": window_id}))
        }
        "saveExplorerWindowSize" => {
            let size = WindowSize {
                width: u32::try_from(param_i64(params, "width")?).map_err(|_| "invalid width")?,
                height: u32::try_from(param_i64(params, "height")?).map_err(|_| "invalid height")?,
            };
            engine.explorer.save_size(size).await.map_err(|e| e.to_string())?;
            Ok(ack())
        }

        // ─── Settings ───
        "getSettings" => get_settings(store, param_str(params, "section")?).await,
        "updateSettings" => {
            let section = param_str(params, "section")?;
            let value = params.get("value").ok_or("missing value")?;
            let updated = update_settings(store, section, value).await?;
            Ok(json!({"ok": true, "settings": updated}))
        }
        "exportSettings" => export_settings(store).await.map_err(|e| e.to_string()),
        "importSettings" => {
            let blob = params.get("blob").ok_or("missing blob")?;
            let imported = import_settings(store, blob).await.map_err(|e| e.to_string())?;
            Ok(json!({"ok": true, "imported": imported}))
        }

        "ping" => Ok(json!({"ok": true, "version": env!("CARGO_PKG_VERSION")})),
        _ => Err(format!("unknown message type: {}", message_type)),
    }
}
