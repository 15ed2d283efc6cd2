//! Unit tests for the message handler: every message dispatched by `handle_message`.
//!
//! These tests go through the same code path as the `tabkeeper-bridge`
//! binary, with an in-memory tab host and a temporary on-disk SQLite store.

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use tabkeeper::database::Database;
use tabkeeper::engine::PolicyEngine;
use tabkeeper::rpc_handler::{handle_message, respond};
use tabkeeper::services::memory_host::InMemoryTabHost;
use tabkeeper::services::settings_store::SqliteSettingsStore;
use tabkeeper::types::tab::{GroupColor, WindowSize};

/// Create a fresh engine backed by a temp directory DB.
fn setup() -> (Arc<InMemoryTabHost>, PolicyEngine, TempDir) {
    let tmp = TempDir::new().expect("Failed to create temp dir");
    let db = Database::open(&tmp.path().join("test.db")).expect("Failed to open database");
    let host = Arc::new(InMemoryTabHost::new());
    let store = Arc::new(SqliteSettingsStore::new(Arc::new(db)));
    let engine = PolicyEngine::new(host.clone(), store);
    (host, engine, tmp)
}

// ─── Ping / unknown ───

#[tokio::test]
async fn test_ping() {
    let (_host, engine, _tmp) = setup();
    let res = handle_message(&engine, "ping", &json!({})).await.unwrap();
    assert_eq!(res["ok"], true);
    assert_eq!(res["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_unknown_message_returns_error() {
    let (_host, engine, _tmp) = setup();
    let res = handle_message(&engine, "nonexistent", &json!({})).await;
    assert!(res.unwrap_err().contains("unknown message type"));
}

#[test]
fn test_respond_wraps_errors() {
    assert_eq!(respond(Ok(json!({"ok": true}))), json!({"ok": true}));
    assert_eq!(
        respond(Err("boom".to_string())),
        json!({"ok": false, "error": "boom"})
    );
}

// ─── Window labels ───

#[tokio::test]
async fn test_window_label_messages() {
    let (host, engine, _tmp) = setup();
    host.open_tab(2, "https://example.com");

    let res = handle_message(&engine, "setWindowLabel", &json!({"windowId": 2, "label": "Work"}))
        .await
        .unwrap();
    assert_eq!(res, json!({"ok": true}));

    let res = handle_message(&engine, "getWindowLabel", &json!({"windowId": "2"})).await.unwrap();
    assert_eq!(res, json!({"label": "Work"}));

    let res = handle_message(&engine, "getAllWindowLabels", &json!({})).await.unwrap();
    assert_eq!(res, json!({"labels": {"2": "Work"}}));

    let res = handle_message(&engine, "getWindowLabel", &json!({"windowId": 5})).await.unwrap();
    assert_eq!(res, json!({"label": ""}));
}

#[tokio::test]
async fn test_window_prefix_messages() {
    let (_host, engine, _tmp) = setup();
    let res = handle_message(&engine, "getWindowLabelPrefixEnabled", &json!({"windowId": 1}))
        .await
        .unwrap();
    assert_eq!(res, json!({"ok": true, "enabled": true}));

    handle_message(&engine, "applyWindowLabelPrefix", &json!({"windowId": 1, "enabled": false}))
        .await
        .unwrap();
    let res = handle_message(&engine, "getWindowLabelPrefixEnabled", &json!({"windowId": 1}))
        .await
        .unwrap();
    assert_eq!(res["enabled"], false);
}

#[tokio::test]
async fn test_window_id_is_required() {
    let (_host, engine, _tmp) = setup();
    let res = handle_message(&engine, "getWindowLabel", &json!({})).await;
    assert_eq!(res.unwrap_err(), "missing windowId");
    let res = handle_message(&engine, "getWindowLabel", &json!({"windowId": "abc"})).await;
    assert_eq!(res.unwrap_err(), "invalid windowId");
}

// ─── Banners ───

#[tokio::test]
async fn test_duplicate_banner_action() {
    let (host, engine, _tmp) = setup();
    let a = host.open_tab(1, "https://example.com/");
    engine.duplicates.on_navigation(a.id, &a.url).await.unwrap();
    let b = host.open_tab(1, "https://example.com/");
    engine.duplicates.on_navigation(b.id, &b.url).await.unwrap();
    let token = engine.duplicates.pending_for(b.id)[0].token.clone();

    let res = handle_message(
        &engine,
        "duplicateBannerAction",
        &json!({"token": token, "decision": "default"}),
    )
    .await
    .unwrap();
    assert_eq!(res, json!({"ok": true}));
    assert_eq!(host.removed_tabs(), vec![b.id]);

    let again = handle_message(
        &engine,
        "duplicateBannerAction",
        &json!({"token": token, "decision": "keep"}),
    )
    .await;
    assert!(again.unwrap_err().contains("already consumed"));
}

#[tokio::test]
async fn test_banner_action_rejects_unknown_decision() {
    let (_host, engine, _tmp) = setup();
    let res = handle_message(
        &engine,
        "autoCloseBannerAction",
        &json!({"token": "ac_x", "decision": "later"}),
    )
    .await;
    assert_eq!(res.unwrap_err(), "Invalid decision: later");
}

#[tokio::test]
async fn test_auto_close_banner_action_keep() {
    let (host, engine, _tmp) = setup();
    handle_message(
        &engine,
        "updateSettings",
        &json!({"section": "autoClose", "value": {"autoCloseEnabled": true, "urlPatterns": ["*zoom.us*"]}}),
    )
    .await
    .unwrap();
    let tab = host.open_tab(1, "https://zoom.us/j/9");
    engine.auto_close.on_navigation(tab.id, &tab.url).await.unwrap();
    let token = engine.auto_close.pending_for(tab.id).unwrap().token;

    handle_message(&engine, "autoCloseBannerAction", &json!({"token": token, "decision": "keep"}))
        .await
        .unwrap();
    assert!(engine.auto_close.is_suppressed(tab.id));
    assert!(host.tab(tab.id).is_some());
}

// ─── Tabs / explorer ───

#[tokio::test]
async fn test_close_tab() {
    let (host, engine, _tmp) = setup();
    let tab = host.open_tab(1, "https://example.com");

    let res = handle_message(&engine, "closeTab", &json!({"tabId": "nope"})).await;
    assert_eq!(res.unwrap_err(), "Invalid tabId");

    handle_message(&engine, "closeTab", &json!({"tabId": tab.id})).await.unwrap();
    assert_eq!(host.removed_tabs(), vec![tab.id]);
}

#[tokio::test]
async fn test_activate_tab_expands_focuses_and_activates() {
    let (host, engine, _tmp) = setup();
    host.open_tab(1, "https://one.example");
    let target = host.open_tab(2, "https://two.example");
    let group = host.create_group("Later", GroupColor::Grey, &[target.id]).unwrap();
    host.set_group_collapsed(group, true);

    let res = handle_message(
        &engine,
        "activateTab",
        &json!({"tabId": target.id, "windowId": 2, "groupId": group}),
    )
    .await
    .unwrap();
    assert_eq!(res, json!({"ok": true}));
    assert!(!host.group(group).unwrap().collapsed);
    assert_eq!(host.focused_window(), Some(2));
    assert!(host.tab(target.id).unwrap().active);

    // Vanished targets are ignored.
    let res = handle_message(&engine, "activateTab", &json!({"tabId": 999, "windowId": 42})).await;
    assert!(res.is_ok());
}

#[tokio::test]
async fn test_explorer_window_messages() {
    let (host, engine, _tmp) = setup();
    handle_message(&engine, "saveExplorerWindowSize", &json!({"width": 1000, "height": 700}))
        .await
        .unwrap();
    let res = handle_message(&engine, "openExplorerWindow", &json!({})).await.unwrap();
    assert_eq!(res["ok"], true);
    let window_id = res["windowId"].as_i64().unwrap();
    assert_eq!(host.popups(), vec![(window_id, "popup.html?standalone=1".to_string(), WindowSize { width: 1000, height: 700 })]);

    let res = handle_message(&engine, "saveExplorerWindowSize", &json!({"width": -1, "height": 700})).await;
    assert_eq!(res.unwrap_err(), "invalid width");
}

// ─── Grouping ───

#[tokio::test]
async fn test_group_existing_tabs_messages() {
    let (host, engine, _tmp) = setup();
    host.open_tab(1, "https://docs.rs/a");
    host.open_tab(1, "https://docs.rs/b");
    host.open_tab(1, "https://example.com");

    let res = handle_message(
        &engine,
        "groupExistingTabsForRule",
        &json!({"rule": {"pattern": "*docs.rs*", "groupName": "Docs", "groupColor": "green"}}),
    )
    .await
    .unwrap();
    assert_eq!(res, json!({"ok": true, "grouped": 2}));
    assert_eq!(host.groups_in(1)[0].color, GroupColor::Green);

    handle_message(
        &engine,
        "updateSettings",
        &json!({"section": "autoTabGrouping", "value": {"tabGroupRules": [{"patterns": ["*example.com*"], "groupName": "Example"}]}}),
    )
    .await
    .unwrap();
    let res = handle_message(&engine, "groupExistingTabs", &json!({})).await.unwrap();
    assert_eq!(res, json!({"ok": true, "grouped": 1}));
    assert_eq!(host.groups_in(1).len(), 2);

    let res = handle_message(&engine, "groupExistingTabsForRule", &json!({})).await;
    assert_eq!(res.unwrap_err(), "missing rule");
}

// ─── Settings ───

#[tokio::test]
async fn test_get_settings_defaults() {
    let (_host, engine, _tmp) = setup();
    let res = handle_message(&engine, "getSettings", &json!({"section": "autoCollapse"})).await.unwrap();
    assert_eq!(res, json!({"autoCollapseEnabled": true, "collapseDelay": 3}));

    let res = handle_message(&engine, "getSettings", &json!({"section": "duplicatePrevention"}))
        .await
        .unwrap();
    assert_eq!(res["duplicateBannerDelaySeconds"], 5);
    assert_eq!(res["closeOlderTab"], false);
}

#[tokio::test]
async fn test_update_settings_merges_patch() {
    let (_host, engine, _tmp) = setup();
    let res = handle_message(
        &engine,
        "updateSettings",
        &json!({"section": "autoClose", "value": {"closeDelay": 20}}),
    )
    .await
    .unwrap();
    assert_eq!(res["ok"], true);
    assert_eq!(res["settings"]["closeDelay"], 20);
    assert_eq!(res["settings"]["autoCloseBannerEnabled"], true);

    let res = handle_message(&engine, "getSettings", &json!({"section": "autoClose"})).await.unwrap();
    assert_eq!(res["closeDelay"], 20);
}

#[tokio::test]
async fn test_update_settings_rejects_invalid_values() {
    let (_host, engine, _tmp) = setup();
    let res = handle_message(
        &engine,
        "updateSettings",
        &json!({"section": "autoCollapse", "value": {"collapseDelay": 0}}),
    )
    .await;
    assert!(res.unwrap_err().contains("collapseDelay must be between 1 and 30"));

    let res = handle_message(&engine, "getSettings", &json!({"section": "autoCollapse"})).await.unwrap();
    assert_eq!(res["collapseDelay"], 3);

    let res = handle_message(
        &engine,
        "updateSettings",
        &json!({"section": "windowLabels", "value": {}}),
    )
    .await;
    assert_eq!(res.unwrap_err(), "Unknown settings section: windowLabels");

    let res = handle_message(&engine, "updateSettings", &json!({"section": "autoClose", "value": 5})).await;
    assert_eq!(res.unwrap_err(), "value must be an object");
}

#[tokio::test]
async fn test_export_and_import_settings() {
    let (_host, engine, _tmp) = setup();
    handle_message(
        &engine,
        "updateSettings",
        &json!({"section": "duplicatePrevention", "value": {"closeOlderTab": true}}),
    )
    .await
    .unwrap();
    let exported = handle_message(&engine, "exportSettings", &json!({})).await.unwrap();
    assert_eq!(exported["version"], "1.0");

    let (_other_host, other, _other_tmp) = setup();
    let res = handle_message(&other, "importSettings", &json!({"blob": exported})).await.unwrap();
    assert_eq!(res["ok"], true);
    let res = handle_message(&other, "getSettings", &json!({"section": "duplicatePrevention"}))
        .await
        .unwrap();
    assert_eq!(res["closeOlderTab"], true);

    let res = handle_message(&other, "importSettings", &json!({"blob": {"unrelated": 1}})).await;
    assert!(res.unwrap_err().contains("Invalid settings file format"));
}
