//! Unit tests for the settings store: SQLite persistence, typed section
//! loading, validation, and export/import.
//!
//! On-disk tests use a temporary directory so each test starts clean.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tempfile::TempDir;

use tabkeeper::database::Database;
use tabkeeper::services::settings_store::{
    export_settings, import_settings, load, save, section_keys, try_load, MemorySettingsStore, SettingsStore,
    SqliteSettingsStore,
};
use tabkeeper::types::errors::{SettingsError, ValidationError};
use tabkeeper::types::settings::{
    AutoClosePolicy, DuplicatePolicy, GroupRule, GroupingPolicy, InsertPosition, RuleColor, WindowLabels,
};
use tabkeeper::types::tab::GroupColor;

fn sqlite_store() -> (SqliteSettingsStore, TempDir) {
    let tmp = TempDir::new().expect("Failed to create temp dir");
    let db = Database::open(&tmp.path().join("settings.db")).expect("Failed to open database");
    (SqliteSettingsStore::new(Arc::new(db)), tmp)
}

fn values(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

// ─── SQLite store ───

#[tokio::test]
async fn test_sqlite_set_and_get() {
    let (store, _tmp) = sqlite_store();
    store
        .set(values(&[("closeDelay", json!(12)), ("urlPatterns", json!(["*a*"]))]))
        .await
        .unwrap();

    let got = store
        .get(&["closeDelay".to_string(), "missing".to_string()])
        .await
        .unwrap();
    assert_eq!(got.get("closeDelay"), Some(&json!(12)));
    assert!(!got.contains_key("missing"));
}

#[tokio::test]
async fn test_sqlite_values_survive_reopen() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("settings.db");
    {
        let store = SqliteSettingsStore::new(Arc::new(Database::open(&path).unwrap()));
        let labels = WindowLabels {
            labels: [("3".to_string(), "Work".to_string())].into_iter().collect(),
        };
        save(&store, &labels).await.unwrap();
    }
    let store = SqliteSettingsStore::new(Arc::new(Database::open(&path).unwrap()));
    let labels: WindowLabels = load(&store).await;
    assert_eq!(labels.labels.get("3").map(String::as_str), Some("Work"));
}

#[tokio::test]
async fn test_sqlite_overwrite_keeps_one_row() {
    let (store, _tmp) = sqlite_store();
    store.set(values(&[("collapseDelay", json!(3))])).await.unwrap();
    store.set(values(&[("collapseDelay", json!(8))])).await.unwrap();
    let all = store.all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all["collapseDelay"], json!(8));
}

// ─── Typed sections ───

#[test]
fn test_section_keys_cover_every_field() {
    let mut keys = section_keys::<DuplicatePolicy>();
    keys.sort();
    assert_eq!(
        keys,
        vec![
            "allowedDuplicatePatterns",
            "closeOlderTab",
            "duplicateBannerDelaySeconds",
            "duplicateBannerEnabled",
            "duplicatePreventionEnabled",
        ]
    );
}

#[tokio::test]
async fn test_defaults_when_store_is_empty() {
    let store = MemorySettingsStore::new();
    let grouping: GroupingPolicy = load(&store).await;
    assert!(grouping.enabled);
    assert!(grouping.ignore_pinned_tabs);
    assert!(!grouping.apply_to_grouped_tabs);
    assert_eq!(grouping.insert_position, InsertPosition::Right);
    assert!(grouping.rules.is_empty());
}

#[tokio::test]
async fn test_try_load_reports_read_failure() {
    let store = MemorySettingsStore::new();
    store.set_fail_reads(true);
    assert!(matches!(
        try_load::<AutoClosePolicy>(&store).await,
        Err(SettingsError::Storage(_))
    ));
}

#[tokio::test]
async fn test_legacy_rules_load_as_pattern_lists() {
    let store = MemorySettingsStore::new();
    store
        .set(values(&[(
            "tabGroupRules",
            json!([
                {"pattern": "*github.com*", "groupName": "Code", "groupColor": "default"},
                {"patterns": ["*docs.rs*"], "groupName": "Docs", "groupColor": "blue"}
            ]),
        )]))
        .await
        .unwrap();

    let policy: GroupingPolicy = load(&store).await;
    assert_eq!(policy.rules[0].patterns, vec!["*github.com*".to_string()]);
    assert_eq!(policy.rules[0].group_color, Some(RuleColor::Random));
    assert_eq!(policy.rules[1], GroupRule::new("Docs", &["*docs.rs*"], Some(GroupColor::Blue)));
}

#[tokio::test]
async fn test_save_rejects_duplicate_pattern() {
    let store = MemorySettingsStore::new();
    let policy = AutoClosePolicy {
        patterns: vec!["*zoom*".to_string(), "*zoom*".to_string()],
        ..AutoClosePolicy::default()
    };
    let err = save(&store, &policy).await.unwrap_err();
    assert!(matches!(
        err,
        SettingsError::Invalid(ValidationError::DuplicatePattern(_))
    ));
}

#[tokio::test]
async fn test_save_rejects_delay_out_of_range() {
    let store = MemorySettingsStore::new();
    let policy = DuplicatePolicy {
        banner_delay_seconds: 301,
        ..DuplicatePolicy::default()
    };
    assert!(save(&store, &policy).await.is_err());
}

// ─── Export / import ───

#[tokio::test]
async fn test_export_envelope_shape() {
    let (store, _tmp) = sqlite_store();
    store.set(values(&[("autoCloseEnabled", json!(true))])).await.unwrap();

    let exported = export_settings(&store).await.unwrap();
    assert_eq!(exported["version"], "1.0");
    assert!(exported["timestamp"].as_u64().is_some());
    assert_eq!(exported["settings"]["autoCloseEnabled"], json!(true));
}

#[tokio::test]
async fn test_import_envelope_into_other_store() {
    let source = MemorySettingsStore::new();
    source
        .set(values(&[("closeDelay", json!(30)), ("autoCloseEnabled", json!(true))]))
        .await
        .unwrap();
    let exported = export_settings(&source).await.unwrap();

    let (target, _tmp) = sqlite_store();
    assert_eq!(import_settings(&target, &exported).await.unwrap(), 2);
    let policy: AutoClosePolicy = load(&target).await;
    assert!(policy.enabled);
    assert_eq!(policy.close_delay_seconds, 30);
}

#[tokio::test]
async fn test_import_accepts_bare_object_with_known_key() {
    let store = MemorySettingsStore::new();
    let blob = json!({"duplicatePreventionEnabled": false, "closeOlderTab": true});
    assert_eq!(import_settings(&store, &blob).await.unwrap(), 2);
    let policy: DuplicatePolicy = load(&store).await;
    assert!(!policy.enabled);
    assert!(policy.close_older_tab);
}

#[tokio::test]
async fn test_import_rejects_unrecognised_blob() {
    let store = MemorySettingsStore::new();
    for blob in [json!({"theme": "dark"}), json!([1, 2]), json!("settings")] {
        assert!(matches!(
            import_settings(&store, &blob).await,
            Err(SettingsError::InvalidImport(_))
        ));
    }
    assert!(store.all().await.unwrap().is_empty());
}
