//! tabkeeper — browser tab housekeeping policies.
//!
//! Entry point for the console demo: runs every policy against an in-memory
//! tab host and prints what each one did. The browser-facing process is the
//! `tabkeeper-bridge` binary.

use std::error::Error;
use std::sync::Arc;

use serde_json::json;

use tabkeeper::config::EngineConfig;
use tabkeeper::engine::PolicyEngine;
use tabkeeper::logging::init_logging;
use tabkeeper::rpc_handler::handle_message;
use tabkeeper::services::memory_host::InMemoryTabHost;
use tabkeeper::services::settings_store::{save, MemorySettingsStore};
use tabkeeper::types::decision::AutoCloseDecision;
use tabkeeper::types::event::{LoadStatus, TabChange, TabEvent};
use tabkeeper::types::settings::{AutoClosePolicy, DuplicatePolicy, GroupRule, GroupingPolicy};
use tabkeeper::types::tab::{GroupColor, TabInfo};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = EngineConfig::from_env();
    init_logging(&config.log)?;

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               tabkeeper v{} — Demo Mode                  ║", env!("CARGO_PKG_VERSION"));
    println!("║     Duplicates, auto-close, grouping and idle collapse       ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    demo_duplicates().await?;
    demo_auto_close().await?;
    demo_grouping().await?;
    demo_collapse().await?;
    demo_labels().await?;
    demo_settings_export().await?;

    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("  ✅ All policies demonstrated");
    println!("═══════════════════════════════════════════════════════════════");
    Ok(())
}

fn section(name: &str) {
    println!("───────────────────────────────────────────────────────────────");
    println!("  📦 {}", name);
    println!("───────────────────────────────────────────────────────────────");
}

fn setup() -> (Arc<InMemoryTabHost>, Arc<MemorySettingsStore>, PolicyEngine) {
    let host = Arc::new(InMemoryTabHost::new());
    let store = Arc::new(MemorySettingsStore::new());
    let engine = PolicyEngine::new(host.clone(), store.clone());
    (host, store, engine)
}

fn navigated(tab: &TabInfo) -> TabEvent {
    TabEvent::TabUpdated {
        tab_id: tab.id,
        change: TabChange {
            url: Some(tab.url.clone()),
            status: Some(LoadStatus::Complete),
        },
        tab: tab.clone(),
    }
}

async fn demo_duplicates() -> Result<(), Box<dyn Error>> {
    section("Duplicate Tabs");
    let (host, store, engine) = setup();
    save(
        store.as_ref(),
        &DuplicatePolicy {
            banner_enabled: false,
            ..DuplicatePolicy::default()
        },
    )
    .await?;

    let first = host.open_tab(1, "https://docs.rs/tokio#spawn");
    engine.handle_event(&TabEvent::TabCreated { tab: first.clone() }).await;
    let second = host.open_tab(1, "https://docs.rs/tokio");
    engine.handle_event(&TabEvent::TabCreated { tab: second.clone() }).await;

    println!("  Opened tab {} and tab {} on the same page", first.id, second.id);
    println!("  Closed: {:?}, still open: {} tab(s)", host.removed_tabs(), host.tab_count());
    println!("  ✓ Newer duplicate closed, older one kept");
    println!();
    Ok(())
}

async fn demo_auto_close() -> Result<(), Box<dyn Error>> {
    section("Auto-Close");
    let (host, store, engine) = setup();
    save(
        store.as_ref(),
        &AutoClosePolicy {
            enabled: true,
            patterns: vec!["*zoom.us/j/*".to_string()],
            ..AutoClosePolicy::default()
        },
    )
    .await?;

    let meeting = host.open_tab(1, "https://zoom.us/j/123456");
    engine.handle_event(&TabEvent::TabCreated { tab: meeting.clone() }).await;
    let pending = engine.auto_close.pending_for(meeting.id);
    println!("  Banner pending for tab {}: {}", meeting.id, pending.is_some());
    if let Some(pending) = pending {
        engine.auto_close.decide(&pending.token, AutoCloseDecision::Close).await?;
    }
    println!("  Closed after \"close now\": {:?}", host.removed_tabs());
    println!("  ✓ Matching tab closed");
    println!();
    Ok(())
}

async fn demo_grouping() -> Result<(), Box<dyn Error>> {
    section("Auto Tab Grouping");
    let (host, store, engine) = setup();
    save(
        store.as_ref(),
        &GroupingPolicy {
            rules: vec![GroupRule::new("Rust", &["*docs.rs*", "*crates.io*"], Some(GroupColor::Orange))],
            ..GroupingPolicy::default()
        },
    )
    .await?;

    host.open_tab(1, "https://news.example.com");
    let docs = host.open_tab(1, "https://docs.rs/serde");
    engine.handle_event(&navigated(&docs)).await;
    let crates = host.open_tab(1, "https://crates.io/crates/url");
    engine.handle_event(&navigated(&crates)).await;

    for group in host.groups_in(1) {
        println!("  Group {} \"{}\" ({})", group.id, group.title, group.color.as_str());
    }
    println!("  Tab order: {:?}", host.tab_order(1));
    println!("  ✓ Matching tabs routed into one group");
    println!();
    Ok(())
}

async fn demo_collapse() -> Result<(), Box<dyn Error>> {
    section("Idle Group Collapse");
    let (host, _store, engine) = setup();
    let work = host.open_tab(1, "https://mail.example.com");
    let play = host.open_tab(1, "https://video.example.com");
    let work_group = host.create_group("Work", GroupColor::Blue, &[work.id]).ok_or("group not created")?;
    let play_group = host.create_group("Play", GroupColor::Red, &[play.id]).ok_or("group not created")?;

    engine.host().activate_tab(play.id).await?;
    host.set_last_accessed(work.id, 0);
    let collapsed = engine.collapse.collapse_inactive_groups().await?;
    println!("  Collapsed {} group(s)", collapsed);
    println!(
        "  Work collapsed: {:?}, Play collapsed: {:?}",
        host.group(work_group).map(|g| g.collapsed),
        host.group(play_group).map(|g| g.collapsed)
    );
    println!("  ✓ Only the idle group collapsed");
    println!();
    Ok(())
}

async fn demo_labels() -> Result<(), Box<dyn Error>> {
    section("Window Labels & Badge");
    let (host, _store, engine) = setup();
    let tab = host.open_tab(1, "https://example.com");
    engine.host().activate_tab(tab.id).await?;

    engine.labels.refresh_badge().await?;
    if let Some(badge) = host.last_badge_for(Some(tab.id)) {
        println!("  Unlabelled window badge: {} ({})", badge.text, badge.color);
    }
    engine.labels.set_label(1, "Research").await?;
    if let Some(badge) = host.last_badge_for(Some(tab.id)) {
        println!("  Labelled window badge:   {} ({})", badge.text, badge.color);
    }
    println!("  Scripts injected: {}", host.injected_into(tab.id).len());
    println!("  ✓ Label stored and title prefix applied");
    println!();
    Ok(())
}

async fn demo_settings_export() -> Result<(), Box<dyn Error>> {
    section("Settings Export / Import");
    let (_host, _store, engine) = setup();
    handle_message(
        &engine,
        "updateSettings",
        &json!({"section": "autoCollapse", "value": {"collapseDelay": 7}}),
    )
    .await?;
    let exported = handle_message(&engine, "exportSettings", &json!({})).await?;
    println!("  Exported: {}", exported["settings"]);

    let (_host, _store, other) = setup();
    let imported = handle_message(&other, "importSettings", &json!({"blob": exported})).await?;
    println!("  Imported into a fresh store: {}", imported);
    println!("  ✓ Settings round-trip through the export envelope");
    println!();
    Ok(())
}
