//! Unit tests for duplicate tab detection and resolution.
//!
//! Countdown tests run on a paused clock so banner expiry is instant.

use std::sync::Arc;
use std::time::Duration;

use tabkeeper::managers::duplicate_resolver::{DuplicateOutcome, DuplicateResolver};
use tabkeeper::managers::url_registry::UrlRegistry;
use tabkeeper::managers::PolicyHandler;
use tabkeeper::services::memory_host::InMemoryTabHost;
use tabkeeper::services::settings_store::{save, MemorySettingsStore};
use tabkeeper::types::decision::DuplicateDecision;
use tabkeeper::types::errors::DecisionError;
use tabkeeper::types::event::TabEvent;
use tabkeeper::types::settings::DuplicatePolicy;
use tabkeeper::types::tab::PageScript;

const URL: &str = "https://example.com/article";

struct Fixture {
    host: Arc<InMemoryTabHost>,
    registry: Arc<UrlRegistry>,
    resolver: DuplicateResolver,
}

async fn setup(policy: DuplicatePolicy) -> Fixture {
    let host = Arc::new(InMemoryTabHost::new());
    let store = Arc::new(MemorySettingsStore::new());
    save(store.as_ref(), &policy).await.unwrap();
    let registry = Arc::new(UrlRegistry::new());
    let resolver = DuplicateResolver::new(host.clone(), store, registry.clone());
    Fixture {
        host,
        registry,
        resolver,
    }
}

fn no_banner() -> DuplicatePolicy {
    DuplicatePolicy {
        banner_enabled: false,
        ..DuplicatePolicy::default()
    }
}

fn banner_token(outcome: DuplicateOutcome) -> String {
    match outcome {
        DuplicateOutcome::BannerShown { token } => token,
        other => panic!("expected a banner, got {:?}", other),
    }
}

// ─── Immediate resolution ───

#[tokio::test]
async fn test_first_navigation_is_recorded() {
    let f = setup(DuplicatePolicy::default()).await;
    let tab = f.host.open_tab(1, URL);
    let outcome = f.resolver.on_navigation(tab.id, URL).await.unwrap();
    assert_eq!(outcome, DuplicateOutcome::Recorded);
    assert_eq!(f.registry.lookup(URL), Some(tab.id));
}

#[tokio::test]
async fn test_close_newer_keeps_and_focuses_existing() {
    let f = setup(no_banner()).await;
    let existing = f.host.open_tab(1, URL);
    f.resolver.on_navigation(existing.id, URL).await.unwrap();

    let newer = f.host.open_tab(2, URL);
    f.host.set_focused_window(2);
    let outcome = f.resolver.on_navigation(newer.id, URL).await.unwrap();

    assert_eq!(outcome, DuplicateOutcome::DefaultApplied);
    assert_eq!(f.host.removed_tabs(), vec![newer.id]);
    assert_eq!(f.host.focused_window(), Some(1));
    assert!(f.host.tab(existing.id).unwrap().active);
    assert_eq!(f.registry.lookup(URL), Some(existing.id));
}

#[tokio::test]
async fn test_close_older_keeps_new_tab() {
    let f = setup(DuplicatePolicy {
        close_older_tab: true,
        ..no_banner()
    })
    .await;
    let older = f.host.open_tab(1, URL);
    f.resolver.on_navigation(older.id, URL).await.unwrap();
    let newer = f.host.open_tab(1, URL);
    f.resolver.on_navigation(newer.id, URL).await.unwrap();

    assert_eq!(f.host.removed_tabs(), vec![older.id]);
    assert_eq!(f.registry.lookup(URL), Some(newer.id));
}

#[tokio::test]
async fn test_fragment_variants_are_duplicates() {
    let f = setup(no_banner()).await;
    let a = f.host.open_tab(1, "https://example.com/page#intro");
    f.resolver.on_navigation(a.id, &a.url).await.unwrap();
    let b = f.host.open_tab(1, "https://example.com/page#usage");
    let outcome = f.resolver.on_navigation(b.id, &b.url).await.unwrap();
    assert_eq!(outcome, DuplicateOutcome::DefaultApplied);
    assert_eq!(f.host.removed_tabs(), vec![b.id]);
}

#[tokio::test]
async fn test_allowed_pattern_skips_detection() {
    let f = setup(DuplicatePolicy {
        allowed_patterns: vec!["*example.com*".to_string()],
        ..no_banner()
    })
    .await;
    let a = f.host.open_tab(1, URL);
    f.resolver.on_navigation(a.id, URL).await.unwrap();
    let b = f.host.open_tab(1, URL);
    assert_eq!(f.resolver.on_navigation(b.id, URL).await.unwrap(), DuplicateOutcome::Allowed);
    assert!(f.host.removed_tabs().is_empty());
}

#[tokio::test]
async fn test_disabled_policy_only_records() {
    let f = setup(DuplicatePolicy {
        enabled: false,
        ..no_banner()
    })
    .await;
    let a = f.host.open_tab(1, URL);
    f.resolver.on_navigation(a.id, URL).await.unwrap();
    let b = f.host.open_tab(1, URL);
    assert_eq!(f.resolver.on_navigation(b.id, URL).await.unwrap(), DuplicateOutcome::Recorded);
    assert!(f.host.removed_tabs().is_empty());
    assert_eq!(f.registry.lookup(URL), Some(b.id));
}

#[tokio::test]
async fn test_stale_entry_for_closed_tab_is_evicted() {
    let f = setup(no_banner()).await;
    let a = f.host.open_tab(1, URL);
    f.resolver.on_navigation(a.id, URL).await.unwrap();
    f.host.close_externally(a.id);

    let b = f.host.open_tab(1, URL);
    assert_eq!(f.resolver.on_navigation(b.id, URL).await.unwrap(), DuplicateOutcome::Recorded);
    assert!(f.host.removed_tabs().is_empty());
    assert_eq!(f.registry.lookup(URL), Some(b.id));
}

#[tokio::test]
async fn test_existing_tab_that_moved_on_is_not_a_duplicate() {
    let f = setup(no_banner()).await;
    let a = f.host.open_tab(1, URL);
    f.resolver.on_navigation(a.id, URL).await.unwrap();
    f.host.navigate(a.id, "https://elsewhere.org/");

    let b = f.host.open_tab(1, URL);
    assert_eq!(f.resolver.on_navigation(b.id, URL).await.unwrap(), DuplicateOutcome::Recorded);
    assert!(f.host.removed_tabs().is_empty());
}

// ─── Banner decisions ───

#[tokio::test]
async fn test_banner_is_injected_into_new_tab() {
    let f = setup(DuplicatePolicy::default()).await;
    let a = f.host.open_tab(1, URL);
    f.resolver.on_navigation(a.id, URL).await.unwrap();
    let b = f.host.open_tab(1, URL);
    let token = banner_token(f.resolver.on_navigation(b.id, URL).await.unwrap());

    assert_eq!(
        f.host.injected_into(b.id),
        vec![PageScript::DuplicateBanner {
            token: token.clone(),
            default_closes_older: false,
            delay_seconds: 5,
        }]
    );
    assert_eq!(f.resolver.pending_count(), 1);
    assert!(f.host.removed_tabs().is_empty());
}

#[tokio::test]
async fn test_keep_both_consumes_token_once() {
    let f = setup(DuplicatePolicy::default()).await;
    let a = f.host.open_tab(1, URL);
    f.resolver.on_navigation(a.id, URL).await.unwrap();
    let b = f.host.open_tab(1, URL);
    let token = banner_token(f.resolver.on_navigation(b.id, URL).await.unwrap());

    f.resolver.decide(&token, DuplicateDecision::KeepBoth).await.unwrap();
    assert_eq!(f.host.tab_count(), 2);
    assert_eq!(f.resolver.pending_count(), 0);
    assert_eq!(
        f.resolver.decide(&token, DuplicateDecision::ApplyDefault).await,
        Err(DecisionError::UnknownToken(token.clone()))
    );
}

#[tokio::test]
async fn test_apply_default_from_banner() {
    let f = setup(DuplicatePolicy::default()).await;
    let a = f.host.open_tab(1, URL);
    f.resolver.on_navigation(a.id, URL).await.unwrap();
    let b = f.host.open_tab(1, URL);
    let token = banner_token(f.resolver.on_navigation(b.id, URL).await.unwrap());

    f.resolver.decide(&token, DuplicateDecision::ApplyDefault).await.unwrap();
    assert_eq!(f.host.removed_tabs(), vec![b.id]);
}

#[tokio::test]
async fn test_default_not_applied_when_kept_tab_is_gone() {
    let f = setup(DuplicatePolicy::default()).await;
    let a = f.host.open_tab(1, URL);
    f.resolver.on_navigation(a.id, URL).await.unwrap();
    let b = f.host.open_tab(1, URL);
    let token = banner_token(f.resolver.on_navigation(b.id, URL).await.unwrap());

    // The engine never saw the removal event.
    f.host.close_externally(a.id);
    f.resolver.decide(&token, DuplicateDecision::ApplyDefault).await.unwrap();

    assert!(f.host.removed_tabs().is_empty());
    assert!(f.host.tab(b.id).is_some());
    assert_eq!(f.registry.lookup(URL), Some(b.id));
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_banner_applies_default() {
    let f = setup(DuplicatePolicy {
        banner_delay_seconds: 3,
        ..DuplicatePolicy::default()
    })
    .await;
    let a = f.host.open_tab(1, URL);
    f.resolver.on_navigation(a.id, URL).await.unwrap();
    let b = f.host.open_tab(1, URL);
    let token = banner_token(f.resolver.on_navigation(b.id, URL).await.unwrap());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(f.host.removed_tabs().is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(f.host.removed_tabs(), vec![b.id]);
    assert!(f.resolver.decide(&token, DuplicateDecision::KeepBoth).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_answer_cancels_countdown() {
    let f = setup(DuplicatePolicy::default()).await;
    let a = f.host.open_tab(1, URL);
    f.resolver.on_navigation(a.id, URL).await.unwrap();
    let b = f.host.open_tab(1, URL);
    let token = banner_token(f.resolver.on_navigation(b.id, URL).await.unwrap());

    f.resolver.decide(&token, DuplicateDecision::KeepBoth).await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(f.host.removed_tabs().is_empty());
}

#[tokio::test]
async fn test_refused_injection_applies_default_immediately() {
    let f = setup(DuplicatePolicy::default()).await;
    let a = f.host.open_tab(1, URL);
    f.resolver.on_navigation(a.id, URL).await.unwrap();
    let b = f.host.open_tab(1, URL);
    f.host.set_refuse_injection(true);

    let outcome = f.resolver.on_navigation(b.id, URL).await.unwrap();
    assert_eq!(outcome, DuplicateOutcome::DefaultApplied);
    assert_eq!(f.host.removed_tabs(), vec![b.id]);
    assert_eq!(f.resolver.pending_count(), 0);
}

// ─── Tab removal ───

#[tokio::test(start_paused = true)]
async fn test_removed_tab_drops_pending_decision() {
    let f = setup(DuplicatePolicy::default()).await;
    let a = f.host.open_tab(1, URL);
    f.resolver.on_navigation(a.id, URL).await.unwrap();
    let b = f.host.open_tab(1, URL);
    let token = banner_token(f.resolver.on_navigation(b.id, URL).await.unwrap());

    f.host.close_externally(b.id);
    f.resolver
        .handle(&TabEvent::TabRemoved {
            tab_id: b.id,
            window_id: 1,
        })
        .await
        .unwrap();

    assert!(f.resolver.pending_for(b.id).is_empty());
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(f.host.removed_tabs().is_empty());
    assert!(f.resolver.decide(&token, DuplicateDecision::ApplyDefault).await.is_err());
}

#[tokio::test]
async fn test_handler_reacts_to_created_tabs() {
    let f = setup(no_banner()).await;
    let a = f.host.open_tab(1, URL);
    f.resolver.handle(&TabEvent::TabCreated { tab: a.clone() }).await.unwrap();
    let b = f.host.open_tab(1, URL);
    f.resolver.handle(&TabEvent::TabCreated { tab: b.clone() }).await.unwrap();
    assert_eq!(f.host.removed_tabs(), vec![b.id]);
}
