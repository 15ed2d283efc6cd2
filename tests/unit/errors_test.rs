use tabkeeper::types::errors::*;

// === HostError Tests ===

#[test]
fn host_error_display_variants() {
    assert_eq!(HostError::TabNotFound(7).to_string(), "Tab not found: 7");
    assert_eq!(HostError::GroupNotFound(3).to_string(), "Tab group not found: 3");
    assert_eq!(HostError::WindowNotFound(2).to_string(), "Window not found: 2");
    assert_eq!(
        HostError::InjectionRefused {
            tab_id: 4,
            reason: "restricted page".to_string()
        }
        .to_string(),
        "Script injection refused for tab 4: restricted page"
    );
}

#[test]
fn host_error_vanished_targets() {
    assert!(HostError::TabNotFound(1).is_vanished());
    assert!(HostError::GroupNotFound(1).is_vanished());
    assert!(HostError::WindowNotFound(1).is_vanished());
    assert!(!HostError::Bridge("timeout".to_string()).is_vanished());
    assert!(!HostError::InjectionRefused {
        tab_id: 1,
        reason: String::new()
    }
    .is_vanished());
}

// === SettingsError Tests ===

#[test]
fn settings_error_from_serde() {
    let err: SettingsError = serde_json::from_str::<u32>("nope").unwrap_err().into();
    assert!(matches!(err, SettingsError::Serialization(_)));
}

#[test]
fn settings_error_wraps_validation_transparently() {
    let err = SettingsError::from(ValidationError::EmptyPattern);
    assert_eq!(err.to_string(), "URL pattern cannot be empty");
}

#[test]
fn settings_error_from_rusqlite() {
    let err: SettingsError = rusqlite::Error::QueryReturnedNoRows.into();
    assert!(matches!(err, SettingsError::Storage(_)));
}

// === ValidationError Tests ===

#[test]
fn validation_error_delay_message() {
    let err = ValidationError::DelayOutOfRange {
        field: "closeDelay",
        value: 301,
        min: 1,
        max: 300,
    };
    assert_eq!(err.to_string(), "closeDelay must be between 1 and 300 seconds, got 301");
}

#[test]
fn validation_error_duplicate_group_name() {
    let err = ValidationError::DuplicateGroupName("Docs".to_string());
    assert_eq!(err.to_string(), "A group with this name already exists: Docs");
}

// === DecisionError / PolicyError Tests ===

#[test]
fn decision_error_unknown_token() {
    let err = DecisionError::UnknownToken("dup_1".to_string());
    assert_eq!(err.to_string(), "Unknown or already consumed decision token: dup_1");
}

#[test]
fn policy_error_is_transparent() {
    let err: PolicyError = HostError::TabNotFound(9).into();
    assert_eq!(err.to_string(), "Tab not found: 9");
    let err: PolicyError = DecisionError::InvalidDecision("maybe".to_string()).into();
    assert_eq!(err.to_string(), "Invalid decision: maybe");
}

#[test]
fn errors_implement_error_trait() {
    let err: Box<dyn std::error::Error> = Box::new(HostError::TabNotFound(1));
    assert!(err.source().is_none());
}
