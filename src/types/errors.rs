use thiserror::Error;

use super::tab::{GroupId, TabId, WindowId};

// === HostError ===

/// Failures reported by the Tab Host.
///
/// Most of these mean the tab, group or window vanished between lookup and
/// action, which policies treat as a benign no-op.
#[derive(Debug, Error)]
pub enum HostError {
    /// Tab with the given ID is not open.
    #[error("Tab not found: {0}")]
    TabNotFound(TabId),
    /// Group with the given ID does not exist.
    #[error("Tab group not found: {0}")]
    GroupNotFound(GroupId),
    /// Window with the given ID does not exist.
    #[error("Window not found: {0}")]
    WindowNotFound(WindowId),
    /// The page refused script injection.
    #[error("Script injection refused for tab {tab_id}: {reason}")]
    InjectionRefused { tab_id: TabId, reason: String },
    /// The host bridge failed or returned something unreadable.
    #[error("Tab host bridge error: {0}")]
    Bridge(String),
}

impl HostError {
    /// True when the error only means "the target is gone".
    pub fn is_vanished(&self) -> bool {
        matches!(
            self,
            HostError::TabNotFound(_) | HostError::GroupNotFound(_) | HostError::WindowNotFound(_)
        )
    }
}

// === SettingsError ===

/// Errors related to the persisted settings store.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The backing database failed.
    #[error("Settings storage error: {0}")]
    Storage(String),
    /// Failed to serialize or deserialize a value.
    #[error("Settings serialization error: {0}")]
    Serialization(String),
    /// The requested settings section does not exist.
    #[error("Unknown settings section: {0}")]
    UnknownSection(String),
    /// An import blob was not recognised as exported settings.
    #[error("Invalid settings file format: {0}")]
    InvalidImport(String),
    /// The new value failed validation.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

impl From<rusqlite::Error> for SettingsError {
    fn from(e: rusqlite::Error) -> Self {
        SettingsError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for SettingsError {
    fn from(e: serde_json::Error) -> Self {
        SettingsError::Serialization(e.to_string())
    }
}

// === ValidationError ===

/// User input rejected before it reaches policy state.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("{field} must be between {min} and {max} seconds, got {value}")]
    DelayOutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },
    #[error("URL pattern cannot be empty")]
    EmptyPattern,
    #[error("This URL pattern already exists: {0}")]
    DuplicatePattern(String),
    #[error("Group name cannot be empty")]
    EmptyGroupName,
    #[error("A group with this name already exists: {0}")]
    DuplicateGroupName(String),
}

// === DecisionError ===

/// Errors answering a banner decision message.
#[derive(Debug, Error, PartialEq)]
pub enum DecisionError {
    /// No pending decision carries this token (unknown, or already consumed).
    #[error("Unknown or already consumed decision token: {0}")]
    UnknownToken(String),
    /// The decision value is not one the banner offers.
    #[error("Invalid decision: {0}")]
    InvalidDecision(String),
}

// === PolicyError ===

/// Failure of a single policy handler. Never fatal to the engine.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error(transparent)]
    Host(#[from] HostError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Decision(#[from] DecisionError),
}
