use serde::{Deserialize, Serialize};

use super::errors::DecisionError;
use super::tab::TabId;

/// Answer from the duplicate-tab banner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DuplicateDecision {
    /// Apply the configured default (close older or close newer).
    #[serde(rename = "default")]
    ApplyDefault,
    /// Keep both tabs open.
    #[serde(rename = "keep")]
    KeepBoth,
}

impl DuplicateDecision {
    pub fn parse(value: &str) -> Result<Self, DecisionError> {
        match value {
            "default" => Ok(DuplicateDecision::ApplyDefault),
            "keep" => Ok(DuplicateDecision::KeepBoth),
            other => Err(DecisionError::InvalidDecision(other.to_string())),
        }
    }
}

/// Answer from the auto-close banner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AutoCloseDecision {
    Close,
    Keep,
}

impl AutoCloseDecision {
    pub fn parse(value: &str) -> Result<Self, DecisionError> {
        match value {
            "close" => Ok(AutoCloseDecision::Close),
            "keep" => Ok(AutoCloseDecision::Keep),
            other => Err(DecisionError::InvalidDecision(other.to_string())),
        }
    }
}

/// A duplicate collision waiting for the user (or the countdown) to decide.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDuplicateDecision {
    pub token: String,
    pub normalized_url: String,
    pub new_tab_id: TabId,
    pub existing_tab_id: TabId,
    pub default_closes_older: bool,
}

impl PendingDuplicateDecision {
    pub fn involves(&self, tab_id: TabId) -> bool {
        self.new_tab_id == tab_id || self.existing_tab_id == tab_id
    }
}

/// An auto-close countdown waiting for "close" or "do not close".
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAutoCloseDecision {
    pub token: String,
    pub tab_id: TabId,
    pub initial_url: String,
    pub delay_seconds: u64,
}

/// Mint a fresh decision token.
pub fn new_token(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4())
}
