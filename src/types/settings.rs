use std::collections::{BTreeMap, HashSet};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize, Serializer};

use super::errors::ValidationError;
use super::tab::{GroupColor, WindowSize};

/// Longest countdown/close delay accepted, in seconds.
pub const MAX_DELAY_SECONDS: u64 = 300;
/// Longest collapse delay accepted, in seconds.
pub const MAX_COLLAPSE_DELAY_SECONDS: u64 = 30;

/// A group of persisted keys loaded and saved together.
///
/// The serialized form of `Default::default()` names every key the section
/// owns; missing keys in storage fall back to those defaults.
pub trait SettingsSection: Serialize + DeserializeOwned + Default + Clone + Send + Sync {
    /// Name used by `getSettings` / `updateSettings`.
    const SECTION: &'static str;

    /// Checks user-supplied values before they are persisted.
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// Clamp a stored delay the way the countdown banners expect it: `0` falls
/// back to `default`, anything else is capped at [`MAX_DELAY_SECONDS`].
pub fn effective_delay(seconds: u64, default: u64) -> u64 {
    if seconds == 0 {
        default
    } else {
        seconds.min(MAX_DELAY_SECONDS)
    }
}

fn check_delay(field: &'static str, value: u64, max: u64) -> Result<(), ValidationError> {
    if value < 1 || value > max {
        return Err(ValidationError::DelayOutOfRange {
            field,
            value,
            min: 1,
            max,
        });
    }
    Ok(())
}

fn check_patterns<'a>(patterns: impl IntoIterator<Item = &'a String>) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for pattern in patterns {
        if pattern.trim().is_empty() {
            return Err(ValidationError::EmptyPattern);
        }
        if !seen.insert(pattern.as_str()) {
            return Err(ValidationError::DuplicatePattern(pattern.clone()));
        }
    }
    Ok(())
}

// === Duplicate prevention ===

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DuplicatePolicy {
    #[serde(rename = "duplicatePreventionEnabled")]
    pub enabled: bool,
    /// `false` closes the newer tab, `true` closes the older one.
    #[serde(rename = "closeOlderTab")]
    pub close_older_tab: bool,
    #[serde(rename = "allowedDuplicatePatterns")]
    pub allowed_patterns: Vec<String>,
    #[serde(rename = "duplicateBannerEnabled")]
    pub banner_enabled: bool,
    #[serde(rename = "duplicateBannerDelaySeconds")]
    pub banner_delay_seconds: u64,
}

impl Default for DuplicatePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            close_older_tab: false,
            allowed_patterns: Vec::new(),
            banner_enabled: true,
            banner_delay_seconds: 5,
        }
    }
}

impl DuplicatePolicy {
    pub fn banner_delay(&self) -> u64 {
        effective_delay(self.banner_delay_seconds, 5)
    }
}

impl SettingsSection for DuplicatePolicy {
    const SECTION: &'static str = "duplicatePrevention";

    fn validate(&self) -> Result<(), ValidationError> {
        check_delay("duplicateBannerDelaySeconds", self.banner_delay_seconds, MAX_DELAY_SECONDS)?;
        check_patterns(&self.allowed_patterns)
    }
}

// === Auto-close ===

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AutoClosePolicy {
    #[serde(rename = "autoCloseEnabled")]
    pub enabled: bool,
    #[serde(rename = "closeDelay")]
    pub close_delay_seconds: u64,
    #[serde(rename = "urlPatterns")]
    pub patterns: Vec<String>,
    #[serde(rename = "autoCloseBannerEnabled")]
    pub banner_enabled: bool,
}

impl Default for AutoClosePolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            close_delay_seconds: 5,
            patterns: Vec::new(),
            banner_enabled: true,
        }
    }
}

impl AutoClosePolicy {
    pub fn close_delay(&self) -> u64 {
        effective_delay(self.close_delay_seconds, 5)
    }

    /// How long a "do not close" answer keeps the tab from being rescheduled.
    pub fn suppression_seconds(&self) -> u64 {
        self.close_delay().max(10)
    }
}

impl SettingsSection for AutoClosePolicy {
    const SECTION: &'static str = "autoClose";

    fn validate(&self) -> Result<(), ValidationError> {
        check_delay("closeDelay", self.close_delay_seconds, MAX_DELAY_SECONDS)?;
        check_patterns(&self.patterns)
    }
}

// === Auto tab grouping ===

/// Which end of an existing group receives a newly matched tab.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InsertPosition {
    Left,
    #[default]
    Right,
}

/// Color a rule asks for. `"default"` picks a fresh random color every time
/// the rule styles a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleColor {
    Random,
    Fixed(GroupColor),
}

impl RuleColor {
    pub fn parse(name: &str) -> Option<RuleColor> {
        match name {
            "default" => Some(RuleColor::Random),
            other => GroupColor::parse(other).map(RuleColor::Fixed),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleColor::Random => "default",
            RuleColor::Fixed(color) => color.as_str(),
        }
    }

    pub fn pick(&self) -> GroupColor {
        match self {
            RuleColor::Random => GroupColor::random(),
            RuleColor::Fixed(color) => *color,
        }
    }
}

impl Serialize for RuleColor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A named group and the URL patterns that route tabs into it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "StoredGroupRule")]
pub struct GroupRule {
    pub patterns: Vec<String>,
    #[serde(rename = "groupName")]
    pub group_name: String,
    #[serde(rename = "groupColor", skip_serializing_if = "Option::is_none")]
    pub group_color: Option<RuleColor>,
}

/// On-disk shape of a rule, covering the older single-`pattern` form.
#[derive(Deserialize)]
struct StoredGroupRule {
    #[serde(default)]
    patterns: Option<Vec<String>>,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(rename = "groupName", default)]
    group_name: String,
    #[serde(rename = "groupColor", default)]
    group_color: Option<String>,
}

impl From<StoredGroupRule> for GroupRule {
    fn from(stored: StoredGroupRule) -> Self {
        let patterns = match (stored.patterns, stored.pattern) {
            (Some(patterns), _) => patterns,
            (None, Some(pattern)) if !pattern.is_empty() => vec![pattern],
            _ => Vec::new(),
        };
        Self {
            patterns,
            group_name: stored.group_name,
            group_color: stored.group_color.as_deref().and_then(RuleColor::parse),
        }
    }
}

impl GroupRule {
    pub fn new(group_name: &str, patterns: &[&str], group_color: Option<GroupColor>) -> Self {
        Self {
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            group_name: group_name.to_string(),
            group_color: group_color.map(RuleColor::Fixed),
        }
    }

    /// The color to paint a group with, if the rule names one.
    pub fn color(&self) -> Option<GroupColor> {
        self.group_color.map(|c| c.pick())
    }

    pub fn matches(&self, url: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| crate::services::pattern_matcher::matches_pattern(p, url))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GroupingPolicy {
    #[serde(rename = "autoTabGroupingEnabled")]
    pub enabled: bool,
    #[serde(rename = "applyToGroupedTabs")]
    pub apply_to_grouped_tabs: bool,
    #[serde(rename = "ignorePinnedTabs")]
    pub ignore_pinned_tabs: bool,
    #[serde(rename = "addTabPosition")]
    pub insert_position: InsertPosition,
    #[serde(rename = "tabGroupRules")]
    pub rules: Vec<GroupRule>,
}

impl Default for GroupingPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            apply_to_grouped_tabs: false,
            ignore_pinned_tabs: true,
            insert_position: InsertPosition::Right,
            rules: Vec::new(),
        }
    }
}

impl GroupingPolicy {
    /// First rule, in configured order, with a pattern matching `url`.
    pub fn matching_rule(&self, url: &str) -> Option<&GroupRule> {
        self.rules.iter().find(|rule| rule.matches(url))
    }
}

impl SettingsSection for GroupingPolicy {
    const SECTION: &'static str = "autoTabGrouping";

    fn validate(&self) -> Result<(), ValidationError> {
        let mut names = HashSet::new();
        for rule in &self.rules {
            let name = rule.group_name.trim();
            if name.is_empty() {
                return Err(ValidationError::EmptyGroupName);
            }
            if !names.insert(name) {
                return Err(ValidationError::DuplicateGroupName(name.to_string()));
            }
        }
        // A pattern may route into one group only.
        check_patterns(self.rules.iter().flat_map(|r| r.patterns.iter()))
    }
}

// === Auto-collapse ===

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CollapsePolicy {
    #[serde(rename = "autoCollapseEnabled")]
    pub enabled: bool,
    #[serde(rename = "collapseDelay")]
    pub collapse_delay_seconds: u64,
}

impl Default for CollapsePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            collapse_delay_seconds: 3,
        }
    }
}

impl SettingsSection for CollapsePolicy {
    const SECTION: &'static str = "autoCollapse";

    fn validate(&self) -> Result<(), ValidationError> {
        check_delay("collapseDelay", self.collapse_delay_seconds, MAX_COLLAPSE_DELAY_SECONDS)
    }
}

// === Window labels ===

/// Window id (as a string key) → display label.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowLabels {
    #[serde(rename = "windowLabels")]
    pub labels: BTreeMap<String, String>,
}

impl SettingsSection for WindowLabels {
    const SECTION: &'static str = "windowLabels";
}

/// Window id → whether title prefixing is on. Absent means on.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowPrefixFlags {
    #[serde(rename = "windowPrefixEnabled")]
    pub enabled: BTreeMap<String, bool>,
}

impl WindowPrefixFlags {
    pub fn is_enabled(&self, key: &str) -> bool {
        self.enabled.get(key).copied().unwrap_or(true)
    }
}

impl SettingsSection for WindowPrefixFlags {
    const SECTION: &'static str = "windowPrefix";
}

// === Explorer window ===

pub const EXPLORER_MIN_SIZE: WindowSize = WindowSize { width: 600, height: 480 };

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExplorerSettings {
    #[serde(rename = "explorerWindowSize")]
    pub size: WindowSize,
}

impl Default for ExplorerSettings {
    fn default() -> Self {
        Self {
            size: WindowSize {
                width: 900,
                height: 720,
            },
        }
    }
}

impl SettingsSection for ExplorerSettings {
    const SECTION: &'static str = "explorer";
}

/// Keys that identify a bare (unwrapped) settings export.
pub const KNOWN_IMPORT_KEYS: &[&str] = &[
    "autoCloseEnabled",
    "autoTabGroupingEnabled",
    "duplicatePreventionEnabled",
    "tabGroupRules",
    "addTabPosition",
];
