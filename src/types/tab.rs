use rand::seq::SliceRandom;
use serde::{Deserialize, Deserializer, Serialize};

pub type TabId = i64;
pub type WindowId = i64;
pub type GroupId = i64;

/// Group id reported by the host for tabs that are not in any group.
pub const GROUP_ID_NONE: GroupId = -1;

/// URL schemes that belong to the browser itself and are never acted on.
const INTERNAL_SCHEMES: &[&str] = &["chrome://", "chrome-extension://"];

/// Returns true for browser-internal pages (and for unknown URLs).
pub fn is_internal_url(url: &str) -> bool {
    url.is_empty() || INTERNAL_SCHEMES.iter().any(|s| url.starts_with(s))
}

/// Snapshot of a tab as reported by the Tab Host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub id: TabId,
    pub window_id: WindowId,
    pub index: usize,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub active: bool,
    #[serde(default = "default_group_id")]
    pub group_id: GroupId,
    /// Milliseconds since the Unix epoch.
    #[serde(default, deserialize_with = "whole_millis")]
    pub last_accessed: i64,
}

fn default_group_id() -> GroupId {
    GROUP_ID_NONE
}

/// Browsers report `lastAccessed` as a fractional millisecond count.
fn whole_millis<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = f64::deserialize(deserializer)?;
    Ok(millis.trunc() as i64)
}

impl TabInfo {
    pub fn is_grouped(&self) -> bool {
        self.group_id != GROUP_ID_NONE
    }
}

/// A tab group inside one window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TabGroup {
    pub id: GroupId,
    pub window_id: WindowId,
    #[serde(default)]
    pub title: String,
    pub color: GroupColor,
    #[serde(default)]
    pub collapsed: bool,
}

/// The nine colors a tab group can take.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GroupColor {
    Grey,
    Blue,
    Red,
    Yellow,
    Green,
    Pink,
    Purple,
    Cyan,
    Orange,
}

impl GroupColor {
    pub const ALL: [GroupColor; 9] = [
        GroupColor::Grey,
        GroupColor::Blue,
        GroupColor::Red,
        GroupColor::Yellow,
        GroupColor::Green,
        GroupColor::Pink,
        GroupColor::Purple,
        GroupColor::Cyan,
        GroupColor::Orange,
    ];

    /// Uniformly random pick among the supported colors.
    pub fn random() -> GroupColor {
        *Self::ALL
            .choose(&mut rand::thread_rng())
            .unwrap_or(&GroupColor::Grey)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GroupColor::Grey => "grey",
            GroupColor::Blue => "blue",
            GroupColor::Red => "red",
            GroupColor::Yellow => "yellow",
            GroupColor::Green => "green",
            GroupColor::Pink => "pink",
            GroupColor::Purple => "purple",
            GroupColor::Cyan => "cyan",
            GroupColor::Orange => "orange",
        }
    }

    /// Parses a stored color name. Unknown names (including `"default"`) yield `None`.
    pub fn parse(name: &str) -> Option<GroupColor> {
        Self::ALL.iter().copied().find(|c| c.as_str() == name)
    }
}

/// Filter for `TabHost::query_tabs`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TabQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_id: Option<WindowId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default)]
    pub focused_window: bool,
}

impl TabQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn in_window(window_id: WindowId) -> Self {
        Self {
            window_id: Some(window_id),
            ..Self::default()
        }
    }

    pub fn in_group(group_id: GroupId) -> Self {
        Self {
            group_id: Some(group_id),
            ..Self::default()
        }
    }

    /// The active tab of the focused window.
    pub fn active_in_focused_window() -> Self {
        Self {
            active: Some(true),
            focused_window: true,
            ..Self::default()
        }
    }
}

/// Partial update applied to a tab group.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<GroupColor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collapsed: Option<bool>,
}

impl GroupUpdate {
    pub fn collapsed(collapsed: bool) -> Self {
        Self {
            collapsed: Some(collapsed),
            ..Self::default()
        }
    }

    pub fn title_and_color(title: &str, color: Option<GroupColor>) -> Self {
        Self {
            title: Some(title.to_string()),
            color,
            ..Self::default()
        }
    }
}

/// Window size, used for the explorer pop-out window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

/// Badge text/color; `tab_id = None` sets the global badge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BadgeUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<TabId>,
    pub text: String,
    pub color: String,
}

/// Code injected into a tab's page context. Fire-and-forget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PageScript {
    /// Countdown banner offering "apply default" / "keep both".
    #[serde(rename_all = "camelCase")]
    DuplicateBanner {
        token: String,
        default_closes_older: bool,
        delay_seconds: u64,
    },
    /// Countdown banner offering "close now" / "do not close".
    #[serde(rename_all = "camelCase")]
    AutoCloseBanner { token: String, delay_seconds: u64 },
    /// Prefix `document.title` with `[label]` and keep it applied.
    SetTitlePrefix { label: String },
    /// Strip any `[label]` prefix added earlier.
    ClearTitlePrefix,
}
