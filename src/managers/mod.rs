// tabkeeper policy managers
// Each manager owns one housekeeping policy and reacts to Tab Host events.
// Managers never call each other; the engine fans every event out to all of them.

pub mod auto_close_scheduler;
pub mod collapse_scheduler;
pub mod duplicate_resolver;
pub mod explorer_window;
pub mod group_assignment;
pub mod url_registry;
pub mod window_labels;

use async_trait::async_trait;

use crate::types::errors::PolicyError;
use crate::types::event::TabEvent;

/// A policy that reacts to Tab Host events.
///
/// A failing handler only affects its own policy; the engine logs the error
/// and carries on.
#[async_trait]
pub trait PolicyHandler: Send + Sync {
    /// Name used in log lines.
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &TabEvent) -> Result<(), PolicyError>;
}
