// tabkeeper services
// Services are the engine's collaborators: pattern matching, settings storage and the Tab Host.

pub mod memory_host;
pub mod pattern_matcher;
pub mod settings_store;
pub mod stdio_host;
pub mod tab_host;
