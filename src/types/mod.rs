// tabkeeper shared type definitions
// Each submodule defines types used across the engine: tabs, events, settings, decisions, errors.

pub mod decision;
pub mod errors;
pub mod event;
pub mod settings;
pub mod tab;
