//! tabkeeper — background policy engine for browser tab housekeeping.
//!
//! Watches Tab Host events and applies the user's policies: duplicate-tab
//! resolution, scheduled auto-close, rule-based grouping and idle group
//! collapsing, plus per-window labels.
//!
//! This library crate exposes all modules for use by the binaries and integration tests.

pub mod config;
pub mod database;
pub mod engine;
pub mod logging;
pub mod managers;
pub mod platform;
pub mod rpc_handler;
pub mod services;
pub mod types;
