//! # capture-settings
//!
//! Settings that seed a canvas capture agent. [`load_settings`] starts from
//! [`AgentSettings::default()`], merges an optional JSON file over it and
//! finally applies `CANVAS_CAPTURE_*` environment variables.
//!
//! The controller can still replace the size ceiling at runtime through the
//! `display` command; these settings only seed the agent.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings, load_settings_from_path};
pub use types::*;
