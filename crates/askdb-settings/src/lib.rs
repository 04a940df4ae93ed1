//! # askdb-settings
//!
//! Configuration management for the askdb agent.
//!
//! Settings are loaded in three layers, later layers winning:
//!
//! 1. Compiled defaults ([`AskdbSettings::default`])
//! 2. `~/.askdb/settings.json`, deep-merged over the defaults
//! 3. `ASKDB_*` environment variable overrides
//!
//! Prompt language is a closed enum ([`Language`]); a settings file naming
//! an unsupported language fails at load time, not mid-session.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path, settings_path};
pub use types::{AskdbSettings, Language};
