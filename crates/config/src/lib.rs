//! Configuration loading, env substitution, and validation.
//!
//! Config files: `feedbridge.toml`, `feedbridge.yaml`, `feedbridge.yml` or
//! `feedbridge.json`, searched in `./` then the user config directory.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{config_dir, data_dir, discover_and_load, find_config_file, load_config},
    schema::{DestinationConfig, FeedbridgeConfig, RelaySettings, SourceConfig},
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
