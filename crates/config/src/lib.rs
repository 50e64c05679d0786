//! Configuration loading, validation, and env substitution.
//!
//! Config files: `switchboard.toml`, `switchboard.yaml`, or `switchboard.json`
//! Searched in `./` then `~/.config/switchboard/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{config_dir, data_dir, discover_and_load, find_config_file, load_config},
    schema::{
        EngineConfig, MessengerConfig, MetaAppConfig, ServerConfig, StorageConfig,
        SwitchboardConfig, WhatsAppConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
