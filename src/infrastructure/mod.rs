//! Infrastructure layer - external adapters (config files, simulated engine).
//!
//! This layer handles all I/O operations and the stand-in collaborators the
//! CLI runs the manager against.

pub mod config;
pub mod simulated;

pub use config::{
    config_file_path, ensure_config_exists, load_config, load_config_from_file, render_config,
    save_config, DEFAULT_CONFIG,
};
pub use simulated::{
    simulated_registry, SimulatedConfigurer, SimulatedConfigurerLog, SimulatedModel,
    StaticEncryptionHandler,
};
