//! Configuration parsing for the Kiln CI orchestrator.
//!
//! This crate handles:
//! - Build definition files (one JSON document per build)
//! - Server configuration from the environment

pub mod definition;
pub mod error;
pub mod system;

pub use definition::{load_definition, parse_definition};
pub use error::{ConfigError, ConfigResult};
pub use system::ServerConfig;
