//! Server configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::warn;

/// Server-wide configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory holding one JSON definition file per build.
    pub definitions_dir: PathBuf,
    /// Directory holding one JSON result file per finished run.
    pub logs_dir: PathBuf,
    /// Admission ceiling for simultaneously running builds.
    pub max_concurrent_builds: usize,
    /// HTTP listen address.
    pub addr: SocketAddr,
    /// SendGrid API key file; mail is disabled when absent.
    pub sendgrid_key_file: PathBuf,
}

const DEFAULT_MAX_CONCURRENT_BUILDS: usize = 3;
const DEFAULT_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 3000);

impl ServerConfig {
    /// Build a configuration from `KILN_*` environment variables, falling
    /// back to defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let definitions_dir = std::env::var("KILN_DEFINITIONS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("definitions"));
        let logs_dir = std::env::var("KILN_LOGS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("logs"));

        let max_concurrent_builds = match std::env::var("KILN_MAX_CONCURRENT_BUILDS") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                warn!(value = %raw, "invalid KILN_MAX_CONCURRENT_BUILDS, using default");
                DEFAULT_MAX_CONCURRENT_BUILDS
            }),
            Err(_) => DEFAULT_MAX_CONCURRENT_BUILDS,
        };

        let addr = match std::env::var("KILN_ADDR") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                warn!(value = %raw, "invalid KILN_ADDR, using default");
                SocketAddr::from(DEFAULT_ADDR)
            }),
            Err(_) => SocketAddr::from(DEFAULT_ADDR),
        };

        let sendgrid_key_file = std::env::var("KILN_SENDGRID_KEY_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("sendgrid-key.json"));

        Self {
            definitions_dir,
            logs_dir,
            max_concurrent_builds,
            addr,
            sendgrid_key_file,
        }
    }
}
