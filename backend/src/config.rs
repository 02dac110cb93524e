//! Runtime configuration.
//!
//! Defaults live here as constants. Each can be overridden from the
//! environment (a `.env` file is loaded first when present), and the CLI
//! can override the port and data directory on top of that.

use std::env;
use std::path::PathBuf;

use crate::models::Actor;

/// HTTP port.
pub const DEFAULT_PORT: u16 = 3000;

/// Directory holding `store.json`.
pub const DEFAULT_DATA_DIR: &str = ".deliverytrack";

/// Actor recorded in audit entries when a request does not identify one.
pub const DEFAULT_ACTOR_ID: &str = "system";
pub const DEFAULT_ACTOR_NAME: &str = "System";

/// Maximum upload size (in bytes).
///
/// 10 MB limit.
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

pub const ENV_PORT: &str = "DELIVERYTRACK_PORT";
pub const ENV_DATA_DIR: &str = "DELIVERYTRACK_DATA_DIR";
pub const ENV_ACTOR_ID: &str = "DELIVERYTRACK_ACTOR_ID";
pub const ENV_ACTOR_NAME: &str = "DELIVERYTRACK_ACTOR_NAME";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub data_dir: PathBuf,
    pub actor_id: String,
    pub actor_name: String,
    pub max_upload_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            actor_id: DEFAULT_ACTOR_ID.to_string(),
            actor_name: DEFAULT_ACTOR_NAME.to_string(),
            max_upload_size: MAX_UPLOAD_SIZE,
        }
    }
}

impl Config {
    /// Defaults overridden by `DELIVERYTRACK_*` environment variables.
    pub fn from_env() -> Self {
        // Try loading .env file
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank or unparsable values fall
    /// back to the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        Self {
            port: get(ENV_PORT)
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            data_dir: get(ENV_DATA_DIR).map(PathBuf::from).unwrap_or(defaults.data_dir),
            actor_id: get(ENV_ACTOR_ID).unwrap_or(defaults.actor_id),
            actor_name: get(ENV_ACTOR_NAME).unwrap_or(defaults.actor_name),
            max_upload_size: defaults.max_upload_size,
        }
    }

    pub fn with_port(mut self, port: Option<u16>) -> Self {
        if let Some(port) = port {
            self.port = port;
        }
        self
    }

    pub fn with_data_dir(mut self, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = dir {
            self.data_dir = dir;
        }
        self
    }

    pub fn default_actor(&self) -> Actor {
        Actor {
            id: self.actor_id.clone(),
            label: self.actor_name.clone(),
        }
    }
}
