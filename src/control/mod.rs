pub mod auth;
pub mod protocol;
pub mod server;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use protocol::*;
pub use server::ControlServer;

use auth::AuthConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub host: String,
    pub port: u16,
    pub require_auth: bool,
    /// Overrides the default token location under the home directory.
    pub token_path: Option<PathBuf>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            host: crate::DEFAULT_HOST.to_string(),
            port: crate::DEFAULT_PORT,
            require_auth: true,
            token_path: None,
        }
    }
}

impl ControlConfig {
    pub fn auth_config(&self) -> AuthConfig {
        let defaults = AuthConfig::default();
        AuthConfig {
            token_path: self.token_path.clone().unwrap_or(defaults.token_path),
            require_auth: self.require_auth,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
