use rand::Rng;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::{ClipdeckError, Result};

const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub token_path: PathBuf,
    pub require_auth: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        let token_path = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(format!(".{}", crate::APP_DIR_NAME))
            .join("auth.token");

        Self {
            token_path,
            require_auth: true,
        }
    }
}

/// Holds the bearer token clients must present to the control server.
/// The token is created on first run and reused afterwards.
pub struct AuthManager {
    require_auth: bool,
    token: Option<String>,
}

impl AuthManager {
    pub async fn new(config: AuthConfig) -> Result<Self> {
        if !config.require_auth {
            debug!("Control server authentication disabled");
            return Ok(Self {
                require_auth: false,
                token: None,
            });
        }

        let token = load_or_create_token(&config.token_path).await?;
        Ok(Self {
            require_auth: true,
            token: Some(token),
        })
    }

    /// A manager that accepts every request.
    pub fn disabled() -> Self {
        Self {
            require_auth: false,
            token: None,
        }
    }

    pub fn is_required(&self) -> bool {
        self.require_auth
    }

    pub fn validate_token(&self, provided: Option<&str>) -> bool {
        if !self.require_auth {
            return true;
        }

        match (&self.token, provided) {
            (Some(stored), Some(provided)) => constant_time_eq(stored.as_bytes(), provided.as_bytes()),
            _ => false,
        }
    }

    pub fn get_token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

async fn load_or_create_token(path: &Path) -> Result<String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    if fs::try_exists(path).await? {
        let token = fs::read_to_string(path).await?.trim().to_string();
        if token.is_empty() {
            return Err(ClipdeckError::Authentication(format!(
                "Token file {} is empty",
                path.display()
            )));
        }
        return Ok(token);
    }

    let token = generate_token();
    fs::write(path, &token).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }

    info!("Generated new control token at {}", path.display());
    Ok(token)
}

fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    (0..TOKEN_BYTES)
        .map(|_| format!("{:02x}", rng.gen::<u8>()))
        .collect()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &tempfile::TempDir) -> AuthConfig {
        AuthConfig {
            token_path: dir.path().join("nested").join("auth.token"),
            require_auth: true,
        }
    }

    #[tokio::test]
    async fn test_token_is_generated_once() {
        let dir = tempfile::tempdir().unwrap();
        let first = AuthManager::new(config_in(&dir)).await.unwrap();
        let token = first.get_token().unwrap().to_string();
        assert_eq!(token.len(), TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));

        let second = AuthManager::new(config_in(&dir)).await.unwrap();
        assert_eq!(second.get_token(), Some(token.as_str()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_token_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        AuthManager::new(config.clone()).await.unwrap();
        let mode = std::fs::metadata(&config.token_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_validation() {
        let dir = tempfile::tempdir().unwrap();
        let manager = AuthManager::new(config_in(&dir)).await.unwrap();
        let token = manager.get_token().unwrap().to_string();

        assert!(manager.validate_token(Some(&token)));
        assert!(!manager.validate_token(Some("wrong")));
        assert!(!manager.validate_token(None));

        let open = AuthManager::disabled();
        assert!(open.validate_token(None));
        assert!(open.get_token().is_none());
    }

    #[tokio::test]
    async fn test_empty_token_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        std::fs::create_dir_all(config.token_path.parent().unwrap()).unwrap();
        std::fs::write(&config.token_path, "  \n").unwrap();

        assert!(matches!(
            AuthManager::new(config).await,
            Err(ClipdeckError::Authentication(_))
        ));
    }
}
