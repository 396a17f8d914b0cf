//! Git authentication configuration.

use crate::error::{PromoteError, Result};
use git2::{Cred, CredentialType, RemoteCallbacks};
use std::fmt;
use std::path::PathBuf;

/// Authentication method for git remote operations.
#[derive(Clone, Default)]
pub enum GitAuth {
    /// SSH key authentication.
    SshKey {
        private_key_path: PathBuf,
        passphrase: Option<String>,
    },
    /// Token-based authentication (for HTTPS).
    Token(String),
    /// Use system credential helper.
    CredentialHelper,
    /// No authentication (public repos, local paths, or an SSH agent).
    #[default]
    None,
}

impl fmt::Debug for GitAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SshKey {
                private_key_path, ..
            } => f
                .debug_struct("SshKey")
                .field("private_key_path", private_key_path)
                .finish_non_exhaustive(),
            Self::Token(_) => f.write_str("Token(***)"),
            Self::CredentialHelper => f.write_str("CredentialHelper"),
            Self::None => f.write_str("None"),
        }
    }
}

impl GitAuth {
    /// Create SSH key auth from the default location (~/.ssh/id_ed25519 or ~/.ssh/id_rsa).
    pub fn ssh_default() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| {
            PromoteError::InvalidConfig("could not determine home directory".into())
        })?;

        for key in ["id_ed25519", "id_rsa"] {
            let path = home.join(".ssh").join(key);
            if path.exists() {
                return Ok(Self::ssh_key(path));
            }
        }

        Err(PromoteError::InvalidConfig(
            "no SSH key found at ~/.ssh/id_ed25519 or ~/.ssh/id_rsa".into(),
        ))
    }

    /// Create SSH key auth with a specific key path.
    pub fn ssh_key(path: impl Into<PathBuf>) -> Self {
        Self::SshKey {
            private_key_path: path.into(),
            passphrase: None,
        }
    }

    /// Create token-based auth (typically for GitHub HTTPS URLs).
    pub fn token(token: impl Into<String>) -> Self {
        Self::Token(token.into())
    }

    /// Create token auth from an environment variable.
    pub fn from_env(var_name: &str) -> Result<Self> {
        let token = std::env::var(var_name).map_err(|_| {
            PromoteError::InvalidConfig(format!("environment variable {} not set", var_name))
        })?;
        Ok(Self::Token(token))
    }

    /// Create token auth from the GITHUB_TOKEN environment variable.
    pub fn github_token() -> Result<Self> {
        Self::from_env("GITHUB_TOKEN")
    }

    /// Set passphrase for SSH key auth.
    pub fn with_passphrase(self, passphrase: impl Into<String>) -> Self {
        match self {
            Self::SshKey {
                private_key_path, ..
            } => Self::SshKey {
                private_key_path,
                passphrase: Some(passphrase.into()),
            },
            other => other,
        }
    }

    /// Remote callbacks answering credential requests with this auth.
    pub(crate) fn callbacks<'a>(&self) -> RemoteCallbacks<'a> {
        let auth = self.clone();
        let mut callbacks = RemoteCallbacks::new();

        callbacks.credentials(move |url, username_from_url, allowed_types| {
            let username = username_from_url.unwrap_or("git");
            match &auth {
                GitAuth::SshKey {
                    private_key_path,
                    passphrase,
                } => Cred::ssh_key(username, None, private_key_path, passphrase.as_deref()),
                // GitHub accepts the token as the user with an empty password
                GitAuth::Token(token) => Cred::userpass_plaintext(token, ""),
                GitAuth::CredentialHelper => {
                    if allowed_types.contains(CredentialType::USER_PASS_PLAINTEXT) {
                        Cred::credential_helper(
                            &git2::Config::open_default()?,
                            url,
                            username_from_url,
                        )
                    } else if allowed_types.contains(CredentialType::SSH_KEY) {
                        Cred::ssh_key_from_agent(username)
                    } else {
                        Cred::default()
                    }
                }
                GitAuth::None => {
                    if allowed_types.contains(CredentialType::SSH_KEY) {
                        Cred::ssh_key_from_agent(username)
                    } else {
                        Cred::default()
                    }
                }
            }
        });

        callbacks
    }
}
