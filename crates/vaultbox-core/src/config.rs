//! `config.yaml` loading and connection resolution.
//!
//! The file is optional. Recognized keys:
//!
//! ```yaml
//! url: https://vault.example.com:8200
//! token: s.xxxxx
//! ca_bundle: ./ca_bundle.crt
//! secret:
//!   engine: kv
//! totp:
//!   engine: totp
//! user:
//!   organization: Example Org
//!   policies: [base]
//!   mount: userpass
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::VaultError;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Environment variable holding the Vault address.
pub const VAULT_ADDR_ENV: &str = "VAULT_ADDR";

/// Environment variable holding the Vault token.
pub const VAULT_TOKEN_ENV: &str = "VAULT_TOKEN";

/// Parsed `config.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolboxConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    /// PEM bundle added to the HTTP client's trust roots.
    #[serde(default)]
    pub ca_bundle: Option<PathBuf>,
    #[serde(default)]
    pub secret: EngineSection,
    #[serde(default)]
    pub totp: EngineSection,
    #[serde(default)]
    pub user: UserDefaults,
}

/// A section naming a default secret engine mount.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineSection {
    #[serde(default)]
    pub engine: Option<String>,
}

/// Values applied to every user created by `user-add`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserDefaults {
    /// Organization tag stored in the entity metadata.
    #[serde(default = "default_organization")]
    pub organization: String,
    /// Policies attached to the new entity.
    #[serde(default = "default_policies")]
    pub policies: Vec<String>,
    /// Mount path of the userpass auth method.
    #[serde(default = "default_userpass_mount")]
    pub mount: String,
}

fn default_organization() -> String {
    "vaultbox".to_owned()
}

fn default_policies() -> Vec<String> {
    vec!["base".to_owned()]
}

fn default_userpass_mount() -> String {
    "userpass".to_owned()
}

impl Default for UserDefaults {
    fn default() -> Self {
        Self {
            organization: default_organization(),
            policies: default_policies(),
            mount: default_userpass_mount(),
        }
    }
}

/// Fully resolved connection parameters for one gateway.
#[derive(Clone)]
pub struct ConnectionSettings {
    pub url: String,
    pub token: String,
    pub ca_bundle: Option<PathBuf>,
}

impl std::fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("url", &self.url)
            .field("ca_bundle", &self.ca_bundle)
            .finish()
    }
}

impl ToolboxConfig {
    /// Parse a YAML document.
    pub fn from_yaml(contents: &str) -> Result<Self, VaultError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Load the config file.
    ///
    /// An explicit path must exist. Without one, `./config.yaml` is used when
    /// present and an empty config otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self, VaultError> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => {
                let p = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !p.exists() {
                    return Ok(Self::default());
                }
                p
            }
        };
        let contents = std::fs::read_to_string(&path).map_err(|e| VaultError::io(&path, e))?;
        Self::from_yaml(&contents)
    }

    /// Resolve the connection: flag > environment > config file.
    ///
    /// `env_url` / `env_token` are the already-read environment values so the
    /// function stays pure.
    pub fn connection(
        &self,
        flag_url: Option<&str>,
        flag_token: Option<&str>,
        env_url: Option<&str>,
        env_token: Option<&str>,
    ) -> Result<ConnectionSettings, VaultError> {
        let url = flag_url
            .or(env_url)
            .or(self.url.as_deref())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                VaultError::Config(format!(
                    "no Vault address (use --url, ${VAULT_ADDR_ENV} or `url` in {DEFAULT_CONFIG_FILE})"
                ))
            })?;
        let token = flag_token
            .or(env_token)
            .or(self.token.as_deref())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                VaultError::Config(format!(
                    "no Vault token (use --token, ${VAULT_TOKEN_ENV} or `token` in {DEFAULT_CONFIG_FILE})"
                ))
            })?;

        Ok(ConnectionSettings {
            url: url.to_owned(),
            token: token.to_owned(),
            ca_bundle: self.ca_bundle.clone(),
        })
    }
}
