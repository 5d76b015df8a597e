//! Error type shared by every vaultbox operation.
//!
//! Library code returns these values; only the binary decides whether an
//! error terminates the process.

use std::path::PathBuf;

/// Errors produced while talking to Vault or preparing a request.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("network error communicating with Vault at {url}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Vault returned HTTP {status}{}", format_errors(.errors))]
    Api { status: u16, errors: Vec<String> },

    #[error("unexpected response shape from {context}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{kind} '{name}' does not exist")]
    NotFound {
        kind: &'static str,
        name: String,
        available: Vec<String>,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("cannot access {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV input is malformed")]
    Csv(#[from] csv::Error),

    #[error("YAML document is malformed")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

fn format_errors(errors: &[String]) -> String {
    if errors.is_empty() {
        String::new()
    } else {
        format!(": {}", errors.join("; "))
    }
}

impl VaultError {
    /// Returns `true` for an API response with HTTP 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, VaultError::Api { status: 404, .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        VaultError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_lists_every_message() {
        let err = VaultError::Api {
            status: 403,
            errors: vec!["permission denied".into(), "invalid token".into()],
        };
        assert_eq!(
            err.to_string(),
            "Vault returned HTTP 403: permission denied; invalid token"
        );
    }

    #[test]
    fn api_error_without_messages() {
        let err = VaultError::Api {
            status: 502,
            errors: vec![],
        };
        assert_eq!(err.to_string(), "Vault returned HTTP 502");
    }

    #[test]
    fn not_found_detection() {
        assert!(
            VaultError::Api {
                status: 404,
                errors: vec![]
            }
            .is_not_found()
        );
        assert!(!VaultError::InvalidInput("x".into()).is_not_found());
    }
}
