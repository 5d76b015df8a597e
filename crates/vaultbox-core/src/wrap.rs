//! Response wrapping: hand a payload out through a single-use token.

use tracing::info;

use crate::error::VaultError;
use crate::gateway::{VaultGateway, VaultMethod, decode};
use crate::schema::{Envelope, WrapResponse};

/// Header carrying the requested wrap lifetime in seconds.
pub const WRAP_TTL_HEADER: &str = "X-Vault-Wrap-TTL";

/// Lifetime of wrapping tokens handed to new users.
pub const DEFAULT_WRAP_TTL_SECS: u64 = 600;

const WRAP_PATH: &str = "sys/wrapping/wrap";
const UNWRAP_PATH: &str = "sys/wrapping/unwrap";

/// Wrap `payload` and return the wrapping token.
pub async fn wrap(
    vault: &VaultGateway,
    payload: &serde_json::Value,
    ttl_secs: u64,
) -> Result<String, VaultError> {
    info!(ttl_secs, "wrapping payload");
    let body = vault
        .request(
            VaultMethod::Post,
            WRAP_PATH,
            Some(payload),
            &[(WRAP_TTL_HEADER, ttl_secs.to_string())],
        )
        .await?;
    let wrapped: WrapResponse = decode(WRAP_PATH, &body)?;
    Ok(wrapped.wrap_info.token)
}

/// Unwrap a wrapping token and return the payload.
///
/// Without `token` the gateway's own token is presented, which unwraps a
/// response that was wrapped for the caller.
pub async fn unwrap(
    vault: &VaultGateway,
    token: Option<&str>,
) -> Result<serde_json::Value, VaultError> {
    let body = match token {
        Some(token) => {
            vault
                .with_token(token)
                .post(UNWRAP_PATH, &serde_json::json!({}))
                .await?
        }
        None => vault.post(UNWRAP_PATH, &serde_json::json!({})).await?,
    };
    let unwrapped: Envelope<serde_json::Value> = decode(UNWRAP_PATH, &body)?;
    Ok(unwrapped.data)
}

/// Command line an operator runs to unwrap `token` against `base_url`.
pub fn unwrap_command(base_url: &str, token: &str) -> String {
    format!("VAULT_ADDR={base_url} vaultbox unwrap {token}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn wrap_sends_ttl_header_and_returns_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/sys/wrapping/wrap"))
            .and(header("x-vault-wrap-ttl", "600"))
            .and(header("x-vault-token", "root"))
            .and(body_json(serde_json::json!({ "password": "pw" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "wrap_info": { "token": "hvs.wrapped", "ttl": 600 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let gw = VaultGateway::with_base_url(server.uri(), "root");
        let token = wrap(
            &gw,
            &serde_json::json!({ "password": "pw" }),
            DEFAULT_WRAP_TTL_SECS,
        )
        .await
        .unwrap();
        assert_eq!(token, "hvs.wrapped");
    }

    #[tokio::test]
    async fn unwrap_presents_wrapping_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/sys/wrapping/unwrap"))
            .and(header("x-vault-token", "hvs.wrapped"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "password": "pw" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let gw = VaultGateway::with_base_url(server.uri(), "root");
        let data = unwrap(&gw, Some("hvs.wrapped")).await.unwrap();
        assert_eq!(data["password"], "pw");
    }

    #[tokio::test]
    async fn unwrap_without_token_uses_own_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/sys/wrapping/unwrap"))
            .and(header("x-vault-token", "root"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "password": "pw" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let gw = VaultGateway::with_base_url(server.uri(), "root");
        unwrap(&gw, None).await.unwrap();
    }

    #[tokio::test]
    async fn used_token_reports_vault_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/sys/wrapping/unwrap"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "errors": ["wrapping token is not valid or does not exist"]
            })))
            .mount(&server)
            .await;

        let gw = VaultGateway::with_base_url(server.uri(), "root");
        let err = unwrap(&gw, Some("hvs.used")).await.unwrap_err();
        assert!(err.to_string().contains("wrapping token is not valid"));
    }

    #[test]
    fn unwrap_command_names_address_and_token() {
        assert_eq!(
            unwrap_command("https://vault.example.com", "hvs.abc"),
            "VAULT_ADDR=https://vault.example.com vaultbox unwrap hvs.abc"
        );
    }
}
