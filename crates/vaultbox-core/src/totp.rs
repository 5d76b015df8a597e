//! TOTP secret engine: generated and imported keys, code reads.

use tracing::info;

use crate::error::VaultError;
use crate::gateway::VaultGateway;
use crate::schema::TotpCodeResponse;

#[derive(Debug, Clone)]
pub struct Totp<'a> {
    vault: &'a VaultGateway,
}

impl<'a> Totp<'a> {
    pub fn new(vault: &'a VaultGateway) -> Self {
        Self { vault }
    }

    pub async fn list(&self, engine: &str) -> Result<Vec<String>, VaultError> {
        self.vault.list(&format!("{engine}/keys")).await
    }

    /// Let Vault generate a new key. The key material is never exported.
    pub async fn add(
        &self,
        engine: &str,
        name: &str,
        issuer: &str,
        account: &str,
    ) -> Result<(), VaultError> {
        let target = format!("{engine}/keys/{name}");
        info!(path = %target, "adding totp key");
        let body = serde_json::json!({
            "generate": true,
            "exported": false,
            "issuer": issuer,
            "account_name": account,
        });
        self.vault.post(&target, &body).await?;
        Ok(())
    }

    /// Import an existing key from an `otpauth://` URL.
    pub async fn import_url(&self, engine: &str, name: &str, url: &str) -> Result<(), VaultError> {
        let target = format!("{engine}/keys/{name}");
        info!(path = %target, "importing totp key");
        let body = serde_json::json!({ "generate": false, "url": url });
        self.vault.post(&target, &body).await?;
        Ok(())
    }

    /// Current code for a key.
    pub async fn read(&self, engine: &str, name: &str) -> Result<String, VaultError> {
        let code: TotpCodeResponse = self
            .vault
            .get_data(&format!("{engine}/code/{name}"))
            .await?;
        Ok(code.code)
    }

    pub async fn delete(&self, engine: &str, name: &str) -> Result<(), VaultError> {
        let target = format!("{engine}/keys/{name}");
        info!(path = %target, "deleting totp key");
        self.vault.delete(&target).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn add_asks_vault_to_generate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/totp/keys/github"))
            .and(body_json(serde_json::json!({
                "generate": true,
                "exported": false,
                "issuer": "GitHub",
                "account_name": "ops@example.com"
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let gw = VaultGateway::with_base_url(server.uri(), "root");
        Totp::new(&gw)
            .add("totp", "github", "GitHub", "ops@example.com")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn import_sends_url() {
        let url = "otpauth://totp/Example:ops?secret=JBSWY3DPEHPK3PXP&issuer=Example";
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/totp/keys/example"))
            .and(body_json(serde_json::json!({ "generate": false, "url": url })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let gw = VaultGateway::with_base_url(server.uri(), "root");
        Totp::new(&gw)
            .import_url("totp", "example", url)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn read_returns_code() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/totp/code/github"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "code": "492039" }
            })))
            .mount(&server)
            .await;

        let gw = VaultGateway::with_base_url(server.uri(), "root");
        assert_eq!(Totp::new(&gw).read("totp", "github").await.unwrap(), "492039");
    }

    #[tokio::test]
    async fn list_and_delete_use_keys_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("LIST"))
            .and(path("/v1/totp/keys"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "keys": ["github", "aws"] }
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/v1/totp/keys/aws"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let gw = VaultGateway::with_base_url(server.uri(), "root");
        let totp = Totp::new(&gw);
        assert_eq!(totp.list("totp").await.unwrap(), vec!["github", "aws"]);
        totp.delete("totp", "aws").await.unwrap();
    }
}
