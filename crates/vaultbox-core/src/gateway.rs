//! HashiCorp Vault HTTP gateway.
//!
//! Issues one request at a time against `{base_url}/v1/{path}`, attaches the
//! `X-Vault-Token` header, and maps every status above 399 to
//! [`VaultError::Api`] carrying the decoded `errors` list. Callers pick the
//! typed helper matching their endpoint's envelope.

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::ConnectionSettings;
use crate::error::VaultError;
use crate::path::encode_request_path;
use crate::schema::{Envelope, ErrorResponse, ListResponse};

/// Header carrying the client token on every request.
pub const TOKEN_HEADER: &str = "X-Vault-Token";

/// HTTP verbs used against the Vault API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultMethod {
    List,
    Get,
    Post,
    Delete,
}

impl VaultMethod {
    fn as_http(self) -> reqwest::Method {
        match self {
            // LIST is a syntactically valid token, so parsing cannot fail.
            VaultMethod::List => {
                reqwest::Method::from_bytes(b"LIST").unwrap_or(reqwest::Method::GET)
            }
            VaultMethod::Get => reqwest::Method::GET,
            VaultMethod::Post => reqwest::Method::POST,
            VaultMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Decode a response body into `T`, naming the endpoint on failure.
pub(crate) fn decode<T: DeserializeOwned>(context: &str, body: &str) -> Result<T, VaultError> {
    serde_json::from_str(body).map_err(|source| VaultError::Decode {
        context: context.to_owned(),
        source,
    })
}

/// Authenticated client for one Vault server.
#[derive(Clone)]
pub struct VaultGateway {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl std::fmt::Debug for VaultGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultGateway")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl VaultGateway {
    /// Build the user-agent string from crate version.
    fn user_agent() -> String {
        format!("vaultbox/{}", env!("CARGO_PKG_VERSION"))
    }

    /// Create a gateway from resolved connection settings.
    ///
    /// When a CA bundle is configured it is added to the client's trust
    /// roots and applies to every request.
    pub fn new(settings: &ConnectionSettings) -> Result<Self, VaultError> {
        let mut builder = reqwest::Client::builder().user_agent(Self::user_agent());
        if let Some(bundle) = &settings.ca_bundle {
            let pem = std::fs::read(bundle).map_err(|e| VaultError::io(bundle, e))?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                VaultError::Config(format!("invalid CA bundle {}: {e}", bundle.display()))
            })?;
            builder = builder.add_root_certificate(cert);
        }
        let http = builder.build().map_err(|source| VaultError::Transport {
            url: settings.url.clone(),
            source,
        })?;

        Ok(Self {
            http,
            base_url: settings.url.trim_end_matches('/').to_owned(),
            token: settings.token.clone(),
        })
    }

    /// Create a gateway at a custom base URL (for tests).
    #[cfg(test)]
    pub fn with_base_url(base_url: String, token: &str) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(Self::user_agent())
            .build()
            .expect("failed to build reqwest client");
        Self {
            http,
            base_url,
            token: token.to_owned(),
        }
    }

    /// Server address without trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// A copy of this gateway that authenticates with another token.
    pub fn with_token(&self, token: &str) -> Self {
        Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            token: token.to_owned(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/v1{}",
            self.base_url,
            encode_request_path(&format!("/{path}"))
        )
    }

    /// Send one request and return the raw response body.
    ///
    /// Extra `headers` are added after the token header. Non-2xx statuses
    /// above 399 become [`VaultError::Api`]; the body of a successful
    /// response may be empty (HTTP 204).
    pub async fn request(
        &self,
        method: VaultMethod,
        path: &str,
        body: Option<&serde_json::Value>,
        headers: &[(&str, String)],
    ) -> Result<String, VaultError> {
        self.send(method, path, &[], body, headers).await
    }

    async fn send(
        &self,
        method: VaultMethod,
        path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
        headers: &[(&str, String)],
    ) -> Result<String, VaultError> {
        let url = self.url(path);
        debug!(method = ?method, url = %url, ?query, "vault request");

        let mut req = self
            .http
            .request(method.as_http(), &url)
            .header(TOKEN_HEADER, &self.token)
            .header("Accept", "application/json");
        if !query.is_empty() {
            req = req.query(query);
        }
        for (name, value) in headers {
            req = req.header(*name, value);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(|source| VaultError::Transport {
            url: url.clone(),
            source,
        })?;
        let status = resp.status().as_u16();
        let text = resp.text().await.map_err(|source| VaultError::Transport {
            url: url.clone(),
            source,
        })?;
        debug!(status, bytes = text.len(), "vault response");

        if status > 399 {
            let errors = serde_json::from_str::<ErrorResponse>(&text)
                .map(|e| e.errors)
                .unwrap_or_default();
            return Err(VaultError::Api { status, errors });
        }
        Ok(text)
    }

    /// LIST a path and return `data.keys`.
    pub async fn list(&self, path: &str) -> Result<Vec<String>, VaultError> {
        let body = self.request(VaultMethod::List, path, None, &[]).await?;
        let envelope: Envelope<ListResponse> = decode(path, &body)?;
        Ok(envelope.data.keys)
    }

    /// LIST a path, treating a 404 (Vault's answer for an empty listing) as
    /// no keys.
    pub async fn list_or_empty(&self, path: &str) -> Result<Vec<String>, VaultError> {
        match self.list(path).await {
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            other => other,
        }
    }

    /// GET a path and decode the whole body.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, VaultError> {
        let body = self.request(VaultMethod::Get, path, None, &[]).await?;
        decode(path, &body)
    }

    /// GET a path and return its `data` member.
    pub async fn get_data<T: DeserializeOwned>(&self, path: &str) -> Result<T, VaultError> {
        let envelope: Envelope<T> = self.get(path).await?;
        Ok(envelope.data)
    }

    /// GET a path with query parameters and return its `data` member.
    pub async fn get_data_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, VaultError> {
        let body = self.send(VaultMethod::Get, path, query, None, &[]).await?;
        let envelope: Envelope<T> = decode(path, &body)?;
        Ok(envelope.data)
    }

    /// POST a JSON body and return the raw response body.
    pub async fn post(&self, path: &str, body: &serde_json::Value) -> Result<String, VaultError> {
        self.request(VaultMethod::Post, path, Some(body), &[]).await
    }

    /// POST a JSON body and return the response's `data` member.
    pub async fn post_data<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, VaultError> {
        let text = self.post(path, body).await?;
        let envelope: Envelope<T> = decode(path, &text)?;
        Ok(envelope.data)
    }

    /// DELETE a path.
    pub async fn delete(&self, path: &str) -> Result<(), VaultError> {
        self.request(VaultMethod::Delete, path, None, &[]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn user_agent_contains_version() {
        assert!(VaultGateway::user_agent().starts_with("vaultbox/"));
    }

    #[test]
    fn url_normalizes_request_path() {
        let gw = VaultGateway::with_base_url("https://vault.example.com".into(), "t");
        assert_eq!(
            gw.url("kv//metadata/Team A/"),
            "https://vault.example.com/v1/kv/metadata/Team%20A/"
        );
    }

    #[tokio::test]
    async fn reserved_characters_stay_in_the_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/kv/data/imported/vpn_%231"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/kv/data/imported/vpn_%232"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/kv/data/imported/what%3F"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let gw = VaultGateway::with_base_url(server.uri(), "root");
        let body = serde_json::json!({ "data": {} });
        for name in ["imported/vpn_#1", "imported/vpn_#2", "imported/what?"] {
            gw.post(&format!("kv/data/{name}"), &body).await.unwrap();
        }

        let received = server.received_requests().await.unwrap();
        assert!(received.iter().all(|r| r.url.query().is_none() && r.url.fragment().is_none()));
    }

    #[test]
    fn debug_output_hides_token() {
        let gw = VaultGateway::with_base_url("http://127.0.0.1:8200".into(), "s.secret");
        assert!(!format!("{gw:?}").contains("s.secret"));
    }

    #[tokio::test]
    async fn list_sends_list_method_and_token() {
        let server = MockServer::start().await;
        Mock::given(method("LIST"))
            .and(path("/v1/kv/metadata/apps/"))
            .and(header("x-vault-token", "root"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "keys": ["db", "web/"] }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let gw = VaultGateway::with_base_url(server.uri(), "root");
        let keys = gw.list("kv/metadata/apps/").await.unwrap();
        assert_eq!(keys, vec!["db", "web/"]);
    }

    #[tokio::test]
    async fn error_status_carries_vault_messages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/kv/data/missing"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "errors": ["permission denied", "1 error occurred"]
            })))
            .mount(&server)
            .await;

        let gw = VaultGateway::with_base_url(server.uri(), "root");
        let err = gw
            .get::<serde_json::Value>("kv/data/missing")
            .await
            .unwrap_err();
        match err {
            VaultError::Api { status, errors } => {
                assert_eq!(status, 403);
                assert_eq!(errors, vec!["permission denied", "1 error occurred"]);
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_status_with_non_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let gw = VaultGateway::with_base_url(server.uri(), "root");
        let err = gw.delete("kv/metadata/x").await.unwrap_err();
        assert!(matches!(err, VaultError::Api { status: 502, ref errors } if errors.is_empty()));
    }

    #[tokio::test]
    async fn shape_mismatch_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("LIST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "keys": [] })),
            )
            .mount(&server)
            .await;

        let gw = VaultGateway::with_base_url(server.uri(), "root");
        let err = gw.list("kv/metadata/").await.unwrap_err();
        assert!(matches!(err, VaultError::Decode { .. }));
    }

    #[tokio::test]
    async fn list_or_empty_swallows_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("LIST"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(serde_json::json!({ "errors": [] })),
            )
            .mount(&server)
            .await;

        let gw = VaultGateway::with_base_url(server.uri(), "root");
        assert!(gw.list_or_empty("auth/userpass/users").await.unwrap().is_empty());
        assert!(gw.list("auth/userpass/users").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn post_sends_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/kv/data/app"))
            .and(body_json(serde_json::json!({ "data": { "user": "svc" } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "version": 2 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let gw = VaultGateway::with_base_url(server.uri(), "root");
        let written: crate::schema::KvWriteResponse = gw
            .post_data(
                "kv/data/app",
                &serde_json::json!({ "data": { "user": "svc" } }),
            )
            .await
            .unwrap();
        assert_eq!(written.version, 2);
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_error() {
        let gw = VaultGateway::with_base_url("http://127.0.0.1:1".into(), "root");
        let err = gw.list("kv/metadata/").await.unwrap_err();
        assert!(matches!(err, VaultError::Transport { .. }));
    }

    #[tokio::test]
    async fn with_token_overrides_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-vault-token", "wrapping-token"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let gw = VaultGateway::with_base_url(server.uri(), "root");
        let body = gw
            .with_token("wrapping-token")
            .post("sys/wrapping/unwrap", &serde_json::json!({}))
            .await
            .unwrap();
        assert!(body.is_empty());
    }
}
