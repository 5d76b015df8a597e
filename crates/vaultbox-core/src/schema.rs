//! Typed response bodies for the Vault endpoints vaultbox calls.
//!
//! Each endpoint decodes into an explicit shape so that a mismatch surfaces
//! as [`VaultError::Decode`](crate::VaultError::Decode) instead of a missing
//! key deep inside a command.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Free-form key/value payload of a KV-v2 secret.
pub type SecretData = serde_json::Map<String, serde_json::Value>;

/// Generic `{"data": ...}` envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// `data` of a LIST response.
#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub keys: Vec<String>,
}

/// `data` of a KV-v2 read (`GET {engine}/data/{path}`).
#[derive(Debug, Clone, Deserialize)]
pub struct KvReadResponse {
    pub data: Option<SecretData>,
}

/// `data` of a KV-v2 write (`POST {engine}/data/{path}`).
#[derive(Debug, Clone, Deserialize)]
pub struct KvWriteResponse {
    pub version: u64,
}

/// `data` of a KV-v2 metadata read (`GET {engine}/metadata/{path}`).
#[derive(Debug, Clone, Deserialize)]
pub struct KvMetadataResponse {
    #[serde(default)]
    pub current_version: u64,
    #[serde(default)]
    pub versions: BTreeMap<String, KvVersionMetadata>,
}

/// Per-version entry inside [`KvMetadataResponse::versions`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KvVersionMetadata {
    #[serde(default)]
    pub created_time: String,
    #[serde(default)]
    pub deletion_time: String,
    #[serde(default)]
    pub destroyed: bool,
}

impl KvVersionMetadata {
    /// A version that can still be read back.
    pub fn is_live(&self) -> bool {
        !self.destroyed && self.deletion_time.is_empty()
    }
}

/// Error body returned by Vault for non-2xx responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub errors: Vec<String>,
}

/// `data` of an identity entity read.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityResponse {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<EntityAlias>,
    #[serde(default)]
    pub policies: Vec<String>,
}

/// Alias bound to an entity.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityAlias {
    pub name: String,
    #[serde(default)]
    pub mount_accessor: String,
    #[serde(default)]
    pub mount_type: String,
}

/// `data` of an entity creation.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityCreated {
    pub id: String,
}

/// One enabled auth method from `GET sys/auth`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthMount {
    pub accessor: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// `data` of `GET sys/auth`, keyed by mount path (e.g. `userpass/`).
pub type AuthMounts = HashMap<String, AuthMount>;

/// `wrap_info` section of a wrapping response.
#[derive(Debug, Clone, Deserialize)]
pub struct WrapInfo {
    pub token: String,
    #[serde(default)]
    pub ttl: u64,
}

/// Response of `POST sys/wrapping/wrap`.
#[derive(Debug, Clone, Deserialize)]
pub struct WrapResponse {
    pub wrap_info: WrapInfo,
}

/// `data` of an identity group read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupResponse {
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub policies: Vec<String>,
    #[serde(default)]
    pub member_entity_ids: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// `data` of an ACL policy read.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyResponse {
    #[serde(default)]
    pub name: String,
    pub policy: String,
}

/// `data` of a TOTP code read.
#[derive(Debug, Clone, Deserialize)]
pub struct TotpCodeResponse {
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_versions_decode_and_liveness() {
        let body = serde_json::json!({
            "current_version": 3,
            "versions": {
                "1": { "created_time": "t1", "deletion_time": "", "destroyed": false },
                "2": { "created_time": "t2", "deletion_time": "", "destroyed": true },
                "3": { "created_time": "t3", "deletion_time": "t4", "destroyed": false }
            }
        });
        let meta: KvMetadataResponse = serde_json::from_value(body).unwrap();
        assert_eq!(meta.current_version, 3);
        assert!(meta.versions["1"].is_live());
        assert!(!meta.versions["2"].is_live());
        assert!(!meta.versions["3"].is_live());
    }

    #[test]
    fn group_keeps_unknown_fields() {
        let body = serde_json::json!({
            "name": "admins",
            "id": "g-1",
            "policies": ["base", "admin"],
            "type": "internal"
        });
        let group: GroupResponse = serde_json::from_value(body).unwrap();
        assert_eq!(group.policies, vec!["base", "admin"]);
        assert_eq!(group.extra["type"], "internal");
    }

    #[test]
    fn entity_aliases_default_to_empty() {
        let body = serde_json::json!({ "id": "e-1", "name": "jane_doe" });
        let entity: EntityResponse = serde_json::from_value(body).unwrap();
        assert!(entity.aliases.is_empty());
    }
}
