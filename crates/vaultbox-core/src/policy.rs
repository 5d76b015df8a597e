//! ACL policies: CRUD plus export to / import from a directory of `.hcl`
//! files, one policy per file named after the policy.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::VaultError;
use crate::gateway::{VaultGateway, decode};
use crate::reconcile::{ReconcileTarget, TargetFuture};
use crate::schema::{Envelope, KvWriteResponse, PolicyResponse};

const POLICY_PATH: &str = "sys/policies/acl";

/// File extension used for exported policies.
pub const POLICY_EXTENSION: &str = "hcl";

/// Policies Vault ships with that cannot be deleted.
pub const BUILTIN_POLICIES: &[&str] = &["default", "root"];

/// ACL policy operations.
#[derive(Debug, Clone)]
pub struct Policies<'a> {
    vault: &'a VaultGateway,
}

impl<'a> Policies<'a> {
    pub fn new(vault: &'a VaultGateway) -> Self {
        Self { vault }
    }

    pub async fn list(&self) -> Result<Vec<String>, VaultError> {
        self.vault.list_or_empty(POLICY_PATH).await
    }

    /// Rule text of one policy.
    pub async fn read(&self, name: &str) -> Result<String, VaultError> {
        let policy: PolicyResponse = self.vault.get_data(&format!("{POLICY_PATH}/{name}")).await?;
        Ok(policy.policy)
    }

    /// Create or update a policy.
    ///
    /// Vault normally answers with an empty body. When it reports a version
    /// other than 1 the policy already existed and was overwritten.
    pub async fn add(&self, name: &str, rules: &str) -> Result<(), VaultError> {
        let target = format!("{POLICY_PATH}/{name}");
        info!(path = %target, "adding policy");
        let body = self
            .vault
            .post(&target, &serde_json::json!({ "policy": rules }))
            .await?;
        if !body.trim().is_empty() {
            let written: Envelope<KvWriteResponse> = decode(&target, &body)?;
            if written.data.version != 1 {
                warn!(name, "policy already existed, creating new version with given data");
            }
        }
        Ok(())
    }

    pub async fn delete(&self, name: &str) -> Result<(), VaultError> {
        let target = format!("{POLICY_PATH}/{name}");
        info!(path = %target, "deleting policy");
        self.vault.delete(&target).await
    }

    /// Write every policy to `{dir}/{name}.hcl` and return the written paths.
    pub async fn export(&self, dir: &Path) -> Result<Vec<PathBuf>, VaultError> {
        std::fs::create_dir_all(dir).map_err(|e| VaultError::io(dir, e))?;
        let mut written = Vec::new();
        for name in self.list().await? {
            let rules = self.read(&name).await?;
            let file = dir.join(format!("{name}.{POLICY_EXTENSION}"));
            std::fs::write(&file, rules).map_err(|e| VaultError::io(&file, e))?;
            written.push(file);
        }
        Ok(written)
    }
}

/// Load every `*.hcl` file in `dir` as `name -> rules`.
pub fn load_dir(dir: &Path) -> Result<BTreeMap<String, String>, VaultError> {
    let entries = std::fs::read_dir(dir).map_err(|e| VaultError::io(dir, e))?;
    let mut policies = BTreeMap::new();
    for entry in entries {
        let entry = entry.map_err(|e| VaultError::io(dir, e))?;
        let path = entry.path();
        if path.extension().is_none_or(|ext| ext != POLICY_EXTENSION) {
            continue;
        }
        let Some(name) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        let rules = std::fs::read_to_string(&path).map_err(|e| VaultError::io(&path, e))?;
        policies.insert(name, rules);
    }
    Ok(policies)
}

impl ReconcileTarget for Policies<'_> {
    type Payload = String;

    fn kind(&self) -> &'static str {
        "policy"
    }

    fn remote_names(&self) -> TargetFuture<'_, Vec<String>> {
        Box::pin(self.list())
    }

    fn upsert<'a>(&'a self, name: &'a str, payload: &'a String) -> TargetFuture<'a, ()> {
        Box::pin(self.add(name, payload))
    }

    fn remove<'a>(&'a self, name: &'a str) -> TargetFuture<'a, ()> {
        Box::pin(self.delete(name))
    }

    fn protected_names(&self) -> &[&'static str] {
        BUILTIN_POLICIES
    }
}
