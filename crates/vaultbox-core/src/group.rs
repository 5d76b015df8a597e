//! Identity groups: CRUD plus YAML export/import.
//!
//! The YAML document maps each group name to its ordered policy list:
//!
//! ```yaml
//! admins: [base, admin]
//! dev: [base]
//! ```

use std::collections::BTreeMap;

use tracing::info;

use crate::error::VaultError;
use crate::gateway::VaultGateway;
use crate::reconcile::{ReconcileTarget, TargetFuture};
use crate::schema::GroupResponse;

const GROUP_NAME_PATH: &str = "identity/group/name";

/// Desired-state mapping of group name to policies.
pub type GroupPolicies = BTreeMap<String, Vec<String>>;

/// Identity group operations.
#[derive(Debug, Clone)]
pub struct Groups<'a> {
    vault: &'a VaultGateway,
}

impl<'a> Groups<'a> {
    pub fn new(vault: &'a VaultGateway) -> Self {
        Self { vault }
    }

    /// Names of every group. An empty listing is not an error.
    pub async fn list(&self) -> Result<Vec<String>, VaultError> {
        self.vault.list_or_empty(GROUP_NAME_PATH).await
    }

    pub async fn read(&self, name: &str) -> Result<GroupResponse, VaultError> {
        self.vault
            .get_data(&format!("{GROUP_NAME_PATH}/{name}"))
            .await
    }

    /// Create or update a group with an arbitrary JSON body.
    pub async fn add(&self, name: &str, data: &serde_json::Value) -> Result<(), VaultError> {
        let target = format!("{GROUP_NAME_PATH}/{name}");
        info!(path = %target, "adding group");
        self.vault.post(&target, data).await?;
        Ok(())
    }

    /// Create or update a group, replacing its policy set.
    pub async fn set_policies(&self, name: &str, policies: &[String]) -> Result<(), VaultError> {
        self.add(name, &serde_json::json!({ "policies": policies }))
            .await
    }

    pub async fn delete(&self, name: &str) -> Result<(), VaultError> {
        let target = format!("{GROUP_NAME_PATH}/{name}");
        info!(path = %target, "deleting group");
        self.vault.delete(&target).await
    }

    /// Read every group's policy list.
    pub async fn export(&self) -> Result<GroupPolicies, VaultError> {
        let mut out = GroupPolicies::new();
        for name in self.list().await? {
            let group = self.read(&name).await?;
            out.insert(name, group.policies);
        }
        Ok(out)
    }
}

/// Render a group/policy mapping as YAML.
pub fn to_yaml(groups: &GroupPolicies) -> Result<String, VaultError> {
    Ok(serde_yaml::to_string(groups)?)
}

/// Parse a group/policy mapping from YAML. A group with no value gets an
/// empty policy list.
pub fn from_yaml(contents: &str) -> Result<GroupPolicies, VaultError> {
    if contents.trim().is_empty() {
        return Ok(GroupPolicies::new());
    }
    let raw: BTreeMap<String, Option<Vec<String>>> = serde_yaml::from_str(contents)?;
    Ok(raw
        .into_iter()
        .map(|(name, policies)| (name, policies.unwrap_or_default()))
        .collect())
}

impl ReconcileTarget for Groups<'_> {
    type Payload = Vec<String>;

    fn kind(&self) -> &'static str {
        "group"
    }

    fn remote_names(&self) -> TargetFuture<'_, Vec<String>> {
        Box::pin(self.list())
    }

    fn upsert<'a>(&'a self, name: &'a str, payload: &'a Vec<String>) -> TargetFuture<'a, ()> {
        Box::pin(self.set_policies(name, payload))
    }

    fn remove<'a>(&'a self, name: &'a str) -> TargetFuture<'a, ()> {
        Box::pin(self.delete(name))
    }
}
