//! KV-v2 secret tree operations: list, read, add, delete and move, each in
//! a single-entry and a recursive flavor.
//!
//! None of the multi-step operations are transactional. A failure halfway
//! through `recursive_delete`, `mv` or `recursive_mv` leaves whatever was
//! already applied in place.

use tracing::{info, warn};

use crate::error::VaultError;
use crate::gateway::VaultGateway;
use crate::path;
use crate::schema::{KvMetadataResponse, KvReadResponse, KvWriteResponse, SecretData};

/// A path yielded while walking the tree, with its nesting depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretNode {
    pub path: String,
    pub depth: usize,
}

impl SecretNode {
    pub fn new(path: String) -> Self {
        let depth = path::depth(&path);
        Self { path, depth }
    }

    pub fn is_directory(&self) -> bool {
        path::is_directory(&self.path)
    }
}

/// Secret operations against one Vault server.
#[derive(Debug, Clone)]
pub struct SecretTree<'a> {
    vault: &'a VaultGateway,
}

fn metadata_path(engine: &str, path: &str) -> String {
    format!("{engine}/metadata/{path}")
}

fn data_path(engine: &str, path: &str) -> String {
    format!("{engine}/data/{path}")
}

impl<'a> SecretTree<'a> {
    pub fn new(vault: &'a VaultGateway) -> Self {
        Self { vault }
    }

    pub fn base_url(&self) -> &str {
        self.vault.base_url()
    }

    /// List the direct children of `path`. Sub-directories end with `/`.
    ///
    /// Fails with a 404 [`VaultError::Api`] when nothing exists below `path`.
    pub async fn list(&self, engine: &str, path: &str) -> Result<Vec<String>, VaultError> {
        let target = metadata_path(engine, path);
        if path::is_directory(&target) {
            self.vault.list(&target).await
        } else {
            self.vault.list(&format!("{target}/")).await
        }
    }

    /// Depth-first listing of every entry below `path`.
    ///
    /// Directory entries precede their descendants; siblings keep the order
    /// Vault returned them in. The walk uses an explicit stack and assumes the
    /// hierarchy is acyclic, as Vault's path hierarchy is.
    pub async fn recursive_list(
        &self,
        engine: &str,
        path: &str,
    ) -> Result<Vec<SecretNode>, VaultError> {
        let mut out = Vec::new();
        let mut stack: Vec<String> = self
            .list(engine, path)
            .await?
            .iter()
            .rev()
            .map(|child| path::join(path, child))
            .collect();

        while let Some(entry) = stack.pop() {
            if path::is_directory(&entry) {
                let children = self.list(engine, &entry).await?;
                stack.extend(children.iter().rev().map(|c| path::join(&entry, c)));
            }
            out.push(SecretNode::new(entry));
        }
        Ok(out)
    }

    /// Read the current version of a secret (`data.data`).
    pub async fn read(&self, engine: &str, path: &str) -> Result<SecretData, VaultError> {
        let read: KvReadResponse = self.vault.get_data(&data_path(engine, path)).await?;
        Ok(read.data.unwrap_or_default())
    }

    /// Read one specific version of a secret.
    pub async fn read_version(
        &self,
        engine: &str,
        path: &str,
        version: u64,
    ) -> Result<SecretData, VaultError> {
        let read: KvReadResponse = self
            .vault
            .get_data_with_query(&data_path(engine, path), &[("version", version.to_string())])
            .await?;
        Ok(read.data.unwrap_or_default())
    }

    /// Read the version metadata of a secret.
    pub async fn metadata(
        &self,
        engine: &str,
        path: &str,
    ) -> Result<KvMetadataResponse, VaultError> {
        self.vault.get_data(&metadata_path(engine, path)).await
    }

    /// Write `data` as a new version of the secret at `path` and return the
    /// version number Vault assigned.
    pub async fn add(
        &self,
        engine: &str,
        path: &str,
        data: &SecretData,
    ) -> Result<u64, VaultError> {
        let target = data_path(engine, path);
        info!(path = %target, "adding secret");
        let written: KvWriteResponse = self
            .vault
            .post_data(&target, &serde_json::json!({ "data": data }))
            .await?;
        if written.version != 1 {
            info!(
                path = %target,
                version = written.version,
                "secret already existed, created new version with given data"
            );
        }
        Ok(written.version)
    }

    /// Permanently delete a secret with all of its versions.
    pub async fn delete(&self, engine: &str, path: &str) -> Result<(), VaultError> {
        let target = metadata_path(engine, path);
        info!(path = %target, "deleting secret");
        self.vault.delete(&target).await
    }

    /// Delete every entry yielded by [`recursive_list`](Self::recursive_list)
    /// in listing order. Directory markers are no-op deletes on Vault's side.
    pub async fn recursive_delete(&self, engine: &str, path: &str) -> Result<usize, VaultError> {
        let nodes = self.recursive_list(engine, path).await?;
        for node in &nodes {
            self.delete(engine, &node.path).await?;
        }
        Ok(nodes.len())
    }

    /// Move a secret with its version history.
    ///
    /// Every live version of `from` is re-added at `to` in ascending version
    /// order, then `from` is deleted. Version numbers at `to` are assigned
    /// fresh by Vault; destroyed or soft-deleted versions are skipped.
    ///
    /// Fails with [`VaultError::NotFound`] and leaves `from` untouched when it
    /// has no live version to carry over.
    pub async fn mv(&self, engine: &str, from: &str, to: &str) -> Result<usize, VaultError> {
        let meta = self.metadata(engine, from).await?;
        let mut versions: Vec<(u64, bool)> = Vec::with_capacity(meta.versions.len());
        for (key, version) in &meta.versions {
            let number = key.parse::<u64>().map_err(|_| {
                VaultError::InvalidInput(format!("non-numeric version '{key}' at {from}"))
            })?;
            versions.push((number, version.is_live()));
        }
        versions.sort_unstable_by_key(|(number, _)| *number);
        if !versions.iter().any(|(_, live)| *live) {
            return Err(VaultError::NotFound {
                kind: "live secret version",
                name: from.to_owned(),
                available: Vec::new(),
            });
        }

        info!(from, to, versions = versions.len(), "moving secret");
        let mut replayed = 0;
        for (number, live) in versions {
            if !live {
                warn!(path = from, version = number, "skipping deleted version");
                continue;
            }
            let data = self.read_version(engine, from, number).await?;
            self.add(engine, to, &data).await?;
            replayed += 1;
        }
        self.delete(engine, from).await?;
        Ok(replayed)
    }

    /// Move every leaf below `from` to the same relative path below `to`.
    /// Directories are implicit and not moved themselves.
    pub async fn recursive_mv(
        &self,
        engine: &str,
        from: &str,
        to: &str,
    ) -> Result<usize, VaultError> {
        let base = path::join(from, "");
        let nodes = self.recursive_list(engine, from).await?;
        let mut moved = 0;
        for node in nodes.iter().filter(|n| !n.is_directory()) {
            let relative = node.path.strip_prefix(&base).ok_or_else(|| {
                VaultError::InvalidInput(format!("{} is not below {base}", node.path))
            })?;
            let dest = path::join(to, relative);
            self.mv(engine, &node.path, &dest).await?;
            moved += 1;
        }
        Ok(moved)
    }
}
