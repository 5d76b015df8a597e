//! Users as Vault sees them: a userpass login, an identity entity and an
//! alias binding the two through the userpass mount accessor.

use rand::Rng;
use rand::distributions::{Alphanumeric, DistString};
use rand::rngs::OsRng;
use tracing::{debug, info, warn};

use crate::config::UserDefaults;
use crate::error::VaultError;
use crate::gateway::{VaultGateway, decode};
use crate::schema::{AuthMounts, EntityCreated, EntityResponse, Envelope};

const ENTITY_PATH: &str = "identity/entity";
const ENTITY_NAME_PATH: &str = "identity/entity/name";
const ENTITY_ALIAS_PATH: &str = "identity/entity-alias";

/// Bounds (inclusive) of a generated password's length.
pub const PASSWORD_LENGTH: std::ops::RangeInclusive<usize> = 16..=25;

/// Generate a random alphanumeric password from the operating system RNG.
pub fn generate_password() -> String {
    let len = OsRng.gen_range(PASSWORD_LENGTH);
    Alphanumeric.sample_string(&mut OsRng, len)
}

/// Login name for a person: `first.last`, lowercased.
pub fn username(first: &str, last: &str) -> String {
    format!("{}.{}", first.to_lowercase(), last.to_lowercase())
}

/// Entity name for a person: `First_Last`.
pub fn entity_name(first: &str, last: &str) -> String {
    format!("{first}_{last}")
}

/// An entity and the names of its aliases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySummary {
    pub name: String,
    pub aliases: Vec<String>,
}

/// Result of [`IdentityManager::list_users`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserListing {
    pub userpass_logins: Vec<String>,
    pub entities: Vec<EntitySummary>,
}

/// Compound user operations.
#[derive(Debug, Clone)]
pub struct IdentityManager<'a> {
    vault: &'a VaultGateway,
    defaults: &'a UserDefaults,
}

impl<'a> IdentityManager<'a> {
    pub fn new(vault: &'a VaultGateway, defaults: &'a UserDefaults) -> Self {
        Self { vault, defaults }
    }

    fn login_path(&self, username: &str) -> String {
        format!("auth/{}/users/{username}", self.defaults.mount)
    }

    /// Create login, entity and alias for a new user and return the
    /// plaintext password.
    ///
    /// A password is generated when none is given.
    pub async fn add_user(
        &self,
        first: &str,
        last: &str,
        password: Option<String>,
    ) -> Result<String, VaultError> {
        let username = username(first, last);
        let password = password.unwrap_or_else(generate_password);

        info!(username = %username, "creating userpass login");
        self.vault
            .post(
                &self.login_path(&username),
                &serde_json::json!({ "password": password }),
            )
            .await?;

        let entity_id = self.create_entity(&entity_name(first, last)).await?;
        let accessor = self.userpass_accessor().await?;

        info!(username = %username, entity_id = %entity_id, "binding alias");
        self.vault
            .post(
                ENTITY_ALIAS_PATH,
                &serde_json::json!({
                    "name": username,
                    "canonical_id": entity_id,
                    "mount_accessor": accessor,
                }),
            )
            .await?;
        Ok(password)
    }

    /// Create the entity and return its id. Vault answers with an empty body
    /// when the entity already exists; the id is then looked up by name.
    async fn create_entity(&self, name: &str) -> Result<String, VaultError> {
        info!(name, "creating entity");
        let body = self
            .vault
            .post(
                ENTITY_PATH,
                &serde_json::json!({
                    "name": name,
                    "metadata": { "organization": self.defaults.organization },
                    "policies": self.defaults.policies,
                }),
            )
            .await?;
        if body.trim().is_empty() {
            warn!(name, "empty response on entity creation, entity seems to exist already");
            debug!(name, "resolving entity id by name");
            return Ok(self.entity(name).await?.id);
        }
        let created: Envelope<EntityCreated> = decode(ENTITY_PATH, &body)?;
        Ok(created.data.id)
    }

    async fn userpass_accessor(&self) -> Result<String, VaultError> {
        let mounts: AuthMounts = self.vault.get_data("sys/auth").await?;
        let key = format!("{}/", self.defaults.mount);
        match mounts.get(&key) {
            Some(mount) => Ok(mount.accessor.clone()),
            None => {
                let mut available: Vec<String> = mounts.into_keys().collect();
                available.sort();
                Err(VaultError::NotFound {
                    kind: "auth mount",
                    name: key,
                    available,
                })
            }
        }
    }

    /// Read an entity by name.
    pub async fn entity(&self, name: &str) -> Result<EntityResponse, VaultError> {
        self.vault
            .get_data(&format!("{ENTITY_NAME_PATH}/{name}"))
            .await
    }

    pub async fn entity_names(&self) -> Result<Vec<String>, VaultError> {
        self.vault.list_or_empty(ENTITY_NAME_PATH).await
    }

    /// Delete a user's userpass logins, then the entity itself.
    ///
    /// An unknown entity yields [`VaultError::NotFound`] listing the entities
    /// that do exist.
    pub async fn delete_user(&self, name: &str) -> Result<(), VaultError> {
        let entity = match self.entity(name).await {
            Ok(entity) => entity,
            Err(e) if e.is_not_found() => {
                return Err(VaultError::NotFound {
                    kind: "user",
                    name: name.to_owned(),
                    available: self.entity_names().await?,
                });
            }
            Err(e) => return Err(e),
        };

        for alias in &entity.aliases {
            if !alias.mount_type.is_empty() && alias.mount_type != "userpass" {
                debug!(
                    alias = %alias.name,
                    mount_type = %alias.mount_type,
                    "leaving non-userpass alias"
                );
                continue;
            }
            info!(alias = %alias.name, "deleting userpass login");
            self.vault.delete(&self.login_path(&alias.name)).await?;
        }

        info!(name, "deleting entity");
        self.vault
            .delete(&format!("{ENTITY_NAME_PATH}/{name}"))
            .await
    }

    /// Userpass logins plus every entity with its alias names.
    pub async fn list_users(&self) -> Result<UserListing, VaultError> {
        let userpass_logins = self
            .vault
            .list_or_empty(&format!("auth/{}/users", self.defaults.mount))
            .await?;
        let mut entities = Vec::new();
        for name in self.entity_names().await? {
            let entity = self.entity(&name).await?;
            entities.push(EntitySummary {
                name: entity.name,
                aliases: entity.aliases.into_iter().map(|a| a.name).collect(),
            });
        }
        Ok(UserListing {
            userpass_logins,
            entities,
        })
    }
}
