pub mod config;
pub mod csv_import;
pub mod error;
pub mod gateway;
pub mod group;
pub mod html_export;
pub mod identity;
pub mod path;
pub mod policy;
pub mod reconcile;
pub mod schema;
pub mod secret;
pub mod totp;
pub mod wrap;

pub use config::{ConnectionSettings, ToolboxConfig};
pub use error::VaultError;
pub use gateway::VaultGateway;
