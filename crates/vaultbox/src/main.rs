mod ui;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use tracing::debug;
use vaultbox_core::config::{VAULT_ADDR_ENV, VAULT_TOKEN_ENV};
use vaultbox_core::group::{self, Groups};
use vaultbox_core::identity::IdentityManager;
use vaultbox_core::policy::{self, Policies};
use vaultbox_core::reconcile::reconcile;
use vaultbox_core::schema::SecretData;
use vaultbox_core::secret::SecretTree;
use vaultbox_core::totp::Totp;
use vaultbox_core::{csv_import, html_export, wrap};
use vaultbox_core::{ToolboxConfig, VaultError, VaultGateway};

#[derive(Debug, Parser)]
#[command(name = "vaultbox", version, about = "Convenience commands for HashiCorp Vault")]
struct Cli {
    /// Vault address (otherwise VAULT_ADDR, then `url` in config.yaml).
    #[arg(long, global = true)]
    url: Option<String>,

    /// Vault token (otherwise VAULT_TOKEN, then `token` in config.yaml).
    #[arg(long, global = true)]
    token: Option<String>,

    /// Path to the config file (default: ./config.yaml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase output verbosity.
    #[arg(short = 'v', long = "verbosity", global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// No output except errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Append log output to this file instead of stderr.
    #[arg(long, global = true)]
    logfile: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

/// Commands whose first positional is an optional secret engine take their
/// positionals as one list; the engine falls back to config.yaml when the
/// list is one short.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// Add a secret from a JSON object.
    SecretAdd {
        #[arg(value_name = "[ENGINE] PATH DATA", num_args = 2..=3, required = true)]
        args: Vec<String>,
    },
    /// Permanently delete a secret with all its versions.
    SecretDel {
        #[arg(value_name = "[ENGINE] PATH", num_args = 1..=2, required = true)]
        args: Vec<String>,

        /// Delete everything below PATH.
        #[arg(short, long)]
        recursive: bool,
    },
    /// List secrets below a path.
    SecretList {
        #[arg(value_name = "[ENGINE] PATH", num_args = 1..=2, required = true)]
        args: Vec<String>,

        /// Walk the whole tree below PATH.
        #[arg(short, long)]
        recursive: bool,
    },
    /// Print the current version of a secret as JSON.
    SecretRead {
        #[arg(value_name = "[ENGINE] PATH", num_args = 1..=2, required = true)]
        args: Vec<String>,
    },
    /// Move a secret, replaying its version history at the destination.
    SecretMv {
        #[arg(value_name = "[ENGINE] FROM TO", num_args = 2..=3, required = true)]
        args: Vec<String>,

        /// Move every secret below FROM.
        #[arg(short, long)]
        recursive: bool,
    },
    /// Create a user: userpass login, entity and alias.
    UserAdd {
        firstname: String,
        lastname: String,
    },
    /// Delete a user's logins and entity.
    UserDel {
        /// Entity name (e.g. Jane_Doe).
        user: String,
    },
    /// List userpass logins and entities.
    UserList,
    /// Let Vault generate a new TOTP key.
    TotpAdd {
        #[arg(value_name = "[ENGINE] NAME ISSUER ACCOUNT", num_args = 3..=4, required = true)]
        args: Vec<String>,
    },
    /// Delete a TOTP key.
    TotpDel {
        #[arg(value_name = "[ENGINE] NAME", num_args = 1..=2, required = true)]
        args: Vec<String>,
    },
    /// List TOTP keys.
    TotpList { engine: Option<String> },
    /// Print the current code of a TOTP key.
    TotpRead {
        #[arg(value_name = "[ENGINE] NAME", num_args = 1..=2, required = true)]
        args: Vec<String>,
    },
    /// Import a TOTP key from an otpauth:// URL.
    TotpImport {
        #[arg(value_name = "[ENGINE] NAME URL", num_args = 2..=3, required = true)]
        args: Vec<String>,
    },
    /// Create or update a group from a JSON file.
    GroupAdd {
        group_name: String,
        /// File containing the group data as JSON.
        datafile: PathBuf,
    },
    /// Delete a group.
    GroupDel { group_name: String },
    /// List groups.
    GroupList,
    /// Print a group as JSON.
    GroupRead { group_name: String },
    /// Write every group's policy list as YAML.
    GroupYamlExport {
        /// Output file (default: stdout).
        file: Option<PathBuf>,
    },
    /// Apply a YAML group/policy mapping, deleting unlisted groups after confirmation.
    GroupYamlImport { file: PathBuf },
    /// Create or update a policy.
    PolicyAdd {
        policy_name: String,
        /// Policy rules as text.
        data: String,
    },
    /// Delete a policy.
    PolicyDel { policy_name: String },
    /// List policies.
    PolicyList,
    /// Print a policy's rules.
    PolicyRead { policy_name: String },
    /// Write every policy to DIR/<name>.hcl.
    PolicyExport { dir: PathBuf },
    /// Apply DIR/*.hcl, deleting unlisted policies after confirmation.
    PolicyImport { dir: PathBuf },
    /// Unwrap a wrapping token.
    Unwrap {
        /// Wrapping token (default: the token used to authenticate).
        token: Option<String>,
    },
    /// Render a secret tree as nested HTML lists linking into the Vault UI.
    Export {
        #[arg(value_name = "[ENGINE] PATH", num_args = 1..=2, required = true)]
        args: Vec<String>,
    },
    /// Import a KeePass CSV export into a secret engine.
    #[command(name = "import_from_csv")]
    ImportFromCsv {
        #[arg(value_name = "[ENGINE] VAULTPATH FILE", num_args = 2..=3, required = true)]
        args: Vec<String>,

        /// Only show what would be written.
        #[arg(short, long)]
        dryrun: bool,
    },
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
struct LogSettings {
    level: &'static str,
    logfile: Option<PathBuf>,
}

impl LogSettings {
    fn from_cli(cli: &Cli) -> Self {
        let level = if cli.verbose {
            "debug"
        } else if cli.quiet {
            "error"
        } else {
            "info"
        };
        Self {
            level,
            logfile: cli.logfile.clone(),
        }
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the level flags.
fn init_tracing(settings: &LogSettings) -> Result<(), VaultError> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(settings.level));
    match &settings.logfile {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| VaultError::Io {
                    path: path.clone(),
                    source: e,
                })?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Positional helpers
// ---------------------------------------------------------------------------

/// Split an optional leading engine off `args`, which must hold exactly `N`
/// further values.
fn engine_args<const N: usize>(
    mut args: Vec<String>,
    default: Option<&str>,
    setting: &str,
) -> Result<(String, [String; N]), VaultError> {
    let engine = if args.len() > N {
        args.remove(0)
    } else {
        default
            .map(str::to_owned)
            .ok_or_else(|| {
                VaultError::Config(format!(
                    "no engine given and `{setting}` is not set in config.yaml"
                ))
            })?
    };
    let rest: [String; N] = args.try_into().map_err(|args: Vec<String>| {
        VaultError::InvalidInput(format!(
            "expected {N} arguments after the engine, got {}",
            args.len()
        ))
    })?;
    Ok((engine, rest))
}

fn read_file(path: &Path) -> Result<String, VaultError> {
    std::fs::read_to_string(path).map_err(|e| VaultError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

fn parse_json<T: serde::de::DeserializeOwned>(context: &str, text: &str) -> Result<T, VaultError> {
    serde_json::from_str(text)
        .map_err(|e| VaultError::InvalidInput(format!("{context} is not valid JSON: {e}")))
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(&LogSettings::from_cli(&cli)) {
        ui::error(&format!("vaultbox: {e}"));
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

/// The one place an error turns into terminal output.
fn report(err: &VaultError) {
    debug!(error = ?err, "command failed");
    ui::error(&format!("vaultbox: {err}"));
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        eprintln!("  caused by: {cause}");
        source = cause.source();
    }
    if let VaultError::NotFound {
        kind, available, ..
    } = err
    {
        if !available.is_empty() {
            eprintln!("\nplease choose one of the following {kind}s:\n");
            for name in available {
                eprintln!("  {name}");
            }
        }
    }
}

async fn run(cli: Cli) -> Result<(), VaultError> {
    let config = ToolboxConfig::load(cli.config.as_deref())?;

    // `unwrap TOKEN` authenticates with the wrapping token itself, so no
    // operator token is needed for it.
    let positional_token = match &cli.cmd {
        Cmd::Unwrap { token } => token.as_deref(),
        _ => None,
    };
    let env_url = std::env::var(VAULT_ADDR_ENV).ok();
    let env_token = std::env::var(VAULT_TOKEN_ENV).ok();
    let settings = config.connection(
        cli.url.as_deref(),
        cli.token.as_deref().or(positional_token),
        env_url.as_deref(),
        env_token.as_deref(),
    )?;
    debug!(?settings, "resolved connection");
    let vault = VaultGateway::new(&settings)?;

    dispatch(cli.cmd, &vault, &config).await
}

async fn dispatch(
    cmd: Cmd,
    vault: &VaultGateway,
    config: &ToolboxConfig,
) -> Result<(), VaultError> {
    let secret_engine = config.secret.engine.as_deref();
    let totp_engine = config.totp.engine.as_deref();
    let tree = SecretTree::new(vault);
    let totp = Totp::new(vault);
    let groups = Groups::new(vault);
    let policies = Policies::new(vault);
    let identity = IdentityManager::new(vault, &config.user);

    match cmd {
        Cmd::SecretAdd { args } => {
            let (engine, [path, data]) = engine_args::<2>(args, secret_engine, "secret.engine")?;
            let data: SecretData = parse_json("secret data", &data)?;
            let version = tree.add(&engine, &path, &data).await?;
            ui::success(&format!("Wrote {engine}/{path} (version {version})"));
        }
        Cmd::SecretDel { args, recursive } => {
            let (engine, [path]) = engine_args::<1>(args, secret_engine, "secret.engine")?;
            if recursive {
                let pb = ui::spinner(&format!("Deleting everything below {path}"));
                let deleted = tree.recursive_delete(&engine, &path).await;
                pb.finish_and_clear();
                ui::success(&format!("Deleted {} entries", deleted?));
            } else {
                tree.delete(&engine, &path).await?;
                ui::success(&format!("Deleted {engine}/{path}"));
            }
        }
        Cmd::SecretList { args, recursive } => {
            let (engine, [path]) = engine_args::<1>(args, secret_engine, "secret.engine")?;
            if recursive {
                for node in tree.recursive_list(&engine, &path).await? {
                    ui::tree_entry(&node.path, node.depth);
                }
            } else {
                for name in tree.list(&engine, &path).await? {
                    println!("{name}");
                }
            }
        }
        Cmd::SecretRead { args } => {
            let (engine, [path]) = engine_args::<1>(args, secret_engine, "secret.engine")?;
            let data = tree.read(&engine, &path).await?;
            ui::print_json(&serde_json::Value::Object(data));
        }
        Cmd::SecretMv { args, recursive } => {
            let (engine, [from, to]) = engine_args::<2>(args, secret_engine, "secret.engine")?;
            if recursive {
                let pb = ui::spinner(&format!("Moving everything below {from} to {to}"));
                let moved = tree.recursive_mv(&engine, &from, &to).await;
                pb.finish_and_clear();
                ui::success(&format!("Moved {} secrets", moved?));
            } else {
                let versions = tree.mv(&engine, &from, &to).await?;
                ui::success(&format!("Moved {from} to {to} ({versions} versions)"));
            }
        }
        Cmd::UserAdd {
            firstname,
            lastname,
        } => {
            let password = identity.add_user(&firstname, &lastname, None).await?;
            let token = wrap::wrap(
                vault,
                &serde_json::json!({ "password": password }),
                wrap::DEFAULT_WRAP_TTL_SECS,
            )
            .await?;
            ui::success(&format!(
                "Created user {firstname} {lastname}; the password can be unwrapped once within {}s:",
                wrap::DEFAULT_WRAP_TTL_SECS
            ));
            println!("{}", wrap::unwrap_command(vault.base_url(), &token));
        }
        Cmd::UserDel { user } => {
            identity.delete_user(&user).await?;
            ui::success(&format!("Deleted user {user}"));
        }
        Cmd::UserList => {
            ui::user_listing(&identity.list_users().await?);
        }
        Cmd::TotpAdd { args } => {
            let (engine, [name, issuer, account]) =
                engine_args::<3>(args, totp_engine, "totp.engine")?;
            totp.add(&engine, &name, &issuer, &account).await?;
            ui::success(&format!("Added TOTP key {name}"));
        }
        Cmd::TotpDel { args } => {
            let (engine, [name]) = engine_args::<1>(args, totp_engine, "totp.engine")?;
            totp.delete(&engine, &name).await?;
            ui::success(&format!("Deleted TOTP key {name}"));
        }
        Cmd::TotpList { engine } => {
            let args = engine.into_iter().collect();
            let (engine, []) = engine_args::<0>(args, totp_engine, "totp.engine")?;
            ui::name_list("TOTP keys", &totp.list(&engine).await?);
        }
        Cmd::TotpRead { args } => {
            let (engine, [name]) = engine_args::<1>(args, totp_engine, "totp.engine")?;
            println!("{}", totp.read(&engine, &name).await?);
        }
        Cmd::TotpImport { args } => {
            let (engine, [name, url]) = engine_args::<2>(args, totp_engine, "totp.engine")?;
            totp.import_url(&engine, &name, &url).await?;
            ui::success(&format!("Imported TOTP key {name}"));
        }
        Cmd::GroupAdd {
            group_name,
            datafile,
        } => {
            let data: serde_json::Value =
                parse_json(&datafile.display().to_string(), &read_file(&datafile)?)?;
            groups.add(&group_name, &data).await?;
            ui::success(&format!("Wrote group {group_name}"));
        }
        Cmd::GroupDel { group_name } => {
            groups.delete(&group_name).await?;
            ui::success(&format!("Deleted group {group_name}"));
        }
        Cmd::GroupList => {
            for name in groups.list().await? {
                println!("{name}");
            }
        }
        Cmd::GroupRead { group_name } => {
            let group = groups.read(&group_name).await?;
            let value = serde_json::to_value(&group).map_err(|source| VaultError::Decode {
                context: format!("group {group_name}"),
                source,
            })?;
            ui::print_json(&value);
        }
        Cmd::GroupYamlExport { file } => {
            let yaml = group::to_yaml(&groups.export().await?)?;
            match file {
                Some(path) => {
                    std::fs::write(&path, yaml).map_err(|e| VaultError::Io {
                        path: path.clone(),
                        source: e,
                    })?;
                    ui::success(&format!("Wrote {}", path.display()));
                }
                None => print!("{yaml}"),
            }
        }
        Cmd::GroupYamlImport { file } => {
            let desired = group::from_yaml(&read_file(&file)?)?;
            let outcome = reconcile(&groups, &desired, &mut ui::StdinPrompt).await?;
            ui::reconcile_outcome("group", &outcome);
        }
        Cmd::PolicyAdd { policy_name, data } => {
            policies.add(&policy_name, &data).await?;
            ui::success(&format!("Wrote policy {policy_name}"));
        }
        Cmd::PolicyDel { policy_name } => {
            policies.delete(&policy_name).await?;
            ui::success(&format!("Deleted policy {policy_name}"));
        }
        Cmd::PolicyList => {
            for name in policies.list().await? {
                println!("{name}");
            }
        }
        Cmd::PolicyRead { policy_name } => {
            println!("{}", policies.read(&policy_name).await?);
        }
        Cmd::PolicyExport { dir } => {
            let written = policies.export(&dir).await?;
            ui::success(&format!("Wrote {} policies to {}", written.len(), dir.display()));
        }
        Cmd::PolicyImport { dir } => {
            let desired = policy::load_dir(&dir)?;
            let outcome = reconcile(&policies, &desired, &mut ui::StdinPrompt).await?;
            ui::reconcile_outcome("policy", &outcome);
        }
        Cmd::Unwrap { token } => {
            let data = wrap::unwrap(vault, token.as_deref()).await?;
            ui::print_json(&data);
        }
        Cmd::Export { args } => {
            let (engine, [path]) = engine_args::<1>(args, secret_engine, "secret.engine")?;
            let pb = ui::spinner(&format!("Walking {engine}/{path}"));
            let html = html_export::export(&tree, &engine, &path).await;
            pb.finish_and_clear();
            print!("{}", html?);
        }
        Cmd::ImportFromCsv { args, dryrun } => {
            let (engine, [vaultpath, file]) =
                engine_args::<2>(args, secret_engine, "secret.engine")?;
            let plan = csv_import::plan_file(Path::new(&file), &vaultpath)?;
            let written = csv_import::apply(&tree, &engine, &plan, dryrun).await?;
            if dryrun {
                ui::warn(&format!("Dry run: {written} secrets would be written"));
            } else {
                ui::success(&format!("Imported {written} secrets into {engine}/{vaultpath}"));
            }
        }
    }
    Ok(())
}
