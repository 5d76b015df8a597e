//! Import of password-manager CSV exports (KeePass layout) into KV-v2.
//!
//! Every row needs a `Group` and a `Title` column. The group path shared by
//! all rows is stripped, and each row lands at
//! `{vaultpath}/{group}/{title}` with its remaining non-empty columns as the
//! secret's key/value pairs.

use std::io::Read;
use std::path::Path;

use tracing::{debug, info};

use crate::error::VaultError;
use crate::path::normalize_import_path;
use crate::schema::SecretData;
use crate::secret::SecretTree;

pub const GROUP_COLUMN: &str = "Group";
pub const TITLE_COLUMN: &str = "Title";

/// One secret to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedSecret {
    pub path: String,
    pub data: SecretData,
}

/// Secrets derived from a CSV file, ready to be written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportPlan {
    /// Leading group path removed from every row.
    pub common_prefix: String,
    pub secrets: Vec<PlannedSecret>,
}

struct Row {
    group: String,
    title: String,
    fields: SecretData,
}

/// Longest leading run of whole path segments shared by every group.
///
/// The character-wise common prefix is cut back to its last `/`, so
/// `Infra/Prod` and `Infra/Prodx` share `Infra/` rather than `Infra/Prod`.
/// A single group is therefore only stripped up to its last separator:
/// one row in `Infra/Prod` keeps `Prod` instead of landing directly under
/// the import path.
pub fn common_leading_path<'a, I>(groups: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut prefix: Option<&str> = None;
    for group in groups {
        prefix = Some(match prefix {
            None => group,
            Some(p) => {
                let len = p
                    .char_indices()
                    .zip(group.chars())
                    .take_while(|((_, a), b)| a == b)
                    .last()
                    .map(|((i, c), _)| i + c.len_utf8())
                    .unwrap_or(0);
                &p[..len]
            }
        });
    }
    let prefix = prefix.unwrap_or_default();
    match prefix.rfind('/') {
        Some(idx) => prefix[..=idx].to_owned(),
        None => String::new(),
    }
}

fn read_rows<R: Read>(reader: R) -> Result<Vec<Row>, VaultError> {
    let mut rdr = csv::ReaderBuilder::new().from_reader(reader);
    let headers = rdr.headers()?.clone();
    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| VaultError::InvalidInput(format!("CSV has no '{name}' column")))
    };
    let group_idx = position(GROUP_COLUMN)?;
    let title_idx = position(TITLE_COLUMN)?;

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        debug!(?record, "csv row");
        let mut fields = SecretData::new();
        for (idx, (header, value)) in headers.iter().zip(record.iter()).enumerate() {
            if idx == group_idx || idx == title_idx || value.is_empty() {
                continue;
            }
            fields.insert(header.to_owned(), serde_json::Value::String(value.to_owned()));
        }
        rows.push(Row {
            group: record.get(group_idx).unwrap_or_default().to_owned(),
            title: record.get(title_idx).unwrap_or_default().to_owned(),
            fields,
        });
    }
    Ok(rows)
}

/// Build the import plan for CSV data read from `reader`.
pub fn plan<R: Read>(reader: R, vaultpath: &str) -> Result<ImportPlan, VaultError> {
    let rows = read_rows(reader)?;
    let common_prefix = common_leading_path(rows.iter().map(|r| r.group.as_str()));
    if !common_prefix.is_empty() {
        info!(prefix = %common_prefix, "common leading path found and will be ignored");
    }

    let secrets = rows
        .into_iter()
        .map(|row| {
            let group = row
                .group
                .strip_prefix(common_prefix.as_str())
                .unwrap_or(&row.group);
            PlannedSecret {
                path: normalize_import_path(&format!("{vaultpath}/{group}/{}", row.title)),
                data: row.fields,
            }
        })
        .collect();
    Ok(ImportPlan {
        common_prefix,
        secrets,
    })
}

/// Build the import plan for a CSV file on disk.
pub fn plan_file(file: &Path, vaultpath: &str) -> Result<ImportPlan, VaultError> {
    info!(file = %file.display(), "reading CSV file");
    let handle = std::fs::File::open(file).map_err(|e| VaultError::io(file, e))?;
    plan(handle, vaultpath)
}

/// Write every planned secret. With `dryrun` nothing is sent to Vault and
/// each write is only logged.
pub async fn apply(
    tree: &SecretTree<'_>,
    engine: &str,
    plan: &ImportPlan,
    dryrun: bool,
) -> Result<usize, VaultError> {
    for secret in &plan.secrets {
        if dryrun {
            info!(path = %secret.path, keys = secret.data.len(), "dry run, not writing");
            continue;
        }
        tree.add(engine, &secret.path, &secret.data).await?;
    }
    Ok(plan.secrets.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::VaultGateway;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEEPASS_CSV: &str = "\
\"Group\",\"Title\",\"Username\",\"Password\",\"URL\",\"Notes\"
\"Infra/Prod\",\"Database\",\"dba\",\"pw1\",\"db.prod\",\"\"
\"Infra/Staging\",\"Web Admin\",\"admin\",\"pw2\",\"\",\"rotate monthly\"
";

    #[test]
    fn common_path_from_group_values() {
        assert_eq!(
            common_leading_path(["Infra/Prod", "Infra/Staging"]),
            "Infra/"
        );
        assert_eq!(common_leading_path(["Infra/Prod", "Infra/Prodx"]), "Infra/");
        assert_eq!(common_leading_path(["Infra/Prod", "Office"]), "");
        assert_eq!(common_leading_path(Vec::<&str>::new()), "");
        assert_eq!(common_leading_path(["Infra/Prod"]), "Infra/");
        assert_eq!(common_leading_path(["Infra"]), "");
    }

    #[test]
    fn plan_strips_common_path_and_empty_fields() {
        let plan = plan(KEEPASS_CSV.as_bytes(), "imported").unwrap();
        assert_eq!(plan.common_prefix, "Infra/");
        assert_eq!(plan.secrets.len(), 2);

        let db = &plan.secrets[0];
        assert_eq!(db.path, "imported/prod/database");
        assert_eq!(db.data["Username"], "dba");
        assert_eq!(db.data["URL"], "db.prod");
        assert!(!db.data.contains_key("Notes"));
        assert!(!db.data.contains_key("Group"));
        assert!(!db.data.contains_key("Title"));

        let web = &plan.secrets[1];
        assert_eq!(web.path, "imported/staging/web_admin");
        assert!(!web.data.contains_key("URL"));
        assert_eq!(web.data["Notes"], "rotate monthly");
    }

    #[test]
    fn missing_title_column_is_rejected() {
        let err = plan("Group,Username\nInfra,dba\n".as_bytes(), "imported").unwrap_err();
        assert!(matches!(err, VaultError::InvalidInput(ref m) if m.contains("Title")));
    }

    #[test]
    fn plan_file_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("export.csv");
        std::fs::write(&file, KEEPASS_CSV).unwrap();
        let plan = plan_file(&file, "/team//imported/").unwrap();
        assert_eq!(plan.secrets[0].path, "/team/imported/prod/database");
    }

    #[tokio::test]
    async fn dryrun_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let gw = VaultGateway::with_base_url(server.uri(), "root");
        let plan = plan(KEEPASS_CSV.as_bytes(), "imported").unwrap();
        let written = apply(&SecretTree::new(&gw), "kv", &plan, true).await.unwrap();
        assert_eq!(written, 2);
    }

    #[tokio::test]
    async fn apply_writes_each_secret() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/kv/data/imported/prod/database"))
            .and(body_json(serde_json::json!({
                "data": { "Password": "pw1", "URL": "db.prod", "Username": "dba" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "version": 1 }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/kv/data/imported/staging/web_admin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "version": 1 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let gw = VaultGateway::with_base_url(server.uri(), "root");
        let plan = plan(KEEPASS_CSV.as_bytes(), "imported").unwrap();
        apply(&SecretTree::new(&gw), "kv", &plan, false).await.unwrap();
    }
}
