// ai
//! 🔌 Execution context: which table, which bucket, whose credentials.
//!
//! 🧠 Knowledge graph:
//! - Each side (table, archive) gets its own `SdkConfig`: its own region, and when
//!   `account_id` is set, credentials from STS for `arn:aws:iam::<account>:role/<role>`.
//!   Cross-account, cross-region exports are the whole point of having two sides.
//! - `ExportContext` = table in, bucket out. `RestoreContext` = bucket in, table out.
//!   Each binding is moved into exactly one worker.
//! - Tests skip all of this and build the contexts straight from in-memory backends.
//!
//! 🦆 The duck assumed a role once. It was "duck". Nobody noticed the difference.

use aws_config::sts::AssumeRoleProvider;
use aws_config::{BehaviorVersion, ConfigLoader, Region, SdkConfig};
use tracing::info;

use crate::app_config::{AppConfig, AwsSideConfig};
use crate::backends::dynamo::DynamoTable;
use crate::backends::s3::S3BlobStore;
use crate::backends::{BlobBackend, TableBackend};

const SESSION_NAME: &str = "dynadump";

/// 🎭 A role to borrow in another account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssumedRole {
    pub account_id: String,
    pub role_name: String,
}

impl AssumedRole {
    /// `None` when no account is configured: use whatever credentials the environment has.
    pub fn from_side(side: &AwsSideConfig) -> Option<Self> {
        let account_id = side.account_id.as_deref()?.trim();
        if account_id.is_empty() {
            return None;
        }
        Some(Self {
            account_id: account_id.to_string(),
            role_name: side.role_name.trim().to_string(),
        })
    }

    pub fn arn(&self) -> String {
        format!("arn:aws:iam::{}:role/{}", self.account_id, self.role_name)
    }
}

fn loader(side: &AwsSideConfig) -> ConfigLoader {
    let loader = aws_config::defaults(BehaviorVersion::latest());
    match &side.region {
        Some(region) => loader.region(Region::new(region.clone())),
        None => loader,
    }
}

/// 🔧 Build one side's AWS config: region first, then (maybe) a role on top.
async fn side_config(side: &AwsSideConfig) -> SdkConfig {
    let base = loader(side).load().await;

    let Some(role) = AssumedRole::from_side(side) else {
        return base;
    };
    info!("🎭 assuming role {}", role.arn());
    let provider = AssumeRoleProvider::builder(role.arn())
        .session_name(SESSION_NAME)
        .configure(&base)
        .build()
        .await;
    loader(side).credentials_provider(provider).load().await
}

async fn dynamo_table(config: &AppConfig) -> TableBackend {
    let sdk = side_config(&config.table.aws).await;
    let client = aws_sdk_dynamodb::Client::new(&sdk);
    TableBackend::Dynamo(DynamoTable::new(client, config.table.name.clone()))
}

async fn s3_store(config: &AppConfig) -> BlobBackend {
    let sdk = side_config(&config.archive.aws).await;
    BlobBackend::S3(S3BlobStore::new(aws_sdk_s3::Client::new(&sdk)))
}

/// 📤 Everything an export needs to touch.
#[derive(Debug)]
pub struct ExportContext {
    pub source: TableBackend,
    pub destination: BlobBackend,
}

impl ExportContext {
    pub fn new(source: TableBackend, destination: BlobBackend) -> Self {
        Self { source, destination }
    }

    /// 📡 Real AWS clients for both sides.
    pub async fn connect(config: &AppConfig) -> Self {
        Self::new(dynamo_table(config).await, s3_store(config).await)
    }
}

/// 📥 Everything a restore needs to touch.
#[derive(Debug)]
pub struct RestoreContext {
    pub source: BlobBackend,
    pub destination: TableBackend,
}

impl RestoreContext {
    pub fn new(source: BlobBackend, destination: TableBackend) -> Self {
        Self { source, destination }
    }

    pub async fn connect(config: &AppConfig) -> Self {
        Self::new(s3_store(config).await, dynamo_table(config).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_an_account_becomes_an_arn() {
        let side = AwsSideConfig {
            region: Some("eu-west-1".into()),
            account_id: Some("123456789012".into()),
            role_name: "Restorer".into(),
        };
        let role = AssumedRole::from_side(&side).expect("💀 an account was configured");
        assert_eq!(role.arn(), "arn:aws:iam::123456789012:role/Restorer");
    }

    #[test]
    fn the_one_where_no_account_means_no_role() {
        assert_eq!(AssumedRole::from_side(&AwsSideConfig::default()), None);
        let blank = AwsSideConfig {
            account_id: Some("   ".into()),
            ..AwsSideConfig::default()
        };
        assert_eq!(AssumedRole::from_side(&blank), None);
    }
}
