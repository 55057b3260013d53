// ai
//! 🗄️📡 DynamoDB Backend: the table, the whole table, and nothing but the table.
//!
//! INT. AWS CONSOLE, NIGHT. A provisioned table hums at 5 RCUs. Somebody asked
//! for a full scan. The table sighs. It has been here before.
//!
//! 🧠 Knowledge graph:
//! - `Scan` with `Limit` + `ExclusiveStartKey` pages the table. Same start key = same page.
//! - `BatchWriteItem` caps out at 25 puts per request, so a pipeline batch is split into
//!   25-item chunks. Leftover `UnprocessedItems` are reported as throttling: the writer then
//!   replays the whole batch. Puts are idempotent, so nobody gets written twice in any way
//!   that matters.
//! - `DescribeTable` feeds the restore gate: missing / not ACTIVE / item count.
//! - Throttling = `ProvisionedThroughputExceededException`, `ThrottlingException`,
//!   `RequestLimitExceeded`. Everything else is a `Service` error.
//!
//! 🦆 The duck has read capacity of exactly one. It is being used right now.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::config::http::HttpResponse;
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::{AttributeValue as SdkValue, PutRequest, TableStatus, WriteRequest};
use tracing::{debug, trace};

use crate::backends::{BackendError, ScanPage, Table, TableState};
use crate::record::{AttributeValue, Record};

/// 📦 DynamoDB's hard ceiling on puts per `BatchWriteItem`.
const MAX_BATCH_WRITE_ITEMS: usize = 25;

const THROTTLING_CODES: &[&str] = &[
    "ProvisionedThroughputExceededException",
    "ThrottlingException",
    "RequestLimitExceeded",
];

/// 🗄️ One DynamoDB table, bound to one client (and therefore one region + credential set).
#[derive(Debug, Clone)]
pub struct DynamoTable {
    client: Client,
    table_name: String,
}

impl DynamoTable {
    pub fn new(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }
}

/// 🏷️ Sort an SDK failure into "slow down" or "actually broken".
fn classify<E>(what: &str, err: SdkError<E, HttpResponse>) -> BackendError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match err.code() {
        Some(code) if THROTTLING_CODES.contains(&code) => BackendError::Throttled(format!("{what}: {code}")),
        _ => BackendError::Service {
            message: format!("{what}: {}", DisplayErrorContext(&err)),
            source: Some(Box::new(err)),
        },
    }
}

fn to_sdk_value(value: &AttributeValue) -> SdkValue {
    match value {
        AttributeValue::S(s) => SdkValue::S(s.clone()),
        AttributeValue::N(n) => SdkValue::N(n.clone()),
        AttributeValue::B(b) => SdkValue::B(Blob::new(b.clone())),
        AttributeValue::Bool(b) => SdkValue::Bool(*b),
        AttributeValue::Null(n) => SdkValue::Null(*n),
        AttributeValue::L(items) => SdkValue::L(items.iter().map(to_sdk_value).collect()),
        AttributeValue::M(map) => SdkValue::M(map.iter().map(|(k, v)| (k.clone(), to_sdk_value(v))).collect()),
        AttributeValue::Ss(set) => SdkValue::Ss(set.clone()),
        AttributeValue::Ns(set) => SdkValue::Ns(set.clone()),
        AttributeValue::Bs(set) => SdkValue::Bs(set.iter().map(|b| Blob::new(b.clone())).collect()),
    }
}

fn from_sdk_value(value: &SdkValue) -> Result<AttributeValue, BackendError> {
    Ok(match value {
        SdkValue::S(s) => AttributeValue::S(s.clone()),
        SdkValue::N(n) => AttributeValue::N(n.clone()),
        SdkValue::B(b) => AttributeValue::B(b.as_ref().to_vec()),
        SdkValue::Bool(b) => AttributeValue::Bool(*b),
        SdkValue::Null(n) => AttributeValue::Null(*n),
        SdkValue::L(items) => AttributeValue::L(items.iter().map(from_sdk_value).collect::<Result<_, _>>()?),
        SdkValue::M(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), from_sdk_value(v)?)))
                .collect::<Result<_, BackendError>>()?,
        ),
        SdkValue::Ss(set) => AttributeValue::Ss(set.clone()),
        SdkValue::Ns(set) => AttributeValue::Ns(set.clone()),
        SdkValue::Bs(set) => AttributeValue::Bs(set.iter().map(|b| b.as_ref().to_vec()).collect()),
        unknown => {
            return Err(BackendError::Service {
                message: format!("DynamoDB returned an attribute type this build doesn't know: {unknown:?}"),
                source: None,
            });
        }
    })
}

pub(crate) fn record_to_item(record: &Record) -> HashMap<String, SdkValue> {
    record.iter().map(|(k, v)| (k.clone(), to_sdk_value(v))).collect()
}

pub(crate) fn item_to_record(item: &HashMap<String, SdkValue>) -> Result<Record, BackendError> {
    item.iter()
        .map(|(k, v)| Ok((k.clone(), from_sdk_value(v)?)))
        .collect()
}

#[async_trait]
impl Table for DynamoTable {
    fn name(&self) -> &str {
        &self.table_name
    }

    async fn scan_page(&self, limit: usize, start_key: Option<Record>) -> Result<ScanPage, BackendError> {
        let output = self
            .client
            .scan()
            .table_name(&self.table_name)
            .limit(i32::try_from(limit).unwrap_or(i32::MAX))
            .set_exclusive_start_key(start_key.as_ref().map(record_to_item))
            .send()
            .await
            .map_err(|e| classify(&format!("scan of {}", self.table_name), e))?;

        let records = output
            .items()
            .iter()
            .map(item_to_record)
            .collect::<Result<Vec<_>, _>>()?;
        let last_evaluated_key = output.last_evaluated_key().map(item_to_record).transpose()?;
        trace!("📄 scanned {} items from {}", records.len(), self.table_name);
        Ok(ScanPage {
            records,
            last_evaluated_key,
        })
    }

    async fn write_batch(&self, batch: &[Record]) -> Result<(), BackendError> {
        for chunk in batch.chunks(MAX_BATCH_WRITE_ITEMS) {
            let requests = chunk
                .iter()
                .map(|record| {
                    let put = PutRequest::builder()
                        .set_item(Some(record_to_item(record)))
                        .build()
                        .map_err(|e| BackendError::service("building a PutRequest", e))?;
                    Ok(WriteRequest::builder().put_request(put).build())
                })
                .collect::<Result<Vec<_>, BackendError>>()?;

            let output = self
                .client
                .batch_write_item()
                .request_items(&self.table_name, requests)
                .send()
                .await
                .map_err(|e| classify(&format!("batch write to {}", self.table_name), e))?;

            let unprocessed: usize = output
                .unprocessed_items()
                .map(|tables| tables.values().map(Vec::len).sum())
                .unwrap_or(0);
            if unprocessed > 0 {
                return Err(BackendError::Throttled(format!(
                    "batch write to {}: {unprocessed} unprocessed items",
                    self.table_name
                )));
            }
            debug!("📥 wrote {} items to {}", chunk.len(), self.table_name);
        }
        Ok(())
    }

    async fn describe(&self) -> Result<TableState, BackendError> {
        let output = match self.client.describe_table().table_name(&self.table_name).send().await {
            Ok(output) => output,
            Err(err) => {
                let missing = err
                    .as_service_error()
                    .is_some_and(|service_err| service_err.is_resource_not_found_exception());
                if missing {
                    return Ok(TableState::Missing);
                }
                return Err(classify(&format!("describe of {}", self.table_name), err));
            }
        };

        let Some(table) = output.table() else {
            return Ok(TableState::Missing);
        };
        match table.table_status() {
            Some(TableStatus::Active) => Ok(TableState::Active {
                item_count: table.item_count().unwrap_or(0),
            }),
            other => Ok(TableState::NotActive {
                status: other.map(|s| s.as_str().to_string()).unwrap_or_else(|| "UNKNOWN".to_string()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_records_cross_the_sdk_border_intact() -> Result<(), BackendError> {
        let nested = [("k".to_string(), AttributeValue::Bool(false))].into_iter().collect();
        let record = Record::new()
            .with("s", AttributeValue::S("x".into()))
            .with("n", AttributeValue::N("1.50".into()))
            .with("b", AttributeValue::B(vec![1, 2, 3]))
            .with("nul", AttributeValue::Null(true))
            .with("l", AttributeValue::L(vec![AttributeValue::N("1".into())]))
            .with("m", AttributeValue::M(nested))
            .with("ss", AttributeValue::Ss(vec!["a".into()]))
            .with("ns", AttributeValue::Ns(vec!["2".into()]))
            .with("bs", AttributeValue::Bs(vec![vec![9]]));

        let item = record_to_item(&record);
        assert_eq!(item.get("n"), Some(&SdkValue::N("1.50".into())), "numbers keep their exact text");
        assert_eq!(item_to_record(&item)?, record);
        Ok(())
    }
}
