// ai
//! 🪣🚀🌐 S3 Backend: the bucket where tables go to hibernate.
//!
//! This module wraps the AWS S3 SDK and exposes a [`BlobStore`]. Three verbs:
//! put a whole object, get a whole object, ask whether an object is there.
//! Archive objects are a few MiB each, so whole-object reads are fine.
//!
//! 🧠 Knowledge graph:
//! - Puts go in as `STANDARD_IA` with `AES256` server-side encryption. Archives are
//!   written once and read rarely; infrequent-access pricing is the right shelf.
//! - `NoSuchKey` on GET and `NotFound` on HEAD are answers, not failures.
//! - `SlowDown` is S3 for "throttled". Reported as `BackendError::Throttled` so the caller retries it.
//!
//! 🦆 The duck has no clearance for AWS. It watches from the edge of the VPC.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{ServerSideEncryption, StorageClass};
use tracing::{debug, info};

use crate::backends::{BackendError, BlobStore};

const THROTTLING_CODES: &[&str] = &["SlowDown", "ThrottlingException", "RequestLimitExceeded"];

/// 🪣 An S3 client bound to one region and one credential set.
#[derive(Debug, Clone)]
pub struct S3BlobStore {
    client: Client,
}

impl S3BlobStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn classify<E>(what: String, err: SdkError<E, HttpResponse>) -> BackendError
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

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), BackendError> {
        info!("📤 writing object s3://{}/{} ({} bytes)", bucket, key, body.len());
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .storage_class(StorageClass::StandardIa)
            .server_side_encryption(ServerSideEncryption::Aes256)
            .send()
            .await
            .map_err(|e| classify(format!("upload of s3://{bucket}/{key}"), e))?;
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let output = match self.client.get_object().bucket(bucket).key(key).send().await {
            Ok(output) => output,
            Err(err) => {
                if err.as_service_error().is_some_and(|e| e.is_no_such_key()) {
                    debug!("🕳️ s3://{}/{} does not exist", bucket, key);
                    return Ok(None);
                }
                return Err(classify(format!("download of s3://{bucket}/{key}"), err));
            }
        };
        let body = output
            .body
            .collect()
            .await
            .map_err(|e| BackendError::service(format!("reading body of s3://{bucket}/{key}"), e))?;
        Ok(Some(body.into_bytes().to_vec()))
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, BackendError> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => Err(classify(format!("HEAD of s3://{bucket}/{key}"), err)),
        }
    }
}
