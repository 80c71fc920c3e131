use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream as S3Body;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use super::store::{ByteStream, ObjectHead, ObjectStore};
use crate::delivery::ByteRange;
use crate::error::StorageError;

/// Size of one multipart upload part. Artifacts smaller than this are
/// stored with a single PUT.
pub const PART_SIZE: usize = 8 * 1024 * 1024;

/// S3-backed object store.
///
/// Stores renditions in a bucket of S3 or an S3-compatible service (MinIO,
/// GCS, etc.). Uploads are multipart, so an aborted stream never leaves a
/// partial object behind.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    identifier: String,
}

/// Multipart upload in progress.
struct MultipartUpload {
    upload_id: String,
    parts: Vec<CompletedPart>,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        let bucket = bucket.into();
        let identifier = format!("s3://{}", bucket);
        Self {
            client,
            bucket,
            identifier,
        }
    }

    /// Get the bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn location(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }

    async fn put_single(
        &self,
        key: &str,
        data: Bytes,
        metadata: HashMap<String, String>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .set_metadata(Some(metadata))
            .body(S3Body::from(data))
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }

    async fn create_upload(
        &self,
        key: &str,
        metadata: HashMap<String, String>,
        content_type: &str,
    ) -> Result<MultipartUpload, StorageError> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .set_metadata(Some(metadata))
            .send()
            .await
            .map_err(sdk_error)?;

        let upload_id = output
            .upload_id()
            .ok_or_else(|| StorageError::S3("multipart upload without upload id".to_string()))?
            .to_string();

        debug!(location = %self.location(key), upload_id = %upload_id, "Started multipart upload");
        Ok(MultipartUpload {
            upload_id,
            parts: Vec::new(),
        })
    }

    async fn upload_part(
        &self,
        key: &str,
        upload: &mut MultipartUpload,
        data: Bytes,
    ) -> Result<(), StorageError> {
        let part_number = upload.parts.len() as i32 + 1;
        let output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(&upload.upload_id)
            .part_number(part_number)
            .body(S3Body::from(data))
            .send()
            .await
            .map_err(sdk_error)?;

        upload.parts.push(
            CompletedPart::builder()
                .set_e_tag(output.e_tag().map(str::to_string))
                .part_number(part_number)
                .build(),
        );
        Ok(())
    }

    async fn complete_upload(&self, key: &str, upload: &MultipartUpload) -> Result<(), StorageError> {
        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(upload.parts.clone()))
            .build();
        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(&upload.upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }

    async fn abort_upload(&self, key: &str, upload: &MultipartUpload) {
        let result = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(&upload.upload_id)
            .send()
            .await;
        if let Err(e) = result {
            warn!(
                location = %self.location(key),
                upload_id = %upload.upload_id,
                error = %e,
                "Failed to abort multipart upload"
            );
        }
    }

    /// Stream `body` into parts, committing only after it ended cleanly.
    async fn put_streamed(
        &self,
        key: &str,
        mut body: ByteStream,
        metadata: HashMap<String, String>,
        content_type: &str,
    ) -> Result<u64, StorageError> {
        let mut buffer = BytesMut::with_capacity(PART_SIZE);
        let mut upload: Option<MultipartUpload> = None;
        let mut total = 0u64;

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    if let Some(upload) = &upload {
                        self.abort_upload(key, upload).await;
                    }
                    return Err(StorageError::Aborted(e.to_string()));
                }
            };
            total += chunk.len() as u64;
            buffer.extend_from_slice(&chunk);

            if buffer.len() >= PART_SIZE {
                if upload.is_none() {
                    upload = Some(self.create_upload(key, metadata.clone(), content_type).await?);
                }
                if let Some(active) = upload.as_mut() {
                    let part = buffer.split().freeze();
                    if let Err(e) = self.upload_part(key, active, part).await {
                        self.abort_upload(key, active).await;
                        return Err(e);
                    }
                }
            }
        }

        match upload {
            None => {
                self.put_single(key, buffer.freeze(), metadata, content_type)
                    .await?
            }
            Some(mut upload) => {
                if !buffer.is_empty() {
                    if let Err(e) = self.upload_part(key, &mut upload, buffer.freeze()).await {
                        self.abort_upload(key, &upload).await;
                        return Err(e);
                    }
                }
                if let Err(e) = self.complete_upload(key, &upload).await {
                    self.abort_upload(key, &upload).await;
                    return Err(e);
                }
                debug!(
                    location = %self.location(key),
                    parts = upload.parts.len(),
                    "Completed multipart upload"
                );
            }
        }

        Ok(total)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn head(&self, key: &str) -> Result<Option<ObjectHead>, StorageError> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        let head = match result {
            Ok(head) => head,
            Err(e) => {
                let is_not_found = e
                    .as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false);

                // Some S3-compatible services answer HEAD misses without a typed error
                let status_is_404 = e
                    .raw_response()
                    .map(|r| r.status().as_u16() == 404)
                    .unwrap_or(false);

                if is_not_found || status_is_404 {
                    return Ok(None);
                }

                let err_str = e.to_string();
                if err_str.contains("NotFound") || err_str.contains("NoSuchKey") {
                    return Ok(None);
                }
                return Err(sdk_error(e));
            }
        };

        Ok(Some(ObjectHead {
            size: head.content_length().unwrap_or(0).max(0) as u64,
            metadata: head.metadata().cloned().unwrap_or_default(),
        }))
    }

    async fn get(&self, key: &str, range: Option<ByteRange>) -> Result<ByteStream, StorageError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .set_range(range.map(|r| r.to_header()))
            .send()
            .await
            .map_err(|e| {
                let is_no_such_key = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);
                if is_no_such_key {
                    StorageError::NotFound(self.location(key))
                } else {
                    sdk_error(e)
                }
            })?;

        Ok(ReaderStream::new(resp.body.into_async_read()).boxed())
    }

    async fn put(
        &self,
        key: &str,
        body: ByteStream,
        metadata: HashMap<String, String>,
        content_type: &str,
    ) -> Result<u64, StorageError> {
        let stored = self.put_streamed(key, body, metadata, content_type).await?;
        debug!(location = %self.location(key), bytes = stored, "Stored rendition");
        Ok(stored)
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

/// Map an SDK error, separating transport failures from S3 rejections.
fn sdk_error<E, R>(e: SdkError<E, R>) -> StorageError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match &e {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
            StorageError::Connection(DisplayErrorContext(&e).to_string())
        }
        _ => StorageError::S3(DisplayErrorContext(&e).to_string()),
    }
}

/// Create an S3 client with optional custom endpoint and region.
///
/// Use a custom endpoint for S3-compatible services like MinIO:
/// ```ignore
/// let client = create_s3_client(Some("http://localhost:9000"), "us-east-1").await;
/// ```
///
/// For AWS S3, pass `None` to use the default endpoint:
/// ```ignore
/// let client = create_s3_client(None, "us-east-1").await;
/// ```
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;

    // S3-compatible services generally need path-style addressing
    let s3_config = if endpoint_url.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}
