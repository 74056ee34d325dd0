use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use super::store::{OriginStore, SourceObject, VariantStore};
use crate::error::IoError;
use crate::variant::key::encode_path;
use crate::variant::record::VariantRecord;

/// Object metadata keys carried on stored variants.
const META_SOURCE_WIDTH: &str = "source-width";
const META_QUALITY: &str = "quality";

// =============================================================================
// Origin Store
// =============================================================================

/// Origin store reading source images from an S3 bucket.
#[derive(Clone)]
pub struct S3OriginStore {
    client: Client,
    bucket: String,
}

impl S3OriginStore {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Check that the bucket is reachable.
    pub async fn check(&self) -> Result<(), IoError> {
        check_bucket(&self.client, &self.bucket).await
    }
}

#[async_trait]
impl OriginStore for S3OriginStore {
    async fn get(&self, path: &str) -> Result<SourceObject, IoError> {
        let identifier = format!("s3://{}/{}", self.bucket, path);

        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| {
                let not_found = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false)
                    || e.raw_response()
                        .map(|r| r.status().as_u16() == 404)
                        .unwrap_or(false);
                map_sdk_error(e, not_found, &identifier)
            })?;

        let content_type = resp.content_type().map(str::to_string);
        let bytes = resp
            .body
            .collect()
            .await
            .map_err(|e| IoError::Connection(e.to_string()))?
            .into_bytes();

        Ok(SourceObject::new(bytes, content_type))
    }

    fn location(&self) -> &str {
        &self.bucket
    }
}

// =============================================================================
// Variant Store
// =============================================================================

/// Variant store writing records to an S3 bucket.
///
/// Records carry their content type and Cache-Control as object headers so
/// the bucket can be served directly.
#[derive(Clone)]
pub struct S3VariantStore {
    client: Client,
    bucket: String,
    public_base_url: Option<String>,
}

impl S3VariantStore {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            public_base_url: None,
        }
    }

    /// Serve oversized variants by redirecting to `<base>/<key>`.
    pub fn with_public_base_url(mut self, base: impl Into<String>) -> Self {
        self.public_base_url = Some(base.into().trim_end_matches('/').to_string());
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub async fn check(&self) -> Result<(), IoError> {
        check_bucket(&self.client, &self.bucket).await
    }
}

#[async_trait]
impl VariantStore for S3VariantStore {
    async fn put(&self, key: &str, record: &VariantRecord) -> Result<(), IoError> {
        let identifier = format!("s3://{}/{}", self.bucket, key);

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(&record.content_type)
            .cache_control(&record.cache_control)
            .body(ByteStream::from(record.bytes.clone()));

        if let Some(width) = record.source_width {
            request = request.metadata(META_SOURCE_WIDTH, width.to_string());
        }
        if let Some(quality) = record.quality {
            request = request.metadata(META_QUALITY, quality.to_string());
        }

        request
            .send()
            .await
            .map_err(|e| map_sdk_error(e, false, &identifier))?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<VariantRecord>, IoError> {
        let identifier = format!("s3://{}/{}", self.bucket, key);

        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        let resp = match result {
            Ok(resp) => resp,
            Err(e) => {
                let not_found = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false)
                    || e.raw_response()
                        .map(|r| r.status().as_u16() == 404)
                        .unwrap_or(false);
                if not_found {
                    return Ok(None);
                }
                return Err(map_sdk_error(e, false, &identifier));
            }
        };

        let content_type = resp
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let cache_control = resp.cache_control().unwrap_or_default().to_string();
        let metadata = resp.metadata().cloned().unwrap_or_default();

        let bytes = resp
            .body
            .collect()
            .await
            .map_err(|e| IoError::Connection(e.to_string()))?
            .into_bytes();

        let mut record = VariantRecord::new(bytes, content_type, cache_control)
            .with_quality(parse_metadata(&metadata, META_QUALITY));
        record.source_width = parse_metadata(&metadata, META_SOURCE_WIDTH);

        Ok(Some(record))
    }

    fn location(&self) -> &str {
        &self.bucket
    }

    fn public_url(&self, key: &str) -> Option<String> {
        self.public_base_url
            .as_ref()
            .map(|base| format!("{}/{}", base, encode_path(key)))
    }
}

fn parse_metadata<T: std::str::FromStr>(metadata: &HashMap<String, String>, name: &str) -> Option<T> {
    metadata.get(name).and_then(|value| value.parse().ok())
}

/// Map an SDK failure onto the store error taxonomy.
fn map_sdk_error<E, R>(err: SdkError<E, R>, not_found: bool, identifier: &str) -> IoError
where
    SdkError<E, R>: std::fmt::Display,
{
    if not_found {
        return IoError::NotFound(identifier.to_string());
    }

    match err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
            IoError::Connection(format!("{}: {}", identifier, err))
        }
        _ => IoError::S3(format!("{}: {}", identifier, err)),
    }
}

async fn check_bucket(client: &Client, bucket: &str) -> Result<(), IoError> {
    client
        .list_objects_v2()
        .bucket(bucket)
        .max_keys(1)
        .send()
        .await
        .map(|_| ())
        .map_err(|e| map_sdk_error(e, false, &format!("s3://{}", bucket)))
}

/// Create an S3 client with optional custom endpoint and region.
///
/// Use a custom endpoint for S3-compatible services like MinIO:
/// ```ignore
/// let client = create_s3_client(Some("http://localhost:9000"), "us-east-1").await;
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
