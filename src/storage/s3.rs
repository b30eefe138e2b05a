use anyhow::{Context, Result};
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::{debug, instrument};

use super::{ObjectStore, RemoteBundle};
use crate::config::SyncConfig;

/// [`ObjectStore`] backed by an S3-compatible bucket.
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

/// Build an S3-backed store from the sync configuration, using ambient AWS
/// credentials and the configured region.
pub async fn build_object_store(config: &SyncConfig) -> Result<S3ObjectStore> {
    let aws_config = aws_config::from_env()
        .region(aws_config::Region::new(config.region.clone()))
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(true)
        .build();

    let client = Client::from_conf(s3_config);
    tracing::info!(
        bucket = %config.bucket,
        region = %config.region,
        "object store client initialised"
    );
    Ok(S3ObjectStore::new(client, config.bucket.clone()))
}

#[async_trait::async_trait]
impl ObjectStore for S3ObjectStore {
    /// List all objects in the bucket, paginating through every
    /// continuation token.
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn list(&self) -> Result<Vec<RemoteBundle>> {
        let mut bundles = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut req = self.client.list_objects_v2().bucket(&self.bucket);

            if let Some(ref token) = continuation_token {
                req = req.continuation_token(token);
            }

            let resp = req.send().await.context("S3 ListObjectsV2")?;

            for obj in resp.contents() {
                let Some(name) = obj.key() else { continue };
                bundles.push(RemoteBundle {
                    name: name.to_string(),
                    // S3 wraps etags in double quotes; strip them so the
                    // persisted tag is the bare opaque value.
                    etag: obj.e_tag().unwrap_or_default().trim_matches('"').to_string(),
                    size: obj.size().unwrap_or(0),
                });
            }

            match resp.next_continuation_token() {
                Some(token) => {
                    continuation_token = Some(token.to_string());
                }
                None => break,
            }
        }

        debug!(count = bundles.len(), "listed remote bundles");
        Ok(bundles)
    }

    #[instrument(skip(self), fields(bucket = %self.bucket, %name))]
    async fn fetch(&self, name: &str) -> Result<Bytes> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
            .context("S3 GetObject")?;

        let bytes = resp
            .body
            .collect()
            .await
            .context("read S3 GetObject body")?
            .into_bytes();

        debug!(bytes = bytes.len(), "bundle fetched");
        Ok(bytes)
    }
}
