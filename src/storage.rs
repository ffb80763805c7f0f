// menu-render-service/src/storage.rs

use crate::models::RenderJob;
use anyhow::{Context, Result};
use async_trait::async_trait;
use google_cloud_storage::client::{Client as GcsClient, ClientConfig};
use google_cloud_storage::http::objects::get::GetObjectRequest;
use google_cloud_storage::http::objects::upload::{UploadObjectRequest, UploadType};
use google_cloud_storage::http::objects::Object;
use google_cloud_storage::http::Error as GcsError;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::{debug, info, instrument};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

const CHECKSUM_METADATA_KEY: &str = "sha256";

/// A PDF already sitting in object storage.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredArtifact {
    pub key: String,
    pub url: String,
    pub byte_length: usize,
    pub sha256: String,
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Look up an existing artifact. `Ok(None)` when nothing is stored.
    async fn find(&self, key: &str) -> Result<Option<StoredArtifact>>;

    async fn put(&self, key: &str, pdf: &[u8]) -> Result<StoredArtifact>;
}

/// Content-addressed object key: `menus/{sha256 of the job JSON}.pdf`.
pub fn cache_key(job: &RenderJob) -> Result<String> {
    let canonical = serde_json::to_vec(job).context("Failed to serialize render job")?;
    Ok(format!("menus/{}.pdf", sha256_hex(&canonical)))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[derive(Clone)]
pub struct GcsArtifactStore {
    client: GcsClient,
    bucket: String,
}

impl GcsArtifactStore {
    /// Initialise from the ambient service account credentials.
    pub async fn new(bucket: &str) -> Result<Self> {
        let config = ClientConfig::default()
            .with_auth()
            .await
            .context("Failed to initialise GCS client with service account")?;

        Ok(Self {
            client: GcsClient::new(config),
            bucket: bucket.to_string(),
        })
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://storage.googleapis.com/{}/{}", self.bucket, key)
    }
}

#[async_trait]
impl ArtifactStore for GcsArtifactStore {
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn find(&self, key: &str) -> Result<Option<StoredArtifact>> {
        let request = GetObjectRequest {
            bucket: self.bucket.clone(),
            object: key.to_string(),
            ..Default::default()
        };

        let object = match self.client.get_object(&request).await {
            Ok(object) => object,
            Err(GcsError::Response(response)) if response.code == 404 => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to look up GCS object {}", key))
            }
        };

        let Some(sha256) = object
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.get(CHECKSUM_METADATA_KEY))
            .cloned()
        else {
            debug!(key, "Stored object has no checksum, treating as absent");
            return Ok(None);
        };

        Ok(Some(StoredArtifact {
            key: key.to_string(),
            url: self.public_url(key),
            byte_length: object.size.max(0) as usize,
            sha256,
        }))
    }

    #[instrument(skip(self, pdf), fields(bucket = %self.bucket, size_kb = pdf.len() / 1024))]
    async fn put(&self, key: &str, pdf: &[u8]) -> Result<StoredArtifact> {
        let sha256 = sha256_hex(pdf);

        let upload_type = UploadType::Multipart(Box::new(Object {
            name: key.to_string(),
            content_type: Some(PDF_CONTENT_TYPE.to_string()),
            metadata: Some(HashMap::from([(
                CHECKSUM_METADATA_KEY.to_string(),
                sha256.clone(),
            )])),
            ..Default::default()
        }));

        self.client
            .upload_object(
                &UploadObjectRequest {
                    bucket: self.bucket.clone(),
                    ..Default::default()
                },
                pdf.to_vec(),
                &upload_type,
            )
            .await
            .with_context(|| format!("Failed to upload menu PDF to GCS path {}", key))?;

        info!(
            gcs_path = %key,
            file_size = pdf.len(),
            sha256 = %sha256,
            "Uploaded menu PDF to GCS"
        );

        Ok(StoredArtifact {
            key: key.to_string(),
            url: self.public_url(key),
            byte_length: pdf.len(),
            sha256,
        })
    }
}
