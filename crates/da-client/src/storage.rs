//! Bucket and object reconciliation plus signed-URL issuance.

use crate::session::SessionClient;
use crate::transport::{ApiRequest, Body};
use da_core::{Direction, Error, RetentionPolicy, SignedUrl, SignedUrlPolicy};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use tracing::info;

/// Ensures buckets and uploaded objects exist, and issues short-lived
/// signed URLs for reading or writing objects.
pub struct StorageProvisioner {
    client: SessionClient,
    base_url: String,
    retention: RetentionPolicy,
    signed_urls: SignedUrlPolicy,
}

#[derive(Debug, Deserialize)]
struct SignedResponse {
    #[serde(rename = "signedUrl")]
    signed_url: String,
}

impl StorageProvisioner {
    pub fn new(client: SessionClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            retention: RetentionPolicy::default(),
            signed_urls: SignedUrlPolicy::default(),
        }
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_signed_url_policy(mut self, policy: SignedUrlPolicy) -> Self {
        self.signed_urls = policy;
        self
    }

    pub fn client(&self) -> &SessionClient {
        &self.client
    }

    /// Creates the bucket unless it already exists. A 403 on the detail
    /// lookup means the key is held by another principal and becomes
    /// `ResourceConflict`; the retention policy is fixed at creation.
    pub async fn ensure_bucket_exists(&self, key: &str) -> Result<(), Error> {
        info!(bucket = key, "checking bucket");
        let url = format!("{}/buckets/{}/details", self.base_url, key);
        match self.client.call(ApiRequest::get(url)).await {
            Ok(_) => {
                info!(bucket = key, "found existing bucket");
                Ok(())
            }
            Err(e) if e.is_status(404) => {
                info!(bucket = key, policy = ?self.retention, "creating bucket");
                let body = json!({ "bucketKey": key, "policyKey": self.retention });
                self.client
                    .call(ApiRequest::post(
                        format!("{}/buckets", self.base_url),
                        Body::Json(body),
                    ))
                    .await?;
                Ok(())
            }
            Err(e) if e.is_status(403) => Err(Error::ResourceConflict(format!(
                "bucket `{key}` was created by another application"
            ))),
            Err(e) => Err(e),
        }
    }

    /// Uploads `local_path` as `name` unless the object is already in
    /// the bucket. The local file must be openable for reading either
    /// way, even when the upload ends up skipped.
    pub async fn ensure_object_exists(
        &self,
        bucket: &str,
        name: &str,
        local_path: &Path,
    ) -> Result<(), Error> {
        let local = tokio::fs::File::open(local_path).await.map_err(|e| {
            Error::LocalIo(format!(
                "cannot read local input {}: {e}",
                local_path.display()
            ))
        })?;
        let meta = local.metadata().await.map_err(|e| {
            Error::LocalIo(format!(
                "cannot read local input {}: {e}",
                local_path.display()
            ))
        })?;
        if !meta.is_file() {
            return Err(Error::LocalIo(format!(
                "local input {} is not a regular file",
                local_path.display()
            )));
        }

        info!(bucket, object = name, "checking object");
        let url = format!("{}/buckets/{}/objects/{}/details", self.base_url, bucket, name);
        match self.client.call(ApiRequest::get(url)).await {
            Ok(_) => {
                info!(bucket, object = name, "found existing object");
                return Ok(());
            }
            Err(e) if e.is_status(404) => {}
            Err(e) if e.is_status(403) => {
                return Err(Error::ResourceConflict(format!(
                    "object `{name}` in bucket `{bucket}` is not accessible to this application"
                )))
            }
            Err(e) => return Err(e),
        }

        let content = tokio::fs::read(local_path).await.map_err(|e| {
            Error::LocalIo(format!(
                "reading local input {}: {e}",
                local_path.display()
            ))
        })?;
        info!(bucket, object = name, bytes = content.len(), "uploading object");
        let url = format!("{}/buckets/{}/objects/{}", self.base_url, bucket, name);
        let request = ApiRequest::put(url, Body::Bytes(content))
            .with_headers(self.client.headers_with_content_type("application/octet-stream"));
        self.client.call(request).await?;
        Ok(())
    }

    /// Issues a signed URL for one object under the configured policy.
    /// `direction` only records which verb the holder will use; the
    /// issuance call is the same either way.
    pub async fn issue_signed_url(
        &self,
        bucket: &str,
        name: &str,
        direction: Direction,
    ) -> Result<SignedUrl, Error> {
        let url = format!("{}/buckets/{}/objects/{}/signed", self.base_url, bucket, name);
        let body = json!({
            "minutesExpiration": self.signed_urls.minutes_expiration,
            "singleUse": self.signed_urls.single_use,
        });
        let response = self.client.call(ApiRequest::post(url, Body::Json(body))).await?;
        let signed: SignedResponse = response.json()?;
        Ok(SignedUrl {
            url: signed.signed_url,
            direction,
        })
    }

    /// Direct (bearer-authorized) object URL, used as a work-item
    /// output target together with authorization headers.
    pub fn object_url(&self, bucket: &str, name: &str) -> String {
        format!("{}/buckets/{}/objects/{}", self.base_url, bucket, name)
    }
}
