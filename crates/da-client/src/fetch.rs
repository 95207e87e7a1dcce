//! Downloads signed or direct URLs to local files.

use crate::transport::{ApiRequest, Body, Method, Transport};
use da_core::Error;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub struct ResultFetcher {
    transport: Arc<dyn Transport>,
}

impl ResultFetcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Writes the resource at `url` to `destination`, creating
    /// intermediate directories as needed. The URL is signed or
    /// otherwise self-authorizing, so no bearer header is sent.
    /// Completion of the write is the only success criterion; there is
    /// no checksum or size verification.
    ///
    /// The whole body is buffered in memory before the write; sized
    /// for reports and job outputs, not bulk transfers.
    pub async fn fetch(&self, url: &str, destination: &Path) -> Result<(), Error> {
        let request = ApiRequest {
            method: Method::Get,
            url: url.to_string(),
            headers: Some(BTreeMap::new()),
            body: Body::Empty,
        };
        let response = self.transport.execute(request).await?;
        if !response.is_success() {
            return Err(Error::transport(Some(response.status), response.text()));
        }
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::LocalIo(format!("creating {}: {e}", parent.display()))
            })?;
        }
        tokio::fs::write(destination, &response.body)
            .await
            .map_err(|e| Error::LocalIo(format!("writing {}: {e}", destination.display())))?;
        info!(
            path = %destination.display(),
            bytes = response.body.len(),
            "wrote artifact"
        );
        Ok(())
    }
}
