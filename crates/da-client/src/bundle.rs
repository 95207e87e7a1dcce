//! Package (app bundle) reconciliation: ensure-or-version, alias
//! tracking and the archive upload to the pre-signed target.

use crate::resources::{self, ResourceKind};
use crate::session::SessionClient;
use crate::transport::{ApiRequest, Body, Method};
use da_core::{listing_contains, qualified_name, Error, VersionedResource};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

/// What to provision: one engine-bound package published under one
/// alias, with its archive read from the local filesystem.
#[derive(Clone, Debug)]
pub struct PackageSpec {
    pub id: String,
    pub engine: String,
    pub alias: String,
    pub archive: PathBuf,
}

/// Result of a reconciliation run.
#[derive(Clone, Debug)]
pub struct ProvisionedPackage {
    pub qualified_name: String,
    pub version: u64,
}

pub struct PackageProvisioner {
    client: SessionClient,
    base_url: String,
}

impl PackageProvisioner {
    pub fn new(client: SessionClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Ensure-or-version:
    /// 1. scan the listing for `<nickname>.<id>+<alias>` (exact match);
    /// 2. absent: create fresh (version 1); present: publish a new
    ///    version (the remote picks the number);
    /// 3. create or patch the alias so it points at that version;
    /// 4. upload the archive to the pre-signed target returned by the
    ///    create/version call (single use, no bearer header).
    ///
    /// There is no rollback: a partial run leaves remote state ahead of
    /// the alias and is re-reconciled by running again.
    pub async fn ensure(
        &self,
        spec: &PackageSpec,
        nickname: &str,
    ) -> Result<ProvisionedPackage, Error> {
        let archive = tokio::fs::read(&spec.archive).await.map_err(|e| {
            Error::LocalIo(format!(
                "reading package archive {}: {e}",
                spec.archive.display()
            ))
        })?;

        let expected = qualified_name(nickname, &spec.id, &spec.alias);
        let listing =
            resources::list_qualified_names(&self.client, &self.base_url, ResourceKind::AppBundle)
                .await?;
        let exists = listing_contains(&listing, &expected);

        let created: VersionedResource = if exists {
            info!(package = %spec.id, "found existing package, publishing new version");
            self.client
                .call(ApiRequest::post(
                    format!("{}/appbundles/{}/versions", self.base_url, spec.id),
                    Body::Json(json!({ "engine": spec.engine })),
                ))
                .await?
                .json()?
        } else {
            info!(package = %spec.id, "creating package");
            self.client
                .call(ApiRequest::post(
                    format!("{}/appbundles", self.base_url),
                    Body::Json(json!({ "id": spec.id, "engine": spec.engine })),
                ))
                .await?
                .json()?
        };

        let alias_present = resources::alias_exists(
            &self.client,
            &self.base_url,
            ResourceKind::AppBundle,
            &spec.id,
            &spec.alias,
        )
        .await?;
        resources::point_alias(
            &self.client,
            &self.base_url,
            ResourceKind::AppBundle,
            &spec.id,
            &spec.alias,
            created.version,
            alias_present,
        )
        .await?;

        let upload = created.upload_parameters.ok_or_else(|| {
            Error::transport(None, "create/version response missing upload parameters")
        })?;
        let file_name = spec
            .archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "package.zip".to_string());
        info!(
            package = %spec.id,
            version = created.version,
            bytes = archive.len(),
            "uploading package archive"
        );
        // Pre-signed target: explicit empty headers keep the bearer out.
        let request = ApiRequest {
            method: Method::Post,
            url: upload.endpoint_url,
            headers: Some(BTreeMap::new()),
            body: Body::Multipart {
                fields: upload.form_data.into_iter().collect(),
                file_name,
                file: archive,
            },
        };
        self.client.call(request).await?;

        Ok(ProvisionedPackage {
            qualified_name: expected,
            version: created.version,
        })
    }
}
