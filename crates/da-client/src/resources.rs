//! Listing and alias plumbing shared by the package and activity
//! provisioners. Both resource kinds expose the same routes, differing
//! only in the path segment.

use crate::session::SessionClient;
use crate::transport::{ApiRequest, Body};
use da_core::Error;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ResourceKind {
    AppBundle,
    Activity,
}

impl ResourceKind {
    pub(crate) fn segment(&self) -> &'static str {
        match self {
            ResourceKind::AppBundle => "appbundles",
            ResourceKind::Activity => "activities",
        }
    }
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: Vec<String>,
}

/// Full listing of fully qualified names for one resource kind.
pub(crate) async fn list_qualified_names(
    client: &SessionClient,
    base_url: &str,
    kind: ResourceKind,
) -> Result<Vec<String>, Error> {
    let response = client
        .call(ApiRequest::get(format!("{base_url}/{}", kind.segment())))
        .await?;
    let listing: Listing = response.json()?;
    Ok(listing.data)
}

/// 2xx means the alias exists, 404 means it does not; anything else
/// propagates.
pub(crate) async fn alias_exists(
    client: &SessionClient,
    base_url: &str,
    kind: ResourceKind,
    id: &str,
    alias: &str,
) -> Result<bool, Error> {
    let url = format!("{base_url}/{}/{id}/aliases/{alias}", kind.segment());
    match client.call(ApiRequest::get(url)).await {
        Ok(_) => Ok(true),
        Err(e) if e.is_status(404) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Points the alias at `version`: created fresh when absent, patched
/// when present. Run right after a create/version call this keeps the
/// alias on the version just published, never a stale one.
pub(crate) async fn point_alias(
    client: &SessionClient,
    base_url: &str,
    kind: ResourceKind,
    id: &str,
    alias: &str,
    version: u64,
    already_exists: bool,
) -> Result<(), Error> {
    if already_exists {
        info!(resource = id, alias, version, "updating alias");
        let url = format!("{base_url}/{}/{id}/aliases/{alias}", kind.segment());
        client
            .call(ApiRequest::patch(url, Body::Json(json!({ "version": version }))))
            .await?;
    } else {
        info!(resource = id, alias, version, "creating alias");
        let url = format!("{base_url}/{}/{id}/aliases", kind.segment());
        client
            .call(ApiRequest::post(
                url,
                Body::Json(json!({ "id": alias, "version": version })),
            ))
            .await?;
    }
    Ok(())
}
