//! Activity reconciliation: the same ensure-or-version algorithm as
//! packages, plus the parameter contract and command template the
//! engine invocation is built from.

use crate::resources::{self, ResourceKind};
use crate::session::SessionClient;
use crate::transport::{ApiRequest, Body};
use da_core::{listing_contains, qualified_name, Error, ParameterContract, VersionedResource};
use serde_json::json;
use tracing::info;

#[derive(Clone, Debug)]
pub struct ActivitySpec {
    pub id: String,
    pub engine: String,
    pub alias: String,
    /// Command line template referencing the package and the named
    /// arguments positionally, passed through to the engine verbatim.
    pub command_template: String,
    /// Must match, by name, the argument map supplied at work-item
    /// submission time.
    pub parameters: ParameterContract,
}

#[derive(Clone, Debug)]
pub struct ProvisionedActivity {
    pub qualified_name: String,
    pub version: u64,
    /// Contract carried along so submissions can be validated locally.
    pub parameters: ParameterContract,
}

pub struct ActivityProvisioner {
    client: SessionClient,
    base_url: String,
}

impl ActivityProvisioner {
    pub fn new(client: SessionClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Ensure-or-version against `/activities`; `apps` is the list of
    /// qualified package names the activity binds.
    pub async fn ensure(
        &self,
        spec: &ActivitySpec,
        apps: &[String],
        nickname: &str,
    ) -> Result<ProvisionedActivity, Error> {
        let expected = qualified_name(nickname, &spec.id, &spec.alias);
        let listing =
            resources::list_qualified_names(&self.client, &self.base_url, ResourceKind::Activity)
                .await?;
        let exists = listing_contains(&listing, &expected);

        let mut body = json!({
            "engine": spec.engine,
            "apps": apps,
            "commandLine": spec.command_template,
            "settings": serde_json::Value::Null,
            "parameters": spec.parameters,
        });

        let created: VersionedResource = if exists {
            info!(activity = %spec.id, "found existing activity, publishing new version");
            self.client
                .call(ApiRequest::post(
                    format!("{}/activities/{}/versions", self.base_url, spec.id),
                    Body::Json(body),
                ))
                .await?
                .json()?
        } else {
            info!(activity = %spec.id, "creating activity");
            body["id"] = json!(spec.id);
            self.client
                .call(ApiRequest::post(
                    format!("{}/activities", self.base_url),
                    Body::Json(body),
                ))
                .await?
                .json()?
        };

        let alias_present = resources::alias_exists(
            &self.client,
            &self.base_url,
            ResourceKind::Activity,
            &spec.id,
            &spec.alias,
        )
        .await?;
        resources::point_alias(
            &self.client,
            &self.base_url,
            ResourceKind::Activity,
            &spec.id,
            &spec.alias,
            created.version,
            alias_present,
        )
        .await?;

        Ok(ProvisionedActivity {
            qualified_name: expected,
            version: created.version,
            parameters: spec.parameters.clone(),
        })
    }
}
