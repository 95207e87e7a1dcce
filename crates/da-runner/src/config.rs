//! TOML configuration for a pipeline run.
//!
//! One file describes the whole run: service endpoints, credentials,
//! the buckets and local inputs, the package and activity to publish,
//! and the jobs to submit. Poll intervals and the signed-URL policy
//! are configuration with service-conventional defaults rather than
//! hard-coded constants.

use anyhow::Context;
use da_core::{ParameterContract, PollPolicy, RetentionPolicy, SignedUrlPolicy};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub service: ServiceConfig,
    pub credentials: CredentialsConfig,
    pub storage: StorageConfig,
    pub package: PackageConfig,
    pub activity: ActivityConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    pub storage_base_url: String,
    pub engine_base_url: String,
    pub auth_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsConfig {
    pub client_id: String,
    pub client_secret: String,
}

impl CredentialsConfig {
    pub fn to_credentials(&self) -> da_core::Credentials {
        da_core::Credentials {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    pub input_bucket: String,
    pub output_bucket: String,
    /// Directory holding the local input files, uploaded by name.
    #[serde(default = "default_inputs_dir")]
    pub inputs_dir: PathBuf,
    #[serde(default)]
    pub input_files: Vec<String>,
    #[serde(default)]
    pub retention: Option<RetentionPolicy>,
}

fn default_inputs_dir() -> PathBuf {
    PathBuf::from(".")
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageConfig {
    pub id: String,
    pub engine: String,
    pub archive: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivityConfig {
    pub id: String,
    /// Defaults to the package engine when omitted.
    #[serde(default)]
    pub engine: Option<String>,
    pub command_template: String,
    /// Declared parameter slots; submission arguments are checked
    /// against these names before anything goes over the wire.
    #[serde(default)]
    pub parameters: ParameterContract,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Alias both the package and activity are published under.
    pub alias: String,
    /// Where reports and downloaded outputs land; `~` expands.
    pub output_dir: String,
    pub signed_urls: SignedUrlPolicy,
    pub poll: PollPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            alias: "prod".to_string(),
            output_dir: "~/Documents".to_string(),
            signed_urls: SignedUrlPolicy::default(),
            poll: PollPolicy::default(),
        }
    }
}

impl RunConfig {
    pub fn resolved_output_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.output_dir).into_owned())
    }
}

/// One work item to submit once provisioning is done.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    pub name: String,
    /// Execution report file name inside the output directory.
    #[serde(default)]
    pub report_file: Option<String>,
    #[serde(default)]
    pub arguments: BTreeMap<String, JobArgument>,
}

impl JobConfig {
    pub fn report_file_name(&self) -> String {
        self.report_file
            .clone()
            .unwrap_or_else(|| format!("{}-report.txt", self.name))
    }

    pub fn error_report_file_name(&self) -> String {
        format!("{}-error-report.txt", self.name)
    }
}

/// How one named argument is materialized at submission time.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum JobArgument {
    /// Read side: a fresh signed URL for an object in the input bucket.
    SignedInput {
        object: String,
        #[serde(default)]
        zip: Option<bool>,
        #[serde(default)]
        path_in_zip: Option<String>,
        #[serde(default)]
        local_name: Option<String>,
    },
    /// Read side: a JSON payload embedded as a data URI.
    InlineJson { json: String },
    /// Write side: the engine uploads into the output bucket; when
    /// `download` is set the object is fetched locally afterwards.
    BucketOutput {
        object: String,
        #[serde(default)]
        download: bool,
    },
}

pub fn load_from(path: &Path) -> anyhow::Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: Config =
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [service]
        storage_base_url = "https://developer.example.com/oss/v2"
        engine_base_url = "https://developer.example.com/da/us-east/v3"
        auth_url = "https://developer.example.com/authentication/v2/token"

        [credentials]
        client_id = "app"
        client_secret = "secret"

        [storage]
        input_bucket = "app-inputs"
        output_bucket = "app-outputs"
        inputs_dir = "inputs"
        input_files = ["model.dat"]
        retention = "transient"

        [package]
        id = "UpdateParams"
        engine = "Engine+24"
        archive = "plugin/UpdateParams.zip"

        [activity]
        id = "UpdateParamsActivity"
        command_template = "$(engine.path)\\run.exe /i $(args[InputDoc].path)"

        [activity.parameters.InputDoc]
        localName = "input.dat"

        [activity.parameters.Result]
        verb = "put"
        localName = "result.dat"
        optional = true

        [run]
        alias = "staging"
        output_dir = "out"

        [run.poll]
        initial_interval_ms = 500
        max_attempts = 60

        [[jobs]]
        name = "width-10"

        [jobs.arguments.InputDoc]
        kind = "signed-input"
        object = "model.dat"

        [jobs.arguments.Params]
        kind = "inline-json"
        json = '{"width":"10 in"}'

        [jobs.arguments.Result]
        kind = "bucket-output"
        object = "result-10.dat"
        download = true
    "#;

    #[test]
    fn parses_full_config() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.run.alias, "staging");
        assert_eq!(config.storage.retention, Some(RetentionPolicy::Transient));
        assert_eq!(config.activity.parameters.len(), 2);
        let job = &config.jobs[0];
        assert_eq!(job.report_file_name(), "width-10-report.txt");
        assert!(matches!(
            job.arguments["Result"],
            JobArgument::BucketOutput { download: true, .. }
        ));
    }

    #[test]
    fn run_section_defaults_apply() {
        let trimmed = SAMPLE
            .replace("alias = \"staging\"", "")
            .replace("output_dir = \"out\"", "");
        let config: Config = toml::from_str(&trimmed).unwrap();
        assert_eq!(config.run.alias, "prod");
        assert_eq!(config.run.signed_urls.minutes_expiration, 45);
        assert!(config.run.signed_urls.single_use);
        assert_eq!(config.run.poll.initial_interval_ms, 500);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let broken = SAMPLE.replace("input_bucket", "input_bukcet");
        assert!(toml::from_str::<Config>(&broken).is_err());
    }
}
