//! The sequential provisioning and execution pipeline.
//!
//! One run walks the whole surface in order: storage session, buckets
//! and inputs, engine session, package and activity publication, then
//! each configured job submitted and driven to a terminal status. Jobs
//! run strictly one after another; the first non-success outcome stops
//! the run after its report is saved.

use crate::config::{Config, JobArgument, JobConfig};
use anyhow::Context;
use da_client::{
    fetch_nickname, ActivityProvisioner, ActivitySpec, PackageProvisioner, PackageSpec,
    ProvisionedActivity, ProvisionedPackage, ResultFetcher, SessionClient, StorageProvisioner,
    Transport, WorkItemOrchestrator,
};
use da_core::{Direction, Error, Outcome, Verb, WorkItemArgument, WorkItemStatus};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Scopes for the storage session.
const STORAGE_SCOPES: &[&str] = &[
    "bucket:create",
    "bucket:read",
    "data:read",
    "data:write",
    "data:create",
];

/// Scopes for the engine session.
const ENGINE_SCOPES: &[&str] = &["code:all"];

#[derive(Debug)]
pub struct PipelineReport {
    pub package: ProvisionedPackage,
    pub activity: ProvisionedActivity,
    pub jobs: Vec<JobReport>,
}

#[derive(Debug)]
pub struct JobReport {
    pub name: String,
    pub work_item_id: String,
    pub status: WorkItemStatus,
    pub report_path: Option<PathBuf>,
    pub outputs: Vec<PathBuf>,
}

fn scope_vec(scopes: &[&str]) -> Vec<String> {
    scopes.iter().map(|s| s.to_string()).collect()
}

pub async fn run(transport: Arc<dyn Transport>, config: &Config) -> anyhow::Result<PipelineReport> {
    let credentials = config.credentials.to_credentials();

    let storage_session = SessionClient::authenticate(
        transport.clone(),
        &config.service.auth_url,
        &credentials,
        &scope_vec(STORAGE_SCOPES),
    )
    .await
    .context("storage authentication")?;
    let mut storage = StorageProvisioner::new(
        storage_session.clone(),
        config.service.storage_base_url.clone(),
    )
    .with_signed_url_policy(config.run.signed_urls.clone());
    if let Some(retention) = config.storage.retention {
        storage = storage.with_retention(retention);
    }

    storage
        .ensure_bucket_exists(&config.storage.input_bucket)
        .await?;
    for file in &config.storage.input_files {
        let local = config.storage.inputs_dir.join(file);
        storage
            .ensure_object_exists(&config.storage.input_bucket, file, &local)
            .await?;
    }
    storage
        .ensure_bucket_exists(&config.storage.output_bucket)
        .await?;

    let engine_session = SessionClient::authenticate(
        transport.clone(),
        &config.service.auth_url,
        &credentials,
        &scope_vec(ENGINE_SCOPES),
    )
    .await
    .context("engine authentication")?;
    let nickname = fetch_nickname(&engine_session, &config.service.engine_base_url).await?;
    info!(nickname, "resolved account nickname");

    let package_spec = PackageSpec {
        id: config.package.id.clone(),
        engine: config.package.engine.clone(),
        alias: config.run.alias.clone(),
        archive: config.package.archive.clone(),
    };
    let package =
        PackageProvisioner::new(engine_session.clone(), config.service.engine_base_url.clone())
            .ensure(&package_spec, &nickname)
            .await?;

    let activity_spec = ActivitySpec {
        id: config.activity.id.clone(),
        engine: config
            .activity
            .engine
            .clone()
            .unwrap_or_else(|| config.package.engine.clone()),
        alias: config.run.alias.clone(),
        command_template: config.activity.command_template.clone(),
        parameters: config.activity.parameters.clone(),
    };
    let activity =
        ActivityProvisioner::new(engine_session.clone(), config.service.engine_base_url.clone())
            .ensure(&activity_spec, &[package.qualified_name.clone()], &nickname)
            .await?;

    let orchestrator =
        WorkItemOrchestrator::new(engine_session, config.service.engine_base_url.clone())
            .with_poll_policy(config.run.poll.clone());
    let fetcher = ResultFetcher::new(transport);
    let output_dir = config.run.resolved_output_dir();

    let mut jobs = Vec::new();
    for job in &config.jobs {
        let report = execute_job(
            job,
            config,
            &storage,
            &storage_session,
            &activity,
            &orchestrator,
            &fetcher,
            &output_dir,
        )
        .await?;
        jobs.push(report);
    }

    Ok(PipelineReport {
        package,
        activity,
        jobs,
    })
}

#[allow(clippy::too_many_arguments)]
async fn execute_job(
    job: &JobConfig,
    config: &Config,
    storage: &StorageProvisioner,
    storage_session: &SessionClient,
    activity: &ProvisionedActivity,
    orchestrator: &WorkItemOrchestrator,
    fetcher: &ResultFetcher,
    output_dir: &Path,
) -> anyhow::Result<JobReport> {
    info!(job = job.name, "starting job");
    let mut arguments = BTreeMap::new();
    let mut downloads = Vec::new();
    for (name, argument) in &job.arguments {
        match argument {
            JobArgument::SignedInput {
                object,
                zip,
                path_in_zip,
                local_name,
            } => {
                let signed = storage
                    .issue_signed_url(&config.storage.input_bucket, object, Direction::Read)
                    .await?;
                arguments.insert(
                    name.clone(),
                    WorkItemArgument::UrlRead {
                        url: signed.url,
                        zip: *zip,
                        path_in_zip: path_in_zip.clone(),
                        local_name: local_name.clone(),
                    },
                );
            }
            JobArgument::InlineJson { json } => {
                arguments.insert(name.clone(), WorkItemArgument::inline_json(json.clone()));
            }
            JobArgument::BucketOutput { object, download } => {
                arguments.insert(
                    name.clone(),
                    WorkItemArgument::UrlWrite {
                        url: storage.object_url(&config.storage.output_bucket, object),
                        verb: Verb::Put,
                        headers: storage_session
                            .headers_with_content_type("application/octet-stream"),
                    },
                );
                if *download {
                    downloads.push(object.clone());
                }
            }
        }
    }

    let work_item_id = orchestrator
        .submit(&activity.qualified_name, &activity.parameters, &arguments)
        .await?;
    let outcome = orchestrator.await_completion(&work_item_id).await;

    if outcome.status != WorkItemStatus::Success {
        warn!(
            job = job.name,
            work_item = work_item_id,
            status = %outcome.status,
            "job did not succeed"
        );
        save_report(fetcher, &outcome, output_dir, &job.error_report_file_name()).await?;
        return Err(Error::WorkItemFailure {
            id: work_item_id,
            status: outcome.status,
        }
        .into());
    }

    let report_path =
        save_report(fetcher, &outcome, output_dir, &job.report_file_name()).await?;
    let mut outputs = Vec::new();
    for object in downloads {
        let signed = storage
            .issue_signed_url(&config.storage.output_bucket, &object, Direction::Read)
            .await?;
        let destination = output_dir.join(&object);
        fetcher.fetch(&signed.url, &destination).await?;
        outputs.push(destination);
    }
    info!(job = job.name, work_item = work_item_id, "job finished");

    Ok(JobReport {
        name: job.name.clone(),
        work_item_id,
        status: outcome.status,
        report_path,
        outputs,
    })
}

async fn save_report(
    fetcher: &ResultFetcher,
    outcome: &Outcome,
    output_dir: &Path,
    file_name: &str,
) -> anyhow::Result<Option<PathBuf>> {
    let Some(url) = &outcome.report_url else {
        return Ok(None);
    };
    let destination = output_dir.join(file_name);
    fetcher.fetch(url, &destination).await?;
    Ok(Some(destination))
}
