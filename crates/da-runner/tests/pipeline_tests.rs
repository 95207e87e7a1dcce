//! Full pipeline runs against the in-memory service fake.

use da_client::{MemoryTransport, PollStep};
use da_core::WorkItemStatus;
use da_runner::config::Config;
use da_runner::pipeline;
use std::sync::Arc;

const CONFIG_TEMPLATE: &str = r#"
[service]
storage_base_url = "http://storage.test"
engine_base_url = "http://engine.test"
auth_url = "http://engine.test/authenticate"

[credentials]
client_id = "test-client"
client_secret = "test-secret"

[storage]
input_bucket = "acme-inputs"
output_bucket = "acme-outputs"
inputs_dir = "@INPUTS@"
input_files = ["model.dat"]

[package]
id = "UpdateParams"
engine = "Engine+24"
archive = "@ARCHIVE@"

[activity]
id = "UpdateParamsActivity"
command_template = "run /i $(args[InputDoc].path)"

[activity.parameters.InputDoc]
localName = "input.dat"

[activity.parameters.Params]
localName = "params.json"

[activity.parameters.Result]
verb = "put"
localName = "result.dat"

[run]
alias = "prod"
output_dir = "@OUT@"

[run.poll]
initial_interval_ms = 1
max_interval_ms = 1
multiplier = 1
max_attempts = 20

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

const SECOND_JOB: &str = r#"
[[jobs]]
name = "width-16"

[jobs.arguments.InputDoc]
kind = "signed-input"
object = "model.dat"

[jobs.arguments.Params]
kind = "inline-json"
json = '{"width":"16 in"}'

[jobs.arguments.Result]
kind = "bucket-output"
object = "result-16.dat"
download = false
"#;

struct Workspace {
    _dir: tempfile::TempDir,
    config: Config,
    out: std::path::PathBuf,
}

fn workspace(extra_jobs: &str) -> Workspace {
    let dir = tempfile::tempdir().unwrap();
    let inputs = dir.path().join("inputs");
    std::fs::create_dir_all(&inputs).unwrap();
    std::fs::write(inputs.join("model.dat"), b"model bytes").unwrap();
    let archive = dir.path().join("UpdateParams.zip");
    std::fs::write(&archive, b"plugin archive").unwrap();
    let out = dir.path().join("out");

    let raw = format!("{CONFIG_TEMPLATE}{extra_jobs}")
        .replace("@INPUTS@", inputs.to_str().unwrap())
        .replace("@ARCHIVE@", archive.to_str().unwrap())
        .replace("@OUT@", out.to_str().unwrap());
    let config: Config = toml::from_str(&raw).unwrap();
    Workspace {
        _dir: dir,
        config,
        out,
    }
}

#[tokio::test]
async fn full_run_provisions_publishes_and_executes() {
    let service = Arc::new(MemoryTransport::new("acme"));
    let ws = workspace("");

    let report = pipeline::run(service.clone(), &ws.config).await.unwrap();

    assert_eq!(report.package.qualified_name, "acme.UpdateParams+prod");
    assert_eq!(report.package.version, 1);
    assert_eq!(
        report.activity.qualified_name,
        "acme.UpdateParamsActivity+prod"
    );
    assert_eq!(report.jobs.len(), 1);
    let job = &report.jobs[0];
    assert_eq!(job.status, WorkItemStatus::Success);

    // Remote state: inputs uploaded, package archive stored, aliases set.
    assert_eq!(
        service.object_bytes("acme-inputs", "model.dat"),
        Some(b"model bytes".to_vec())
    );
    assert_eq!(
        service.package_archive("UpdateParams", 1),
        Some(b"plugin archive".to_vec())
    );
    assert_eq!(service.package_alias("UpdateParams", "prod"), Some(1));
    assert_eq!(
        service.activity_alias("UpdateParamsActivity", "prod"),
        Some(1)
    );

    // Local artifacts: execution report and the downloaded output.
    let report_path = job.report_path.as_ref().expect("report downloaded");
    assert_eq!(
        std::fs::read(report_path).unwrap(),
        b"work item report log"
    );
    assert_eq!(job.outputs, vec![ws.out.join("result-10.dat")]);
    assert_eq!(
        std::fs::read(&job.outputs[0]).unwrap(),
        b"engine output"
    );
}

#[tokio::test]
async fn rerun_keeps_storage_and_republishes_the_code() {
    let service = Arc::new(MemoryTransport::new("acme"));
    let ws = workspace("");

    pipeline::run(service.clone(), &ws.config).await.unwrap();
    let mutations_after_first = service.mutation_count();
    pipeline::run(service.clone(), &ws.config).await.unwrap();

    // Buckets and objects are found in place; only the package version,
    // its archive upload and the alias moves mutate on the second run
    // (and the same pair for the activity).
    assert_eq!(service.mutation_count(), mutations_after_first + 5);
    assert_eq!(service.package_version("UpdateParams"), Some(2));
    assert_eq!(service.package_alias("UpdateParams", "prod"), Some(2));
    assert_eq!(service.activity_version("UpdateParamsActivity"), Some(2));
    assert_eq!(
        service.activity_alias("UpdateParamsActivity", "prod"),
        Some(2)
    );
}

#[tokio::test]
async fn failed_job_saves_its_report_and_stops_the_run() {
    let service = Arc::new(MemoryTransport::new("acme"));
    let ws = workspace(SECOND_JOB);
    service.script_work_item(
        vec![
            PollStep::Status(WorkItemStatus::Inprogress),
            PollStep::Status(WorkItemStatus::Failed),
        ],
        true,
    );

    let err = pipeline::run(service.clone(), &ws.config)
        .await
        .unwrap_err();
    let source = err
        .downcast_ref::<da_core::Error>()
        .expect("failure carries the work item error");
    assert!(matches!(
        source,
        da_core::Error::WorkItemFailure {
            status: WorkItemStatus::Failed,
            ..
        }
    ));

    // The failure report landed, no output was downloaded, and the
    // second job was never submitted.
    assert!(ws.out.join("width-10-error-report.txt").exists());
    assert!(!ws.out.join("result-10.dat").exists());
    assert_eq!(service.submission_count(), 1);
}
