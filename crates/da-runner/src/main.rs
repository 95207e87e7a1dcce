use clap::Parser;
use da_client::HttpTransport;
use da_runner::{config, pipeline};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Provisions cloud storage, publishes the plugin package and its
/// activity, then runs the configured jobs to completion.
#[derive(Debug, Parser)]
#[command(name = "da-runner", version)]
struct Cli {
    /// Path to the run configuration.
    #[arg(long, default_value = "da.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match config::load_from(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!(error = ?e, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let transport = Arc::new(HttpTransport::new());
    match pipeline::run(transport, &config).await {
        Ok(report) => {
            for job in &report.jobs {
                info!(
                    job = job.name,
                    work_item = job.work_item_id,
                    status = %job.status,
                    outputs = job.outputs.len(),
                    "job summary"
                );
            }
            info!(
                package = report.package.qualified_name,
                activity = report.activity.qualified_name,
                jobs = report.jobs.len(),
                "run complete"
            );
        }
        Err(e) => {
            error!(error = ?e, "run failed");
            std::process::exit(1);
        }
    }
}
