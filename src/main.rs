use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use runscope_gcp::CloudLoggingProvider;
use runscope_logs::{
    CloudProviderOptions, FileLogProvider, LogTailer, MockLogProvider, TailConfig,
};

mod backend;
mod config;
mod output;

use backend::Backend;
use config::FileConfig;
use output::LineFormat;

/// Runscope - tail the logs of a managed compute service
#[derive(Parser, Debug)]
#[command(name = "runscope")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Service whose logs to follow
    #[arg(value_name = "SERVICE")]
    service: String,

    /// Cloud project id
    #[arg(long, env = "GCP_PROJECT")]
    project: Option<String>,

    /// Cloud region
    #[arg(long, env = "GCP_REGION")]
    region: Option<String>,

    /// Use generated logs instead of the cloud API
    #[arg(long, conflicts_with = "file")]
    mock: bool,

    /// Seed for generated logs (with --mock)
    #[arg(long, requires = "mock")]
    seed: Option<u64>,

    /// Tail a JSON-lines log file instead of the cloud API
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// Config file (defaults to ~/.runscope/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Show timestamps in local time
    #[arg(long)]
    local_time: bool,

    /// Log diagnostics at debug level to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Diagnostics go to stderr so stdout carries only the log stream
    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    let result = run(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run(args: Args) -> Result<()> {
    let file_config = FileConfig::load(args.config.as_deref())?;
    let tail_config = file_config.tail.apply(TailConfig::default());

    let project = args.project.clone().or(file_config.gcp.project);
    let region = args
        .region
        .clone()
        .or(file_config.gcp.region)
        .unwrap_or_default();

    let backend = select_backend(&args, project.as_deref())?;
    let mut opts = CloudProviderOptions::new(&args.service, region);
    if let Some(project) = project {
        opts = opts.with_project(project);
    }

    info!(service = %opts.source_id, backend = backend.label(), "tailing logs");
    let tailer = LogTailer::new(Arc::new(backend), opts, tail_config)
        .context("Invalid tail configuration")?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let mut tail = tailer.start(cancel.clone());
    let format = LineFormat {
        local_time: args.local_time,
    };
    let stdout = io::stdout();

    while let Some(entry) = tail.recv().await {
        let mut out = stdout.lock();
        if writeln!(out, "{}", format.format(&entry))
            .and_then(|_| out.flush())
            .is_err()
        {
            // stdout closed (e.g. piped into `head`)
            cancel.cancel();
            break;
        }
    }

    let summary = tail.join().await.context("Log tail task failed")?;
    debug!(?summary, "tail session finished");
    Ok(())
}

fn select_backend(args: &Args, project: Option<&str>) -> Result<Backend> {
    if args.mock {
        let provider = match args.seed {
            Some(seed) => MockLogProvider::seeded(&args.service, seed),
            None => MockLogProvider::new(&args.service),
        };
        return Ok(Backend::Mock(provider));
    }

    if let Some(path) = &args.file {
        if !path.exists() {
            bail!("Log file '{}' not found", path.display());
        }
        return Ok(Backend::File(FileLogProvider::new(path)));
    }

    let Some(project) = project else {
        bail!("Project ID is required. Set --project, GCP_PROJECT, or [gcp] project in the config file");
    };
    let provider = CloudLoggingProvider::new(project)
        .context("Failed to create Cloud Logging client")?;
    Ok(Backend::Cloud(provider))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from(["runscope", "api", "--mock", "--seed", "3"]).unwrap();
        assert_eq!(args.service, "api");
        assert!(args.mock);
        assert_eq!(args.seed, Some(3));
    }

    #[test]
    fn test_mock_and_file_conflict() {
        assert!(Args::try_parse_from(["runscope", "api", "--mock", "--file", "x.jsonl"]).is_err());
    }

    #[test]
    fn test_cloud_requires_project() {
        let args = Args::try_parse_from(["runscope", "api"]).unwrap();
        let err = select_backend(&args, None).err().unwrap();
        assert!(err.to_string().contains("Project ID is required"));
    }
}
