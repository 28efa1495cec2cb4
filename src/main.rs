//! Binary entry point for the volclone CLI.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use volclone::{
    CloneConfig, CloneError, CloneRequest, CloneWorkflow, DdCopier, Ec2Backend, Ec2Error,
    ImdsClient,
};

mod cli;

use cli::{Cli, CloneCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("clone failed: {0}")]
    Clone(#[from] CloneError<Ec2Error>),
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    match cli {
        Cli::Clone(command) => clone_command(command).await,
    }
}

async fn clone_command(args: CloneCommand) -> Result<i32, CliError> {
    let config =
        CloneConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    config
        .validate()
        .map_err(|err| CliError::Config(err.to_string()))?;

    let backend = Ec2Backend::with_process_runner(config.ec2_settings());
    let copier = DdCopier::with_process_runner(config.copier_settings());
    let identity = ImdsClient::new(&config.metadata_base_url);
    let workflow = CloneWorkflow::new(
        backend,
        copier,
        identity,
        config.clone_options(args.backup),
    );

    let request = CloneRequest {
        source_instance_id: args.instance_id,
        source_volume_id: args.volume_id,
        target_size_gib: args.new_size,
    };

    let report = workflow.run(&request).await?;
    let mut stdout = io::stdout();
    writeln!(stdout, "{}", report.new_volume_id).ok();
    if let Some(snapshot_id) = &report.snapshot_id {
        tracing::info!(snapshot_id, "backup snapshot retained");
    }
    tracing::info!(
        new_volume_id = %report.new_volume_id,
        device = %report.restored_device,
        "clone attached to the source instance"
    );

    Ok(0)
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
mod tests {
    use volclone::CloneStep;
    use volclone::workflow::{RequestError, StepFailure};

    use super::*;

    #[test]
    fn write_error_renders_the_failed_step() {
        let err = CliError::Clone(CloneError::Aborted {
            step: CloneStep::StopSource,
            source: StepFailure::Request(RequestError::ZeroSize),
        });
        let mut buf = Vec::new();
        write_error(&mut buf, &err);
        let rendered = String::from_utf8(buf).expect("utf8 output");
        assert!(rendered.contains("clone failed"), "rendered: {rendered}");
        assert!(rendered.contains("stop-source"), "rendered: {rendered}");
    }

    #[test]
    fn write_error_renders_config_errors() {
        let err = CliError::Config(String::from("missing provider CLI binary"));
        let mut buf = Vec::new();
        write_error(&mut buf, &err);
        let rendered = String::from_utf8(buf).expect("utf8 output");
        assert!(
            rendered.contains("configuration error"),
            "rendered: {rendered}"
        );
    }
}
