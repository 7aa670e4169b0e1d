use clap::Parser;
use devserve::cli::{Cli, Mode};
use devserve::config::Toolchain;
use devserve::supervisor::{Supervisor, install_interrupt_handler};
use devserve::{install, logging, reload};
use std::process::ExitCode;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.mode() {
        Mode::LiveReloadWorker => {
            let host = cli.http_host.clone().unwrap_or_else(|| cli.host.clone());
            reload::run_watch_and_serve(&host, cli.http_port).await;
            ExitCode::SUCCESS
        }
        Mode::Install => {
            let report = install::run_install(&Toolchain::from_env());
            report.print();
            ExitCode::SUCCESS
        }
        Mode::Normal => match tokio::task::spawn_blocking(move || supervise(&cli)).await {
            Ok(code) => code,
            Err(e) => {
                error!(error = %e, "supervisor thread failed");
                ExitCode::FAILURE
            }
        },
    }
}

/// Start the configured services and block until they are stopped
fn supervise(cli: &Cli) -> ExitCode {
    let config = match cli.run_config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "startup failed");
            return ExitCode::FAILURE;
        }
    };

    let interrupted = match install_interrupt_handler() {
        Ok(flag) => flag,
        Err(e) => {
            error!(error = %e, "startup failed");
            return ExitCode::FAILURE;
        }
    };

    Supervisor::new(&config, interrupted).run();
    ExitCode::SUCCESS
}
