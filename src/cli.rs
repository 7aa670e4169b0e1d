use crate::config::{RunConfig, Toolchain};
use crate::constants::{DEFAULT_HOST, DEFAULT_HTTP_PORT, DEFAULT_PROXY_PORT};
use crate::error::Result;
use crate::port::allocate_free_port;
use clap::Parser;
use tracing::info;

/// What this invocation of the binary does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Supervise the HTTP and proxy services
    Normal,
    /// Run the in-process watch-and-serve loop (spawned by `--reload`)
    LiveReloadWorker,
    /// Install dependencies and the launcher, then exit
    Install,
}

/// devserve CLI application
#[derive(Parser, Debug)]
#[command(name = "devserve")]
#[command(about = "HTTP server and HTTPS proxy for local web development (both enabled by default)")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Do not start the HTTP server
    #[arg(short = 'H', long)]
    pub disable_http: bool,

    /// Do not start the HTTPS proxy
    #[arg(short = 'P', long)]
    pub disable_proxy: bool,

    /// HTTP port
    #[arg(short = 't', long, env = "DEVSERVE_HTTP_PORT", default_value_t = DEFAULT_HTTP_PORT)]
    pub http_port: u16,

    /// HTTPS proxy port
    #[arg(short = 'p', long, env = "DEVSERVE_PROXY_PORT", default_value_t = DEFAULT_PROXY_PORT)]
    pub proxy_port: u16,

    /// Use a random free port for HTTP
    #[arg(short = 'r', long)]
    pub random_http_port: bool,

    /// Use a random free port for the proxy
    #[arg(short = 's', long)]
    pub random_proxy_port: bool,

    /// Bind address shared by both services
    #[arg(short = 'b', long, env = "DEVSERVE_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Bind address for HTTP only
    #[arg(short = 'x', long)]
    pub http_host: Option<String>,

    /// Bind address for the proxy only
    #[arg(short = 'y', long)]
    pub proxy_host: Option<String>,

    /// Serve with live reload
    #[arg(short = 'R', long)]
    pub reload: bool,

    /// Print the commands, start nothing
    #[arg(short = 'd', long)]
    pub dry_run: bool,

    /// Open the site in the default browser after startup
    #[arg(short = 'o', long)]
    pub open: bool,

    /// Install dependencies and the devserve launcher, then exit
    #[arg(long)]
    pub install: bool,

    /// Debug logging
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Worker mode used by --reload
    #[arg(long, hide = true)]
    pub live_reload_worker: bool,
}

impl Cli {
    /// Operating mode selected by the flags
    pub fn mode(&self) -> Mode {
        if self.live_reload_worker {
            Mode::LiveReloadWorker
        } else if self.install {
            Mode::Install
        } else {
            Mode::Normal
        }
    }

    /// Resolve the flags into a run configuration, allocating random ports
    /// where requested
    pub fn run_config(&self) -> Result<RunConfig> {
        let http_port = if self.random_http_port {
            let port = allocate_free_port()?;
            info!(port, "allocated random HTTP port");
            port
        } else {
            self.http_port
        };
        let proxy_port = if self.random_proxy_port {
            let port = allocate_free_port()?;
            info!(port, "allocated random proxy port");
            port
        } else {
            self.proxy_port
        };

        Ok(RunConfig {
            http_enabled: !self.disable_http,
            proxy_enabled: !self.disable_proxy,
            http_host: self.http_host.clone().unwrap_or_else(|| self.host.clone()),
            http_port,
            proxy_host: self.proxy_host.clone().unwrap_or_else(|| self.host.clone()),
            proxy_port,
            reload: self.reload,
            dry_run: self.dry_run,
            open_browser: self.open,
            toolchain: Toolchain::from_env(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn short_flags_map_to_config() {
        let cli = Cli::try_parse_from([
            "devserve", "-P", "-t", "9000", "-b", "0.0.0.0", "-y", "localhost", "-R", "-d", "-o",
        ])
        .unwrap();
        assert_eq!(cli.mode(), Mode::Normal);

        let config = cli.run_config().unwrap();
        assert!(config.http_enabled);
        assert!(!config.proxy_enabled);
        assert_eq!(config.http_port, 9000);
        assert_eq!(config.http_host, "0.0.0.0");
        assert_eq!(config.proxy_host, "localhost");
        assert!(config.reload && config.dry_run && config.open_browser);
    }

    #[test]
    fn random_ports_override_explicit_ones() {
        let cli = Cli::try_parse_from(["devserve", "-t", "1", "-p", "2", "-r", "-s"]).unwrap();
        let config = cli.run_config().unwrap();
        assert_ne!(config.http_port, 1);
        assert_ne!(config.proxy_port, 2);
    }

    #[test]
    fn worker_flag_selects_worker_mode() {
        let cli = Cli::try_parse_from([
            "devserve",
            "--live-reload-worker",
            "--http-host",
            "127.0.0.2",
            "--http-port",
            "8123",
        ])
        .unwrap();
        assert_eq!(cli.mode(), Mode::LiveReloadWorker);
        assert_eq!(cli.http_host.as_deref(), Some("127.0.0.2"));
        assert_eq!(cli.http_port, 8123);
    }

    #[test]
    fn install_flag_selects_install_mode() {
        let cli = Cli::try_parse_from(["devserve", "--install"]).unwrap();
        assert_eq!(cli.mode(), Mode::Install);
    }

    #[test]
    fn worker_flag_is_hidden_from_help() {
        let help = Cli::command().render_long_help().to_string();
        assert!(!help.contains("live-reload-worker"));
        assert!(help.contains("--random-proxy-port"));
    }
}
