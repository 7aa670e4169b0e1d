//! Service launcher
//!
//! Turns a [`ServiceKind`] and the run configuration into a concrete command
//! line and starts it. Failures stop at this boundary: the caller only learns
//! whether a service is running.

use crate::config::RunConfig;
use crate::constants::{LIVE_RELOAD_WORKER_FLAG, PROXY_PACKAGE};
use crate::error::{DevServeError, Result};
use crate::service::{ServiceHandle, ServiceKind};
use std::fmt;
use std::io::{self, Write};
use std::process::Command;
use tracing::{info, warn};

/// A fully composed command line for one service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ServiceCommand {
    fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Build the `std::process::Command` for this line
    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl fmt::Display for ServiceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words = std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str));
        write!(f, "{}", shell_words::join(words))
    }
}

/// Compose the command line for a service without running anything
pub fn compose(kind: ServiceKind, config: &RunConfig) -> Result<ServiceCommand> {
    match kind {
        ServiceKind::Http if config.reload => {
            let exe = std::env::current_exe().map_err(DevServeError::CurrentExe)?;
            Ok(ServiceCommand::new(exe.to_string_lossy())
                .arg(LIVE_RELOAD_WORKER_FLAG)
                .arg("--http-host")
                .arg(&config.http_host)
                .arg("--http-port")
                .arg(config.http_port.to_string()))
        }
        ServiceKind::Http => Ok(ServiceCommand::new(&config.toolchain.python)
            .arg("-m")
            .arg("http.server")
            .arg(config.http_port.to_string())
            .arg("--bind")
            .arg(&config.http_host)),
        ServiceKind::Proxy => {
            let launcher = if cfg!(windows) {
                ServiceCommand::new("powershell.exe")
                    .arg("-NoProfile")
                    .arg("-ExecutionPolicy")
                    .arg("Bypass")
                    .arg("-File")
                    .arg(&config.toolchain.npx_ps1)
            } else {
                ServiceCommand::new(&config.toolchain.npx)
            };
            Ok(launcher
                .arg("--yes")
                .arg(PROXY_PACKAGE)
                .arg("--source")
                .arg(config.proxy_port.to_string())
                .arg("--target")
                .arg(config.http_port.to_string())
                .arg("--hostname")
                .arg(&config.proxy_host))
        }
    }
}

/// The underlying cause of a start failure, without the error's own prefix
fn failure_cause(e: &DevServeError) -> String {
    match e {
        DevServeError::Spawn { source, .. } | DevServeError::CurrentExe(source) => source.to_string(),
        other => other.to_string(),
    }
}

/// Start a service, printing dry-run output to stdout
pub fn start_service(kind: ServiceKind, config: &RunConfig) -> Option<ServiceHandle> {
    start_service_with_output(kind, config, &mut io::stdout())
}

/// Start a service, writing dry-run output to `out`.
///
/// Returns `None` when the service is disabled, when this is a dry run, or
/// when it could not be started. Start failures are logged, never returned.
pub fn start_service_with_output<W: Write>(
    kind: ServiceKind,
    config: &RunConfig,
    out: &mut W,
) -> Option<ServiceHandle> {
    if !config.is_enabled(kind) {
        return None;
    }

    let line = match compose(kind, config) {
        Ok(line) => line,
        Err(e) => {
            warn!(kind = %kind, "failed to start {} service: {}", kind, failure_cause(&e));
            return None;
        }
    };

    if kind == ServiceKind::Http {
        let flavour = if config.reload { "live-reload" } else { "standard" };
        info!(kind = %kind, "using {} HTTP server", flavour);
    }

    if config.dry_run {
        if let Err(e) = writeln!(out, "DRY-RUN {}: {}", kind, line) {
            warn!(kind = %kind, error = %e, "could not write dry-run command");
        }
        return None;
    }

    match ServiceHandle::spawn(kind, &mut line.to_command()) {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(kind = %kind, command = %line, "failed to start {} service: {}", kind, failure_cause(&e));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Toolchain;

    fn http_only() -> RunConfig {
        RunConfig {
            proxy_enabled: false,
            ..RunConfig::default()
        }
    }

    #[test]
    fn static_server_binds_host_and_port() {
        let line = compose(ServiceKind::Http, &http_only()).unwrap();
        assert_eq!(line.args, ["-m", "http.server", "8080", "--bind", "127.0.0.1"]);
    }

    #[test]
    fn reload_mode_reinvokes_own_binary_as_worker() {
        let config = RunConfig {
            reload: true,
            http_port: 9001,
            ..http_only()
        };
        let line = compose(ServiceKind::Http, &config).unwrap();
        let exe = std::env::current_exe().unwrap();
        assert_eq!(line.program, exe.to_string_lossy());
        assert_eq!(
            line.args,
            [LIVE_RELOAD_WORKER_FLAG, "--http-host", "127.0.0.1", "--http-port", "9001"]
        );
    }

    #[test]
    fn proxy_points_at_http_port() {
        let config = RunConfig {
            http_port: 3000,
            proxy_port: 3443,
            proxy_host: "localhost".to_string(),
            ..RunConfig::default()
        };
        let line = compose(ServiceKind::Proxy, &config).unwrap();
        let rendered = line.to_string();
        assert!(rendered.contains("--yes local-ssl-proxy"));
        assert!(rendered.contains("--source 3443"));
        assert!(rendered.contains("--target 3000"));
        assert!(rendered.ends_with("--hostname localhost"));
    }

    #[test]
    fn rendering_quotes_arguments_with_spaces() {
        let line = ServiceCommand::new("/opt/my tools/python").arg("-m");
        assert_eq!(line.to_string(), "'/opt/my tools/python' -m");
    }

    #[test]
    fn disabled_service_is_silent() {
        let config = RunConfig {
            http_enabled: false,
            proxy_enabled: false,
            ..RunConfig::default()
        };
        let mut out = Vec::new();
        assert!(start_service_with_output(ServiceKind::Http, &config, &mut out).is_none());
        assert!(start_service_with_output(ServiceKind::Proxy, &config, &mut out).is_none());
        assert!(out.is_empty());
    }

    #[test]
    fn dry_run_prints_instead_of_spawning() {
        let config = RunConfig {
            dry_run: true,
            ..http_only()
        };
        let mut out = Vec::new();
        assert!(start_service_with_output(ServiceKind::Http, &config, &mut out).is_none());
        assert!(start_service_with_output(ServiceKind::Proxy, &config, &mut out).is_none());

        let printed = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = printed.lines().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("DRY-RUN HTTP: "));
        assert!(lines[0].ends_with("-m http.server 8080 --bind 127.0.0.1"));
    }

    #[test]
    fn spawn_failure_is_contained() {
        let config = RunConfig {
            toolchain: Toolchain {
                python: "devserve-missing-python".to_string(),
                ..Toolchain::default()
            },
            ..http_only()
        };
        let mut out = Vec::new();
        assert!(start_service_with_output(ServiceKind::Http, &config, &mut out).is_none());
        assert!(out.is_empty());
    }

    #[test]
    fn start_failure_cause_is_not_prefixed_twice() {
        let mut command = Command::new("devserve-missing-python");
        let err = ServiceHandle::spawn(ServiceKind::Http, &mut command).unwrap_err();
        assert!(err.to_string().starts_with("failed to start HTTP service"));

        let cause = failure_cause(&err);
        assert!(!cause.contains("failed to start"), "{cause}");
        assert!(!cause.is_empty());
    }
}
