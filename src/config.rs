//! Run configuration for devserve
//!
//! Everything a run needs is resolved once from the command line into a
//! [`RunConfig`] and handed to each component by reference.

use crate::constants::{DEFAULT_HOST, DEFAULT_HTTP_PORT, DEFAULT_PROXY_PORT};
use crate::service::ServiceKind;
use std::env;

/// External programs the launcher and installer invoke
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    /// Python interpreter providing `http.server`
    pub python: String,
    /// npx, used to run the TLS proxy package
    pub npx: String,
    /// npm, used by the installer to prefetch the proxy package
    pub npm: String,
    /// PowerShell wrapper for npx on Windows
    pub npx_ps1: String,
}

impl Toolchain {
    /// Platform defaults, overridden by `DEVSERVE_PYTHON`, `DEVSERVE_NPX`,
    /// `DEVSERVE_NPM` and `DEVSERVE_NPX_PS1`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            python: env::var("DEVSERVE_PYTHON").unwrap_or(defaults.python),
            npx: env::var("DEVSERVE_NPX").unwrap_or(defaults.npx),
            npm: env::var("DEVSERVE_NPM").unwrap_or(defaults.npm),
            npx_ps1: env::var("DEVSERVE_NPX_PS1").unwrap_or(defaults.npx_ps1),
        }
    }
}

impl Default for Toolchain {
    fn default() -> Self {
        if cfg!(windows) {
            Self {
                python: "python".to_string(),
                npx: "npx.cmd".to_string(),
                npm: "npm.cmd".to_string(),
                npx_ps1: r"C:\Program Files\nodejs\npx.ps1".to_string(),
            }
        } else {
            Self {
                python: "python3".to_string(),
                npx: "npx".to_string(),
                npm: "npm".to_string(),
                npx_ps1: String::new(),
            }
        }
    }
}

/// Immutable configuration of one devserve run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub http_enabled: bool,
    pub proxy_enabled: bool,
    pub http_host: String,
    pub http_port: u16,
    pub proxy_host: String,
    pub proxy_port: u16,
    /// Serve through the live-reload worker instead of the static server
    pub reload: bool,
    /// Print commands instead of spawning them
    pub dry_run: bool,
    pub open_browser: bool,
    pub toolchain: Toolchain,
}

impl RunConfig {
    /// Whether the given service should be started at all
    pub fn is_enabled(&self, kind: ServiceKind) -> bool {
        match kind {
            ServiceKind::Http => self.http_enabled,
            ServiceKind::Proxy => self.proxy_enabled,
        }
    }

    /// Whether any service is configured to run
    pub fn any_enabled(&self) -> bool {
        self.http_enabled || self.proxy_enabled
    }

    /// Public URL of a service
    pub fn service_url(&self, kind: ServiceKind) -> String {
        match kind {
            ServiceKind::Http => format!("http://{}:{}/", self.http_host, self.http_port),
            ServiceKind::Proxy => format!("https://{}:{}/", self.proxy_host, self.proxy_port),
        }
    }

    /// URL the browser is pointed at: the proxy when it runs, plain HTTP otherwise
    pub fn browser_url(&self) -> String {
        if self.proxy_enabled {
            self.service_url(ServiceKind::Proxy)
        } else {
            self.service_url(ServiceKind::Http)
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            http_enabled: true,
            proxy_enabled: true,
            http_host: DEFAULT_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            proxy_host: DEFAULT_HOST.to_string(),
            proxy_port: DEFAULT_PROXY_PORT,
            reload: false,
            dry_run: false,
            open_browser: false,
            toolchain: Toolchain::default(),
        }
    }
}
