//! devserve
//!
//! Serves the current directory over HTTP for local web development, with an
//! optional HTTPS front-end (a TLS terminating proxy) and optional live reload.
//! The binary is a supervisor: it launches the configured child services, waits
//! for Ctrl-C and then stops and joins every child.

pub mod browser;
pub mod cli;
pub mod config;
pub mod error;
pub mod install;
pub mod launcher;
pub mod logging;
pub mod port;
pub mod reload;
pub mod service;
pub mod supervisor;

pub use config::{RunConfig, Toolchain};
pub use error::{DevServeError, Result};
pub use service::{ServiceHandle, ServiceKind, ServiceState};
pub use supervisor::{Supervisor, SupervisorState};

/// Application constants
pub mod constants {
    use std::time::Duration;

    /// Default port of the static HTTP service
    pub const DEFAULT_HTTP_PORT: u16 = 8080;

    /// Default port of the HTTPS proxy
    pub const DEFAULT_PROXY_PORT: u16 = 8443;

    /// Default bind address shared by both services
    pub const DEFAULT_HOST: &str = "127.0.0.1";

    /// Supervisor wait loop tick
    pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

    /// Delay before the browser is pointed at the site
    pub const BROWSER_OPEN_DELAY: Duration = Duration::from_secs(10);

    /// Quiet period the watcher waits for before reporting a change
    pub const WATCH_DEBOUNCE: Duration = Duration::from_millis(500);

    /// How long a live-reload client long-poll is held open
    pub const CHANGE_POLL_TIMEOUT: Duration = Duration::from_secs(30);

    /// npm package providing the TLS terminating proxy
    pub const PROXY_PACKAGE: &str = "local-ssl-proxy";

    /// Exit status when a second interrupt abandons shutdown (128 + SIGINT)
    pub const FORCED_EXIT_CODE: i32 = 130;

    /// Hidden flag that re-invokes the binary as the live-reload worker
    pub const LIVE_RELOAD_WORKER_FLAG: &str = "--live-reload-worker";
}
