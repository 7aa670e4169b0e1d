use crate::service::ServiceKind;
use thiserror::Error;

/// Errors raised by devserve components
#[derive(Debug, Error)]
pub enum DevServeError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The OS refused to hand out an ephemeral port
    #[error("could not allocate a free port: {0}")]
    PortAllocation(#[source] std::io::Error),

    /// A service process could not be spawned
    #[error("failed to start {kind} service '{program}': {source}")]
    Spawn {
        kind: ServiceKind,
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A termination request could not be delivered
    #[error("failed to signal {kind} service (pid {pid}): {source}")]
    Terminate {
        kind: ServiceKind,
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    /// Interrupt handler registration failed
    #[error("could not install interrupt handler: {0}")]
    Signal(#[from] ctrlc::Error),

    /// File watcher unavailable
    #[error("file watcher unavailable: {0}")]
    Watch(#[from] notify::Error),

    /// Listener could not bind
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The running executable could not be located
    #[error("cannot locate own executable: {0}")]
    CurrentExe(#[source] std::io::Error),

    /// An installer step failed
    #[error("install step '{step}' failed: {message}")]
    Install { step: &'static str, message: String },
}

/// Result type alias for devserve operations
pub type Result<T> = std::result::Result<T, DevServeError>;
