//! Child service processes
//!
//! A [`ServiceHandle`] owns one spawned child and tracks where it is in its
//! lifecycle, so the supervisor never has to guess whether a child started or
//! has already gone away.

use crate::error::{DevServeError, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use std::process::{Child, Command, ExitStatus, Stdio};
use tracing::{debug, info};

/// The services devserve can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    /// Static (or live-reload) HTTP server
    Http,
    /// TLS terminating proxy in front of the HTTP server
    Proxy,
}

impl ServiceKind {
    /// Start order used by the supervisor
    pub const ALL: [ServiceKind; 2] = [ServiceKind::Http, ServiceKind::Proxy];
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::Http => write!(f, "HTTP"),
            ServiceKind::Proxy => write!(f, "PROXY"),
        }
    }
}

/// Lifecycle state of a spawned service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Spawned and not yet asked to stop
    Running,
    /// Termination requested, exit not yet observed
    Terminated,
    /// Exit observed
    Exited,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::Running => write!(f, "running"),
            ServiceState::Terminated => write!(f, "terminated"),
            ServiceState::Exited => write!(f, "exited"),
        }
    }
}

/// A started child process
#[derive(Debug)]
pub struct ServiceHandle {
    kind: ServiceKind,
    child: Child,
    state: ServiceState,
    started_at: DateTime<Utc>,
    exit_status: Option<ExitStatus>,
}

impl ServiceHandle {
    /// Spawn `command` as the given service.
    ///
    /// On unix the child gets its own process group, so a terminal Ctrl-C
    /// reaches only the supervisor, which then relays termination itself.
    pub fn spawn(kind: ServiceKind, command: &mut Command) -> Result<Self> {
        command.stdin(Stdio::null());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let child = command.spawn().map_err(|source| DevServeError::Spawn {
            kind,
            program: command.get_program().to_string_lossy().into_owned(),
            source,
        })?;

        info!(kind = %kind, pid = child.id(), "service started");
        Ok(Self {
            kind,
            child,
            state: ServiceState::Running,
            started_at: Utc::now(),
            exit_status: None,
        })
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// Exit status, once the exit has been observed
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Request a graceful stop.
    ///
    /// Sends SIGTERM to the child's process group, falling back to the child
    /// itself. Never escalates to SIGKILL. A child that already exited is
    /// marked Exited instead.
    pub fn terminate(&mut self) -> Result<()> {
        if self.state != ServiceState::Running {
            return Ok(());
        }
        if self.poll_exit()?.is_some() {
            return Ok(());
        }

        let pid = self.pid();

        #[cfg(unix)]
        {
            use libc::{SIGTERM, kill};

            debug!(kind = %self.kind, pid, "sending SIGTERM to process group");
            let group_result = unsafe { kill(-(pid as i32), SIGTERM) };
            if group_result != 0 {
                debug!(kind = %self.kind, pid, "process group signal failed, signalling process");
                let process_result = unsafe { kill(pid as i32, SIGTERM) };
                if process_result != 0 {
                    let errno = std::io::Error::last_os_error();
                    // The child may have exited between the checks
                    if self.poll_exit()?.is_some() {
                        return Ok(());
                    }
                    return Err(DevServeError::Terminate {
                        kind: self.kind,
                        pid,
                        source: errno,
                    });
                }
            }
        }

        #[cfg(not(unix))]
        {
            // No graceful signal for a detached child here; kill is the closest equivalent
            if let Err(source) = self.child.kill() {
                if self.poll_exit()?.is_some() {
                    return Ok(());
                }
                return Err(DevServeError::Terminate {
                    kind: self.kind,
                    pid,
                    source,
                });
            }
        }

        self.state = ServiceState::Terminated;
        Ok(())
    }

    /// Check for exit without blocking
    pub fn poll_exit(&mut self) -> Result<Option<ExitStatus>> {
        if let Some(status) = self.exit_status {
            return Ok(Some(status));
        }
        match self.child.try_wait()? {
            Some(status) => {
                self.mark_exited(status);
                Ok(Some(status))
            }
            None => Ok(None),
        }
    }

    /// Block until the child exits. No timeout.
    pub fn wait(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.exit_status {
            return Ok(status);
        }
        let status = self.child.wait()?;
        self.mark_exited(status);
        Ok(status)
    }

    fn mark_exited(&mut self, status: ExitStatus) {
        let uptime = Utc::now().signed_duration_since(self.started_at);
        info!(
            kind = %self.kind,
            pid = self.child.id(),
            status = %status,
            uptime_secs = uptime.num_seconds(),
            "service exited"
        );
        self.exit_status = Some(status);
        self.state = ServiceState::Exited;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sleeper() -> ServiceHandle {
        let mut command = Command::new("sleep");
        command.arg("30");
        ServiceHandle::spawn(ServiceKind::Http, &mut command).unwrap()
    }

    #[test]
    fn terminate_then_wait_reaches_exited() {
        let mut handle = sleeper();
        assert_eq!(handle.state(), ServiceState::Running);

        handle.terminate().unwrap();
        assert_eq!(handle.state(), ServiceState::Terminated);

        let status = handle.wait().unwrap();
        assert!(!status.success());
        assert_eq!(handle.state(), ServiceState::Exited);
        assert_eq!(handle.exit_status(), Some(status));
    }

    #[test]
    fn terminate_after_exit_is_a_no_op() {
        let mut command = Command::new("true");
        let mut handle = ServiceHandle::spawn(ServiceKind::Proxy, &mut command).unwrap();
        handle.wait().unwrap();

        handle.terminate().unwrap();
        assert_eq!(handle.state(), ServiceState::Exited);
    }

    #[test]
    fn spawn_failure_names_the_program() {
        let mut command = Command::new("devserve-no-such-program");
        let err = ServiceHandle::spawn(ServiceKind::Proxy, &mut command).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("PROXY"));
        assert!(message.contains("devserve-no-such-program"));
    }
}
