//! Process supervisor
//!
//! Starts the configured services, idles until an interrupt arrives and then
//! stops and joins every child it started.
//!
//! ```text
//! Idle -> Starting -> Running -> ShuttingDown -> Stopped
//!                 \___________________________/
//!                   (nothing started)
//! ```

use crate::browser;
use crate::config::RunConfig;
use crate::constants::{BROWSER_OPEN_DELAY, FORCED_EXIT_CODE, POLL_INTERVAL};
use crate::error::Result;
use crate::launcher;
use crate::service::{ServiceHandle, ServiceKind, ServiceState};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Supervisor lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

/// What a delivered interrupt asks the supervisor to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InterruptAction {
    /// First interrupt: stop services gracefully
    Stop,
    /// Interrupt during shutdown: give up on the children and exit
    ForceExit,
}

fn on_interrupt(flag: &AtomicBool) -> InterruptAction {
    if flag.swap(true, Ordering::SeqCst) {
        InterruptAction::ForceExit
    } else {
        InterruptAction::Stop
    }
}

/// Install a Ctrl-C / SIGTERM handler that raises the returned flag.
///
/// A second interrupt ends the process immediately, leaving any child that
/// ignored its termination request running.
pub fn install_interrupt_handler() -> Result<Arc<AtomicBool>> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        if on_interrupt(&flag) == InterruptAction::ForceExit {
            warn!("interrupted again, exiting without waiting for services");
            eprintln!("Interrupted again, exiting without waiting for services.");
            std::process::exit(FORCED_EXIT_CODE);
        }
    })?;
    Ok(interrupted)
}

/// Owns every started service for the lifetime of a run
pub struct Supervisor<'a> {
    config: &'a RunConfig,
    state: SupervisorState,
    active: Vec<ServiceHandle>,
    interrupted: Arc<AtomicBool>,
    poll_interval: Duration,
    browser: Option<JoinHandle<()>>,
}

impl<'a> Supervisor<'a> {
    /// Create a supervisor observing `interrupted` as its stop signal
    pub fn new(config: &'a RunConfig, interrupted: Arc<AtomicBool>) -> Self {
        Self {
            config,
            state: SupervisorState::Idle,
            active: Vec::new(),
            interrupted,
            poll_interval: POLL_INTERVAL,
            browser: None,
        }
    }

    /// Override the wait loop tick
    #[cfg(test)]
    fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Services started during this run, in start order
    pub fn services(&self) -> &[ServiceHandle] {
        &self.active
    }

    /// Take ownership of a service spawned outside the launcher
    #[cfg(test)]
    fn adopt(&mut self, handle: ServiceHandle) {
        self.active.push(handle);
    }

    #[cfg(test)]
    fn browser_scheduled(&self) -> bool {
        self.browser.is_some()
    }

    /// Run the full lifecycle. Returns once every started child has exited.
    pub fn run(&mut self) {
        self.start_services();

        if self.active.is_empty() {
            info!("no services running, nothing to supervise");
            self.state = SupervisorState::Stopped;
            return;
        }

        self.print_banner();
        if self.config.open_browser {
            self.browser = browser::schedule_open(self.config.browser_url(), BROWSER_OPEN_DELAY);
        }

        self.wait_for_interrupt();
        self.shutdown();
    }

    fn start_services(&mut self) {
        self.state = SupervisorState::Starting;
        for kind in ServiceKind::ALL {
            if let Some(handle) = launcher::start_service(kind, self.config) {
                self.active.push(handle);
            }
        }
        debug!(count = self.active.len(), "services started");
    }

    fn print_banner(&self) {
        for handle in &self.active {
            println!(
                "🟢 {} on {} (pid {})",
                handle.kind(),
                self.config.service_url(handle.kind()),
                handle.pid()
            );
        }
        println!("Press Ctrl-C to stop.");
    }

    fn wait_for_interrupt(&mut self) {
        self.state = SupervisorState::Running;
        while !self.interrupted.load(Ordering::SeqCst) {
            thread::sleep(self.poll_interval);
            self.reap_exited();
        }
    }

    /// Record children that exited on their own
    fn reap_exited(&mut self) {
        for handle in &mut self.active {
            if handle.state() != ServiceState::Running {
                continue;
            }
            match handle.poll_exit() {
                Ok(Some(status)) => {
                    warn!(kind = %handle.kind(), status = %status, "service stopped unexpectedly");
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(kind = %handle.kind(), error = %e, "could not poll service");
                }
            }
        }
    }

    fn shutdown(&mut self) {
        self.state = SupervisorState::ShuttingDown;
        println!("🛑 Stopping services...");

        for handle in &mut self.active {
            if let Err(e) = handle.terminate() {
                warn!(kind = %handle.kind(), error = %e, "termination request failed");
            }
        }

        for handle in &mut self.active {
            match handle.wait() {
                Ok(status) => debug!(kind = %handle.kind(), status = %status, "service joined"),
                Err(e) => warn!(kind = %handle.kind(), error = %e, "waiting for service failed"),
            }
        }

        if let Some(opener) = &self.browser {
            if !opener.is_finished() {
                debug!("browser launch still pending, leaving it detached");
            }
        }

        self.state = SupervisorState::Stopped;
        info!("all services stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disabled() -> RunConfig {
        RunConfig {
            http_enabled: false,
            proxy_enabled: false,
            ..RunConfig::default()
        }
    }

    #[test]
    fn nothing_configured_stops_immediately() {
        let config = RunConfig {
            open_browser: true,
            ..disabled()
        };
        let mut supervisor = Supervisor::new(&config, Arc::new(AtomicBool::new(false)));
        assert_eq!(supervisor.state(), SupervisorState::Idle);

        supervisor.run();
        assert_eq!(supervisor.state(), SupervisorState::Stopped);
        assert!(supervisor.services().is_empty());
        assert!(!supervisor.browser_scheduled());
    }

    #[test]
    fn second_interrupt_forces_exit() {
        let flag = AtomicBool::new(false);
        assert_eq!(on_interrupt(&flag), InterruptAction::Stop);
        assert!(flag.load(Ordering::SeqCst));
        assert_eq!(on_interrupt(&flag), InterruptAction::ForceExit);
        assert_eq!(on_interrupt(&flag), InterruptAction::ForceExit);
    }

    #[test]
    fn dry_run_stops_without_children() {
        let config = RunConfig {
            dry_run: true,
            reload: true,
            open_browser: true,
            ..RunConfig::default()
        };
        let mut supervisor = Supervisor::new(&config, Arc::new(AtomicBool::new(false)));
        supervisor.run();
        assert_eq!(supervisor.state(), SupervisorState::Stopped);
        assert!(supervisor.services().is_empty());
        assert!(!supervisor.browser_scheduled());
    }

    #[cfg(unix)]
    #[test]
    fn interrupt_terminates_and_joins_every_child() {
        use std::process::Command;

        let config = disabled();
        let interrupted = Arc::new(AtomicBool::new(false));
        let mut supervisor = Supervisor::new(&config, Arc::clone(&interrupted))
            .with_poll_interval(Duration::from_millis(10));

        for kind in ServiceKind::ALL {
            let mut command = Command::new("sleep");
            command.arg("30");
            supervisor.adopt(ServiceHandle::spawn(kind, &mut command).unwrap());
        }

        let trigger = {
            let interrupted = Arc::clone(&interrupted);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));
                interrupted.store(true, Ordering::SeqCst);
            })
        };

        supervisor.run();
        trigger.join().unwrap();

        assert_eq!(supervisor.state(), SupervisorState::Stopped);
        assert_eq!(supervisor.services().len(), 2);
        for handle in supervisor.services() {
            assert_eq!(handle.state(), ServiceState::Exited);
            assert!(handle.exit_status().is_some());
        }
    }

    #[cfg(unix)]
    #[test]
    fn child_that_exits_early_is_reaped_before_shutdown() {
        use std::process::Command;

        let config = disabled();
        let interrupted = Arc::new(AtomicBool::new(false));
        let mut supervisor = Supervisor::new(&config, Arc::clone(&interrupted))
            .with_poll_interval(Duration::from_millis(10));

        let mut quick = Command::new("true");
        supervisor.adopt(ServiceHandle::spawn(ServiceKind::Http, &mut quick).unwrap());

        let trigger = {
            let interrupted = Arc::clone(&interrupted);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(200));
                interrupted.store(true, Ordering::SeqCst);
            })
        };

        supervisor.run();
        trigger.join().unwrap();

        let handle = &supervisor.services()[0];
        assert_eq!(handle.state(), ServiceState::Exited);
        assert!(handle.exit_status().unwrap().success());
    }
}
