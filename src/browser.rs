//! Best-effort browser launching

use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{info, warn};

/// Open `url` with the platform's default handler. Failures are only logged.
pub fn open_url(url: &str) {
    open_with(url, webbrowser::open);
}

fn open_with<F>(url: &str, opener: F) -> bool
where
    F: FnOnce(&str) -> io::Result<()>,
{
    println!("🌐 Opening {}", url);
    match opener(url) {
        Ok(()) => {
            info!(url, "browser opened");
            true
        }
        Err(e) => {
            warn!(url, error = %e, "could not open browser");
            false
        }
    }
}

/// Open `url` after `delay` on a background thread.
///
/// The delay gives the services time to start listening. It is a fixed wait,
/// not a readiness probe.
pub fn schedule_open(url: String, delay: Duration) -> Option<JoinHandle<()>> {
    schedule_open_with(url, delay, webbrowser::open)
}

fn schedule_open_with<F>(url: String, delay: Duration, opener: F) -> Option<JoinHandle<()>>
where
    F: FnOnce(&str) -> io::Result<()> + Send + 'static,
{
    let spawned = thread::Builder::new()
        .name("browser-opener".to_string())
        .spawn(move || {
            thread::sleep(delay);
            open_with(&url, opener);
        });

    match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "could not schedule browser launch");
            None
        }
    }
}
