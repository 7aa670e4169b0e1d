//! Live-reload worker
//!
//! Serves a directory tree over HTTP with caching disabled and reloads open
//! pages when files change. HTML responses get a small script injected that
//! long-polls [`CHANGES_PATH`]; the request completes after the debounced
//! watcher reports a change and the page reloads itself.

use crate::constants::{CHANGE_POLL_TIMEOUT, WATCH_DEBOUNCE};
use crate::error::{DevServeError, Result};
use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{self, HeaderValue};
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use notify::RecursiveMode;
use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::{self, error::RecvError};
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tracing::{debug, error, info, warn};

type Body = UnsyncBoxBody<Bytes, std::io::Error>;

/// Path of the injected client script
pub const SCRIPT_PATH: &str = "/__devserve/livereload.js";

/// Long-poll endpoint that completes on the next change
pub const CHANGES_PATH: &str = "/__devserve/changes";

const SCRIPT_TAG: &str = "<script src=\"/__devserve/livereload.js\"></script>";

const RELOAD_SCRIPT: &str = r#"(function () {
  function poll() {
    fetch("/__devserve/changes", { cache: "no-store" })
      .then(function (res) {
        if (res.status === 200) {
          window.location.reload();
        } else if (res.status === 204) {
          poll();
        } else {
          setTimeout(poll, 1000);
        }
      })
      .catch(function () {
        setTimeout(poll, 1000);
      });
  }
  poll();
})();
"#;

/// Handle for pushing a reload to connected pages
#[derive(Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<()>,
}

impl ChangeNotifier {
    pub fn notify(&self) {
        // No receivers just means no page is open
        let _ = self.tx.send(());
    }
}

/// A bound live-reload server, watching its root
pub struct ReloadServer {
    listener: TcpListener,
    root: PathBuf,
    changes: broadcast::Sender<()>,
    _watcher: Debouncer<notify::RecommendedWatcher>,
}

impl ReloadServer {
    /// Bind `host:port` and start watching `root`.
    ///
    /// A taken port is reported as [`DevServeError::Bind`], a missing watch
    /// capability as [`DevServeError::Watch`].
    pub async fn bind(root: impl Into<PathBuf>, host: &str, port: u16) -> Result<Self> {
        let root = root.into();
        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|source| DevServeError::Bind {
                addr: format!("{}:{}", host, port),
                source,
            })?;

        let (changes, _) = broadcast::channel(16);
        let watcher = watch_tree(&root, ChangeNotifier { tx: changes.clone() })?;

        Ok(Self {
            listener,
            root,
            changes,
            _watcher: watcher,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    #[cfg(test)]
    fn notifier(&self) -> ChangeNotifier {
        ChangeNotifier {
            tx: self.changes.clone(),
        }
    }

    /// Accept connections until `shutdown` completes
    pub async fn serve_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let state = Arc::new(ServeState {
            files: ServeDir::new(&self.root),
            changes: self.changes.clone(),
        });
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let state = Arc::clone(&state);
                            tokio::spawn(async move {
                                if let Err(e) = serve_connection(stream, state).await {
                                    debug!(addr = %addr, error = %e, "connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("live reload server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Watch the current directory and serve it on `host:port` until interrupted.
///
/// Every failure is logged and ends the call; nothing is propagated.
pub async fn run_watch_and_serve(host: &str, port: u16) {
    let server = match ReloadServer::bind(".", host, port).await {
        Ok(server) => server,
        Err(DevServeError::Watch(e)) => {
            error!(error = %e, "live reload is unavailable on this system");
            return;
        }
        Err(e) => {
            error!(error = %e, "cannot serve on {}:{}", host, port);
            return;
        }
    };

    let addr = match server.local_addr() {
        Ok(addr) => addr.to_string(),
        Err(_) => format!("{}:{}", host, port),
    };
    println!("🔄 Starting live reload server on http://{}", addr);
    if let Err(e) = server.serve_until(shutdown_signal()).await {
        error!(error = %e, "live reload server failed");
    }
}

fn watch_tree(root: &Path, notifier: ChangeNotifier) -> Result<Debouncer<notify::RecommendedWatcher>> {
    let mut debouncer = new_debouncer(WATCH_DEBOUNCE, move |result: DebounceEventResult| match result {
        Ok(events) => {
            let changed: Vec<_> = events.iter().filter(|event| !is_ignored(&event.path)).collect();
            if changed.is_empty() {
                return;
            }
            for event in &changed {
                debug!(path = %event.path.display(), "change detected");
            }
            info!(files = changed.len(), "reloading clients");
            notifier.notify();
        }
        Err(e) => warn!(error = ?e, "watch error"),
    })?;

    debouncer.watcher().watch(root, RecursiveMode::Recursive)?;
    Ok(debouncer)
}

fn is_ignored(path: &Path) -> bool {
    path.components()
        .any(|component| matches!(component, Component::Normal(name) if name == ".git"))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("live reload server interrupted"),
        _ = terminate => info!("live reload server terminated"),
    }
}

struct ServeState {
    files: ServeDir,
    changes: broadcast::Sender<()>,
}

impl ServeState {
    async fn handle(&self, req: Request<Incoming>) -> std::result::Result<Response<Body>, Infallible> {
        let response = match (req.method(), req.uri().path()) {
            (&Method::GET, SCRIPT_PATH) => {
                full(StatusCode::OK, "application/javascript; charset=utf-8", RELOAD_SCRIPT)
            }
            (&Method::GET, CHANGES_PATH) => self.wait_for_change().await,
            _ => self.serve_file(req).await,
        };
        Ok(disable_caching(response))
    }

    async fn wait_for_change(&self) -> Response<Body> {
        let mut rx = self.changes.subscribe();
        match tokio::time::timeout(CHANGE_POLL_TIMEOUT, rx.recv()).await {
            Ok(Ok(())) | Ok(Err(RecvError::Lagged(_))) => {
                full(StatusCode::OK, "text/plain; charset=utf-8", "reload")
            }
            Ok(Err(RecvError::Closed)) => {
                full(StatusCode::SERVICE_UNAVAILABLE, "text/plain; charset=utf-8", "watcher stopped")
            }
            Err(_) => full(StatusCode::NO_CONTENT, "text/plain; charset=utf-8", Bytes::new()),
        }
    }

    async fn serve_file(&self, mut req: Request<Incoming>) -> Response<Body> {
        // Always send the full file, never 304
        req.headers_mut().remove(header::IF_NONE_MATCH);
        req.headers_mut().remove(header::IF_MODIFIED_SINCE);
        let head = req.method() == Method::HEAD;

        let response = match self.files.clone().oneshot(req).await {
            Ok(response) => response,
            Err(never) => match never {},
        };

        // HEAD carries no body to rewrite, so its length stays the file's
        if head || response.status() != StatusCode::OK || !is_html(&response) {
            return response.map(|body| body.boxed_unsync());
        }

        let (mut parts, body) = response.into_parts();
        let html = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!(error = %e, "failed to read HTML file");
                return full(StatusCode::INTERNAL_SERVER_ERROR, "text/plain; charset=utf-8", "read error");
            }
        };

        let injected = inject_reload_script(&html);
        parts.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(injected.len()));
        Response::from_parts(parts, full_body(injected))
    }
}

async fn serve_connection(
    stream: TcpStream,
    state: Arc<ServeState>,
) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req: Request<Incoming>| {
        let state = Arc::clone(&state);
        async move { state.handle(req).await }
    });

    AutoBuilder::new(TokioExecutor::new())
        .serve_connection(io, service)
        .await
}

fn is_html<B>(response: &Response<B>) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/html"))
}

/// Insert the reload script before the last `</body>`, or append it
pub fn inject_reload_script(html: &[u8]) -> Vec<u8> {
    let lower = html.to_ascii_lowercase();
    let at = lower
        .windows(b"</body>".len())
        .rposition(|window| window == b"</body>")
        .unwrap_or(html.len());

    let mut out = Vec::with_capacity(html.len() + SCRIPT_TAG.len());
    out.extend_from_slice(&html[..at]);
    out.extend_from_slice(SCRIPT_TAG.as_bytes());
    out.extend_from_slice(&html[at..]);
    out
}

fn disable_caching(mut response: Response<Body>) -> Response<Body> {
    let headers = response.headers_mut();
    headers.remove(header::ETAG);
    headers.remove(header::LAST_MODIFIED);
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate, max-age=0"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    response
}

fn full_body(bytes: impl Into<Bytes>) -> Body {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

fn full(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Body> {
    let mut response = Response::new(full_body(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
