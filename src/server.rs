//! Loopback content server.
//!
//! Serves the request directory over HTTP so asset URLs resolve the way they
//! would on a deployed origin. One server per request; it stops when
//! cancelled, when [`ContentServer::stop`] is called, or on drop.

use crate::cancel::LinkedToken;
use crate::diagnostics::{Channel, DiagnosticsLog, Severity};
use crate::{Error, Result};
use log::{debug, info, warn};
use percent_encoding::percent_decode_str;
use std::fs::File;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tiny_http::{Header, Method, Request, Response, Server};

const ACCEPT_SLICE: Duration = Duration::from_millis(50);

pub struct ContentServer {
    server: Arc<Server>,
    port: u16,
    token: LinkedToken,
    handle: Option<JoinHandle<()>>,
}

impl ContentServer {
    /// Bind `127.0.0.1:port` (0 picks a free port) and start serving `root`.
    pub fn start(root: impl Into<PathBuf>, port: u16, diagnostics: DiagnosticsLog, token: LinkedToken) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::ServerStartError(format!("{} is not a directory", root.display())));
        }

        let listener = TcpListener::bind(("127.0.0.1", port))
            .map_err(|e| Error::ServerStartError(format!("cannot bind 127.0.0.1:{}: {}", port, e)))?;
        let port = listener
            .local_addr()
            .map_err(|e| Error::ServerStartError(e.to_string()))?
            .port();
        let server = Server::from_listener(listener, None).map_err(|e| Error::ServerStartError(e.to_string()))?;
        let server = Arc::new(server);

        let worker = Arc::clone(&server);
        let worker_token = token.clone();
        let served_root = root.clone();
        let handle = thread::Builder::new()
            .name(format!("uishot-server-{}", port))
            .spawn(move || serve(&worker, &served_root, &diagnostics, &worker_token))
            .map_err(|e| Error::ServerStartError(format!("cannot spawn server thread: {}", e)))?;

        info!("Content server listening on http://127.0.0.1:{} (root {})", port, root.display());
        Ok(Self { server, port, token, handle: Some(handle) })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// URL of a file relative to the served root.
    pub fn url_for(&self, relative: &str) -> String {
        let encoded: Vec<String> = relative
            .trim_start_matches('/')
            .split('/')
            .map(|seg| percent_encoding::utf8_percent_encode(seg, PATH_SEGMENT).to_string())
            .collect();
        format!("{}/{}", self.base_url(), encoded.join("/"))
    }

    /// Stop accepting requests and wait for the server thread. Idempotent.
    pub fn stop(&mut self) {
        self.token.cancel();
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Content server thread on port {} panicked", self.port);
            } else {
                debug!("Content server on port {} stopped", self.port);
            }
        }
    }
}

impl Drop for ContentServer {
    fn drop(&mut self) {
        self.stop();
    }
}

const PATH_SEGMENT: &percent_encoding::AsciiSet = &percent_encoding::CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

fn serve(server: &Server, root: &Path, diagnostics: &DiagnosticsLog, token: &LinkedToken) {
    while !token.is_cancelled() {
        match server.recv_timeout(ACCEPT_SLICE) {
            Ok(Some(request)) => handle(request, root, diagnostics),
            Ok(None) => {}
            Err(e) => {
                if !token.is_cancelled() {
                    warn!("Content server accept failed: {}", e);
                }
                break;
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Resolution {
    File(PathBuf),
    Forbidden(&'static str),
    NotFound,
}

/// Map a request URL onto a file under `root`.
pub(crate) fn resolve(root: &Path, url: &str) -> Resolution {
    let path = url.split(['?', '#']).next().unwrap_or("");
    let mut target = root.to_path_buf();
    for raw in path.split('/') {
        let segment = match percent_decode_str(raw).decode_utf8() {
            Ok(s) => s,
            Err(_) => return Resolution::Forbidden("path is not valid UTF-8"),
        };
        match segment.as_ref() {
            "" | "." => continue,
            ".." => return Resolution::Forbidden("path escapes the served root"),
            s if s.contains(['/', '\\', '\0']) => return Resolution::Forbidden("invalid path segment"),
            s => target.push(s),
        }
    }

    if target.is_dir() {
        let index = target.join("index.html");
        return if index.is_file() {
            Resolution::File(index)
        } else {
            Resolution::Forbidden("directory listing is not allowed")
        };
    }
    if target.is_file() {
        Resolution::File(target)
    } else {
        Resolution::NotFound
    }
}

fn content_type(path: &Path) -> String {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let essence = mime.essence_str();
    if mime.type_() == mime_guess::mime::TEXT || essence == "application/javascript" {
        format!("{}; charset=utf-8", essence)
    } else {
        essence.to_string()
    }
}

fn header(name: &str, value: &str) -> Option<Header> {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).ok()
}

fn handle(request: Request, root: &Path, diagnostics: &DiagnosticsLog) {
    let method = request.method().clone();
    let url = request.url().to_string();

    if method != Method::Get && method != Method::Head {
        diagnostics.record(Channel::Network, Severity::Warning, None, format!("Server: {} {} -> 405", method, url));
        let mut response = Response::from_string("405 Method Not Allowed").with_status_code(405);
        if let Some(h) = header("Allow", "GET, HEAD") {
            response.add_header(h);
        }
        respond(request, response, &url);
        return;
    }

    match resolve(root, &url) {
        Resolution::File(path) => match File::open(&path) {
            Ok(file) => {
                let ctype = content_type(&path);
                diagnostics.info(Channel::Network, format!("Server: {} {} -> 200 ({})", method, url, ctype));
                let mut response = Response::from_file(file);
                if let Some(h) = header("Content-Type", &ctype) {
                    response.add_header(h);
                }
                respond(request, response, &url);
            }
            Err(e) => {
                diagnostics.error(Channel::Network, format!("Server: {} {} -> 500 ({})", method, url, e));
                respond(request, Response::from_string("500 Internal Server Error").with_status_code(500), &url);
            }
        },
        Resolution::Forbidden(reason) => {
            diagnostics.error(Channel::Network, format!("Server: {} {} -> 403 ({})", method, url, reason));
            respond(request, Response::from_string("403 Forbidden").with_status_code(403), &url);
        }
        Resolution::NotFound => {
            diagnostics.error(Channel::Network, format!("Server: {} {} -> 404", method, url));
            respond(request, Response::from_string("404 Not Found").with_status_code(404), &url);
        }
    }
}

fn respond<R: std::io::Read>(request: Request, response: Response<R>, url: &str) {
    // client hang-ups are routine during teardown
    if let Err(e) = request.respond(response) {
        debug!("Failed to write response for {}: {}", url, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_files_and_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("assets/sub")).unwrap();
        std::fs::write(dir.path().join("assets/a b.png"), b"x").unwrap();
        std::fs::write(dir.path().join("assets/sub/index.html"), b"x").unwrap();

        assert_eq!(
            resolve(dir.path(), "/assets/a%20b.png?v=1"),
            Resolution::File(dir.path().join("assets/a b.png"))
        );
        assert_eq!(
            resolve(dir.path(), "/assets/sub/"),
            Resolution::File(dir.path().join("assets/sub/index.html"))
        );
        assert_eq!(resolve(dir.path(), "/assets/"), Resolution::Forbidden("directory listing is not allowed"));
        assert_eq!(resolve(dir.path(), "/assets/missing.png"), Resolution::NotFound);
    }

    #[test]
    fn refuses_to_escape_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(resolve(dir.path(), "/../etc/passwd"), Resolution::Forbidden(_)));
        assert!(matches!(resolve(dir.path(), "/a/%2e%2e/%2e%2e/x"), Resolution::Forbidden(_)));
        assert!(matches!(resolve(dir.path(), "/a%2fb"), Resolution::Forbidden(_)));
    }

    #[test]
    fn content_types_default_to_octet_stream() {
        assert_eq!(content_type(Path::new("a.html")), "text/html; charset=utf-8");
        assert_eq!(content_type(Path::new("a.png")), "image/png");
        assert_eq!(content_type(Path::new("a.unknownext")), "application/octet-stream");
    }
}
