//! # Development Server
//!
//! Serve l'albero di staging via HTTP e inietta il client di live reload in ogni pagina HTML.
//!
//! ## Endpoint:
//! - `/__livereload`: stream Server-Sent Events alimentato dalla `ReloadSession`
//!   (`reload` ⇒ ricarica pagina, `css` ⇒ refresh dei soli `<link rel="stylesheet">`)
//! - qualsiasi altro path: file statici sotto la document root (`app/`),
//!   `index.html` per le directory, `..` rifiutato
//!
//! Il client è iniettato prima di `</body>` (o in coda se il tag manca).

use crate::error::PipelineError;
use crate::session::ReloadSession;
use anyhow::Result;
use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::convert::Infallible;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, warn};

pub const LIVERELOAD_PATH: &str = "/__livereload";

/// Script injected in served HTML pages
pub const CLIENT_SCRIPT: &str = concat!(
    "<script>(function(){",
    "var source=new EventSource(\"/__livereload\");",
    "source.addEventListener(\"reload\",function(){location.reload();});",
    "source.addEventListener(\"css\",function(){",
    "document.querySelectorAll('link[rel=\"stylesheet\"]').forEach(function(link){",
    "var url=new URL(link.href);url.searchParams.set(\"livereload\",Date.now());link.href=url.toString();",
    "});});",
    "})();</script>"
);

#[derive(Clone)]
struct ServerState {
    root: Arc<PathBuf>,
    session: ReloadSession,
}

/// Static file server with live reload over the staging tree
pub struct DevServer {
    root: PathBuf,
    session: ReloadSession,
    host: String,
    port: u16,
}

impl DevServer {
    pub fn new(root: impl Into<PathBuf>, session: ReloadSession, host: &str, port: u16) -> Self {
        Self {
            root: root.into(),
            session,
            host: host.to_string(),
            port,
        }
    }

    pub fn router(&self) -> Router {
        let state = ServerState {
            root: Arc::new(self.root.clone()),
            session: self.session.clone(),
        };
        Router::new()
            .route(LIVERELOAD_PATH, get(livereload))
            .fallback(serve_static)
            .with_state(state)
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        let address = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| PipelineError::Server(format!("cannot listen on {}: {}", address, e)))?;
        Ok(listener)
    }

    /// Serve on an already bound listener until the task is dropped
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr()?;
        info!("Serving {} at http://{}", self.root.display(), local);
        axum::serve(listener, self.router())
            .await
            .map_err(|e| PipelineError::Server(e.to_string()))?;
        Ok(())
    }

    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }
}

async fn livereload(State(state): State<ServerState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("Live reload client connected ({} total)", state.session.client_count() + 1);
    let stream = BroadcastStream::new(state.session.subscribe()).filter_map(|message| match message {
        Ok(event) => {
            let data = serde_json::to_string(&event).unwrap_or_default();
            Some(Ok::<Event, Infallible>(
                Event::default().event(event.event_name()).data(data),
            ))
        }
        // Lagged clients just miss the notification
        Err(_) => None,
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn serve_static(State(state): State<ServerState>, uri: Uri) -> Response {
    let Some(path) = resolve_request_path(&state.root, uri.path()) else {
        return (StatusCode::BAD_REQUEST, "Bad request").into_response();
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let content_type = content_type(&path);
            let body = if content_type.starts_with("text/html") {
                inject_client(&String::from_utf8_lossy(&bytes)).into_bytes()
            } else {
                bytes
            };
            (
                [(header::CONTENT_TYPE, content_type), (header::CACHE_CONTROL, "no-cache")],
                body,
            )
                .into_response()
        }
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Cannot read {}: {}", path.display(), e);
            }
            (StatusCode::NOT_FOUND, "Not found").into_response()
        }
    }
}

/// Map a request path onto the document root. `None` for paths escaping the root.
pub fn resolve_request_path(root: &Path, request_path: &str) -> Option<PathBuf> {
    let decoded = percent_decode(request_path)?;
    let relative = Path::new(decoded.trim_start_matches('/'));

    let mut resolved = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }

    if resolved.is_dir() {
        resolved.push("index.html");
    }
    Some(resolved)
}

fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = input.get(i + 1..i + 3)?;
            decoded.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).ok()
}

/// Insert the live reload client before `</body>`, or append it
pub fn inject_client(html: &str) -> String {
    match html.to_ascii_lowercase().rfind("</body>") {
        Some(index) => {
            let mut injected = String::with_capacity(html.len() + CLIENT_SCRIPT.len());
            injected.push_str(&html[..index]);
            injected.push_str(CLIENT_SCRIPT);
            injected.push_str(&html[index..]);
            injected
        }
        None => format!("{}{}", html, CLIENT_SCRIPT),
    }
}

pub fn content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_inject_before_body() {
        let html = "<html><BODY><p>hi</p></BODY></html>";
        let injected = inject_client(html);
        assert!(injected.ends_with(&format!("{}</BODY></html>", CLIENT_SCRIPT)));
        assert!(injected.starts_with("<html><BODY><p>hi</p>"));
    }

    #[test]
    fn test_inject_without_body_appends() {
        assert_eq!(inject_client("<p>x</p>"), format!("<p>x</p>{}", CLIENT_SCRIPT));
    }

    #[test]
    fn test_resolve_request_path() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("pages")).unwrap();

        assert_eq!(
            resolve_request_path(temp.path(), "/").unwrap(),
            temp.path().join("index.html")
        );
        assert_eq!(
            resolve_request_path(temp.path(), "/pages").unwrap(),
            temp.path().join("pages/index.html")
        );
        assert_eq!(
            resolve_request_path(temp.path(), "/images/my%20logo.png").unwrap(),
            temp.path().join("images/my logo.png")
        );
        assert!(resolve_request_path(temp.path(), "/../secret").is_none());
        assert!(resolve_request_path(temp.path(), "/%2e%2e/secret").is_none());
        assert!(resolve_request_path(temp.path(), "/bad%zz").is_none());
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type(Path::new("a.CSS")), "text/css; charset=utf-8");
        assert_eq!(content_type(Path::new("sprite.svg")), "image/svg+xml");
        assert_eq!(content_type(Path::new("archive.zip")), "application/octet-stream");
    }

    async fn get(port: u16, path: &str) -> String {
        let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let request = format!("GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n", path);
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_serves_html_with_client_and_assets_verbatim() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("index.html"), "<html><body><h1>Home</h1></body></html>").unwrap();
        std::fs::create_dir_all(temp.path().join("css")).unwrap();
        std::fs::write(temp.path().join("css/index.css"), "body{margin:0}").unwrap();

        let server = DevServer::new(temp.path(), ReloadSession::new(), "127.0.0.1", 0);
        let listener = server.bind().await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move { server.serve(listener).await });

        let page = get(port, "/").await;
        assert!(page.starts_with("HTTP/1.1 200"));
        assert!(page.contains("<h1>Home</h1><script>"));
        assert!(page.contains(LIVERELOAD_PATH));

        let css = get(port, "/css/index.css").await;
        assert!(css.contains("text/css"));
        assert!(css.ends_with("body{margin:0}"));

        let missing = get(port, "/nope.html").await;
        assert!(missing.starts_with("HTTP/1.1 404"));

        handle.abort();
    }
}
