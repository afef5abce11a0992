//! `modserve serve` command implementation.
//!
//! Every request goes through one fallback handler:
//!
//! ```text
//! GET /src/app.js
//!   → module handler (.js/.mjs: rewrite bare imports, ETag, 304)
//!   → static file under root (content type by extension)
//!   → SPA index (extension-less paths, when enabled)
//!   → 404
//! ```

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use miette::{IntoDiagnostic, Result};
use modserve_core::{ModuleHandler, ModuleRequest, ModuleResponse, ServeConfig};
use modserve_util::fs::url_path_to_relative;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Serve action, as given on the command line.
///
/// `None` fields fall back to the config file, then to defaults.
#[derive(Debug, Clone, Default)]
pub struct ServeAction {
    pub root: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub config: Option<PathBuf>,
    pub no_spa: bool,
}

impl ServeAction {
    /// Build the effective config: flags > config file > defaults.
    pub fn resolve_config(&self, cwd: &Path) -> Result<ServeConfig> {
        let base = match &self.root {
            Some(root) => cwd.join(root),
            None => cwd.to_path_buf(),
        };
        let explicit = self.config.as_ref().map(|path| cwd.join(path));

        let mut config = ServeConfig::load(&base, explicit.as_deref()).into_diagnostic()?;
        if self.root.is_some() {
            config = config.with_root(base);
        }
        if let Some(host) = &self.host {
            config = config.with_host(host.as_str());
        }
        if let Some(port) = self.port {
            config = config.with_port(port);
        }
        if self.no_spa {
            config = config.with_spa_fallback(false);
        }

        config.canonicalize_root().into_diagnostic()
    }
}

/// Run the serve command.
pub fn run(action: ServeAction, cwd: &Path) -> Result<()> {
    let config = action.resolve_config(cwd)?;
    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    runtime.block_on(serve(config))
}

/// Bind and serve until Ctrl+C.
pub async fn serve(config: ServeConfig) -> Result<()> {
    let host = if config.host == "localhost" {
        "127.0.0.1"
    } else {
        config.host.as_str()
    };
    let listener = tokio::net::TcpListener::bind((host, config.port))
        .await
        .into_diagnostic()?;
    let addr = listener.local_addr().into_diagnostic()?;

    info!(root = %config.root.display(), configured = %config.addr(), addr = %addr, "Serving modules");
    println!();
    println!("  modserve running at http://{}:{}", config.host, addr.port());
    println!("  Serving {}", config.root.display());
    println!();
    println!("  Press Ctrl+C to stop");
    println!();

    axum::serve(listener, router(config))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .into_diagnostic()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

struct ServerState {
    config: ServeConfig,
    modules: ModuleHandler,
}

/// Build the application router for `config`.
pub fn router(config: ServeConfig) -> Router {
    let modules = ModuleHandler::from_config(&config);
    let state = Arc::new(ServerState { config, modules });

    Router::new()
        .fallback(handle)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn handle(
    State(state): State<Arc<ServerState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let request = ModuleRequest {
        method: method.as_str().to_string(),
        path: uri
            .path_and_query()
            .map_or_else(|| uri.path().to_string(), ToString::to_string),
        if_none_match: headers
            .get(header::IF_NONE_MATCH)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    };

    if let Some(response) = state.modules.handle(&request).await {
        return into_axum(response);
    }

    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    serve_static(&state.config, uri.path(), method == Method::HEAD).await
}

fn into_axum(response: ModuleResponse) -> Response {
    let mut out = Response::new(Body::from(response.body));
    *out.status_mut() =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    for (name, value) in response.headers {
        match HeaderValue::from_str(&value) {
            Ok(value) => {
                out.headers_mut().insert(name, value);
            }
            Err(_) => warn!(header = name, "Dropping unrepresentable header value"),
        }
    }
    out
}

async fn serve_static(config: &ServeConfig, url_path: &str, head: bool) -> Response {
    let (root, path, index) = (config.root.clone(), url_path.to_string(), config.index.clone());
    let file = tokio::task::spawn_blocking(move || static_file(&root, &path, &index))
        .await
        .ok()
        .flatten();
    if let Some(file) = file {
        match tokio::fs::read(&file).await {
            Ok(bytes) => return file_response(content_type_for(&file), bytes, head),
            Err(e) => warn!(path = %file.display(), error = %e, "Failed to read static file"),
        }
    }

    // Client-side routes (/about, /users/1) get the app shell.
    if config.spa_fallback && Path::new(url_path).extension().is_none() {
        let index = config.root.join(&config.index);
        if let Ok(bytes) = tokio::fs::read(&index).await {
            return file_response("text/html; charset=utf-8", bytes, head);
        }
    }

    (StatusCode::NOT_FOUND, format!("Not found: {url_path}")).into_response()
}

/// Map a URL path onto an existing file under `root`, using `index` for
/// directories. Blocking.
fn static_file(root: &Path, url_path: &str, index: &str) -> Option<PathBuf> {
    let path = root.join(url_path_to_relative(url_path)?);
    if path.is_dir() {
        let index = path.join(index);
        return index.is_file().then_some(index);
    }
    path.is_file().then_some(path)
}

fn file_response(content_type: &'static str, bytes: Vec<u8>, head: bool) -> Response {
    let body = if head { Body::empty() } else { Body::from(bytes) };
    ([(header::CONTENT_TYPE, content_type)], body).into_response()
}

fn content_type_for(path: &Path) -> &'static str {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" | "cjs" => "application/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::net::SocketAddr;
    use tempfile::{tempdir, TempDir};

    fn project() -> TempDir {
        let dir = tempdir().unwrap();
        let root = dir.path();

        fs::create_dir_all(root.join("node_modules/dep")).unwrap();
        fs::write(
            root.join("node_modules/dep/package.json"),
            r#"{"name": "dep", "module": "esm.js"}"#,
        )
        .unwrap();
        fs::write(root.join("node_modules/dep/esm.js"), "export default 1;\n").unwrap();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/main.js"), "import dep from 'dep';\n").unwrap();
        fs::write(root.join("index.html"), "<script type=\"module\" src=\"/src/main.js\"></script>").unwrap();
        fs::write(root.join("style.css"), "body { margin: 0 }").unwrap();
        dir
    }

    async fn spawn_server(config: ServeConfig) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(config)).await.unwrap();
        });
        addr
    }

    async fn start(dir: &TempDir, action: ServeAction) -> SocketAddr {
        let config = action.resolve_config(dir.path()).unwrap();
        spawn_server(config).await
    }

    #[tokio::test]
    async fn test_module_request_and_revalidation() {
        let dir = project();
        let addr = start(&dir, ServeAction::default()).await;
        let client = reqwest::Client::new();
        let url = format!("http://{addr}/src/main.js");

        let first = client.get(&url).send().await.unwrap();
        assert_eq!(first.status(), 200);
        let headers = first.headers().clone();
        assert_eq!(
            headers["content-type"],
            "application/javascript; charset=utf-8"
        );
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert_eq!(headers["x-request-url"], "/src/main.js");
        let etag = headers["etag"].to_str().unwrap().to_string();
        assert_eq!(
            first.text().await.unwrap(),
            "import dep from \"../node_modules/dep/esm.js\";\n"
        );

        let second = client
            .get(&url)
            .header("if-none-match", &etag)
            .send()
            .await
            .unwrap();
        assert_eq!(second.status(), 304);
        assert!(second.text().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_static_files_and_index() {
        let dir = project();
        let addr = start(&dir, ServeAction::default()).await;

        let css = reqwest::get(format!("http://{addr}/style.css")).await.unwrap();
        assert_eq!(css.status(), 200);
        assert_eq!(css.headers()["content-type"], "text/css; charset=utf-8");
        assert_eq!(css.text().await.unwrap(), "body { margin: 0 }");

        let root = reqwest::get(format!("http://{addr}/")).await.unwrap();
        assert_eq!(root.status(), 200);
        assert!(root.text().await.unwrap().contains("/src/main.js"));

        let missing_module = reqwest::get(format!("http://{addr}/nope.js")).await.unwrap();
        assert_eq!(missing_module.status(), 404);

        let missing_asset = reqwest::get(format!("http://{addr}/logo.png")).await.unwrap();
        assert_eq!(missing_asset.status(), 404);
    }

    #[tokio::test]
    async fn test_spa_fallback() {
        let dir = project();
        let addr = start(&dir, ServeAction::default()).await;

        let route = reqwest::get(format!("http://{addr}/users/42")).await.unwrap();
        assert_eq!(route.status(), 200);
        assert_eq!(route.headers()["content-type"], "text/html; charset=utf-8");

        let dir_off = project();
        let addr_off = start(
            &dir_off,
            ServeAction {
                no_spa: true,
                ..ServeAction::default()
            },
        )
        .await;
        let route = reqwest::get(format!("http://{addr_off}/users/42")).await.unwrap();
        assert_eq!(route.status(), 404);
    }

    #[tokio::test]
    async fn test_other_methods_rejected() {
        let dir = project();
        let addr = start(&dir, ServeAction::default()).await;

        let response = reqwest::Client::new()
            .post(format!("http://{addr}/src/main.js"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 405);
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = project();
        fs::write(
            dir.path().join("modserve.json"),
            r#"{"port": 3000, "host": "0.0.0.0", "spa_fallback": true}"#,
        )
        .unwrap();

        let from_file = ServeAction::default().resolve_config(dir.path()).unwrap();
        assert_eq!(from_file.port, 3000);
        assert_eq!(from_file.host, "0.0.0.0");
        assert!(from_file.spa_fallback);

        let action = ServeAction {
            port: Some(9000),
            no_spa: true,
            ..ServeAction::default()
        };
        let config = action.resolve_config(dir.path()).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "0.0.0.0");
        assert!(!config.spa_fallback);
        assert_eq!(config.root, canonical_root(dir.path()));
    }

    #[test]
    fn test_root_flag_is_relative_to_cwd() {
        let dir = project();
        let action = ServeAction {
            root: Some(PathBuf::from("src")),
            ..ServeAction::default()
        };
        let config = action.resolve_config(dir.path()).unwrap();
        assert_eq!(config.root, canonical_root(&dir.path().join("src")));
    }

    #[test]
    fn test_missing_explicit_config_fails() {
        let dir = project();
        let action = ServeAction {
            config: Some(PathBuf::from("missing.json")),
            ..ServeAction::default()
        };
        assert!(action.resolve_config(dir.path()).is_err());
    }

    #[test]
    fn test_static_file_rejects_escape() {
        let dir = project();
        assert!(static_file(dir.path(), "/../etc/passwd", "index.html").is_none());
        assert_eq!(
            static_file(dir.path(), "/", "index.html"),
            Some(dir.path().join("index.html"))
        );
        assert!(static_file(dir.path(), "/src", "index.html").is_none());
        assert!(static_file(dir.path(), "/%2e%2e/etc/passwd", "index.html").is_none());
    }

    #[tokio::test]
    async fn test_percent_encoded_paths() {
        let dir = project();
        fs::write(dir.path().join("src/my mod.js"), "import dep from 'dep';\n").unwrap();
        fs::write(dir.path().join("read me.txt"), "hello").unwrap();
        let addr = start(&dir, ServeAction::default()).await;

        let module = reqwest::get(format!("http://{addr}/src/my%20mod.js")).await.unwrap();
        assert_eq!(module.status(), 200);
        assert_eq!(
            module.text().await.unwrap(),
            "import dep from \"../node_modules/dep/esm.js\";\n"
        );

        let text = reqwest::get(format!("http://{addr}/read%20me.txt")).await.unwrap();
        assert_eq!(text.status(), 200);
        assert_eq!(text.text().await.unwrap(), "hello");
    }

    #[test]
    fn test_host_flag_overrides_default() {
        let dir = project();
        let action = ServeAction {
            host: Some("0.0.0.0".to_string()),
            port: Some(4100),
            ..ServeAction::default()
        };
        let config = action.resolve_config(dir.path()).unwrap();
        assert_eq!(config.addr(), "0.0.0.0:4100");
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for(Path::new("a.svg")), "image/svg+xml");
        assert_eq!(content_type_for(Path::new("a.wasm")), "application/wasm");
        assert_eq!(content_type_for(Path::new("LICENSE")), "application/octet-stream");
    }

    fn canonical_root(path: &Path) -> PathBuf {
        ServeConfig::new(path.to_path_buf())
            .canonicalize_root()
            .unwrap()
            .root
    }
}
