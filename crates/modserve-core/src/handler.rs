//! Request handler for `.js`/`.mjs` module requests.
//!
//! Framework-agnostic: takes a method/path/`if-none-match` triple and either
//! declines (`None`, the caller falls through to its next handler) or
//! produces a complete response.

use crate::cache::{CachedModule, ModuleCache};
use crate::config::ServeConfig;
use crate::error::LoadError;
use crate::resolver::NodeResolver;
use crate::rewrite::ImportRewriter;
use modserve_util::fs::{read_to_string_lossy, url_path_to_relative};
use modserve_util::hash::content_etag;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Content type for served modules.
pub const JAVASCRIPT_CONTENT_TYPE: &str = "application/javascript; charset=utf-8";

/// Content type for error responses.
pub const ERROR_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// The parts of an HTTP request the handler looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRequest {
    pub method: String,
    /// Request path, possibly with a query string.
    pub path: String,
    /// Raw `if-none-match` header value.
    pub if_none_match: Option<String>,
}

impl ModuleRequest {
    /// A `GET` request for `path` with no conditional header.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            path: path.into(),
            if_none_match: None,
        }
    }

    /// Set the `if-none-match` header.
    #[must_use]
    pub fn with_if_none_match(mut self, value: impl Into<String>) -> Self {
        self.if_none_match = Some(value.into());
        self
    }

    /// Set the method.
    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }
}

/// A complete response produced by the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleResponse {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
}

impl ModuleResponse {
    /// First value of header `name` (lowercase).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Serves rewritten modules from a root directory.
#[derive(Debug, Clone)]
pub struct ModuleHandler {
    root: PathBuf,
    cache: Arc<ModuleCache>,
    rewriter: ImportRewriter,
}

impl ModuleHandler {
    /// Create a handler serving `root` with its own cache.
    #[must_use]
    pub fn new(root: PathBuf, rewriter: ImportRewriter) -> Self {
        Self::with_cache(root, rewriter, Arc::new(ModuleCache::new()))
    }

    /// Create a handler serving `root` with a shared cache.
    #[must_use]
    pub fn with_cache(root: PathBuf, rewriter: ImportRewriter, cache: Arc<ModuleCache>) -> Self {
        Self {
            root,
            cache,
            rewriter,
        }
    }

    /// Create a handler from a server config.
    #[must_use]
    pub fn from_config(config: &ServeConfig) -> Self {
        let resolver = NodeResolver::new(config.resolver.clone());
        Self::new(config.root.clone(), ImportRewriter::new(resolver))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<ModuleCache> {
        &self.cache
    }

    /// Handle a request, or return `None` to decline it.
    ///
    /// Declines non-`GET`/`HEAD` methods, paths not ending in `.js`/`.mjs`,
    /// paths with `..` segments, and files that do not exist. The path is
    /// percent-decoded before it is mapped onto the root.
    pub async fn handle(&self, request: &ModuleRequest) -> Option<ModuleResponse> {
        let head = match request.method.as_str() {
            "GET" => false,
            "HEAD" => true,
            _ => return None,
        };

        let url_path = strip_query(&request.path);
        let file = self.file_for(url_path)?;
        if !is_module_path(&file) {
            return None;
        }

        let file = tokio::task::spawn_blocking(move || existing_file(file))
            .await
            .ok()
            .flatten()?;

        let rewriter = self.rewriter.clone();
        let result = self
            .cache
            .get_or_load(&file, move |path| load_module(&rewriter, path))
            .await;

        let mut response = match result {
            Ok(module) => respond(request, &module),
            Err(LoadError::NotFound(_)) => return None,
            Err(e) => {
                warn!(path = %file.display(), error = %e, "Failed to serve module");
                error_response(request, &e)
            }
        };

        if head {
            response.body.clear();
        }
        Some(response)
    }

    /// Map a URL path onto a file under the root.
    ///
    /// Returns `None` for paths that would leave the root.
    fn file_for(&self, url_path: &str) -> Option<PathBuf> {
        let Some(relative) = url_path_to_relative(url_path) else {
            debug!(path = url_path, "Declining path outside root");
            return None;
        };
        Some(self.root.join(relative))
    }
}

/// Canonical form of `path` if it is an existing file. Blocking.
fn existing_file(path: PathBuf) -> Option<PathBuf> {
    if !path.is_file() {
        return None;
    }
    Some(dunce::canonicalize(&path).unwrap_or(path))
}

/// Read, rewrite and fingerprint the module at `path`.
fn load_module(rewriter: &ImportRewriter, path: &Path) -> Result<CachedModule, LoadError> {
    let source = read_to_string_lossy(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => LoadError::NotFound(path.to_path_buf()),
        _ => LoadError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        },
    })?;

    let content = rewriter.rewrite(path, &source)?;
    let etag = content_etag(content.as_bytes());

    Ok(CachedModule {
        content,
        etag,
        content_type: JAVASCRIPT_CONTENT_TYPE,
        file_path: path.to_path_buf(),
    })
}

fn respond(request: &ModuleRequest, module: &CachedModule) -> ModuleResponse {
    let not_modified = request
        .if_none_match
        .as_deref()
        .is_some_and(|value| value.contains(&module.etag));

    if not_modified {
        return ModuleResponse {
            status: 304,
            headers: vec![
                ("etag", module.etag.clone()),
                ("access-control-allow-origin", "*".to_string()),
                ("x-request-url", request.path.clone()),
            ],
            body: String::new(),
        };
    }

    ModuleResponse {
        status: 200,
        headers: vec![
            ("content-type", module.content_type.to_string()),
            ("etag", module.etag.clone()),
            ("access-control-allow-origin", "*".to_string()),
            ("x-request-url", request.path.clone()),
        ],
        body: module.content.clone(),
    }
}

fn error_response(request: &ModuleRequest, error: &LoadError) -> ModuleResponse {
    ModuleResponse {
        status: 500,
        headers: vec![
            ("content-type", ERROR_CONTENT_TYPE.to_string()),
            ("access-control-allow-origin", "*".to_string()),
            ("x-request-url", request.path.clone()),
        ],
        body: error.to_string(),
    }
}

fn strip_query(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or(path)
}

fn is_module_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("js" | "mjs")
    )
}
