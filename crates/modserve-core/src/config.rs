use crate::error::Error;
use crate::resolver::ResolverConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the optional project config file looked up in the served root.
pub const CONFIG_FILE_NAME: &str = "modserve.json";

/// Default port to listen on.
pub const DEFAULT_PORT: u16 = 8000;

/// Default host to bind.
pub const DEFAULT_HOST: &str = "localhost";

/// Server configuration.
///
/// Every field is optional in `modserve.json`; missing fields take their
/// defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    /// Directory being served. Relative paths in a config file are taken
    /// relative to the file's directory.
    pub root: PathBuf,

    /// Host to bind.
    pub host: String,

    /// Port to listen on.
    pub port: u16,

    /// Serve `index` for extension-less paths that match no file.
    pub spa_fallback: bool,

    /// Document served as the SPA fallback.
    pub index: String,

    /// Module resolution settings.
    pub resolver: ResolverConfig,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            spa_fallback: true,
            index: "index.html".to_string(),
            resolver: ResolverConfig::default(),
        }
    }
}

impl ServeConfig {
    /// Create a config serving `root` with default settings.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            ..Default::default()
        }
    }

    /// Load the config for `root`.
    ///
    /// Reads `explicit` when given (it must exist), otherwise
    /// `<root>/modserve.json` if present. Without a file the defaults are
    /// returned with `root` set.
    pub fn load(root: &Path, explicit: Option<&Path>) -> Result<Self, Error> {
        let (path, required) = match explicit {
            Some(path) => (path.to_path_buf(), true),
            None => (root.join(CONFIG_FILE_NAME), false),
        };

        if !required && !path.is_file() {
            return Ok(Self::new(root.to_path_buf()));
        }

        let mut config = Self::from_file(&path)?;
        if config.root.is_relative() {
            let base = path.parent().unwrap_or(root);
            config.root = base.join(&config.root);
        }
        Ok(config)
    }

    /// Parse a config file.
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&text).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Set the served root.
    #[must_use]
    pub fn with_root(mut self, root: PathBuf) -> Self {
        self.root = root;
        self
    }

    /// Set the bind host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the listen port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enable or disable the SPA fallback.
    #[must_use]
    pub fn with_spa_fallback(mut self, enabled: bool) -> Self {
        self.spa_fallback = enabled;
        self
    }

    /// Canonicalize `root`, failing if it does not exist.
    pub fn canonicalize_root(mut self) -> Result<Self, Error> {
        self.root = dunce::canonicalize(&self.root)?;
        Ok(self)
    }

    /// `host:port` address string.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
