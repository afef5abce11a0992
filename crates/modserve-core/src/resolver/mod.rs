//! Node-style module resolver.
//!
//! Resolves import specifiers the way node does, with one browser-oriented
//! twist: package manifests are read with `module` and `jsnext:main`
//! preferred over `main`, so ES module builds are picked when a package ships
//! both.
//!
//! Supports:
//! - Relative specifiers: `./`, `../`
//! - Absolute filesystem specifiers
//! - Bare specifiers with `node_modules` lookup (scoped packages and subpaths)
//! - Extension probing
//! - Directory resolution (manifest entry fields, then `index.*`)

mod manifest;
mod node;

pub use manifest::{read_manifest, select_entry};
pub use node::NodeResolver;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Extensions tried after the exact path, in order.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".js", ".mjs", ".json"];

/// Manifest fields consulted for a package entry point, in priority order.
pub const DEFAULT_MAIN_FIELDS: &[&str] = &["module", "jsnext:main", "jsnext", "main"];

/// Entry file used when a package declares none of the main fields.
pub const DEFAULT_ENTRY: &str = "index.js";

/// Resolver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Extensions to try (in order).
    pub extensions: Vec<String>,
    /// Manifest fields naming the entry point (in priority order).
    pub main_fields: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| (*s).to_string()).collect(),
            main_fields: DEFAULT_MAIN_FIELDS.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

/// Reason codes for unresolved imports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveReasonCode {
    SpecifierInvalid,
    UnsupportedScheme,
    NotFound,
    IsDirectory,
    NodeModulesNotFound,
    PackageNotFound,
    PackageJsonInvalid,
    PackageMainNotFound,
    NoRelativePath,
}

impl ResolveReasonCode {
    /// Human-readable description of the reason.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::SpecifierInvalid => "specifier is empty",
            Self::UnsupportedScheme => "URL specifiers are not resolved",
            Self::NotFound => "no matching file",
            Self::IsDirectory => "directory has no index file",
            Self::NodeModulesNotFound => "no node_modules directory found",
            Self::PackageNotFound => "package is not installed",
            Self::PackageJsonInvalid => "package.json is not valid JSON",
            Self::PackageMainNotFound => "package entry point does not exist",
            Self::NoRelativePath => "target has no path relative to the importer",
        }
    }
}

impl fmt::Display for ResolveReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SpecifierInvalid => "SPECIFIER_INVALID",
            Self::UnsupportedScheme => "UNSUPPORTED_SCHEME",
            Self::NotFound => "NOT_FOUND",
            Self::IsDirectory => "IS_DIRECTORY",
            Self::NodeModulesNotFound => "NODE_MODULES_NOT_FOUND",
            Self::PackageNotFound => "PACKAGE_NOT_FOUND",
            Self::PackageJsonInvalid => "PACKAGE_JSON_INVALID",
            Self::PackageMainNotFound => "PACKAGE_MAIN_NOT_FOUND",
            Self::NoRelativePath => "NO_RELATIVE_PATH",
        };
        write!(f, "{s}")
    }
}

/// A specifier that could not be resolved.
///
/// The `Display` form is a human-readable message; the structured
/// [`ResolveReasonCode`] is kept alongside for callers that need it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveError {
    /// Specifier exactly as written in the source.
    pub specifier: String,
    /// Directory the specifier was resolved from.
    pub from: PathBuf,
    /// Why resolution failed.
    pub reason: ResolveReasonCode,
    /// Candidate paths tried (capped).
    pub tried: Vec<PathBuf>,
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cannot find module '{}' from '{}': {}",
            self.specifier,
            self.from.display(),
            self.reason.description()
        )?;
        if !self.tried.is_empty() {
            let tried: Vec<String> = self.tried.iter().map(|p| p.display().to_string()).collect();
            write!(f, " (tried: {})", tried.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for ResolveError {}
