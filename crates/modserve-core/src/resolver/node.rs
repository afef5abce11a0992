//! Node resolution algorithm with manifest field override.

use super::manifest::{read_manifest, select_entry};
use super::{ResolveError, ResolveReasonCode, ResolverConfig, DEFAULT_ENTRY};
use modserve_util::fs::relative_path;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Maximum number of tried paths to record.
const MAX_TRIED_PATHS: usize = 20;

/// Resolves import specifiers against the file system.
///
/// Holds no cache: every call goes back to disk, so results always reflect
/// the current state of `node_modules`.
#[derive(Debug, Clone, Default)]
pub struct NodeResolver {
    config: ResolverConfig,
}

impl NodeResolver {
    /// Create a resolver with the given configuration.
    #[must_use]
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// Resolve `specifier` imported from a file in `from_dir`.
    ///
    /// Returns the target's path relative to `from_dir`, `/`-separated on
    /// every platform (e.g. `node_modules/pkg/dist/esm/index.js` or
    /// `../lib/util.js`).
    pub fn resolve(&self, from_dir: &Path, specifier: &str) -> Result<String, ResolveError> {
        let target = self.resolve_path(from_dir, specifier)?;
        let base = canonical(from_dir);

        relative_path(&base, &target).ok_or_else(|| ResolveError {
            specifier: specifier.to_string(),
            from: from_dir.to_path_buf(),
            reason: ResolveReasonCode::NoRelativePath,
            tried: vec![target],
        })
    }

    /// Resolve `specifier` imported from a file in `from_dir` to an absolute,
    /// canonical path.
    pub fn resolve_path(&self, from_dir: &Path, specifier: &str) -> Result<PathBuf, ResolveError> {
        let mut tried = Vec::new();
        self.resolve_specifier(from_dir, specifier, &mut tried)
            .map_err(|reason| ResolveError {
                specifier: specifier.to_string(),
                from: from_dir.to_path_buf(),
                reason,
                tried,
            })
    }

    fn resolve_specifier(
        &self,
        from_dir: &Path,
        spec: &str,
        tried: &mut Vec<PathBuf>,
    ) -> Result<PathBuf, ResolveReasonCode> {
        if spec.is_empty() {
            return Err(ResolveReasonCode::SpecifierInvalid);
        }

        if is_url_like(spec) {
            return Err(ResolveReasonCode::UnsupportedScheme);
        }

        if is_relative(spec) {
            return self.resolve_file_or_directory(&from_dir.join(spec), tried);
        }

        if is_absolute_path(spec) {
            return self.resolve_file_or_directory(Path::new(spec), tried);
        }

        self.resolve_bare(from_dir, spec, tried)
    }

    /// Resolve a path: exact file, then extension probing, then directory.
    fn resolve_file_or_directory(
        &self,
        base: &Path,
        tried: &mut Vec<PathBuf>,
    ) -> Result<PathBuf, ResolveReasonCode> {
        add_tried(tried, base);
        if base.is_file() {
            return Ok(canonical(base));
        }

        if let Some(found) = self.try_extensions(base, tried) {
            return Ok(found);
        }

        if base.is_dir() {
            return self.resolve_directory(base, tried);
        }

        Err(ResolveReasonCode::NotFound)
    }

    /// Resolve a directory: manifest entry fields, then `index.*`.
    fn resolve_directory(
        &self,
        dir: &Path,
        tried: &mut Vec<PathBuf>,
    ) -> Result<PathBuf, ResolveReasonCode> {
        let manifest_path = dir.join("package.json");

        if let Some(manifest) = read_manifest(&manifest_path)? {
            add_tried(tried, &manifest_path);

            if let Some(entry) = select_entry(&manifest, &self.config.main_fields) {
                let entry_path = dir.join(entry.trim_start_matches("./"));
                add_tried(tried, &entry_path);

                if entry_path.is_file() {
                    return Ok(canonical(&entry_path));
                }

                if let Some(found) = self.try_extensions(&entry_path, tried) {
                    return Ok(found);
                }

                if entry_path.is_dir() {
                    if let Ok(found) = self.resolve_index(&entry_path, tried) {
                        return Ok(found);
                    }
                }

                // A declared entry that is missing never falls through to a
                // lower-priority field.
                return Err(ResolveReasonCode::PackageMainNotFound);
            }
        }

        self.resolve_index(dir, tried)
    }

    /// Resolve `index.js` (then `index` + each configured extension) in `dir`.
    fn resolve_index(
        &self,
        dir: &Path,
        tried: &mut Vec<PathBuf>,
    ) -> Result<PathBuf, ResolveReasonCode> {
        let default_entry = dir.join(DEFAULT_ENTRY);
        add_tried(tried, &default_entry);
        if default_entry.is_file() {
            return Ok(canonical(&default_entry));
        }

        if let Some(found) = self.try_extensions(&dir.join("index"), tried) {
            return Ok(found);
        }

        if dir.is_dir() {
            Err(ResolveReasonCode::IsDirectory)
        } else {
            Err(ResolveReasonCode::NotFound)
        }
    }

    /// Resolve a bare specifier via `node_modules` in `from_dir` and its ancestors.
    fn resolve_bare(
        &self,
        from_dir: &Path,
        spec: &str,
        tried: &mut Vec<PathBuf>,
    ) -> Result<PathBuf, ResolveReasonCode> {
        // e.g., "lodash/fp" -> "lodash", "@scope/pkg/sub" -> "@scope/pkg"
        let (pkg_name, subpath) = parse_bare_specifier(spec);

        let mut found_node_modules = false;
        let mut current = Some(from_dir);

        while let Some(dir) = current {
            let node_modules = dir.join("node_modules");

            if node_modules.is_dir() {
                found_node_modules = true;

                let pkg_dir = node_modules.join(pkg_name);
                add_tried(tried, &pkg_dir);

                if pkg_dir.is_dir() {
                    return match subpath {
                        Some(sub) => self.resolve_file_or_directory(&pkg_dir.join(sub), tried),
                        None => self.resolve_directory(&pkg_dir, tried),
                    };
                }
            }

            current = dir.parent();
        }

        if found_node_modules {
            Err(ResolveReasonCode::PackageNotFound)
        } else {
            Err(ResolveReasonCode::NodeModulesNotFound)
        }
    }

    /// Try `base` with each configured extension appended.
    fn try_extensions(&self, base: &Path, tried: &mut Vec<PathBuf>) -> Option<PathBuf> {
        for ext in &self.config.extensions {
            let mut candidate = OsString::from(base.as_os_str());
            candidate.push(ext);
            let candidate = PathBuf::from(candidate);
            add_tried(tried, &candidate);

            if candidate.is_file() {
                return Some(canonical(&candidate));
            }
        }
        None
    }
}

/// Whether a specifier is relative to the importing file.
fn is_relative(spec: &str) -> bool {
    spec == "." || spec == ".." || spec.starts_with("./") || spec.starts_with("../")
}

/// Whether a specifier is a URL rather than a path or package name.
fn is_url_like(spec: &str) -> bool {
    spec.contains("://")
        || spec.starts_with("data:")
        || spec.starts_with("node:")
        || spec.starts_with("blob:")
}

/// Check if a specifier is an absolute path.
fn is_absolute_path(spec: &str) -> bool {
    if spec.starts_with('/') {
        return true;
    }

    // Windows absolute: C:\, D:/, etc.
    let bytes = spec.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
}

/// Parse a bare specifier into package name and optional subpath.
fn parse_bare_specifier(spec: &str) -> (&str, Option<&str>) {
    // Scoped package: @scope/pkg or @scope/pkg/subpath
    if spec.starts_with('@') {
        let mut slash_count = 0;
        for (i, c) in spec.char_indices() {
            if c == '/' {
                slash_count += 1;
                if slash_count == 2 {
                    return (&spec[..i], Some(&spec[i + 1..]));
                }
            }
        }
        return (spec, None);
    }

    if let Some(pos) = spec.find('/') {
        (&spec[..pos], Some(&spec[pos + 1..]))
    } else {
        (spec, None)
    }
}

fn canonical(path: &Path) -> PathBuf {
    dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Add a path to tried list (with cap).
fn add_tried(tried: &mut Vec<PathBuf>, path: &Path) {
    if tried.len() < MAX_TRIED_PATHS {
        tried.push(path.to_path_buf());
    }
}
