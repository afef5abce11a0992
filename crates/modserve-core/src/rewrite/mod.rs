//! Import rewriting for browser module serving.
//!
//! Parses a module, finds every import/export/dynamic-import specifier, and
//! replaces each one that resolves with a browser-legal relative path:
//! - Bare specifiers (`lit-element`) → `"./node_modules/lit-element/lit-element.js"`
//! - Relative imports (`./App`) → `"./App.js"` (extension and index tried)
//!
//! Specifiers that fail to resolve are left exactly as written.

mod patch;
mod scan;

pub use patch::{apply_patches, Patch};
pub use scan::{scan_specifiers, SpecifierKind, SpecifierRef};

use crate::error::ParseError;
use crate::resolver::NodeResolver;
use std::path::Path;
use tracing::debug;

/// Import rewriter for module serving.
#[derive(Debug, Clone, Default)]
pub struct ImportRewriter {
    resolver: NodeResolver,
}

impl ImportRewriter {
    /// Create a new import rewriter.
    #[must_use]
    pub fn new(resolver: NodeResolver) -> Self {
        Self { resolver }
    }

    /// Rewrite the specifiers of the module at `module_path`.
    ///
    /// Returns the source unchanged when it has no specifiers. Fails only if
    /// the source is not a valid ES module; unresolvable specifiers are
    /// skipped.
    pub fn rewrite(&self, module_path: &Path, source: &str) -> Result<String, ParseError> {
        let refs = scan_specifiers(module_path, source)?;
        if refs.is_empty() {
            return Ok(source.to_string());
        }

        let module_dir = module_path.parent().unwrap_or(Path::new("/"));
        let patches = self.plan(module_dir, source, &refs);

        debug!(
            path = %module_path.display(),
            specifiers = refs.len(),
            rewritten = patches.len(),
            "Rewrote module specifiers"
        );

        Ok(apply_patches(source, patches))
    }

    /// Resolve each reference and build the patches for those that resolve.
    fn plan(&self, module_dir: &Path, source: &str, refs: &[SpecifierRef]) -> Vec<Patch> {
        let mut patches = Vec::with_capacity(refs.len());

        for r in refs {
            match self.resolver.resolve(module_dir, &r.specifier) {
                Ok(relative) => {
                    let replacement = quote_specifier(&browser_path(&relative));
                    if source.get(r.start..r.end) != Some(replacement.as_str()) {
                        patches.push(Patch::new(r.start, r.end, replacement));
                    }
                }
                Err(e) => {
                    debug!(specifier = %r.specifier, error = %e, "Leaving specifier unrewritten");
                }
            }
        }

        patches
    }
}

/// Prefix a directory-relative path so browsers treat it as relative.
fn browser_path(relative: &str) -> String {
    if relative.starts_with("../") {
        relative.to_string()
    } else {
        format!("./{relative}")
    }
}

/// Render a specifier as a JSON (and therefore JavaScript) string literal.
fn quote_specifier(specifier: &str) -> String {
    serde_json::Value::String(specifier.to_string()).to_string()
}
