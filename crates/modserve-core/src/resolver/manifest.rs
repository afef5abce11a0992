//! Package manifest (`package.json`) reading and entry selection.

use super::ResolveReasonCode;
use serde_json::Value;
use std::path::Path;

/// Read and parse a `package.json`.
///
/// Returns `Ok(None)` if the file does not exist, and
/// [`ResolveReasonCode::PackageJsonInvalid`] if it exists but cannot be read
/// or is not valid JSON.
pub fn read_manifest(path: &Path) -> Result<Option<Value>, ResolveReasonCode> {
    if !path.is_file() {
        return Ok(None);
    }
    let content =
        std::fs::read_to_string(path).map_err(|_| ResolveReasonCode::PackageJsonInvalid)?;
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|_| ResolveReasonCode::PackageJsonInvalid)
}

/// Select the entry point declared by a manifest.
///
/// Walks `main_fields` in order and returns the first field holding a
/// non-empty string. With the default field order this prefers `module`,
/// then `jsnext:main`/`jsnext`, then `main`.
#[must_use]
pub fn select_entry<'a>(manifest: &'a Value, main_fields: &[String]) -> Option<&'a str> {
    main_fields.iter().find_map(|field| {
        manifest
            .get(field.as_str())
            .and_then(Value::as_str)
            .filter(|entry| !entry.trim().is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ResolverConfig;
    use serde_json::json;

    fn fields() -> Vec<String> {
        ResolverConfig::default().main_fields
    }

    #[test]
    fn test_module_beats_main() {
        let pkg = json!({"main": "lib/index.js", "module": "dist/esm/index.js"});
        assert_eq!(select_entry(&pkg, &fields()), Some("dist/esm/index.js"));
    }

    #[test]
    fn test_jsnext_main_beats_main() {
        let pkg = json!({"main": "lib/index.js", "jsnext:main": "es/index.js"});
        assert_eq!(select_entry(&pkg, &fields()), Some("es/index.js"));
    }

    #[test]
    fn test_jsnext_alias_beats_main() {
        let pkg = json!({"main": "lib/index.js", "jsnext": "es/index.js"});
        assert_eq!(select_entry(&pkg, &fields()), Some("es/index.js"));
    }

    #[test]
    fn test_module_beats_jsnext() {
        let pkg = json!({"jsnext:main": "es/index.js", "module": "esm/index.js"});
        assert_eq!(select_entry(&pkg, &fields()), Some("esm/index.js"));
    }

    #[test]
    fn test_main_only() {
        let pkg = json!({"main": "lib/index.js"});
        assert_eq!(select_entry(&pkg, &fields()), Some("lib/index.js"));
    }

    #[test]
    fn test_no_entry_fields() {
        let pkg = json!({"name": "bare"});
        assert_eq!(select_entry(&pkg, &fields()), None);
    }

    #[test]
    fn test_non_string_field_is_skipped() {
        let pkg = json!({"module": false, "main": "lib/index.js"});
        assert_eq!(select_entry(&pkg, &fields()), Some("lib/index.js"));
    }
}
