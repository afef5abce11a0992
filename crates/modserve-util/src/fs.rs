use percent_encoding::percent_decode_str;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Read a file to string, replacing invalid UTF-8 sequences with the replacement character.
///
/// # Errors
/// Returns an error if the file cannot be read.
pub fn read_to_string_lossy(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Compute the path of `target` relative to the directory `from`.
///
/// Both paths should be absolute and normalized (e.g. canonicalized). The
/// result uses `/` separators and never starts with `./`. Returns `None` when
/// the paths live on different prefixes (e.g. different Windows drives).
#[must_use]
pub fn relative_path(from: &Path, target: &Path) -> Option<String> {
    let from: Vec<Component<'_>> = from.components().collect();
    let target: Vec<Component<'_>> = target.components().collect();

    if let (Some(Component::Prefix(a)), Some(Component::Prefix(b))) = (from.first(), target.first())
    {
        if a != b {
            return None;
        }
    }

    let common = from
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = Vec::new();
    for _ in common..from.len() {
        parts.push("..".to_string());
    }
    for component in &target[common..] {
        parts.push(component.as_os_str().to_string_lossy().into_owned());
    }

    Some(parts.join("/"))
}

/// Turn a URL path (no query) into a path relative to a served root.
///
/// Percent-escapes are decoded first. Returns `None` when the decoded path
/// is not UTF-8 or has a component other than a plain name or `.`, so
/// `..`, `%2e%2e` and absolute segments never leave the root.
#[must_use]
pub fn url_path_to_relative(url_path: &str) -> Option<PathBuf> {
    let decoded = percent_decode_str(url_path).decode_utf8().ok()?;
    let relative = Path::new(decoded.trim_start_matches('/'));
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return None;
    }
    Some(relative.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_to_string_lossy_valid_utf8() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        file.flush().unwrap();

        let content = read_to_string_lossy(file.path()).unwrap();
        assert_eq!(content, "hello world");
    }

    #[test]
    fn test_read_to_string_lossy_invalid_utf8() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0x48, 0x65, 0x6c, 0x6c, 0x6f, 0x80, 0x81])
            .unwrap();
        file.flush().unwrap();

        let content = read_to_string_lossy(file.path()).unwrap();
        assert!(content.starts_with("Hello"));
        assert!(content.contains('\u{FFFD}'));
    }

    #[cfg(unix)]
    #[test]
    fn test_relative_path_sibling() {
        let rel = relative_path(Path::new("/project/src"), Path::new("/project/src/a.js"));
        assert_eq!(rel.as_deref(), Some("a.js"));
    }

    #[cfg(unix)]
    #[test]
    fn test_relative_path_into_node_modules() {
        let rel = relative_path(
            Path::new("/project"),
            Path::new("/project/node_modules/pkg/dist/index.js"),
        );
        assert_eq!(rel.as_deref(), Some("node_modules/pkg/dist/index.js"));
    }

    #[cfg(unix)]
    #[test]
    fn test_relative_path_parent() {
        let rel = relative_path(
            Path::new("/project/src/components"),
            Path::new("/project/node_modules/pkg/index.js"),
        );
        assert_eq!(rel.as_deref(), Some("../../node_modules/pkg/index.js"));
    }

    #[test]
    fn test_url_path_to_relative_decodes_escapes() {
        assert_eq!(
            url_path_to_relative("/my%20mod.js"),
            Some(PathBuf::from("my mod.js"))
        );
        assert_eq!(
            url_path_to_relative("/src/caf%C3%A9.mjs"),
            Some(PathBuf::from("src/café.mjs"))
        );
        assert_eq!(url_path_to_relative("/src/app.js"), Some(PathBuf::from("src/app.js")));
    }

    #[test]
    fn test_url_path_to_relative_rejects_escape() {
        assert_eq!(url_path_to_relative("/../secret.js"), None);
        assert_eq!(url_path_to_relative("/%2e%2e/secret.js"), None);
        assert_eq!(url_path_to_relative("/a/%2E%2E/%2E%2E/secret.js"), None);
        assert_eq!(url_path_to_relative("/%FF.js"), None);
    }
}
