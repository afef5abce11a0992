//! In-place text patching.

use tracing::warn;

/// Replace `start..end` (byte offsets into the original text) with `replacement`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub start: usize,
    pub end: usize,
    pub replacement: String,
}

impl Patch {
    #[must_use]
    pub fn new(start: usize, end: usize, replacement: impl Into<String>) -> Self {
        Self {
            start,
            end,
            replacement: replacement.into(),
        }
    }
}

/// Apply patches to `source`, all offsets referring to the unmodified text.
///
/// Patches are applied from the highest start offset down, so each splice only
/// shifts text that later (lower-offset) patches never touch. A patch that
/// overlaps one already applied, or whose range is not valid in `source`, is
/// skipped.
#[must_use]
pub fn apply_patches(source: &str, mut patches: Vec<Patch>) -> String {
    if patches.is_empty() {
        return source.to_string();
    }

    patches.sort_by(|a, b| b.start.cmp(&a.start).then(b.end.cmp(&a.end)));

    let mut out = source.to_string();
    // Lowest offset already rewritten; everything below it still matches `source`.
    let mut floor = source.len();

    for patch in patches {
        let valid = patch.start <= patch.end
            && patch.end <= floor
            && source.is_char_boundary(patch.start)
            && source.is_char_boundary(patch.end);

        if !valid {
            warn!(
                start = patch.start,
                end = patch.end,
                floor,
                "Skipping overlapping or out-of-range patch"
            );
            continue;
        }

        out.replace_range(patch.start..patch.end, &patch.replacement);
        floor = patch.start;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Apply patches front to back, shifting every later offset by the length
    /// delta of each edit as it is made.
    fn apply_forward_remeasuring(source: &str, mut patches: Vec<Patch>) -> String {
        patches.sort_by_key(|p| p.start);
        let mut out = source.to_string();
        let mut shift: isize = 0;
        for p in patches {
            let start = (p.start as isize + shift) as usize;
            let end = (p.end as isize + shift) as usize;
            out.replace_range(start..end, &p.replacement);
            shift += p.replacement.len() as isize - (p.end - p.start) as isize;
        }
        out
    }

    #[test]
    fn test_no_patches_is_identity() {
        assert_eq!(apply_patches("abc", Vec::new()), "abc");
    }

    #[test]
    fn test_single_patch() {
        let out = apply_patches("import x from 'a';", vec![Patch::new(14, 17, "\"./a.js\"")]);
        assert_eq!(out, "import x from \"./a.js\";");
    }

    #[test]
    fn test_order_of_input_does_not_matter() {
        let source = "'a' 'bb' 'ccc'";
        let patches = vec![
            Patch::new(0, 3, "\"./node_modules/a/index.js\""),
            Patch::new(9, 14, "\"./c.js\""),
            Patch::new(4, 8, "\"./b\""),
        ];
        let mut reversed = patches.clone();
        reversed.reverse();

        let expected = "\"./node_modules/a/index.js\" \"./b\" \"./c.js\"";
        assert_eq!(apply_patches(source, patches), expected);
        assert_eq!(apply_patches(source, reversed), expected);
    }

    #[test]
    fn test_matches_forward_application_with_remeasured_offsets() {
        let source = "import a from 'a';\nimport b from 'bee';\nexport * from 'c';\nimport('d');\n";
        let patches = vec![
            Patch::new(14, 17, "\"./node_modules/a/dist/esm/index.js\""),
            Patch::new(33, 38, "\"./b.js\""),
            Patch::new(54, 57, "\"../c/index.mjs\""),
            Patch::new(66, 69, "\"./d\""),
        ];
        for p in &patches {
            assert!(source[p.start..p.end].starts_with('\''));
            assert!(source[p.start..p.end].ends_with('\''));
        }

        assert_eq!(
            apply_patches(source, patches.clone()),
            apply_forward_remeasuring(source, patches)
        );
    }

    #[test]
    fn test_overlapping_patch_is_skipped() {
        let source = "0123456789";
        let out = apply_patches(source, vec![Patch::new(2, 6, "X"), Patch::new(4, 8, "Y")]);
        assert_eq!(out, "0123Y89");
    }

    #[test]
    fn test_out_of_range_patch_is_skipped() {
        assert_eq!(apply_patches("abc", vec![Patch::new(2, 10, "X")]), "abc");
    }

    #[test]
    fn test_non_char_boundary_patch_is_skipped() {
        assert_eq!(apply_patches("é", vec![Patch::new(1, 2, "X")]), "é");
    }
}
