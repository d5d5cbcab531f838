//! Storage key normalization helpers.
//!
//! Keys are flat, slash-separated strings.  No directory objects exist;
//! any hierarchy is an interpretation applied at listing time.

/// Normalize a path-like name into a canonical storage key.
///
/// Backslashes become forward slashes so Windows-style paths land on the
/// same key as their slash-separated equivalents.  Case is preserved:
/// keys differing only by case are distinct.
pub fn clean_name(name: &str) -> String {
    name.replace('\\', "/")
}

/// Produce the candidate key for collision attempt `attempt`.
///
/// The counter is inserted between the file stem and its extension, and
/// the directory part is preserved: `img/a.png` -> `img/a_1.png`.  A
/// leading dot in the final segment is not treated as an extension
/// separator.
pub fn alternative_name(name: &str, attempt: u32) -> String {
    let (dir, file) = match name.rfind('/') {
        Some(idx) => (&name[..idx + 1], &name[idx + 1..]),
        None => ("", name),
    };
    let (stem, ext) = match file.rfind('.') {
        Some(idx) if idx > 0 => (&file[..idx], &file[idx..]),
        _ => (file, ""),
    };
    format!("{}{}_{}{}", dir, stem, attempt, ext)
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_name_backslashes() {
        assert_eq!(clean_name("img\\products\\a.png"), "img/products/a.png");
        assert_eq!(clean_name("already/clean.txt"), "already/clean.txt");
    }

    #[test]
    fn test_clean_name_is_idempotent() {
        let once = clean_name("a\\b\\c");
        assert_eq!(clean_name(&once), once);
    }

    #[test]
    fn test_clean_name_preserves_case() {
        assert_eq!(clean_name("Img/A.PNG"), "Img/A.PNG");
    }

    #[test]
    fn test_alternative_name_basic() {
        assert_eq!(alternative_name("a.png", 1), "a_1.png");
        assert_eq!(alternative_name("a.png", 2), "a_2.png");
    }

    #[test]
    fn test_alternative_name_preserves_directory() {
        assert_eq!(alternative_name("img/products/a.png", 3), "img/products/a_3.png");
    }

    #[test]
    fn test_alternative_name_no_extension() {
        assert_eq!(alternative_name("README", 1), "README_1");
        assert_eq!(alternative_name("docs/README", 2), "docs/README_2");
    }

    #[test]
    fn test_alternative_name_hidden_file() {
        // A leading dot is part of the name, not an extension separator.
        assert_eq!(alternative_name(".gitignore", 1), ".gitignore_1");
        assert_eq!(alternative_name("conf/.env", 1), "conf/.env_1");
    }

    #[test]
    fn test_alternative_name_multiple_dots() {
        assert_eq!(alternative_name("archive.tar.gz", 1), "archive.tar_1.gz");
    }
}
