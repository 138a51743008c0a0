//! Entry name sanitization.
//!
//! Names inside an archive are untrusted input. They are resolved lexically
//! here and never joined onto a destination path before that.

use std::path::PathBuf;

use crate::utils::errors::ArchiveError;

/// Resolve an archive entry name to a safe relative path.
///
/// `\` is treated as a separator, `.` segments are dropped and `..` pops the
/// previous segment. Empty names, absolute paths, drive prefixes, NUL bytes
/// and any `..` that climbs above the root are rejected.
pub fn sanitize_entry_name(name: &str) -> Result<PathBuf, ArchiveError> {
    let rejected = || ArchiveError::PathTraversal {
        entry: name.to_string(),
    };

    if name.is_empty() || name.contains('\0') {
        return Err(rejected());
    }

    let normalized = name.replace('\\', "/");
    if normalized.starts_with('/') || has_drive_prefix(&normalized) {
        return Err(rejected());
    }

    let mut parts: Vec<&str> = Vec::new();
    for segment in normalized.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(rejected());
                }
            }
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return Err(rejected());
    }

    Ok(parts.iter().collect())
}

/// Sanitize `name` and require it to live strictly inside `namespace`
/// (e.g. `photos/<file>`).
pub fn resolve_in_namespace(name: &str, namespace: &str) -> Result<PathBuf, ArchiveError> {
    let path = sanitize_entry_name(name)?;

    let mut components = path.components();
    let inside = components
        .next()
        .map(|c| c.as_os_str() == namespace)
        .unwrap_or(false)
        && components.next().is_some();

    if inside {
        Ok(path)
    } else {
        Err(ArchiveError::PathTraversal {
            entry: name.to_string(),
        })
    }
}

fn has_drive_prefix(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn is_traversal(result: Result<PathBuf, ArchiveError>) -> bool {
        matches!(result, Err(ArchiveError::PathTraversal { .. }))
    }

    #[test]
    fn test_plain_names_pass_through() {
        assert_eq!(
            sanitize_entry_name("photos/1_cat.jpg").unwrap(),
            Path::new("photos").join("1_cat.jpg")
        );
        assert_eq!(sanitize_entry_name("photos/").unwrap(), PathBuf::from("photos"));
        assert_eq!(
            sanitize_entry_name("metadata.json").unwrap(),
            PathBuf::from("metadata.json")
        );
    }

    #[test]
    fn test_dot_segments_are_resolved() {
        assert_eq!(
            sanitize_entry_name("photos/./x/../1.jpg").unwrap(),
            Path::new("photos").join("1.jpg")
        );
        assert_eq!(
            sanitize_entry_name("photos\\2.jpg").unwrap(),
            Path::new("photos").join("2.jpg")
        );
    }

    #[test]
    fn test_escapes_are_rejected() {
        assert!(is_traversal(sanitize_entry_name("../../etc/passwd")));
        assert!(is_traversal(sanitize_entry_name("photos/../../x")));
        assert!(is_traversal(sanitize_entry_name("..\\..\\windows\\system32")));
        assert!(is_traversal(sanitize_entry_name("/etc/passwd")));
        assert!(is_traversal(sanitize_entry_name("C:/Windows/win.ini")));
        assert!(is_traversal(sanitize_entry_name("c:evil")));
        assert!(is_traversal(sanitize_entry_name("photos/a\0.jpg")));
        assert!(is_traversal(sanitize_entry_name("")));
        assert!(is_traversal(sanitize_entry_name("a/..")));
    }

    #[test]
    fn test_namespace_is_enforced() {
        assert!(resolve_in_namespace("photos/7_dog.png", "photos").is_ok());
        assert!(is_traversal(resolve_in_namespace("photos/../metadata.json", "photos")));
        assert!(is_traversal(resolve_in_namespace("photos/", "photos")));
        assert!(is_traversal(resolve_in_namespace("photosx/1.jpg", "photos")));
        assert!(is_traversal(resolve_in_namespace("other/1.jpg", "photos")));
    }
}
