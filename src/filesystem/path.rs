// src/filesystem/path.rs

//! Path sanitization for archive entry names
//!
//! Entry names inside the bundled archive are chosen by whoever built the
//! package. They are treated as untrusted fragments and reduced to a plain
//! relative path before anything is joined onto the mount root.

use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Reduce an untrusted entry name to a relative path
///
/// This function:
/// 1. Strips leading separators so absolute names become relative
/// 2. Skips `.` components
/// 3. Rejects `..` components
/// 4. Rejects names that are empty after the above
///
/// # Examples
///
/// ```
/// use title_installer::filesystem::path::sanitize_path;
/// use std::path::PathBuf;
///
/// assert_eq!(sanitize_path("apps/foo/boot.dol").unwrap(), PathBuf::from("apps/foo/boot.dol"));
/// assert_eq!(sanitize_path("/apps/foo").unwrap(), PathBuf::from("apps/foo"));
/// assert!(sanitize_path("../boot.dol").is_err());
/// ```
pub fn sanitize_path(name: &str) -> Result<PathBuf> {
    let relative = name.trim_start_matches('/');
    let mut normalized = PathBuf::new();

    for component in Path::new(relative).components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::CurDir => {}
            Component::ParentDir => return Err(Error::PathTraversal(name.to_string())),
            Component::Prefix(_) | Component::RootDir => {}
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(Error::InvalidPath(format!("Empty entry name: {:?}", name)));
    }

    Ok(normalized)
}

/// Join a sanitized entry name onto `root`
///
/// The deepest part of the joined path that already exists is resolved and
/// must stay under `root`. This catches symlinks anywhere along the path,
/// including a symlinked directory above a leaf that is yet to be created.
/// A dangling symlink is rejected outright since writing through it would
/// create its target.
pub fn safe_join(root: &Path, name: &str) -> Result<PathBuf> {
    let sanitized = sanitize_path(name)?;
    let joined = root.join(&sanitized);

    // Nothing on disk to resolve yet
    let Ok(canonical_root) = root.canonicalize() else {
        return Ok(joined);
    };

    if let Some(existing) = joined.ancestors().find(|p| p.symlink_metadata().is_ok()) {
        let contained = existing
            .canonicalize()
            .is_ok_and(|resolved| resolved.starts_with(&canonical_root));
        if !contained {
            return Err(Error::PathTraversal(format!(
                "{} escapes {} through {}",
                joined.display(),
                root.display(),
                existing.display()
            )));
        }
    }

    Ok(joined)
}

/// Strip a single trailing `/` from a directory entry name
///
/// ```
/// use title_installer::filesystem::path::normalize_directory_name;
///
/// assert_eq!(normalize_directory_name("apps/foo/"), "apps/foo");
/// assert_eq!(normalize_directory_name("apps/foo//"), "apps/foo/");
/// assert_eq!(normalize_directory_name("apps/foo"), "apps/foo");
/// ```
pub fn normalize_directory_name(raw: &str) -> &str {
    raw.strip_suffix('/').unwrap_or(raw)
}

/// Check that `name` is a bare file name with no directory part
pub fn sanitize_filename(name: &str) -> Result<&str> {
    if name.is_empty() {
        return Err(Error::InvalidPath("Empty filename".to_string()));
    }
    if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(Error::PathTraversal(format!("Not a bare filename: {}", name)));
    }
    Ok(name)
}
