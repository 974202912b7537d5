// src/filesystem/materializer.rs

//! Mapping archive entries onto mounted external storage

use super::path::{normalize_directory_name, safe_join, sanitize_path};
use crate::error::{Error, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A mounted external storage device
///
/// `device` is the prefix the bootstrap loader resolves, such as `fat:/`.
/// `host_root` is where that device is reachable from this process; on the
/// console both are the same string, on a workstation the device is emulated
/// by a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPoint {
    device: String,
    host_root: PathBuf,
}

impl MountPoint {
    pub fn new(device: impl Into<String>, host_root: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
            host_root: host_root.into(),
        }
    }

    /// A mount whose device prefix is also its host path
    pub fn native(device: impl Into<String>) -> Self {
        let device = device.into();
        let host_root = PathBuf::from(&device);
        Self { device, host_root }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn host_root(&self) -> &Path {
        &self.host_root
    }

    /// Device path of a relative path on this mount
    pub fn device_path(&self, relative: &Path) -> String {
        let parts: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect();
        format!("{}/{}", self.device.trim_end_matches('/'), parts.join("/"))
    }
}

/// Where one archive entry lands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// Sanitized path relative to the mount root
    pub relative: PathBuf,
    /// Path used for filesystem calls
    pub host: PathBuf,
    /// Path as the bootstrap loader will see it
    pub device: String,
}

/// Creates the directory structure for archive entries on a mount
pub struct PathMaterializer<'m> {
    mount: &'m MountPoint,
}

impl<'m> PathMaterializer<'m> {
    pub fn new(mount: &'m MountPoint) -> Self {
        Self { mount }
    }

    /// Resolve an entry name to its destination on the mount
    pub fn destination(&self, name: &str, is_directory: bool) -> Result<Destination> {
        let name = if is_directory {
            normalize_directory_name(name)
        } else {
            name
        };
        let relative = sanitize_path(name)?;
        let host = safe_join(self.mount.host_root(), name)?;
        let device = self.mount.device_path(&relative);
        Ok(Destination {
            relative,
            host,
            device,
        })
    }

    /// Create every missing ancestor directory of `path`
    pub fn ensure_parent_directories(&self, path: &Path) -> Result<()> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                fs::create_dir_all(parent).map_err(|source| Error::CreateDirectory {
                    path: parent.to_path_buf(),
                    source,
                })
            }
            _ => Ok(()),
        }
    }

    /// Create a single directory; an existing one counts as success
    pub fn create_directory(&self, path: &Path) -> Result<()> {
        match fs::create_dir(path) {
            Ok(()) => {
                debug!("Created directory {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!("Directory already exists: {}", path.display());
                Ok(())
            }
            Err(source) => Err(Error::CreateDirectory {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn mount(dir: &TempDir) -> MountPoint {
        MountPoint::new("root:/", dir.path())
    }

    #[test]
    fn test_device_path() {
        let mount = MountPoint::native("fat:/");
        assert_eq!(
            mount.device_path(Path::new("apps/foo/boot.dol")),
            "fat:/apps/foo/boot.dol"
        );
        let bare = MountPoint::native("usb:");
        assert_eq!(bare.device_path(Path::new("a")), "usb:/a");
    }

    #[test]
    fn test_destination() {
        let dir = TempDir::new().unwrap();
        let mount = mount(&dir);
        let materializer = PathMaterializer::new(&mount);

        let dest = materializer.destination("app/boot.dol", false).unwrap();
        assert_eq!(dest.relative, PathBuf::from("app/boot.dol"));
        assert_eq!(dest.host, dir.path().join("app/boot.dol"));
        assert_eq!(dest.device, "root:/app/boot.dol");

        let dir_dest = materializer.destination("app/icon/", true).unwrap();
        assert_eq!(dir_dest.device, "root:/app/icon");
        assert_eq!(dir_dest.host, dir.path().join("app/icon"));
    }

    #[test]
    fn test_destination_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let mount = mount(&dir);
        let materializer = PathMaterializer::new(&mount);
        assert!(matches!(
            materializer.destination("../outside.txt", false),
            Err(Error::PathTraversal(_))
        ));
    }

    #[test]
    fn test_ensure_parent_directories() {
        let dir = TempDir::new().unwrap();
        let mount = mount(&dir);
        let materializer = PathMaterializer::new(&mount);

        let target = dir.path().join("a/b/c/file.bin");
        materializer.ensure_parent_directories(&target).unwrap();
        assert!(dir.path().join("a/b/c").is_dir());
        assert!(!target.exists());

        // Idempotent
        materializer.ensure_parent_directories(&target).unwrap();
    }

    #[test]
    fn test_create_directory_idempotent() {
        let dir = TempDir::new().unwrap();
        let mount = mount(&dir);
        let materializer = PathMaterializer::new(&mount);

        let target = dir.path().join("icon");
        materializer.create_directory(&target).unwrap();
        materializer.create_directory(&target).unwrap();
        assert!(target.is_dir());
    }

    #[test]
    fn test_create_directory_missing_parent_fails() {
        let dir = TempDir::new().unwrap();
        let mount = mount(&dir);
        let materializer = PathMaterializer::new(&mount);

        let err = materializer
            .create_directory(&dir.path().join("missing/icon"))
            .unwrap_err();
        assert_eq!(err.code(), "DIR_CREATE_FAIL");
    }
}
