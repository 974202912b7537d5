// src/storage/store.rs

//! The privileged title store
//!
//! Objects live under `/title/<hi>/<lo>/...` and carry an attribute byte plus
//! owner/group/other access modes. The store has no transactions: callers
//! sequence create, open, write and close themselves.

use super::Status;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Access granted to one class of principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessMode {
    None,
    Read,
    Write,
    #[default]
    ReadWrite,
}

impl AccessMode {
    /// Equivalent unix rwx triplet (without execute)
    fn unix_bits(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Read => 4,
            Self::Write => 2,
            Self::ReadWrite => 6,
        }
    }
}

/// Owner/group/other access of a store object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorePermissions {
    pub owner: AccessMode,
    pub group: AccessMode,
    pub other: AccessMode,
}

impl StorePermissions {
    /// Unix mode bits approximating these permissions
    pub fn unix_mode(&self) -> u32 {
        (self.owner.unix_bits() << 6) | (self.group.unix_bits() << 3) | self.other.unix_bits()
    }
}

/// Mode an object is opened with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    ReadWrite,
}

impl OpenMode {
    fn can_read(&self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    fn can_write(&self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// Descriptor of an open store object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreFd(pub i32);

/// Privileged persistent object store
pub trait TitleStore {
    /// Create an empty object; fails with `ALREADY_EXISTS` if present
    fn create(&mut self, key: &str, permissions: StorePermissions)
    -> std::result::Result<(), Status>;

    /// Open an existing object, positioned at its start
    fn open(&mut self, key: &str, mode: OpenMode) -> std::result::Result<StoreFd, Status>;

    /// Read from the current position
    fn read(&mut self, fd: StoreFd, buf: &mut [u8]) -> std::result::Result<usize, Status>;

    /// Write at the current position
    fn write(&mut self, fd: StoreFd, data: &[u8]) -> std::result::Result<usize, Status>;

    fn close(&mut self, fd: StoreFd) -> std::result::Result<(), Status>;

    /// Remove an object; fails with `NOT_FOUND` if absent
    fn delete(&mut self, key: &str) -> std::result::Result<(), Status>;

    /// Size and permissions of an object
    fn stat(&mut self, key: &str) -> std::result::Result<(u64, StorePermissions), Status>;
}

fn store_error<'a>(op: &'static str, key: &'a str) -> impl Fn(Status) -> Error + 'a {
    move |status| Error::StoreIo {
        op,
        key: key.to_string(),
        status: status.0,
    }
}

/// Create `key` and fill it with `data`, writing at most `chunk_size` bytes per call
///
/// If anything fails after the object was created, it is closed and deleted
/// again so no truncated object is left under `key`.
pub fn write_object<S: TitleStore + ?Sized>(
    store: &mut S,
    key: &str,
    permissions: StorePermissions,
    data: &[u8],
    chunk_size: usize,
) -> Result<()> {
    store
        .create(key, permissions)
        .map_err(store_error("create", key))?;

    if let Err(e) = fill_object(store, key, data, chunk_size) {
        match store.delete(key) {
            Ok(()) => debug!("Removed partial object {}", key),
            Err(status) => warn!("Could not remove partial object {} (status {})", key, status),
        }
        return Err(e);
    }

    debug!("Wrote {} bytes to {}", data.len(), key);
    Ok(())
}

/// Open an existing object and write `data` to it; the fd is always closed
fn fill_object<S: TitleStore + ?Sized>(
    store: &mut S,
    key: &str,
    data: &[u8],
    chunk_size: usize,
) -> Result<()> {
    let fd = store
        .open(key, OpenMode::Write)
        .map_err(store_error("open", key))?;

    let mut outcome = Ok(());
    for chunk in data.chunks(chunk_size.max(1)) {
        match store.write(fd, chunk) {
            Ok(written) if written == chunk.len() => {}
            Ok(_) => {
                outcome = Err(store_error("write", key)(Status::INVALID));
                break;
            }
            Err(status) => {
                outcome = Err(store_error("write", key)(status));
                break;
            }
        }
    }

    let closed = store.close(fd).map_err(store_error("close", key));
    outcome.and(closed)
}

/// Delete `key`, treating an absent object as success
///
/// Returns whether an object was actually removed.
pub fn delete_if_present<S: TitleStore + ?Sized>(store: &mut S, key: &str) -> Result<bool> {
    match store.delete(key) {
        Ok(()) => {
            debug!("Deleted {}", key);
            Ok(true)
        }
        Err(Status::NOT_FOUND) => {
            debug!("Nothing to delete at {}", key);
            Ok(false)
        }
        Err(status) => Err(Error::StoreIo {
            op: "delete",
            key: key.to_string(),
            status: status.0,
        }),
    }
}

/// Store operation, used to script failures and inspect call order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Create,
    Open,
    Read,
    Write,
    Close,
    Delete,
}

#[derive(Debug, Clone)]
struct MemoryObject {
    permissions: StorePermissions,
    data: Vec<u8>,
}

#[derive(Debug)]
struct OpenObject {
    key: String,
    mode: OpenMode,
    position: usize,
}

/// Title store held in memory, with scriptable failures
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: HashMap<String, MemoryObject>,
    open: HashMap<i32, OpenObject>,
    next_fd: i32,
    failures: HashMap<(StoreOp, String), Status>,
    log: Vec<(StoreOp, String)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object with content
    pub fn with_object(
        mut self,
        key: impl Into<String>,
        permissions: StorePermissions,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        self.objects.insert(
            key.into(),
            MemoryObject {
                permissions,
                data: data.into(),
            },
        );
        self
    }

    /// Make every `op` on `key` fail with `status`
    pub fn fail_on(mut self, op: StoreOp, key: impl Into<String>, status: Status) -> Self {
        self.failures.insert((op, key.into()), status);
        self
    }

    /// Contents of an object, if present
    pub fn contents(&self, key: &str) -> Option<&[u8]> {
        self.objects.get(key).map(|o| o.data.as_slice())
    }

    pub fn permissions(&self, key: &str) -> Option<StorePermissions> {
        self.objects.get(key).map(|o| o.permissions)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }

    /// Every operation attempted so far, in order
    pub fn operations(&self) -> &[(StoreOp, String)] {
        &self.log
    }

    fn check(&mut self, op: StoreOp, key: &str) -> std::result::Result<(), Status> {
        self.log.push((op, key.to_string()));
        match self.failures.get(&(op, key.to_string())) {
            Some(status) => Err(*status),
            None => Ok(()),
        }
    }

    fn open_key(&self, fd: StoreFd) -> std::result::Result<String, Status> {
        self.open
            .get(&fd.0)
            .map(|o| o.key.clone())
            .ok_or(Status::BAD_DESCRIPTOR)
    }
}

impl TitleStore for MemoryStore {
    fn create(
        &mut self,
        key: &str,
        permissions: StorePermissions,
    ) -> std::result::Result<(), Status> {
        self.check(StoreOp::Create, key)?;
        if !key.starts_with('/') {
            return Err(Status::INVALID);
        }
        if self.objects.contains_key(key) {
            return Err(Status::ALREADY_EXISTS);
        }
        self.objects.insert(
            key.to_string(),
            MemoryObject {
                permissions,
                data: Vec::new(),
            },
        );
        Ok(())
    }

    fn open(&mut self, key: &str, mode: OpenMode) -> std::result::Result<StoreFd, Status> {
        self.check(StoreOp::Open, key)?;
        if !self.objects.contains_key(key) {
            return Err(Status::NOT_FOUND);
        }
        let fd = self.next_fd;
        self.next_fd += 1;
        self.open.insert(
            fd,
            OpenObject {
                key: key.to_string(),
                mode,
                position: 0,
            },
        );
        Ok(StoreFd(fd))
    }

    fn read(&mut self, fd: StoreFd, buf: &mut [u8]) -> std::result::Result<usize, Status> {
        let key = self.open_key(fd)?;
        self.check(StoreOp::Read, &key)?;
        let handle = self.open.get_mut(&fd.0).ok_or(Status::BAD_DESCRIPTOR)?;
        if !handle.mode.can_read() {
            return Err(Status::ACCESS_DENIED);
        }
        let data = &self.objects.get(&key).ok_or(Status::NOT_FOUND)?.data;
        let remaining = data.len().saturating_sub(handle.position);
        let n = remaining.min(buf.len());
        buf[..n].copy_from_slice(&data[handle.position..handle.position + n]);
        handle.position += n;
        Ok(n)
    }

    fn write(&mut self, fd: StoreFd, data: &[u8]) -> std::result::Result<usize, Status> {
        let key = self.open_key(fd)?;
        self.check(StoreOp::Write, &key)?;
        let handle = self.open.get_mut(&fd.0).ok_or(Status::BAD_DESCRIPTOR)?;
        if !handle.mode.can_write() {
            return Err(Status::ACCESS_DENIED);
        }
        let object = self.objects.get_mut(&key).ok_or(Status::NOT_FOUND)?;
        let end = handle.position + data.len();
        if object.data.len() < end {
            object.data.resize(end, 0);
        }
        object.data[handle.position..end].copy_from_slice(data);
        handle.position = end;
        Ok(data.len())
    }

    fn close(&mut self, fd: StoreFd) -> std::result::Result<(), Status> {
        let key = self.open_key(fd)?;
        self.check(StoreOp::Close, &key)?;
        self.open.remove(&fd.0);
        Ok(())
    }

    fn delete(&mut self, key: &str) -> std::result::Result<(), Status> {
        self.check(StoreOp::Delete, key)?;
        self.objects
            .remove(key)
            .map(|_| ())
            .ok_or(Status::NOT_FOUND)
    }

    fn stat(&mut self, key: &str) -> std::result::Result<(u64, StorePermissions), Status> {
        self.objects
            .get(key)
            .map(|o| (o.data.len() as u64, o.permissions))
            .ok_or(Status::NOT_FOUND)
    }
}

/// Title store mirrored into a host directory
///
/// The key `/title/a/b/data/state.txt` maps to `<root>/title/a/b/data/state.txt`.
/// Permissions are applied as unix mode bits where supported.
pub struct DirStore {
    root: PathBuf,
    open: HashMap<i32, (File, OpenMode)>,
    next_fd: i32,
}

impl DirStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            open: HashMap::new(),
            next_fd: 0,
        }
    }

    /// Host path backing a key
    pub fn object_path(&self, key: &str) -> std::result::Result<PathBuf, Status> {
        let relative = key.strip_prefix('/').ok_or(Status::INVALID)?;
        if relative.split('/').any(|c| c == ".." || c.is_empty()) {
            return Err(Status::INVALID);
        }
        Ok(self.root.join(relative))
    }

    fn handle(&mut self, fd: StoreFd) -> std::result::Result<&mut (File, OpenMode), Status> {
        self.open.get_mut(&fd.0).ok_or(Status::BAD_DESCRIPTOR)
    }
}

impl TitleStore for DirStore {
    fn create(
        &mut self,
        key: &str,
        permissions: StorePermissions,
    ) -> std::result::Result<(), Status> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Status::from_io(&e))?;
        }
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| Status::from_io(&e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            // The emulated store must stay writable for the owner running it
            let mode = permissions.unix_mode() | 0o600;
            if let Err(e) = fs::set_permissions(&path, fs::Permissions::from_mode(mode)) {
                warn!("Could not apply permissions to {}: {}", path.display(), e);
            }
        }
        #[cfg(not(unix))]
        let _ = permissions;

        Ok(())
    }

    fn open(&mut self, key: &str, mode: OpenMode) -> std::result::Result<StoreFd, Status> {
        let path = self.object_path(key)?;
        let file = OpenOptions::new()
            .read(mode.can_read())
            .write(mode.can_write())
            .open(&path)
            .map_err(|e| Status::from_io(&e))?;
        let fd = self.next_fd;
        self.next_fd += 1;
        self.open.insert(fd, (file, mode));
        Ok(StoreFd(fd))
    }

    fn read(&mut self, fd: StoreFd, buf: &mut [u8]) -> std::result::Result<usize, Status> {
        let (file, mode) = self.handle(fd)?;
        if !mode.can_read() {
            return Err(Status::ACCESS_DENIED);
        }
        file.read(buf).map_err(|e| Status::from_io(&e))
    }

    fn write(&mut self, fd: StoreFd, data: &[u8]) -> std::result::Result<usize, Status> {
        let (file, mode) = self.handle(fd)?;
        if !mode.can_write() {
            return Err(Status::ACCESS_DENIED);
        }
        file.write_all(data).map_err(|e| Status::from_io(&e))?;
        Ok(data.len())
    }

    fn close(&mut self, fd: StoreFd) -> std::result::Result<(), Status> {
        let (file, _) = self.open.remove(&fd.0).ok_or(Status::BAD_DESCRIPTOR)?;
        file.sync_all().map_err(|e| Status::from_io(&e))
    }

    fn delete(&mut self, key: &str) -> std::result::Result<(), Status> {
        let path = self.object_path(key)?;
        fs::remove_file(&path).map_err(|e| Status::from_io(&e))
    }

    fn stat(&mut self, key: &str) -> std::result::Result<(u64, StorePermissions), Status> {
        let path = self.object_path(key)?;
        let meta = fs::metadata(&path).map_err(|e| Status::from_io(&e))?;
        Ok((meta.len(), permissions_from_metadata(&meta)))
    }
}

#[cfg(unix)]
fn permissions_from_metadata(meta: &fs::Metadata) -> StorePermissions {
    use std::os::unix::fs::PermissionsExt;
    let mode = meta.permissions().mode();
    let access = |bits: u32| match (bits & 4 != 0, bits & 2 != 0) {
        (true, true) => AccessMode::ReadWrite,
        (true, false) => AccessMode::Read,
        (false, true) => AccessMode::Write,
        (false, false) => AccessMode::None,
    };
    StorePermissions {
        owner: access(mode >> 6),
        group: access(mode >> 3),
        other: access(mode),
    }
}

#[cfg(not(unix))]
fn permissions_from_metadata(_meta: &fs::Metadata) -> StorePermissions {
    StorePermissions::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "/title/00010001/4f534341/data/state.txt";

    #[test]
    fn test_unix_mode() {
        assert_eq!(StorePermissions::default().unix_mode(), 0o666);
        let owner_only = StorePermissions {
            owner: AccessMode::ReadWrite,
            group: AccessMode::Read,
            other: AccessMode::None,
        };
        assert_eq!(owner_only.unix_mode(), 0o640);
    }

    #[test]
    fn test_write_object_chunks() {
        let mut store = MemoryStore::new();
        let data: Vec<u8> = (0..100u8).collect();

        write_object(&mut store, KEY, StorePermissions::default(), &data, 32).unwrap();

        assert_eq!(store.contents(KEY), Some(&data[..]));
        let writes = store
            .operations()
            .iter()
            .filter(|(op, _)| *op == StoreOp::Write)
            .count();
        assert_eq!(writes, 4);
    }

    #[test]
    fn test_write_object_existing_fails() {
        let mut store = MemoryStore::new().with_object(KEY, StorePermissions::default(), b"old".to_vec());
        let err = write_object(&mut store, KEY, StorePermissions::default(), b"new", 32).unwrap_err();
        assert!(matches!(
            err,
            Error::StoreIo { op: "create", status, .. } if status == Status::ALREADY_EXISTS.0
        ));
        assert_eq!(store.contents(KEY), Some(&b"old"[..]));
    }

    #[test]
    fn test_write_object_failure_removes_partial_object() {
        let mut store = MemoryStore::new().fail_on(StoreOp::Write, KEY, Status::ACCESS_DENIED);
        let err = write_object(&mut store, KEY, StorePermissions::default(), b"x", 32).unwrap_err();

        assert_eq!(err.code(), "-102");
        assert!(!store.contains(KEY));
        let ops: Vec<StoreOp> = store.operations().iter().map(|(op, _)| *op).collect();
        assert_eq!(
            ops,
            vec![
                StoreOp::Create,
                StoreOp::Open,
                StoreOp::Write,
                StoreOp::Close,
                StoreOp::Delete
            ]
        );
    }

    #[test]
    fn test_write_object_close_failure_removes_object() {
        let mut store = MemoryStore::new().fail_on(StoreOp::Close, KEY, Status::INVALID);
        let err = write_object(&mut store, KEY, StorePermissions::default(), b"payload", 4)
            .unwrap_err();

        assert!(matches!(err, Error::StoreIo { op: "close", .. }));
        assert!(!store.contains(KEY));
    }

    #[test]
    fn test_delete_if_present() {
        let mut store = MemoryStore::new().with_object(KEY, StorePermissions::default(), Vec::new());
        assert!(delete_if_present(&mut store, KEY).unwrap());
        assert!(!delete_if_present(&mut store, KEY).unwrap());

        let mut failing = MemoryStore::new().fail_on(StoreOp::Delete, KEY, Status::ACCESS_DENIED);
        assert!(delete_if_present(&mut failing, KEY).is_err());
    }

    #[test]
    fn test_memory_store_read_back() {
        let mut store = MemoryStore::new();
        write_object(&mut store, KEY, StorePermissions::default(), b"fat:/apps/x/boot.dol", 8)
            .unwrap();

        let fd = store.open(KEY, OpenMode::Read).unwrap();
        let mut buf = [0u8; 64];
        let n = store.read(fd, &mut buf).unwrap();
        store.close(fd).unwrap();
        assert_eq!(&buf[..n], b"fat:/apps/x/boot.dol");

        let fd = store.open(KEY, OpenMode::Read).unwrap();
        assert_eq!(store.write(fd, b"nope"), Err(Status::ACCESS_DENIED));
    }

    #[test]
    fn test_dir_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DirStore::new(dir.path());

        write_object(&mut store, KEY, StorePermissions::default(), b"payload", 4).unwrap();
        let on_disk = dir.path().join("title/00010001/4f534341/data/state.txt");
        assert_eq!(fs::read(&on_disk).unwrap(), b"payload");
        assert_eq!(store.stat(KEY).unwrap().0, 7);

        assert_eq!(store.create(KEY, StorePermissions::default()), Err(Status::ALREADY_EXISTS));
        store.delete(KEY).unwrap();
        assert_eq!(store.delete(KEY), Err(Status::NOT_FOUND));
    }

    #[test]
    fn test_dir_store_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::new(dir.path());
        assert_eq!(store.object_path("relative"), Err(Status::INVALID));
        assert_eq!(store.object_path("/title/../../etc"), Err(Status::INVALID));
    }
}
