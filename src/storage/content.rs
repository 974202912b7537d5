// src/storage/content.rs

//! Content slots of the running package
//!
//! The privileged read primitive needs destination memory aligned to 32
//! bytes, and the transfer length rounded up to the same boundary. Blobs are
//! therefore read into an [`AlignedBuffer`]; everything downstream only ever
//! sees the logical, unaligned length reported by the content subsystem.

use super::{Status, TitleId};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Alignment required by the content read primitive
pub const CONTENT_ALIGNMENT: usize = 32;

/// Index of a content slot inside the running package
pub type ContentIndex = u32;

/// Descriptor of an open content slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentFd(pub i32);

/// Read-only access to the running package's content slots
pub trait ContentSource {
    /// Open a content slot by index
    fn open_content(&mut self, index: ContentIndex) -> std::result::Result<ContentFd, Status>;

    /// Size in bytes of an open slot
    fn size(&mut self, fd: ContentFd) -> std::result::Result<u64, Status>;

    /// Read from the start of the slot into `buf`, returning the bytes read
    ///
    /// `buf` may be longer than the slot; the tail is left untouched.
    fn read(&mut self, fd: ContentFd, buf: &mut [u8]) -> std::result::Result<usize, Status>;

    /// Close an open slot
    fn close(&mut self, fd: ContentFd) -> std::result::Result<(), Status>;

    /// Identifier of the running package
    fn title_id(&mut self) -> std::result::Result<TitleId, Status>;
}

#[derive(Clone, Copy, Debug)]
#[repr(C, align(32))]
struct Block([u8; CONTENT_ALIGNMENT]);

/// Zeroed byte buffer whose storage is 32-byte aligned and padded
///
/// The capacity is the requested length rounded up to the next multiple of
/// [`CONTENT_ALIGNMENT`].
#[derive(Debug)]
pub struct AlignedBuffer {
    blocks: Vec<Block>,
}

impl AlignedBuffer {
    /// Allocate a zeroed buffer able to hold `len` bytes
    pub fn new(len: usize) -> Self {
        let blocks = len.div_ceil(CONTENT_ALIGNMENT);
        Self {
            blocks: vec![Block([0; CONTENT_ALIGNMENT]); blocks],
        }
    }

    /// Round `len` up to the next multiple of [`CONTENT_ALIGNMENT`]
    pub fn padded_len(len: usize) -> usize {
        len.div_ceil(CONTENT_ALIGNMENT) * CONTENT_ALIGNMENT
    }

    /// Total padded capacity in bytes
    pub fn capacity(&self) -> usize {
        self.blocks.len() * CONTENT_ALIGNMENT
    }

    /// Whole padded buffer
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: `Block` is `repr(C)` over a byte array with no padding, so
        // the vector's storage is `capacity()` contiguous initialized bytes.
        unsafe { std::slice::from_raw_parts(self.blocks.as_ptr().cast::<u8>(), self.capacity()) }
    }

    /// Whole padded buffer, mutable
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        let len = self.capacity();
        // SAFETY: as in `as_slice`, and the borrow is unique through `&mut self`.
        unsafe { std::slice::from_raw_parts_mut(self.blocks.as_mut_ptr().cast::<u8>(), len) }
    }
}

/// A content slot read fully into memory
#[derive(Debug)]
pub struct ContentBlob {
    index: ContentIndex,
    buffer: AlignedBuffer,
    len: usize,
}

impl ContentBlob {
    /// Slot this blob was read from
    pub fn index(&self) -> ContentIndex {
        self.index
    }

    /// Logical size reported by the content subsystem
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of the padded read buffer
    pub fn padded_len(&self) -> usize {
        self.buffer.capacity()
    }

    /// The blob's bytes, without alignment padding
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer.as_slice()[..self.len]
    }
}

/// Read a whole content slot: open, size, allocate aligned, read, close
///
/// The slot is closed on every path, including failures after the open.
pub fn fetch_content<C: ContentSource + ?Sized>(
    source: &mut C,
    index: ContentIndex,
) -> Result<ContentBlob> {
    let fd = source
        .open_content(index)
        .map_err(content_error("open", index))?;

    let blob = match read_open_slot(source, fd, index) {
        Ok(blob) => blob,
        Err(e) => {
            if let Err(status) = source.close(fd) {
                debug!("Closing content {} after failure: status {}", index, status);
            }
            return Err(e);
        }
    };
    source.close(fd).map_err(content_error("close", index))?;

    debug!(
        "Read content {} ({} bytes, {} allocated)",
        index,
        blob.len,
        blob.buffer.capacity()
    );
    Ok(blob)
}

fn content_error(op: &'static str, index: ContentIndex) -> impl Fn(Status) -> Error {
    move |status| Error::ContentIo {
        op,
        index,
        status: status.0,
    }
}

fn read_open_slot<C: ContentSource + ?Sized>(
    source: &mut C,
    fd: ContentFd,
    index: ContentIndex,
) -> Result<ContentBlob> {
    let size = source.size(fd).map_err(content_error("size", index))?;
    let len = usize::try_from(size).map_err(|_| content_error("size", index)(Status::INVALID))?;

    let mut buffer = AlignedBuffer::new(len);
    let read = source
        .read(fd, buffer.as_mut_slice())
        .map_err(content_error("read", index))?;
    if read != len {
        return Err(content_error("read", index)(Status::INVALID));
    }

    Ok(ContentBlob { index, buffer, len })
}

/// Content slots held in memory
#[derive(Debug, Default)]
pub struct MemoryContentSource {
    title: Option<TitleId>,
    slots: HashMap<ContentIndex, Vec<u8>>,
    open: HashMap<i32, ContentIndex>,
    next_fd: i32,
    /// Last read buffer length seen, for alignment assertions
    last_read_len: Option<usize>,
    read_failures: HashMap<ContentIndex, Status>,
}

impl MemoryContentSource {
    /// Create a source for the given title with no slots
    pub fn new(title: TitleId) -> Self {
        Self {
            title: Some(title),
            ..Default::default()
        }
    }

    /// Create a source whose title id lookup fails
    pub fn without_title() -> Self {
        Self::default()
    }

    /// Add or replace a slot
    pub fn with_slot(mut self, index: ContentIndex, data: impl Into<Vec<u8>>) -> Self {
        self.slots.insert(index, data.into());
        self
    }

    /// Make every read of slot `index` fail with `status`
    pub fn fail_reads(mut self, index: ContentIndex, status: Status) -> Self {
        self.read_failures.insert(index, status);
        self
    }

    /// Length of the destination buffer passed to the most recent read
    pub fn last_read_len(&self) -> Option<usize> {
        self.last_read_len
    }

    /// Number of slots currently open
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    fn slot(&self, fd: ContentFd) -> std::result::Result<&Vec<u8>, Status> {
        let index = self.open.get(&fd.0).ok_or(Status::BAD_DESCRIPTOR)?;
        self.slots.get(index).ok_or(Status::NO_SUCH_CONTENT)
    }
}

impl ContentSource for MemoryContentSource {
    fn open_content(&mut self, index: ContentIndex) -> std::result::Result<ContentFd, Status> {
        if !self.slots.contains_key(&index) {
            return Err(Status::NO_SUCH_CONTENT);
        }
        let fd = self.next_fd;
        self.next_fd += 1;
        self.open.insert(fd, index);
        Ok(ContentFd(fd))
    }

    fn size(&mut self, fd: ContentFd) -> std::result::Result<u64, Status> {
        Ok(self.slot(fd)?.len() as u64)
    }

    fn read(&mut self, fd: ContentFd, buf: &mut [u8]) -> std::result::Result<usize, Status> {
        self.last_read_len = Some(buf.len());
        if let Some(index) = self.open.get(&fd.0)
            && let Some(status) = self.read_failures.get(index)
        {
            return Err(*status);
        }
        let data = self.slot(fd)?;
        if buf.len() < data.len() {
            return Err(Status::INVALID);
        }
        buf[..data.len()].copy_from_slice(data);
        Ok(data.len())
    }

    fn close(&mut self, fd: ContentFd) -> std::result::Result<(), Status> {
        self.open
            .remove(&fd.0)
            .map(|_| ())
            .ok_or(Status::BAD_DESCRIPTOR)
    }

    fn title_id(&mut self) -> std::result::Result<TitleId, Status> {
        self.title.ok_or(Status::INVALID)
    }
}

/// Content slots stored as `<index as 8 hex digits>.app` files in a directory
///
/// This is the layout of an unpacked title on a workstation.
pub struct DirContentSource {
    dir: PathBuf,
    title: TitleId,
    open: HashMap<i32, File>,
    next_fd: i32,
}

impl DirContentSource {
    pub fn new(dir: impl AsRef<Path>, title: TitleId) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            title,
            open: HashMap::new(),
            next_fd: 0,
        }
    }

    /// Path of the file backing a slot
    pub fn slot_path(&self, index: ContentIndex) -> PathBuf {
        self.dir.join(format!("{:08x}.app", index))
    }

    fn file(&mut self, fd: ContentFd) -> std::result::Result<&mut File, Status> {
        self.open.get_mut(&fd.0).ok_or(Status::BAD_DESCRIPTOR)
    }
}

impl ContentSource for DirContentSource {
    fn open_content(&mut self, index: ContentIndex) -> std::result::Result<ContentFd, Status> {
        let path = self.slot_path(index);
        let file = File::open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Status::NO_SUCH_CONTENT,
            _ => Status::from_io(&e),
        })?;
        let fd = self.next_fd;
        self.next_fd += 1;
        self.open.insert(fd, file);
        Ok(ContentFd(fd))
    }

    fn size(&mut self, fd: ContentFd) -> std::result::Result<u64, Status> {
        let file = self.file(fd)?;
        let meta = file.metadata().map_err(|e| Status::from_io(&e))?;
        Ok(meta.len())
    }

    fn read(&mut self, fd: ContentFd, buf: &mut [u8]) -> std::result::Result<usize, Status> {
        let file = self.file(fd)?;
        file.seek(SeekFrom::Start(0))
            .map_err(|e| Status::from_io(&e))?;
        let mut total = 0;
        loop {
            let n = file
                .read(&mut buf[total..])
                .map_err(|e| Status::from_io(&e))?;
            if n == 0 {
                break;
            }
            total += n;
            if total == buf.len() {
                break;
            }
        }
        Ok(total)
    }

    fn close(&mut self, fd: ContentFd) -> std::result::Result<(), Status> {
        self.open
            .remove(&fd.0)
            .map(|_| ())
            .ok_or(Status::BAD_DESCRIPTOR)
    }

    fn title_id(&mut self) -> std::result::Result<TitleId, Status> {
        if fs::metadata(&self.dir).is_err() {
            return Err(Status::NOT_FOUND);
        }
        Ok(self.title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_len() {
        assert_eq!(AlignedBuffer::padded_len(0), 0);
        assert_eq!(AlignedBuffer::padded_len(1), 32);
        assert_eq!(AlignedBuffer::padded_len(32), 32);
        assert_eq!(AlignedBuffer::padded_len(33), 64);
        assert_eq!(AlignedBuffer::padded_len(1000), 1024);
    }

    #[test]
    fn test_aligned_buffer_alignment() {
        let buf = AlignedBuffer::new(45);
        assert_eq!(buf.capacity(), 64);
        assert_eq!(buf.as_slice().as_ptr() as usize % CONTENT_ALIGNMENT, 0);
        assert!(buf.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_fetch_preserves_logical_size() {
        let data: Vec<u8> = (0..45u8).collect();
        let mut source = MemoryContentSource::new(TitleId(1)).with_slot(3, data.clone());

        let blob = fetch_content(&mut source, 3).unwrap();
        assert_eq!(blob.index(), 3);
        assert_eq!(blob.len(), 45);
        assert_eq!(blob.padded_len(), 64);
        assert_eq!(blob.as_bytes(), &data[..]);
        assert_eq!(source.last_read_len(), Some(64));
        assert_eq!(source.open_count(), 0);
    }

    #[test]
    fn test_fetch_exact_multiple_not_padded() {
        let mut source = MemoryContentSource::new(TitleId(1)).with_slot(3, vec![7u8; 64]);
        let blob = fetch_content(&mut source, 3).unwrap();
        assert_eq!(blob.padded_len(), 64);
        assert_eq!(source.last_read_len(), Some(64));
    }

    #[test]
    fn test_fetch_missing_slot() {
        let mut source = MemoryContentSource::new(TitleId(1));
        let err = fetch_content(&mut source, 3).unwrap_err();
        assert!(matches!(
            err,
            Error::ContentIo { op: "open", index: 3, status } if status == Status::NO_SUCH_CONTENT.0
        ));
    }

    #[test]
    fn test_fetch_read_failure_closes_slot() {
        let mut source = MemoryContentSource::new(TitleId(1))
            .with_slot(3, vec![1u8; 100])
            .fail_reads(3, Status::INVALID);

        let err = fetch_content(&mut source, 3).unwrap_err();
        assert!(matches!(err, Error::ContentIo { op: "read", index: 3, .. }));
        assert_eq!(source.open_count(), 0);
    }

    #[test]
    fn test_dir_content_source() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("00000003.app"), b"hello content").unwrap();
        let mut source = DirContentSource::new(dir.path(), TitleId(0x10001_0000_0042));

        let blob = fetch_content(&mut source, 3).unwrap();
        assert_eq!(blob.as_bytes(), b"hello content");
        assert_eq!(blob.padded_len(), 32);
        assert_eq!(source.title_id().unwrap(), TitleId(0x10001_0000_0042));

        assert!(fetch_content(&mut source, 4).is_err());
    }
}
