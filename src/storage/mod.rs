// src/storage/mod.rs

//! Access to the running package's content and the privileged title store
//!
//! Both subsystems are external collaborators that report failures as
//! negative status codes. They are modelled as traits so the migration can
//! run against the real console services, against directories on a
//! workstation, or against in-memory fakes in tests:
//!
//! - [`ContentSource`]: numbered, read-only blobs of the running package
//! - [`TitleStore`]: hierarchical objects under `/title/<hi>/<lo>/...`

mod content;
mod store;
mod title;

pub use content::{
    fetch_content, AlignedBuffer, ContentBlob, ContentFd, ContentIndex, ContentSource,
    DirContentSource, MemoryContentSource, CONTENT_ALIGNMENT,
};
pub use store::{
    delete_if_present, write_object, AccessMode, DirStore, MemoryStore, OpenMode,
    StoreFd, StoreOp, StorePermissions, TitleStore,
};
pub use title::TitleId;

/// Raw status code returned by a storage subsystem
///
/// Success is never represented by a `Status`; the traits return
/// `Result<T, Status>` and only the error side carries one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(pub i32);

impl Status {
    /// Invalid argument
    pub const INVALID: Status = Status(-101);
    /// Permission denied
    pub const ACCESS_DENIED: Status = Status(-102);
    /// Object already exists
    pub const ALREADY_EXISTS: Status = Status(-105);
    /// Object does not exist
    pub const NOT_FOUND: Status = Status(-106);
    /// Descriptor is not open or was opened with the wrong mode
    pub const BAD_DESCRIPTOR: Status = Status(-4);
    /// Content index is not part of the running package
    pub const NO_SUCH_CONTENT: Status = Status(-1017);

    /// Map a host I/O error onto the closest subsystem status
    pub fn from_io(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NOT_FOUND,
            std::io::ErrorKind::AlreadyExists => Self::ALREADY_EXISTS,
            std::io::ErrorKind::PermissionDenied => Self::ACCESS_DENIED,
            _ => Self::INVALID,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
