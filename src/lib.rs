// src/lib.rs

//! Title Installer
//!
//! One-shot first-run migration for a title running in a privileged console
//! context. The archive bundled as a content slot of the running package is
//! extracted onto external storage, then the next launch is redirected,
//! either through a state object read by a bootstrap loader or by replacing
//! the title's executable content in place.
//!
//! # Architecture
//!
//! - [`archive`]: zip decoding over the in-memory content blob
//! - [`storage`]: content slots and the privileged title store, as traits
//! - [`filesystem`]: untrusted entry names to paths on the mounted medium
//! - [`migration`]: the state machine driving all of the above
//! - [`halt`]: the single terminal handler for every failure
//!
//! Platform services (display, input, media drivers) come in through the
//! [`platform::Platform`] trait; nothing here touches global device state.

pub mod archive;
pub mod config;
mod error;
pub mod filesystem;
pub mod halt;
pub mod installer;
pub mod migration;
pub mod platform;
pub mod progress;
pub mod storage;

pub use archive::{Archive, ArchiveEntry};
pub use config::{ConfigError, InstallerConfig};
pub use error::{Error, ErrorKind, Result};
pub use filesystem::{MountPoint, PathMaterializer};
pub use migration::{HandoffMode, MigrationReport, MigrationState, Migrator};
pub use platform::{HostPlatform, MediaSource, Platform};
pub use progress::{
    CallbackProgress, CliProgress, LogProgress, ProgressEvent, ProgressTracker, SilentProgress,
};
pub use storage::{ContentSource, Status, TitleId, TitleStore};
