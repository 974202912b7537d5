// src/migration/mod.rs

//! First-run migration engine
//!
//! Moves the archive bundled in the running package onto external storage
//! and commits the artifact that redirects the next launch.
//!
//! # Lifecycle
//!
//! ```text
//! START -> CONTENT_FETCHED -> ARCHIVE_DECODED -> EXTRACTED -> HANDOFF_COMMITTED -> SPACE_RECLAIMED -> DONE
//!                                                                   ^
//!                                                   Point of no return (next launch is redirected)
//! ```
//!
//! Any step may fail, which moves the migration to `FAILED`. Nothing is
//! rolled back: files already extracted stay on external storage, and the
//! handoff is only written once every entry has been extracted.

mod extract;
mod handoff;

pub use extract::{extract_all, ExtractionSummary};
pub use handoff::{reclaim_archive, replace_executable, retire_executable, write_state, Handoff};

use crate::archive::Archive;
use crate::config::InstallerConfig;
use crate::error::{Error, Result};
use crate::filesystem::{MountPoint, PathMaterializer};
use crate::platform::Platform;
use crate::progress::ProgressTracker;
use crate::storage::{fetch_content, ContentSource, TitleId, TitleStore};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

/// How the next launch is redirected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HandoffMode {
    /// Extract to external storage and write a state object for the bootstrap loader
    #[default]
    External,
    /// Extract to external storage and replace the executable content in place
    ReplaceExecutable,
}

impl std::fmt::Display for HandoffMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::External => write!(f, "external"),
            Self::ReplaceExecutable => write!(f, "replace-executable"),
        }
    }
}

/// Migration state machine phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    /// Nothing done yet
    Start,
    /// Archive content read into memory
    ContentFetched,
    /// Archive central directory decoded
    ArchiveDecoded,
    /// Every entry written to external storage
    Extracted,
    /// Handoff artifact written - POINT OF NO RETURN
    HandoffCommitted,
    /// Store space of consumed content released
    SpaceReclaimed,
    /// Success reported and control returned to the launcher
    Done,
    /// A step failed; the migration must be re-run from the start
    Failed,
}

impl MigrationState {
    /// Returns true once the next launch will boot the migrated state
    pub fn is_committed(&self) -> bool {
        matches!(
            self,
            Self::HandoffCommitted | Self::SpaceReclaimed | Self::Done
        )
    }
}

/// Outcome of a successful migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub title: TitleId,
    /// Logical archive size as reported by the content subsystem
    pub archive_len: usize,
    pub extraction: ExtractionSummary,
    pub handoff: Handoff,
    /// Whether consumed content was released from the store
    pub reclaimed: bool,
}

/// Drives one migration over explicitly provided collaborators
pub struct Migrator<'a> {
    config: &'a InstallerConfig,
    mount: &'a MountPoint,
    content: &'a mut dyn ContentSource,
    store: &'a mut dyn TitleStore,
    progress: Option<&'a dyn ProgressTracker>,
    state: MigrationState,
    failed_after: Option<MigrationState>,
}

impl<'a> Migrator<'a> {
    pub fn new(
        config: &'a InstallerConfig,
        mount: &'a MountPoint,
        content: &'a mut dyn ContentSource,
        store: &'a mut dyn TitleStore,
    ) -> Self {
        Self {
            config,
            mount,
            content,
            store,
            progress: None,
            state: MigrationState::Start,
            failed_after: None,
        }
    }

    /// Report per-entry extraction progress to `progress`
    pub fn with_progress(mut self, progress: &'a dyn ProgressTracker) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Get the current state
    pub fn state(&self) -> MigrationState {
        self.state
    }

    /// Last state reached before failing, if the migration failed
    pub fn failed_after(&self) -> Option<MigrationState> {
        self.failed_after
    }

    /// Run every step up to `SpaceReclaimed`
    pub fn run(&mut self) -> Result<MigrationReport> {
        if self.state != MigrationState::Start {
            return Err(Error::InvalidState(format!("{:?}", self.state)));
        }

        info!(
            "Starting {} migration from content {}",
            self.config.mode, self.config.archive_content
        );
        match self.run_steps() {
            Ok(report) => Ok(report),
            Err(e) => {
                error!("Migration failed after {:?}: {}", self.state, e);
                if let Some(p) = self.progress
                    && !p.is_finished()
                {
                    p.fail(&e.to_string());
                }
                self.failed_after = Some(self.state);
                self.state = MigrationState::Failed;
                Err(e)
            }
        }
    }

    fn advance(&mut self, next: MigrationState) {
        info!("Migration: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn run_steps(&mut self) -> Result<MigrationReport> {
        let blob = fetch_content(&mut *self.content, self.config.archive_content)?;
        self.advance(MigrationState::ContentFetched);

        let mut archive = Archive::open(blob.as_bytes())?;
        self.advance(MigrationState::ArchiveDecoded);

        let materializer = PathMaterializer::new(self.mount);
        let extraction = extract_all(
            &mut archive,
            &materializer,
            &self.config.primary_executable,
            self.progress,
        )?;
        if let Some(p) = self.progress {
            p.finish(&format!(
                "{} files, {} directories, {} bytes",
                extraction.files, extraction.directories, extraction.bytes
            ));
        }
        self.advance(MigrationState::Extracted);

        let title = self
            .content
            .title_id()
            .map_err(|status| Error::TitleId(status.0))?;
        info!("Running as title {}", title);

        let handoff = match self.config.mode {
            HandoffMode::External => {
                let target = extraction
                    .primary_executable
                    .as_deref()
                    .ok_or_else(|| Error::MissingExecutable(self.config.primary_executable.clone()))?;
                write_state(&mut *self.store, title, self.config, target)?
            }
            HandoffMode::ReplaceExecutable => {
                let executable = fetch_content(&mut *self.content, self.config.executable_content)?;
                replace_executable(&mut *self.store, title, self.config, executable.as_bytes())?
            }
        };
        self.advance(MigrationState::HandoffCommitted);

        let reclaimed = match self.config.mode {
            HandoffMode::External => reclaim_archive(&mut *self.store, title, self.config)?,
            HandoffMode::ReplaceExecutable => {
                retire_executable(&mut *self.store, title, self.config)?
            }
        };
        self.advance(MigrationState::SpaceReclaimed);

        Ok(MigrationReport {
            title,
            archive_len: blob.len(),
            extraction,
            handoff,
            reclaimed,
        })
    }

    /// Announce success, count down, unmount and return to the launcher
    pub fn finish(&mut self, platform: &mut dyn Platform) {
        platform.println("Successfully completed!");
        platform.println("Next time you load this title, you will be forwarded to the homebrew.");
        platform.print("Returning to the launcher in ");
        for i in (1..=self.config.countdown_secs).rev() {
            platform.print(&format!("{}.", i));
            platform.sleep(Duration::from_secs(1));
        }
        platform.println("");

        platform.unmount_all();
        self.advance(MigrationState::Done);
        platform.return_to_launcher();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryContentSource, MemoryStore};

    #[test]
    fn test_is_committed() {
        assert!(!MigrationState::Start.is_committed());
        assert!(!MigrationState::Extracted.is_committed());
        assert!(MigrationState::HandoffCommitted.is_committed());
        assert!(MigrationState::Done.is_committed());
        assert!(!MigrationState::Failed.is_committed());
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(HandoffMode::External.to_string(), "external");
        assert_eq!(HandoffMode::ReplaceExecutable.to_string(), "replace-executable");
    }

    #[test]
    fn test_missing_content_fails_at_start() {
        let config = InstallerConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let mount = MountPoint::new("fat:/", dir.path());
        let mut content = MemoryContentSource::new(TitleId(1));
        let mut store = MemoryStore::new();

        let mut migrator = Migrator::new(&config, &mount, &mut content, &mut store);
        let err = migrator.run().unwrap_err();

        assert_eq!(err.kind(), crate::error::ErrorKind::ContentIo);
        assert_eq!(migrator.state(), MigrationState::Failed);
        assert_eq!(migrator.failed_after(), Some(MigrationState::Start));

        let rerun = migrator.run().unwrap_err();
        assert!(matches!(rerun, Error::InvalidState(ref state) if state == "Failed"));
        assert_eq!(rerun.kind(), crate::error::ErrorKind::State);
        assert_eq!(rerun.code(), "BAD_STATE");
        assert_eq!(migrator.failed_after(), Some(MigrationState::Start));
    }
}
