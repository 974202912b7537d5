// src/installer.rs

//! Top-level installer sequence
//!
//! Mounts external storage, runs the migration, and either finishes with the
//! success countdown or hands the error to the fatal-error sink.

use crate::config::InstallerConfig;
use crate::error::Result;
use crate::halt::halt;
use crate::migration::{MigrationReport, Migrator};
use crate::platform::Platform;
use crate::progress::ProgressTracker;
use crate::storage::{ContentSource, TitleStore};

/// Mount, migrate and finish, returning the first error instead of halting
pub fn install(
    platform: &mut dyn Platform,
    content: &mut dyn ContentSource,
    store: &mut dyn TitleStore,
    config: &InstallerConfig,
    progress: Option<&dyn ProgressTracker>,
) -> Result<MigrationReport> {
    let mount = platform.mount_external()?;

    platform.println("Title Installer");
    platform.println("");
    platform.println("Moves the downloaded homebrew app onto your SD Card or USB.");

    let mut migrator = Migrator::new(config, &mount, content, store);
    if let Some(p) = progress {
        migrator = migrator.with_progress(p);
    }
    let report = migrator.run()?;
    migrator.finish(platform);
    Ok(report)
}

/// Run the installer; any failure halts until the operator acknowledges
pub fn run(
    platform: &mut dyn Platform,
    content: &mut dyn ContentSource,
    store: &mut dyn TitleStore,
    config: &InstallerConfig,
    progress: Option<&dyn ProgressTracker>,
) -> MigrationReport {
    match install(platform, content, store, config, progress) {
        Ok(report) => report,
        Err(e) => halt(platform, &e),
    }
}
