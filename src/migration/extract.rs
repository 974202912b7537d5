// src/migration/extract.rs

//! Extraction of every archive entry onto the mount

use crate::archive::Archive;
use crate::error::Result;
use crate::filesystem::PathMaterializer;
use crate::progress::ProgressTracker;
use std::ffi::OsStr;
use tracing::{debug, info};

/// What an extraction pass wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub entries: usize,
    pub files: usize,
    pub directories: usize,
    /// Decompressed bytes written across all files
    pub bytes: u64,
    /// Device path of the first file named like the primary executable
    pub primary_executable: Option<String>,
}

/// Extract every entry in directory order, stopping at the first failure
///
/// Nothing already written is removed when an entry fails.
pub fn extract_all(
    archive: &mut Archive<'_>,
    materializer: &PathMaterializer<'_>,
    primary_executable: &str,
    progress: Option<&dyn ProgressTracker>,
) -> Result<ExtractionSummary> {
    let mut summary = ExtractionSummary::default();
    let total = archive.len();
    if let Some(p) = progress {
        p.begin(total as u64);
    }

    for index in 0..total {
        let entry = archive.stat(index)?;
        let dest = materializer.destination(&entry.name, entry.is_directory)?;
        if let Some(p) = progress {
            p.entry_started(&entry.name);
        }

        materializer.ensure_parent_directories(&dest.host)?;

        let written = if entry.is_directory {
            materializer.create_directory(&dest.host)?;
            summary.directories += 1;
            debug!("Directory {} -> {}", entry.name, dest.device);
            0
        } else {
            let written = archive.extract_to_path(index, &dest.host)?;
            summary.files += 1;
            summary.bytes += written;
            debug!("File {} -> {} ({} bytes)", entry.name, dest.device, written);

            if summary.primary_executable.is_none()
                && dest.relative.file_name() == Some(OsStr::new(primary_executable))
            {
                info!("Primary executable: {}", dest.device);
                summary.primary_executable = Some(dest.device);
            }
            written
        };

        summary.entries += 1;
        if let Some(p) = progress {
            p.entry_done(written);
        }
    }

    info!(
        "Extracted {} entries ({} files, {} directories, {} bytes)",
        summary.entries, summary.files, summary.directories, summary.bytes
    );
    Ok(summary)
}
