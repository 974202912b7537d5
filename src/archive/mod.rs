// src/archive/mod.rs

//! Zip archive reader over an in-memory buffer
//!
//! The bundled content is a zip file. The central directory is decoded once
//! in [`Archive::open`]; entries are then addressed by index in the order
//! the directory lists them. Entry names are returned verbatim and must be
//! sanitized by the caller before they touch a filesystem.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{self, BufWriter, Cursor, Write};
use std::path::Path;
use tracing::debug;
use zip::ZipArchive;

/// Metadata of one archive entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Raw name from the central directory, untrusted
    pub name: String,
    pub is_directory: bool,
    pub uncompressed_size: u64,
}

/// A decoded zip container borrowing its backing buffer
pub struct Archive<'a> {
    zip: ZipArchive<Cursor<&'a [u8]>>,
}

impl<'a> Archive<'a> {
    /// Decode the container's central directory
    pub fn open(bytes: &'a [u8]) -> Result<Self> {
        let zip = ZipArchive::new(Cursor::new(bytes)).map_err(|e| Error::Decode(e.to_string()))?;
        debug!("Opened archive: {} bytes, {} entries", bytes.len(), zip.len());
        Ok(Self { zip })
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.zip.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zip.len() == 0
    }

    /// Metadata of the entry at `index`
    pub fn stat(&mut self, index: usize) -> Result<ArchiveEntry> {
        let file = self
            .zip
            .by_index_raw(index)
            .map_err(|e| Error::Decode(format!("entry {}: {}", index, e)))?;
        Ok(ArchiveEntry {
            name: file.name().to_string(),
            is_directory: file.is_dir(),
            uncompressed_size: file.size(),
        })
    }

    /// Whether the entry at `index` is a directory
    pub fn is_directory(&mut self, index: usize) -> Result<bool> {
        Ok(self.stat(index)?.is_directory)
    }

    /// Metadata of every entry, in directory order
    pub fn entries(&mut self) -> Result<Vec<ArchiveEntry>> {
        (0..self.len()).map(|i| self.stat(i)).collect()
    }

    /// Decompress the entry at `index` into `destination`
    ///
    /// The file is created or truncated. Returns the number of bytes written,
    /// which always equals the entry's declared size.
    pub fn extract_to_path(&mut self, index: usize, destination: &Path) -> Result<u64> {
        let mut file = self.zip.by_index(index).map_err(|e| Error::Extract {
            entry: format!("#{}", index),
            path: destination.to_path_buf(),
            reason: e.to_string(),
        })?;
        let name = file.name().to_string();
        let declared = file.size();

        let extract_err = |reason: String| Error::Extract {
            entry: name.clone(),
            path: destination.to_path_buf(),
            reason,
        };

        if file.is_dir() {
            return Err(extract_err("entry is a directory".to_string()));
        }

        let out = File::create(destination).map_err(|e| extract_err(e.to_string()))?;
        let mut writer = BufWriter::new(out);
        let written = io::copy(&mut file, &mut writer).map_err(|e| extract_err(e.to_string()))?;
        writer.flush().map_err(|e| extract_err(e.to_string()))?;

        if written != declared {
            return Err(extract_err(format!(
                "wrote {} bytes, expected {}",
                written, declared
            )));
        }

        Ok(written)
    }
}
