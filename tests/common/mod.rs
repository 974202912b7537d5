// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::time::Duration;
use title_installer::storage::{MemoryContentSource, MemoryStore, StorePermissions};
use title_installer::{Error, MountPoint, Platform, Result, TitleId};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const TITLE: TitleId = TitleId(0x0001_0001_4f53_4341);

/// One entry of a fixture archive
pub enum Fixture {
    File(&'static str, Vec<u8>),
    Stored(&'static str, Vec<u8>),
    Dir(&'static str),
}

/// Build a zip archive in memory, entries in the given order
pub fn build_zip(entries: &[Fixture]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let deflated = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let stored = FileOptions::default().compression_method(CompressionMethod::Stored);

    for entry in entries {
        match entry {
            Fixture::File(name, data) => {
                zip.start_file(*name, deflated).unwrap();
                zip.write_all(data).unwrap();
            }
            Fixture::Stored(name, data) => {
                zip.start_file(*name, stored).unwrap();
                zip.write_all(data).unwrap();
            }
            Fixture::Dir(name) => {
                zip.add_directory(*name, deflated).unwrap();
            }
        }
    }
    zip.finish().unwrap().into_inner()
}

/// The three-entry archive: boot.dol, meta.xml and an empty icon directory
pub fn scenario_zip() -> Vec<u8> {
    build_zip(&[
        Fixture::File("app/boot.dol", patterned(1000)),
        Fixture::File("app/meta.xml", patterned(200)),
        Fixture::Dir("app/icon/"),
    ])
}

/// Deterministic non-trivial payload
pub fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// Content source holding `archive` in slot 3
pub fn content_with(archive: Vec<u8>) -> MemoryContentSource {
    MemoryContentSource::new(TITLE).with_slot(3, archive)
}

/// Store seeded with the installed archive content object
pub fn store_with_archive(archive: &[u8]) -> MemoryStore {
    MemoryStore::new().with_object(
        TITLE.content_key(3),
        StorePermissions::default(),
        archive.to_vec(),
    )
}

/// Platform that records everything and never blocks
pub struct RecordingPlatform {
    pub mount: Option<MountPoint>,
    pub output: String,
    pub unmounts: usize,
    pub sleeps: Vec<Duration>,
    pub returned_to_launcher: bool,
}

impl RecordingPlatform {
    pub fn new(mount: Option<MountPoint>) -> Self {
        Self {
            mount,
            output: String::new(),
            unmounts: 0,
            sleeps: Vec::new(),
            returned_to_launcher: false,
        }
    }
}

impl Platform for RecordingPlatform {
    fn mount_external(&mut self) -> Result<MountPoint> {
        self.mount
            .clone()
            .ok_or_else(|| Error::MediaUnavailable("no media in test platform".to_string()))
    }

    fn unmount_all(&mut self) {
        self.unmounts += 1;
    }

    fn print(&mut self, text: &str) {
        self.output.push_str(text);
    }

    fn acknowledge_pressed(&mut self) -> bool {
        true
    }

    fn wait_for_vsync(&mut self) {}

    fn sleep(&mut self, duration: Duration) {
        self.sleeps.push(duration);
    }

    fn return_to_launcher(&mut self) {
        self.returned_to_launcher = true;
    }

    fn exit(&mut self, code: i32) -> ! {
        panic!("exit({code})")
    }
}
