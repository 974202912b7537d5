// src/platform.rs

//! Platform services the installer depends on
//!
//! Display, controller input, removable-media drivers and the launcher are
//! owned by the platform. The installer only reaches them through the
//! [`Platform`] trait, which is passed in explicitly rather than held in
//! globals.

use crate::error::{Error, Result};
use crate::filesystem::MountPoint;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Device prefix external storage is mounted under
pub const DEFAULT_DEVICE: &str = "fat:/";

/// Removable media the installer can mount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSource {
    Sd,
    Usb,
}

impl std::fmt::Display for MediaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sd => write!(f, "SD card"),
            Self::Usb => write!(f, "USB storage"),
        }
    }
}

/// Pick the medium to mount: the SD slot wins, USB is the fallback
pub fn select_media(sd_inserted: bool, usb_inserted: bool) -> Result<MediaSource> {
    match (sd_inserted, usb_inserted) {
        (true, _) => Ok(MediaSource::Sd),
        (false, true) => Ok(MediaSource::Usb),
        (false, false) => Err(Error::MediaUnavailable(
            "no SD card or USB storage inserted".to_string(),
        )),
    }
}

/// Services provided by the console (or an emulation of it)
pub trait Platform {
    /// Mount external storage, preferring the SD slot
    fn mount_external(&mut self) -> Result<MountPoint>;

    /// Unmount external storage and shut down its drivers
    fn unmount_all(&mut self);

    /// Write text to the console without a line break
    fn print(&mut self, text: &str);

    /// Write a line to the console
    fn println(&mut self, line: &str) {
        self.print(line);
        self.print("\n");
    }

    /// Sample input once; true when the acknowledgement button is down
    fn acknowledge_pressed(&mut self) -> bool;

    /// Block until the next display refresh
    fn wait_for_vsync(&mut self);

    fn sleep(&mut self, duration: Duration);

    /// Hand control back to the system launcher
    fn return_to_launcher(&mut self);

    /// Terminate the process
    fn exit(&mut self, code: i32) -> !;
}

/// Platform emulation for running the installer on a workstation
///
/// Removable media are directories: a medium counts as inserted when its
/// directory exists. The acknowledgement button is a line on stdin.
pub struct HostPlatform {
    sd: Option<PathBuf>,
    usb: Option<PathBuf>,
    device: String,
    mounted: Option<MediaSource>,
    real_time: bool,
}

impl HostPlatform {
    pub fn new(sd: Option<PathBuf>, usb: Option<PathBuf>) -> Self {
        Self {
            sd,
            usb,
            device: DEFAULT_DEVICE.to_string(),
            mounted: None,
            real_time: true,
        }
    }

    /// Use a different device prefix for handoff paths
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    /// Skip sleeps and frame waits
    pub fn without_delays(mut self) -> Self {
        self.real_time = false;
        self
    }

    /// Medium currently mounted
    pub fn mounted(&self) -> Option<MediaSource> {
        self.mounted
    }

    fn inserted(dir: &Option<PathBuf>) -> bool {
        dir.as_ref().is_some_and(|d| d.is_dir())
    }
}

impl Platform for HostPlatform {
    fn mount_external(&mut self) -> Result<MountPoint> {
        let media = select_media(Self::inserted(&self.sd), Self::inserted(&self.usb))?;
        let dir = match media {
            MediaSource::Sd => self.sd.clone(),
            MediaSource::Usb => self.usb.clone(),
        }
        .ok_or_else(|| Error::MediaUnavailable(media.to_string()))?;

        info!("Mounted {} at {} ({})", media, self.device, dir.display());
        self.mounted = Some(media);
        Ok(MountPoint::new(self.device.clone(), dir))
    }

    fn unmount_all(&mut self) {
        if let Some(media) = self.mounted.take() {
            info!("Unmounted {}", media);
        }
    }

    fn print(&mut self, text: &str) {
        let mut out = io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }

    fn acknowledge_pressed(&mut self) -> bool {
        let mut line = String::new();
        // EOF counts as a press so a closed stdin cannot hang the loop
        let _ = io::stdin().lock().read_line(&mut line);
        true
    }

    fn wait_for_vsync(&mut self) {
        if self.real_time {
            std::thread::sleep(Duration::from_millis(16));
        }
    }

    fn sleep(&mut self, duration: Duration) {
        if self.real_time {
            std::thread::sleep(duration);
        }
    }

    fn return_to_launcher(&mut self) {
        info!("Returning to launcher");
    }

    fn exit(&mut self, code: i32) -> ! {
        std::process::exit(code)
    }
}
