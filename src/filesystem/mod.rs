// src/filesystem/mod.rs

//! Filesystem operations on mounted external storage
//!
//! This module provides:
//! - Sanitization of untrusted archive entry names
//! - Mount points that pair a device prefix with a host path
//! - Directory materialization for extracted entries

mod materializer;
pub mod path;

pub use materializer::{Destination, MountPoint, PathMaterializer};
