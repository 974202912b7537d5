// src/migration/handoff.rs

//! Committing the handoff artifact and reclaiming store space
//!
//! These are the only steps that touch the privileged store. The handoff
//! commit is the point of no return: once it succeeds the next launch boots
//! the new state.

use crate::config::InstallerConfig;
use crate::error::{Error, Result};
use crate::storage::{delete_if_present, write_object, TitleId, TitleStore};
use tracing::{debug, info, warn};

/// The artifact that redirects the next launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handoff {
    /// A state object naming the primary executable on external storage
    StateFile { key: String, target: String },
    /// A content object whose bytes were replaced by a new executable
    Executable { key: String, bytes: usize },
}

impl Handoff {
    /// Store key written by this handoff
    pub fn key(&self) -> &str {
        match self {
            Self::StateFile { key, .. } | Self::Executable { key, .. } => key,
        }
    }
}

/// Write the state object pointing the bootstrap loader at `target`
///
/// A state object left by an earlier run is removed first.
pub fn write_state(
    store: &mut dyn TitleStore,
    title: TitleId,
    config: &InstallerConfig,
    target: &str,
) -> Result<Handoff> {
    let key = title.key(&config.state_object);
    if delete_if_present(store, &key)? {
        info!("Removed stale state object {}", key);
    }
    write_object(
        store,
        &key,
        config.permissions,
        target.as_bytes(),
        config.write_chunk_size,
    )?;
    info!("Wrote state object {} -> {}", key, target);
    Ok(Handoff::StateFile {
        key,
        target: target.to_string(),
    })
}

/// Replace the target executable content object with `executable`
pub fn replace_executable(
    store: &mut dyn TitleStore,
    title: TitleId,
    config: &InstallerConfig,
    executable: &[u8],
) -> Result<Handoff> {
    let key = title.content_key(config.target_executable_content);
    delete_if_present(store, &key)?;
    write_object(
        store,
        &key,
        config.permissions,
        executable,
        config.write_chunk_size,
    )?;
    info!("Replaced executable {} ({} bytes)", key, executable.len());
    Ok(Handoff::Executable {
        key,
        bytes: executable.len(),
    })
}

/// Shrink the archive's content object to zero bytes
///
/// The object must keep existing for the launcher to render the title, so it
/// is deleted and recreated empty with the permissions it had before. A
/// failed delete is logged and leaves the object untouched (returns `false`);
/// a failed recreate is fatal.
pub fn reclaim_archive(
    store: &mut dyn TitleStore,
    title: TitleId,
    config: &InstallerConfig,
) -> Result<bool> {
    let key = title.content_key(config.archive_content);
    let permissions = match store.stat(&key) {
        Ok((_, permissions)) => permissions,
        Err(status) => {
            debug!("No permissions for {} (status {}), using configured", key, status);
            config.permissions
        }
    };

    if let Err(e) = delete_if_present(store, &key) {
        warn!("Failed deleting archive content, leaving it in place: {}", e);
        return Ok(false);
    }

    store
        .create(&key, permissions)
        .map_err(|status| Error::StoreIo {
            op: "create",
            key: key.clone(),
            status: status.0,
        })?;
    info!("Reclaimed archive content {}", key);
    Ok(true)
}

/// Delete the executable superseded by [`replace_executable`]
pub fn retire_executable(
    store: &mut dyn TitleStore,
    title: TitleId,
    config: &InstallerConfig,
) -> Result<bool> {
    let key = title.content_key(config.retired_executable_content);
    let removed = delete_if_present(store, &key)?;
    if removed {
        info!("Retired executable {}", key);
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{AccessMode, MemoryStore, Status, StoreOp, StorePermissions};

    const TITLE: TitleId = TitleId(0x0001_0001_4f53_4341);

    #[test]
    fn test_write_state_replaces_stale_object() {
        let config = InstallerConfig::default();
        let key = TITLE.key("data/state.txt");
        let mut store =
            MemoryStore::new().with_object(key.as_str(), StorePermissions::default(), b"old".to_vec());

        let handoff = write_state(&mut store, TITLE, &config, "fat:/apps/x/boot.dol").unwrap();
        assert_eq!(handoff.key(), key);
        assert_eq!(store.contents(&key), Some(&b"fat:/apps/x/boot.dol"[..]));
    }

    #[test]
    fn test_reclaim_archive_recreates_empty() {
        let config = InstallerConfig::default();
        let key = TITLE.content_key(3);
        let perms = StorePermissions::default();
        let mut store = MemoryStore::new().with_object(key.as_str(), perms, vec![1u8; 4096]);

        assert!(reclaim_archive(&mut store, TITLE, &config).unwrap());
        assert_eq!(store.contents(&key), Some(&b""[..]));
        assert_eq!(store.permissions(&key), Some(perms));
    }

    #[test]
    fn test_reclaim_archive_keeps_original_permissions() {
        let config = InstallerConfig::default();
        let key = TITLE.content_key(3);
        let original = StorePermissions {
            owner: AccessMode::ReadWrite,
            group: AccessMode::Read,
            other: AccessMode::None,
        };
        assert_ne!(original, config.permissions);
        let mut store = MemoryStore::new().with_object(key.as_str(), original, vec![7u8; 64]);

        assert!(reclaim_archive(&mut store, TITLE, &config).unwrap());
        assert_eq!(store.contents(&key), Some(&b""[..]));
        assert_eq!(store.permissions(&key), Some(original));
    }

    #[test]
    fn test_reclaim_archive_delete_failure_is_not_fatal() {
        let config = InstallerConfig::default();
        let key = TITLE.content_key(3);
        let mut store = MemoryStore::new()
            .with_object(key.as_str(), StorePermissions::default(), vec![1u8; 16])
            .fail_on(StoreOp::Delete, key.as_str(), Status::ACCESS_DENIED);

        assert!(!reclaim_archive(&mut store, TITLE, &config).unwrap());
        assert_eq!(store.contents(&key).map(<[u8]>::len), Some(16));
    }

    #[test]
    fn test_reclaim_archive_recreate_failure_is_fatal() {
        let config = InstallerConfig::default();
        let key = TITLE.content_key(3);
        let mut store = MemoryStore::new()
            .with_object(key.as_str(), StorePermissions::default(), vec![1u8; 16])
            .fail_on(StoreOp::Create, key.as_str(), Status::ACCESS_DENIED);

        let err = reclaim_archive(&mut store, TITLE, &config).unwrap_err();
        assert!(matches!(err, Error::StoreIo { op: "create", .. }));
    }

    #[test]
    fn test_replace_and_retire_executable() {
        let config = InstallerConfig::default().with_write_chunk_size(3);
        let target = TITLE.content_key(1);
        let retired = TITLE.content_key(2);
        let mut store = MemoryStore::new()
            .with_object(target.as_str(), StorePermissions::default(), b"old exe".to_vec())
            .with_object(retired.as_str(), StorePermissions::default(), b"older".to_vec());

        let handoff = replace_executable(&mut store, TITLE, &config, b"new executable").unwrap();
        assert_eq!(handoff, Handoff::Executable { key: target.clone(), bytes: 14 });
        assert_eq!(store.contents(&target), Some(&b"new executable"[..]));

        assert!(retire_executable(&mut store, TITLE, &config).unwrap());
        assert!(!store.contains(&retired));
        assert!(!retire_executable(&mut store, TITLE, &config).unwrap());
    }
}
