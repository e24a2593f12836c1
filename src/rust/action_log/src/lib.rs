// Copyright 2026 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

#![deny(warnings)]
// Enable all clippy lints except for many of the pedantic ones. It's a shame this needs to be copied and pasted across crates, but there doesn't appear to be a way to include inner attributes from a common source.
#![deny(
    clippy::all,
    clippy::default_trait_access,
    clippy::expl_impl_clone_on_copy,
    clippy::if_not_else,
    clippy::needless_continue,
    clippy::unseparated_literal_suffix,
    clippy::used_underscore_binding
)]
// It is often more clear to show that nothing is being moved.
#![allow(clippy::match_ref_pats)]
// Subjective style.
#![allow(
    clippy::len_without_is_empty,
    clippy::redundant_field_names,
    clippy::too_many_arguments
)]
// Default isn't as big a deal as people seem to think it is.
#![allow(clippy::new_without_default, clippy::new_ret_no_self)]
// Arc<Mutex> can be more clear than needing to grok Orderings:
#![allow(clippy::mutex_atomic)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

mod serialize;

pub use serialize::ParseActionError;

const TMP_DIR_NAME: &str = "tmp";
const MAX_TEMP_FILE_ATTEMPTS: u32 = 1000;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ActionKind {
    UploadFile,
    DeleteFile,
}

/// A durable record of one pending remote mutation. `backing_file` is `None` until the action has
/// been `log_action`ed; it is the filename (just the `actionKey` as a decimal string) under which
/// the action is persisted.
#[derive(Debug, Clone)]
pub struct CacheAction {
    pub action_key: u64,
    pub kind: ActionKind,
    pub remote_path: String,
    pub source_path: Option<PathBuf>,
    pub is_complete: bool,
    backing_file: Option<PathBuf>,
}

impl CacheAction {
    pub fn upload(remote_path: impl Into<String>, source_path: PathBuf) -> CacheAction {
        CacheAction {
            action_key: 0,
            kind: ActionKind::UploadFile,
            remote_path: remote_path.into(),
            source_path: Some(source_path),
            is_complete: false,
            backing_file: None,
        }
    }

    pub fn delete(remote_path: impl Into<String>) -> CacheAction {
        CacheAction {
            action_key: 0,
            kind: ActionKind::DeleteFile,
            remote_path: remote_path.into(),
            source_path: None,
            is_complete: false,
            backing_file: None,
        }
    }

    pub fn backing_file(&self) -> Option<&Path> {
        self.backing_file.as_deref()
    }
}

/// Directory-backed durable queue of `CacheAction`s. Each action is persisted as its own text
/// file, named by its monotonic `action_key`, under `root`. Keeping the action record (small,
/// always fsync-visible through a single `write` + rename) separate from the payload it may
/// reference (potentially large, staged via `create_temporary_cache_action_data_file`) lets large
/// uploads avoid going through this directory's filename-is-a-monotonic-integer namespace.
pub struct CacheActionLog {
    root: PathBuf,
}

impl CacheActionLog {
    pub fn new(root: PathBuf) -> CacheActionLog {
        CacheActionLog { root }
    }

    pub fn ensure_directory_exists(&self) -> Result<(), String> {
        fs::create_dir_all(&self.root)
            .map_err(|e| format!("failed to create action queue directory {}: {e}", self.root.display()))?;
        fs::create_dir_all(self.root.join(TMP_DIR_NAME)).map_err(|e| {
            format!(
                "failed to create action queue temp directory {}: {e}",
                self.root.join(TMP_DIR_NAME).display()
            )
        })
    }

    /// Returns every filename under `root` parseable as a `u64`, in arbitrary order. Callers must
    /// sort ascending themselves before replay; this makes it harder to accidentally rely on
    /// directory-iteration order being meaningful anywhere else.
    pub fn enumerate_action_keys(&self) -> Result<Vec<u64>, String> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| format!("failed to list action queue {}: {e}", self.root.display()))?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| format!("failed to read action queue entry: {e}"))?;
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(key) = name.parse::<u64>() {
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }

    /// Allocates an `action_key` (a wall-clock tick count, incremented past any collision),
    /// writes the serialized action, and stamps the resulting filename onto `action`. The write
    /// targets a temp path and is renamed into place, so a reader of `root` only ever observes
    /// the file fully absent or fully present.
    pub fn log_action(&self, action: &mut CacheAction) -> Result<(), String> {
        let mut key = now_millis();
        loop {
            let final_path = self.root.join(key.to_string());
            if final_path.exists() {
                key += 1;
                continue;
            }
            let contents = serialize::format_action(action);
            let staging_path = self.root.join(TMP_DIR_NAME).join(format!(".log-{key}"));
            fs::write(&staging_path, contents)
                .map_err(|e| format!("failed to stage action {key}: {e}"))?;
            fs::rename(&staging_path, &final_path)
                .map_err(|e| format!("failed to persist action {key}: {e}"))?;
            action.action_key = key;
            action.backing_file = Some(final_path);
            return Ok(());
        }
    }

    /// Reads the action file named `key` back into an in-memory `CacheAction`.
    pub fn rehydrate_action(&self, key: u64) -> Result<CacheAction, ParseActionError> {
        let path = self.root.join(key.to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| ParseActionError::new(format!("failed to read action {key}: {e}")))?;
        let mut action = serialize::parse_action(key, &contents)?;
        action.backing_file = Some(path);
        Ok(action)
    }

    /// Deletes the action's backing file. Idempotent against a missing file: a `NotFound` error
    /// is treated as success, since the desired post-condition (the file is gone) already holds.
    pub fn release_action(&self, action: &mut CacheAction) -> Result<(), String> {
        if let Some(path) = action.backing_file.take() {
            match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(format!("failed to release action at {}: {e}", path.display())),
            }
        } else {
            Ok(())
        }
    }

    /// Allocates a never-before-used path, under `root`'s temp subdirectory, for staging upload
    /// payloads. Retries on collision up to `MAX_TEMP_FILE_ATTEMPTS` times before failing.
    pub fn create_temporary_cache_action_data_file(&self) -> Result<PathBuf, String> {
        let tmp_dir = self.root.join(TMP_DIR_NAME);
        for _ in 0..MAX_TEMP_FILE_ATTEMPTS {
            let candidate = tmp_dir.join(format!("upload-{}", uuid::Uuid::new_v4()));
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
            {
                Ok(_) => return Ok(candidate),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(format!(
                        "failed to create temporary cache action data file: {e}"
                    ))
                }
            }
        }
        Err(format!(
            "failed to allocate a temporary cache action data file after {MAX_TEMP_FILE_ATTEMPTS} attempts"
        ))
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis() as u64
}
