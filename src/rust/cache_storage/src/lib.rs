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

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::PathBuf;

const NEW_SUFFIX: &str = ".new";

/// Appending, autoflush-capable handle onto a batch file. Every `write_line` call is followed by
/// a flush, so a crash between two appends never loses a line that a caller has already observed
/// via the in-memory cache.
pub struct BatchFileWriter {
    file: File,
}

impl BatchFileWriter {
    pub fn write_line(&mut self, line: &str) -> Result<(), String> {
        self.file
            .write_all(line.as_bytes())
            .and_then(|()| self.file.write_all(b"\n"))
            .and_then(|()| self.file.flush())
            .map_err(|e| format!("failed to append to batch file: {e}"))
    }
}

/// Local persistence of RFSC batch files: enumerate, read, write, and atomically swap. Batches
/// are plain files named by their batch number under `root`; a batch being rewritten during
/// consolidation is staged at a `.new` sibling path first.
pub struct CacheStorage {
    root: PathBuf,
}

impl CacheStorage {
    pub fn new(root: PathBuf) -> Result<CacheStorage, String> {
        fs::create_dir_all(&root)
            .map_err(|e| format!("failed to create cache storage root {}: {e}", root.display()))?;
        Ok(CacheStorage { root })
    }

    fn batch_path(&self, batch_number: u64) -> PathBuf {
        self.root.join(batch_number.to_string())
    }

    fn new_batch_path(&self, batch_number: u64) -> PathBuf {
        self.root
            .join(format!("{batch_number}{NEW_SUFFIX}"))
    }

    /// Every batch number with a sealed-or-current file on disk, in arbitrary order. Callers
    /// sort ascending themselves, matching `action_log`'s `enumerate_action_keys` contract.
    pub fn enumerate_batches(&self) -> Result<Vec<u64>, String> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| format!("failed to list cache storage root {}: {e}", self.root.display()))?;

        let mut batches = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| format!("failed to read cache storage entry: {e}"))?;
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(batch_number) = name.parse::<u64>() {
                    batches.push(batch_number);
                }
            }
        }
        Ok(batches)
    }

    /// A buffered reader over batch `n`'s lines, for replay.
    pub fn open_batch_file_reader(&self, batch_number: u64) -> Result<BufReader<File>, String> {
        let path = self.batch_path(batch_number);
        File::open(&path)
            .map(BufReader::new)
            .map_err(|e| format!("failed to open batch {} for read: {e}", path.display()))
    }

    /// A raw handle onto batch `n`, for copying its bytes wholesale (e.g. staging an upload of
    /// the sealed batch to a temporary path, insulated from later local mutation).
    pub fn open_batch_file_stream(&self, batch_number: u64) -> Result<File, String> {
        let path = self.batch_path(batch_number);
        File::open(&path)
            .map_err(|e| format!("failed to open batch {} for streaming: {e}", path.display()))
    }

    /// An appending, autoflush-capable writer onto the current batch.
    pub fn open_batch_file_writer(&self, batch_number: u64) -> Result<BatchFileWriter, String> {
        let path = self.batch_path(batch_number);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map(|file| BatchFileWriter { file })
            .map_err(|e| format!("failed to open batch {} for append: {e}", path.display()))
    }

    /// A writer onto the `.new` sibling of batch `target`, used during consolidation to stage
    /// the merged contents before the atomic swap.
    pub fn open_new_batch_file_writer(&self, target: u64) -> Result<BatchFileWriter, String> {
        let path = self.new_batch_path(target);
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map(|file| BatchFileWriter { file })
            .map_err(|e| format!("failed to open {} for write: {e}", path.display()))
    }

    /// Atomically replaces `target` with its staged `.new` file, then deletes `to_delete`. The
    /// rename is a single filesystem operation, so a crash leaves either the pre-consolidation
    /// pair of files or the post-consolidation single file, never a half-written `target`.
    pub fn switch_to_consolidated_file(&self, to_delete: u64, target: u64) -> Result<(), String> {
        let new_path = self.new_batch_path(target);
        let target_path = self.batch_path(target);
        fs::rename(&new_path, &target_path).map_err(|e| {
            format!(
                "failed to switch {} into place at {}: {e}",
                new_path.display(),
                target_path.display()
            )
        })?;

        let delete_path = self.batch_path(to_delete);
        match fs::remove_file(&delete_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(format!(
                "consolidated batch {target} but failed to delete retired batch {}: {e}",
                delete_path.display()
            )),
        }
    }

    pub fn get_batch_file_size(&self, batch_number: u64) -> Result<u64, String> {
        let path = self.batch_path(batch_number);
        fs::metadata(&path)
            .map(|m| m.len())
            .map_err(|e| format!("failed to stat batch {}: {e}", path.display()))
    }
}
