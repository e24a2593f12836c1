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

mod busy;
mod file_state;
mod timer;
mod worker;

pub use busy::{BusyScope, BusyTracker};
pub use file_state::{format_file_state, parse_file_state, FileState};
pub use timer::{TimerPort, TokioTimer};

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use action_log::{CacheAction, CacheActionLog};
use async_latch::AsyncLatch;
use cache_storage::{BatchFileWriter, CacheStorage};
use logging::{DiagnosticOutput, NullDiagnosticOutput};
use parking_lot::{Condvar, Mutex};
use remote_provider_traits::RemoteStorageProvider;
use task_executor::Executor;
use tokio::sync::Notify;

const REMOTE_STATE_PREFIX: &str = "/state/";
const ACTION_QUEUE_DIR_NAME: &str = "ActionQueue";
const CONSOLIDATION_THRESHOLD: usize = 3;

struct SyncState {
    cache: HashMap<String, FileState>,
    current_batch_number: u64,
    current_batch_writer: Option<BatchFileWriter>,
    timer_armed: bool,
}

struct Shared {
    sync: Mutex<SyncState>,
    consolidation_sync: Mutex<()>,
    storage: CacheStorage,
    action_log: CacheActionLog,
    remote: Arc<dyn RemoteStorageProvider>,
    timer: Arc<dyn TimerPort>,
    consolidation_delay: Duration,
    busy: BusyTracker,
    action_queue: Mutex<VecDeque<CacheAction>>,
    action_notify: Notify,
    drain_condvar: Condvar,
    stopping: AsyncLatch,
    diagnostic: Arc<dyn DiagnosticOutput>,
}

/// The Remote File State Cache: an in-memory `path -> FileState` map, durably backed by a
/// sequence of local batch files and driven by a single background action worker that mirrors
/// sealed batches (and eventually their consolidated replacements) to a `RemoteStorageProvider`.
///
/// Cheap to clone; clones share the same background worker and local state.
#[derive(Clone)]
pub struct RemoteFileStateCache {
    shared: Arc<Shared>,
}

impl RemoteFileStateCache {
    pub fn new(
        local_root: PathBuf,
        batch_upload_consolidation_delay: Duration,
        remote: Arc<dyn RemoteStorageProvider>,
        executor: Executor,
    ) -> Result<RemoteFileStateCache, String> {
        Self::new_with_diagnostic(
            local_root,
            batch_upload_consolidation_delay,
            remote,
            executor,
            Arc::new(NullDiagnosticOutput),
        )
    }

    /// As `new`, but additionally mirrors a line of context to `diagnostic` for every mutation,
    /// upload, and consolidation the cache performs. Corresponds to the optional
    /// `RemoteFileStateCacheDebugLogPath` configuration option.
    pub fn new_with_diagnostic(
        local_root: PathBuf,
        batch_upload_consolidation_delay: Duration,
        remote: Arc<dyn RemoteStorageProvider>,
        executor: Executor,
        diagnostic: Arc<dyn DiagnosticOutput>,
    ) -> Result<RemoteFileStateCache, String> {
        let storage = CacheStorage::new(local_root.clone())?;
        let action_log = CacheActionLog::new(local_root.join(ACTION_QUEUE_DIR_NAME));
        let timer = Arc::new(TokioTimer::new(executor));

        Ok(RemoteFileStateCache {
            shared: Arc::new(Shared {
                sync: Mutex::new(SyncState {
                    cache: HashMap::new(),
                    current_batch_number: 1,
                    current_batch_writer: None,
                    timer_armed: false,
                }),
                consolidation_sync: Mutex::new(()),
                storage,
                action_log,
                remote,
                timer,
                consolidation_delay: batch_upload_consolidation_delay,
                busy: BusyTracker::new(),
                action_queue: Mutex::new(VecDeque::new()),
                action_notify: Notify::new(),
                drain_condvar: Condvar::new(),
                stopping: AsyncLatch::new(),
                diagnostic,
            }),
        })
    }

    /// Replays local batches into the in-memory map, rehydrates the on-disk action queue, and
    /// starts the background action worker. Must be called exactly once, before any other method.
    pub fn start(&self, executor: &Executor) -> Result<(), String> {
        self.shared.action_log.ensure_directory_exists()?;

        let mut batch_numbers = self.shared.storage.enumerate_batches()?;
        batch_numbers.sort_unstable();
        {
            let mut sync = self.shared.sync.lock();
            for batch_number in &batch_numbers {
                replay_batch(&self.shared.storage, *batch_number, &mut sync.cache)?;
            }
            sync.current_batch_number = batch_numbers.last().map_or(1, |n| n + 1);
        }

        let mut action_keys = self.shared.action_log.enumerate_action_keys()?;
        action_keys.sort_unstable();
        {
            let mut queue = self.shared.action_queue.lock();
            for key in action_keys {
                match self.shared.action_log.rehydrate_action(key) {
                    Ok(action) => queue.push_back(action),
                    Err(e) => {
                        log::error!("skipping corrupt action {key} during replay: {e}");
                    }
                }
            }
        }

        let shared = self.shared.clone();
        executor.native_spawn(async move {
            worker::run(shared).await;
        });

        Ok(())
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.shared.sync.lock().cache.contains_key(path)
    }

    /// A stable, point-in-time copy of the known paths. Never a live view onto the cache map.
    pub fn enumerate_paths(&self) -> Vec<String> {
        self.shared.sync.lock().cache.keys().cloned().collect()
    }

    pub fn get_file_state(&self, path: &str) -> Option<FileState> {
        self.shared.sync.lock().cache.get(path).cloned()
    }

    /// Upserts `path`'s state and appends it to the current batch. `state.path` is ignored in
    /// favor of `path`, so callers cannot accidentally desynchronize the map key from the
    /// serialized line's key.
    pub fn update_file_state(&self, path: &str, state: FileState) -> Result<(), String> {
        let state = state.with_path(path);
        let mut sync = self.shared.sync.lock();
        sync.cache.insert(path.to_owned(), state.clone());
        self.shared
            .diagnostic
            .write_line(&format!("update_file_state {path} size={} checksum={}", state.file_size, state.checksum));
        self.append_line_and_arm_timer(&mut sync, &state)
    }

    /// Removes `path` if present, appending a tombstone. Returns whether an entry was removed.
    pub fn remove_file_state(&self, path: &str) -> Result<bool, String> {
        let mut sync = self.shared.sync.lock();
        if sync.cache.remove(path).is_none() {
            return Ok(false);
        }
        self.shared
            .diagnostic
            .write_line(&format!("remove_file_state {path}"));
        self.append_line_and_arm_timer(&mut sync, &FileState::tombstone(path))?;
        Ok(true)
    }

    fn append_line_and_arm_timer(&self, sync: &mut SyncState, state: &FileState) -> Result<(), String> {
        if sync.current_batch_writer.is_none() {
            sync.current_batch_writer = Some(
                self.shared
                    .storage
                    .open_batch_file_writer(sync.current_batch_number)?,
            );
        }
        sync.current_batch_writer
            .as_mut()
            .expect("just populated above")
            .write_line(&format_file_state(state))?;

        if !sync.timer_armed {
            sync.timer_armed = true;
            let shared = self.shared.clone();
            self.shared
                .timer
                .schedule(self.shared.consolidation_delay, Arc::new(move || on_timer_elapsed(&shared)));
        }
        Ok(())
    }

    /// Number of actions awaiting (or mid-) processing by the background worker. Exposed for
    /// tests and diagnostics only.
    pub fn pending_action_count(&self) -> usize {
        self.shared.action_queue.lock().len()
    }

    /// The batch number currently open for append. Exposed for tests and diagnostics only.
    pub fn current_batch_number(&self) -> u64 {
        self.shared.sync.lock().current_batch_number
    }

    pub fn wait_while_busy(&self) {
        self.shared.busy.wait_while_busy();
    }

    /// Blocks the calling thread until the action queue is empty, or (if `deadline` is given)
    /// until that much time has elapsed, whichever comes first. Returns whether the queue was
    /// empty when this call returned. A `None` deadline waits indefinitely.
    ///
    /// An action stuck retrying a persistently-failing remote call will never drain, so a caller
    /// that cares about bounded latency (rather than eventual completion) should always pass a
    /// deadline rather than relying on this returning promptly.
    pub fn drain_action_queue(&self, deadline: Option<Duration>) -> bool {
        let deadline_instant = deadline.map(|d| Instant::now() + d);
        let mut queue = self.shared.action_queue.lock();
        while !queue.is_empty() {
            match deadline_instant {
                Some(instant) => {
                    let now = Instant::now();
                    if now >= instant {
                        return false;
                    }
                    self.shared.drain_condvar.wait_for(&mut queue, instant - now);
                }
                None => self.shared.drain_condvar.wait(&mut queue),
            }
        }
        true
    }

    /// Signals the background action worker to exit once its current action (if any) completes.
    /// Pending actions are left on disk to be resumed by a future `start()`.
    pub fn stop(&self) {
        self.shared.stopping.trigger();
        self.shared.action_notify.notify_waiters();
    }

    /// Seals the current batch and enqueues its upload immediately, then consolidates if that
    /// pushes the local batch count over the threshold. A no-op if nothing has been written to
    /// the current batch since the last flush. Callers that need uploads to be enqueued on a
    /// known schedule (rather than waiting out the debounce timer) should call this explicitly;
    /// the timer calls the same underlying logic on its own schedule.
    pub fn upload_current_batch_and_begin_next(&self) -> Result<(), String> {
        let _busy = self.shared.busy.enter();
        seal_and_upload_current_batch(&self.shared)?;
        consolidate_while_over_threshold(&self.shared)
    }
}

fn on_timer_elapsed(shared: &Arc<Shared>) {
    let _busy = shared.busy.enter();
    if let Err(e) = seal_and_upload_current_batch(shared) {
        log::error!("failed to seal and upload the current batch: {e}");
        return;
    }
    if let Err(e) = consolidate_while_over_threshold(shared) {
        log::error!("failed to consolidate local batches: {e}");
    }
}

/// Rotates the current batch to a fresh number and enqueues an upload of the sealed one. A no-op
/// when the current batch is empty (no writer has been opened since the last seal), which also
/// makes this safe to call from a debounce timer that fires after an explicit
/// `upload_current_batch_and_begin_next` already sealed the batch it was armed for.
fn seal_and_upload_current_batch(shared: &Shared) -> Result<(), String> {
    let sealed_batch_number = {
        let mut sync = shared.sync.lock();
        if sync.current_batch_writer.is_none() {
            return Ok(());
        }
        sync.current_batch_writer = None;
        sync.timer_armed = false;
        let sealed = sync.current_batch_number;
        sync.current_batch_number += 1;
        sealed
    };
    upload_batch(shared, sealed_batch_number)
}

/// Stages a copy of the sealed batch to a temp file and enqueues an `UploadFile` action for it.
/// Copying first insulates the queued action from consolidation later renaming or deleting the
/// original batch file out from under an in-flight upload.
fn upload_batch(shared: &Shared, batch_number: u64) -> Result<(), String> {
    let temp_path = shared.action_log.create_temporary_cache_action_data_file()?;
    {
        let mut source = shared.storage.open_batch_file_stream(batch_number)?;
        let mut dest = std::fs::File::create(&temp_path)
            .map_err(|e| format!("failed to stage upload copy of batch {batch_number}: {e}"))?;
        std::io::copy(&mut source, &mut dest)
            .map_err(|e| format!("failed to copy batch {batch_number} to staging file: {e}"))?;
    }

    let mut action = CacheAction::upload(format!("{REMOTE_STATE_PREFIX}{batch_number}"), temp_path);
    shared.action_log.log_action(&mut action)?;
    shared
        .diagnostic
        .write_line(&format!("queued upload of batch {batch_number} as action {}", action.action_key));
    enqueue(shared, action);
    Ok(())
}

fn consolidate_while_over_threshold(shared: &Shared) -> Result<(), String> {
    loop {
        if shared.storage.enumerate_batches()?.len() <= CONSOLIDATION_THRESHOLD {
            return Ok(());
        }
        consolidate_oldest_batch(shared)?;
    }
}

/// Folds the two oldest local batches into one, atomically replacing the newer of the pair and
/// deleting the older, then enqueues a re-upload of the merged batch and a remote delete of the
/// retired one. Serialized by `consolidation_sync`, a lock distinct from `sync`, so reads/writes
/// against the cache map continue uninterrupted while a merge is in flight.
fn consolidate_oldest_batch(shared: &Shared) -> Result<u64, String> {
    let _consolidation_guard = shared.consolidation_sync.lock();

    let mut batch_numbers = shared.storage.enumerate_batches()?;
    batch_numbers.sort_unstable();
    if batch_numbers.len() < 2 {
        return Err("cannot consolidate with fewer than two local batches present".to_owned());
    }
    let oldest = batch_numbers[0];
    let merge_into = batch_numbers[1];

    let mut merged = HashMap::new();
    let mut deleted = HashSet::new();
    replay_batch_tracking_deletes(&shared.storage, merge_into, &mut merged, &mut deleted)?;

    {
        let reader = shared.storage.open_batch_file_reader(oldest)?;
        for line in reader.lines() {
            let line = line.map_err(|e| format!("failed to read batch {oldest}: {e}"))?;
            if line.is_empty() {
                continue;
            }
            let state = parse_file_state(&line)?;
            // Tombstones in the oldest batch are discarded outright: nothing earlier than it
            // remains locally for them to shadow.
            if state.is_tombstone() || deleted.contains(&state.path) {
                continue;
            }
            merged.entry(state.path.clone()).or_insert(state);
        }
    }

    {
        let mut writer = shared.storage.open_new_batch_file_writer(merge_into)?;
        for state in merged.values() {
            writer.write_line(&format_file_state(state))?;
        }
    }
    shared.storage.switch_to_consolidated_file(oldest, merge_into)?;
    shared
        .diagnostic
        .write_line(&format!("consolidated batch {oldest} into {merge_into}"));

    upload_batch(shared, merge_into)?;

    let mut delete_action = CacheAction::delete(format!("{REMOTE_STATE_PREFIX}{oldest}"));
    shared.action_log.log_action(&mut delete_action)?;
    enqueue(shared, delete_action);

    Ok(oldest)
}

fn enqueue(shared: &Shared, action: CacheAction) {
    shared.action_queue.lock().push_back(action);
    shared.action_notify.notify_one();
}

fn replay_batch(
    storage: &CacheStorage,
    batch_number: u64,
    cache: &mut HashMap<String, FileState>,
) -> Result<(), String> {
    let reader = storage.open_batch_file_reader(batch_number)?;
    for line in reader.lines() {
        let line = line.map_err(|e| format!("failed to read batch {batch_number}: {e}"))?;
        if line.is_empty() {
            continue;
        }
        let state = parse_file_state(&line)?;
        if state.is_tombstone() {
            cache.remove(&state.path);
        } else {
            cache.insert(state.path.clone(), state);
        }
    }
    Ok(())
}

fn replay_batch_tracking_deletes(
    storage: &CacheStorage,
    batch_number: u64,
    map: &mut HashMap<String, FileState>,
    deleted: &mut HashSet<String>,
) -> Result<(), String> {
    let reader = storage.open_batch_file_reader(batch_number)?;
    for line in reader.lines() {
        let line = line.map_err(|e| format!("failed to read batch {batch_number}: {e}"))?;
        if line.is_empty() {
            continue;
        }
        let state = parse_file_state(&line)?;
        if state.is_tombstone() {
            map.remove(&state.path);
            deleted.insert(state.path);
        } else {
            deleted.remove(&state.path);
            map.insert(state.path.clone(), state);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
