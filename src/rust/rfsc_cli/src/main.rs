// Copyright 2026 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! A one-shot driver for the Remote File State Cache: walks a local directory tree, computes a
//! checksum for every file it finds, and replays those observations into an RFSC pointed at a
//! configured remote backend. Stands in for the out-of-scope file-event-monitoring pipeline that
//! a real backup daemon would drive the cache with continuously; here, a single process exits
//! once the walk and the resulting uploads have drained.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use config::RfscOptions;
use hashing::Digest;
use logging::{DiagnosticOutput, FileDiagnosticOutput, NullDiagnosticOutput};
use rfsc::{FileState, RemoteFileStateCache};
use task_executor::Executor;

/// How long to wait for the background action worker to finish uploading everything this run
/// observed before giving up and exiting anyway, leaving the remainder queued for the next run.
const DRAIN_DEADLINE: Duration = Duration::from_secs(120);

#[derive(Parser)]
#[command(name = "rfsc_cli")]
struct Opt {
    #[command(flatten)]
    rfsc: RfscOptions,

    /// Directory to walk and replay into the cache.
    #[arg(long)]
    sync_root: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    logging::init(log::LevelFilter::Info);

    let opt = Opt::parse();
    let built = opt.rfsc.build()?;

    let diagnostic: Arc<dyn DiagnosticOutput> = match &built.remote_file_state_cache_debug_log_path
    {
        Some(path) => Arc::new(FileDiagnosticOutput::open(path)?),
        None => Arc::new(NullDiagnosticOutput),
    };

    let remote =
        remote_provider::choose_remote_storage_provider(&built.remote_address, built.remote_options)?;
    let executor = Executor::new();

    let cache = RemoteFileStateCache::new_with_diagnostic(
        built.remote_file_state_cache_path,
        built.batch_upload_consolidation_delay,
        remote,
        executor.clone(),
        diagnostic,
    )?;
    cache.start(&executor)?;

    let observed = walk_and_replay(&cache, &opt.sync_root)?;
    log::info!("replayed {observed} file(s) from {}", opt.sync_root.display());

    // The walk above may finish well within the debounce window, in which case nothing has been
    // sealed or enqueued yet. Flush explicitly rather than waiting out the timer, since this
    // process is about to drain the queue and exit.
    cache.upload_current_batch_and_begin_next()?;

    if !cache.drain_action_queue(Some(DRAIN_DEADLINE)) {
        log::warn!(
            "upload queue did not drain within {:?}; remaining actions will resume on the next run",
            DRAIN_DEADLINE
        );
    }
    cache.wait_while_busy();
    cache.stop();

    Ok(())
}

/// Walks `root` depth-first and calls `update_file_state` for every regular file found, keyed by
/// its path relative to `root` (with a leading `/`, matching the remote batch namespace's style).
/// Returns the number of files observed.
fn walk_and_replay(cache: &RemoteFileStateCache, root: &std::path::Path) -> Result<usize, String> {
    let mut count = 0;
    for entry in walkdir::WalkDir::new(root) {
        let entry = entry.map_err(|e| format!("failed to walk {}: {e}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .expect("walkdir always yields descendants of its root");
        let key = format!("/{}", relative.to_string_lossy());

        let bytes = std::fs::read(entry.path())
            .map_err(|e| format!("failed to read {}: {e}", entry.path().display()))?;
        let digest = Digest::of_bytes(&bytes);

        cache.update_file_state(
            &key,
            FileState::live(key.clone(), digest.size_bytes as u64, digest.hash.to_hex()),
        )?;
        count += 1;
    }
    Ok(count)
}
