use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use remote_provider_traits::{LoadDestination, RemoteStorageProvider};
use task_executor::Executor;
use tempfile::TempDir;
use tokio::fs::File;

use super::*;

#[derive(Default)]
struct RecordingRemote {
    uploads: Mutex<Vec<String>>,
    deletes: Mutex<Vec<String>>,
    upload_failures_remaining: AtomicUsize,
    upload_attempts: AtomicUsize,
}

#[async_trait]
impl RemoteStorageProvider for RecordingRemote {
    async fn upload_file_direct(&self, remote_path: &str, _file: File) -> Result<(), String> {
        self.upload_attempts.fetch_add(1, Ordering::SeqCst);
        if self.upload_failures_remaining.load(Ordering::SeqCst) > 0 {
            self.upload_failures_remaining.fetch_sub(1, Ordering::SeqCst);
            return Err("injected transient upload failure".to_owned());
        }
        self.uploads.lock().push(remote_path.to_owned());
        Ok(())
    }

    async fn upload_bytes_direct(&self, remote_path: &str, _bytes: Bytes) -> Result<(), String> {
        self.uploads.lock().push(remote_path.to_owned());
        Ok(())
    }

    async fn download_file_direct(
        &self,
        _remote_path: &str,
        _destination: &mut dyn LoadDestination,
    ) -> Result<bool, String> {
        Ok(false)
    }

    async fn delete_file_direct(&self, remote_path: &str) -> Result<(), String> {
        self.deletes.lock().push(remote_path.to_owned());
        Ok(())
    }

    async fn enumerate_files(&self, _prefix: &str, _recursive: bool) -> Result<Vec<String>, String> {
        Ok(vec![])
    }
}

fn new_cache(
    remote: Arc<dyn RemoteStorageProvider>,
    delay_ms: u64,
) -> (TempDir, PathBuf, Executor, RemoteFileStateCache) {
    let dir = TempDir::new().unwrap();
    let state_root = dir.path().join("state");
    let executor = Executor::new();
    let cache = RemoteFileStateCache::new(
        state_root.clone(),
        Duration::from_millis(delay_ms),
        remote,
        executor.clone(),
    )
    .unwrap();
    cache.start(&executor).unwrap();
    (dir, state_root, executor, cache)
}

#[tokio::test(flavor = "multi_thread")]
async fn drain_action_queue_returns_once_the_worker_catches_up() {
    let remote = Arc::new(RecordingRemote::default());
    let (_dir, _root, _executor, cache) = new_cache(remote, 20);

    cache.update_file_state("/a", FileState::live("/a", 1, "x")).unwrap();
    wait_for_flush(&cache).await;

    assert!(cache.drain_action_queue(Some(Duration::from_secs(5))));
    assert_eq!(cache.pending_action_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn drain_action_queue_reports_a_timeout_while_an_action_keeps_failing() {
    let remote = Arc::new(RecordingRemote::default());
    remote.upload_failures_remaining.store(usize::MAX, Ordering::SeqCst);
    let (_dir, _root, _executor, cache) = new_cache(remote, 20);

    cache.update_file_state("/a", FileState::live("/a", 1, "x")).unwrap();
    wait_for_flush(&cache).await;

    assert!(!cache.drain_action_queue(Some(Duration::from_millis(100))));
}

async fn wait_for_flush(cache: &RemoteFileStateCache) {
    tokio::time::sleep(Duration::from_millis(150)).await;
    cache.wait_while_busy();
}

#[tokio::test(flavor = "multi_thread")]
async fn update_and_remove_affect_the_in_memory_map_immediately() {
    let remote = Arc::new(RecordingRemote::default());
    // A long delay means no flush fires during the assertions below.
    let (_dir, _root, _executor, cache) = new_cache(remote, 5_000);

    assert!(!cache.contains_path("/a"));
    cache.update_file_state("/a", FileState::live("/a", 1, "x")).unwrap();
    assert!(cache.contains_path("/a"));
    assert_eq!(cache.get_file_state("/a").unwrap().checksum, "x");
    assert_eq!(cache.enumerate_paths(), vec!["/a".to_owned()]);

    assert!(cache.remove_file_state("/a").unwrap());
    assert!(!cache.contains_path("/a"));
    assert!(!cache.remove_file_state("/a").unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn round_trips_updates_and_a_delete_across_restart() {
    let remote = Arc::new(RecordingRemote::default());
    let (dir, root, executor, cache) = new_cache(remote.clone(), 20);

    cache.update_file_state("/a", FileState::live("/a", 10, "X")).unwrap();
    cache.update_file_state("/b", FileState::live("/b", 20, "Y")).unwrap();
    cache.update_file_state("/c", FileState::live("/c", 30, "Z")).unwrap();
    wait_for_flush(&cache).await;

    cache.remove_file_state("/b").unwrap();
    wait_for_flush(&cache).await;

    let restarted =
        RemoteFileStateCache::new(root, Duration::from_millis(20), remote, executor.clone()).unwrap();
    restarted.start(&executor).unwrap();

    let mut paths = restarted.enumerate_paths();
    paths.sort();
    assert_eq!(paths, vec!["/a".to_owned(), "/c".to_owned()]);
    assert_eq!(restarted.get_file_state("/a").unwrap().file_size, 10);
    assert_eq!(restarted.get_file_state("/c").unwrap().checksum, "Z");
    assert!(!restarted.contains_path("/b"));
    assert_eq!(restarted.current_batch_number(), 3);

    drop(dir);
}

#[tokio::test(flavor = "multi_thread")]
async fn consolidation_folds_the_oldest_batch_once_more_than_three_exist() {
    let remote = Arc::new(RecordingRemote::default());
    let (_dir, root, _executor, cache) = new_cache(remote.clone(), 20);

    for i in 0..4 {
        cache
            .update_file_state(&format!("/f{i}"), FileState::live(format!("/f{i}"), 1, "X"))
            .unwrap();
        wait_for_flush(&cache).await;
    }

    assert!(!root.join("1").exists());
    assert!(root.join("2").exists());
    assert!(remote.deletes.lock().contains(&"/state/1".to_owned()));
}

#[tokio::test(flavor = "multi_thread")]
async fn consolidation_discards_a_tombstoned_path_entirely() {
    let remote = Arc::new(RecordingRemote::default());
    let (_dir, root, _executor, cache) = new_cache(remote.clone(), 20);

    cache.update_file_state("/p", FileState::live("/p", 1, "a")).unwrap();
    wait_for_flush(&cache).await; // batch 1: live /p

    cache.remove_file_state("/p").unwrap();
    wait_for_flush(&cache).await; // batch 2: tombstone /p

    cache.update_file_state("/q", FileState::live("/q", 2, "b")).unwrap();
    wait_for_flush(&cache).await; // batch 3

    cache.update_file_state("/r", FileState::live("/r", 3, "c")).unwrap();
    wait_for_flush(&cache).await; // batch 4 -> triggers consolidation of 1 into 2

    assert!(!root.join("1").exists());
    let merged = std::fs::read_to_string(root.join("2")).unwrap();
    assert!(!merged.contains("/p"));
    assert!(remote.deletes.lock().contains(&"/state/1".to_owned()));
}

#[tokio::test(flavor = "multi_thread")]
async fn action_worker_processes_queued_actions_in_fifo_order() {
    let remote = Arc::new(RecordingRemote::default());
    let (_dir, _root, _executor, cache) = new_cache(remote.clone(), 20);

    cache.update_file_state("/a", FileState::live("/a", 1, "x")).unwrap();
    wait_for_flush(&cache).await;
    cache.update_file_state("/b", FileState::live("/b", 2, "y")).unwrap();
    wait_for_flush(&cache).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        remote.uploads.lock().as_slice(),
        ["/state/1".to_owned(), "/state/2".to_owned()]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn action_worker_retries_a_transient_upload_failure_then_succeeds() {
    let remote = Arc::new(RecordingRemote::default());
    remote.upload_failures_remaining.store(2, Ordering::SeqCst);
    let (_dir, _root, _executor, cache) = new_cache(remote.clone(), 20);

    cache.update_file_state("/a", FileState::live("/a", 1, "x")).unwrap();

    // The first attempt fails almost immediately; the worker is then asleep in its 5s backoff,
    // so the action must still be pending and only a single attempt recorded so far.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(cache.pending_action_count(), 1);
    assert_eq!(remote.upload_attempts.load(Ordering::SeqCst), 1);

    tokio::time::timeout(Duration::from_secs(15), async {
        loop {
            if cache.pending_action_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("action did not complete before the retry backoff should have elapsed");

    assert_eq!(remote.upload_attempts.load(Ordering::SeqCst), 3);
    assert_eq!(remote.uploads.lock().as_slice(), ["/state/1".to_owned()]);
}

#[tokio::test(flavor = "multi_thread")]
async fn start_skips_a_corrupt_action_file_instead_of_aborting() {
    let dir = TempDir::new().unwrap();
    let state_root = dir.path().join("state");
    let action_queue_dir = state_root.join(ACTION_QUEUE_DIR_NAME);
    std::fs::create_dir_all(&action_queue_dir).unwrap();
    std::fs::write(action_queue_dir.join("1"), "not a valid action record").unwrap();

    let remote = Arc::new(RecordingRemote::default());
    let executor = Executor::new();
    let cache =
        RemoteFileStateCache::new(state_root, Duration::from_millis(20), remote, executor.clone())
            .unwrap();

    // A corrupt action file must not make the whole daemon fail to start.
    cache.start(&executor).unwrap();
    assert_eq!(cache.pending_action_count(), 0);
}
