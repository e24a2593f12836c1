// Copyright 2026 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::sync::Arc;
use std::time::Duration;

use action_log::{ActionKind, CacheAction};

use crate::Shared;

const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Drains the action queue FIFO, retrying each action indefinitely (with a 5-second backoff)
/// until it succeeds. An action is released from the log only after its remote call succeeds, so
/// a crash mid-retry simply resumes the same action on the next `start()`.
pub(crate) async fn run(shared: Arc<Shared>) {
    loop {
        let next = { shared.action_queue.lock().front().cloned() };
        let Some(mut action) = next else {
            if shared.stopping.poll_triggered() {
                return;
            }
            tokio::select! {
                () = shared.action_notify.notified() => {}
                () = shared.stopping.triggered() => {}
            }
            continue;
        };

        let _busy = shared.busy.enter();
        loop {
            match process_action(&shared, &action).await {
                Ok(()) => {
                    action.is_complete = true;
                    if let Err(e) = shared.action_log.release_action(&mut action) {
                        log::error!(
                            "failed to release completed action {}: {e}",
                            action.action_key
                        );
                    }
                    shared.action_queue.lock().pop_front();
                    shared.drain_condvar.notify_all();
                    break;
                }
                Err(e) => {
                    if shared.stopping.poll_triggered() {
                        log::warn!(
                            "action {} left pending for the next startup: {e}",
                            action.action_key
                        );
                        return;
                    }
                    log::warn!("action {} failed, retrying in 5s: {e}", action.action_key);
                    tokio::select! {
                        () = tokio::time::sleep(RETRY_DELAY) => {}
                        () = shared.stopping.triggered() => {}
                    }
                }
            }
        }
    }
}

async fn process_action(shared: &Shared, action: &CacheAction) -> Result<(), String> {
    match action.kind {
        ActionKind::UploadFile => {
            let source_path = action.source_path.as_ref().ok_or_else(|| {
                format!("upload action {} is missing a source path", action.action_key)
            })?;
            let file = tokio::fs::File::open(source_path)
                .await
                .map_err(|e| format!("failed to open staged upload {}: {e}", source_path.display()))?;
            shared.remote.upload_file_direct(&action.remote_path, file).await?;
            tokio::fs::remove_file(source_path)
                .await
                .map_err(|e| format!("failed to remove staged upload {}: {e}", source_path.display()))
        }
        ActionKind::DeleteFile => shared.remote.delete_file_direct(&action.remote_path).await,
    }
}
