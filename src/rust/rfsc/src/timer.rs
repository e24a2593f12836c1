// Copyright 2026 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::sync::Arc;
use std::time::Duration;

use task_executor::Executor;

/// Delayed one-shot callback primitive. There is no separate cancellation operation: a timer is
/// "disarmed" simply by the batch-append path not scheduling another one until the current one
/// has fired, matching the debounce's single-armed-timer-per-batch invariant.
pub trait TimerPort: Send + Sync + 'static {
    fn schedule(&self, delay: Duration, callback: Arc<dyn Fn() + Send + Sync>);
}

/// `TimerPort` backed by a tokio sleep, spawned onto the shared `task_executor::Executor` rather
/// than a dedicated OS thread per timer.
pub struct TokioTimer {
    executor: Executor,
}

impl TokioTimer {
    pub fn new(executor: Executor) -> TokioTimer {
        TokioTimer { executor }
    }
}

impl TimerPort for TokioTimer {
    fn schedule(&self, delay: Duration, callback: Arc<dyn Fn() + Send + Sync>) {
        self.executor.native_spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
    }
}
