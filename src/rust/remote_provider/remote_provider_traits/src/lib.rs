// Copyright 2023 Pants project contributors (see CONTRIBUTORS.md).
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

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWrite};

/// Options governing how a `RemoteStorageProvider` talks to its backend: concurrency, retries,
/// timeouts, and any headers required for auth. Deliberately does not include a vendor-specific
/// address scheme beyond the opaque `root` string each provider constructor interprets itself.
#[derive(Clone)]
pub struct RemoteOptions {
    pub instance_name: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub rpc_timeout: Duration,
    pub rpc_retries: usize,
    pub rpc_concurrency_limit: usize,
}

impl Default for RemoteOptions {
    fn default() -> Self {
        RemoteOptions {
            instance_name: None,
            headers: BTreeMap::new(),
            rpc_timeout: Duration::from_secs(30),
            rpc_retries: 3,
            rpc_concurrency_limit: 128,
        }
    }
}

/// The Remote Storage Port: upload, download, delete, and enumerate over a remote blob
/// namespace. Implementations are expected to be idempotent-tolerant: deleting an absent path and
/// uploading over an existing one must both succeed (or be safely retryable), since the action
/// worker that drives this trait retries indefinitely on failure and cannot distinguish "already
/// done by a previous attempt" from "never attempted".
#[async_trait]
pub trait RemoteStorageProvider: Sync + Send + 'static {
    /// Upload the bytes readable from `file` to `remote_path`.
    async fn upload_file_direct(&self, remote_path: &str, file: File) -> Result<(), String>;

    /// Upload `bytes` to `remote_path`, as an optimisation of `upload_file_direct` when the bytes
    /// are already resident in memory.
    async fn upload_bytes_direct(&self, remote_path: &str, bytes: Bytes) -> Result<(), String>;

    /// Download the contents stored (if any) at `remote_path` into `destination`. Returns `true`
    /// when found, `false` when not.
    async fn download_file_direct(
        &self,
        remote_path: &str,
        destination: &mut dyn LoadDestination,
    ) -> Result<bool, String>;

    /// Delete `remote_path`. Succeeds even if nothing exists at that path.
    async fn delete_file_direct(&self, remote_path: &str) -> Result<(), String>;

    /// List remote paths under `prefix`. When `recursive` is false, only the immediate children
    /// of `prefix` are returned.
    async fn enumerate_files(&self, prefix: &str, recursive: bool) -> Result<Vec<String>, String>;
}

/// Places that write the result of a remote download.
#[async_trait]
pub trait LoadDestination: AsyncWrite + Send + Sync + Unpin + 'static {
    /// Clear out the writer and start again, if there's been previous contents written.
    async fn reset(&mut self) -> std::io::Result<()>;
}

#[async_trait]
impl LoadDestination for tokio::fs::File {
    async fn reset(&mut self) -> std::io::Result<()> {
        self.rewind().await?;
        self.set_len(0).await
    }
}

#[async_trait]
impl LoadDestination for Vec<u8> {
    async fn reset(&mut self) -> std::io::Result<()> {
        self.clear();
        Ok(())
    }
}
