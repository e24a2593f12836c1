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

use async_trait::async_trait;
use bytes::Bytes;
use opendal::layers::{ConcurrentLimitLayer, RetryLayer, TimeoutLayer};
use opendal::{Builder, Operator};
use tokio::fs::File;

use remote_provider_traits::{LoadDestination, RemoteOptions, RemoteStorageProvider};

#[cfg(test)]
mod tests;

/// Remote Storage Port implementation generic over any `opendal` service. This is the one place
/// in the tree that knows about a concrete blob-storage vendor; every caller only sees
/// `RemoteStorageProvider`.
pub struct Provider {
    operator: Operator,
}

impl Provider {
    pub fn new<B: Builder>(builder: B, options: RemoteOptions) -> Result<Provider, String> {
        let operator = Operator::new(builder)
            .map_err(|e| {
                format!(
                    "failed to initialise {} remote storage provider: {e}",
                    B::SCHEME
                )
            })?
            .layer(ConcurrentLimitLayer::new(options.rpc_concurrency_limit))
            .layer(
                TimeoutLayer::new()
                    .with_timeout(options.rpc_timeout)
                    // TimeoutLayer requires specifying a non-zero minimum transfer speed too.
                    .with_speed(1),
            )
            .layer(RetryLayer::new().with_max_times(options.rpc_retries + 1))
            .finish();

        Ok(Provider { operator })
    }

    /// A provider backed by the local filesystem, rooted at `path`. Useful for single-machine
    /// setups and for tests that want a real Remote Storage Port without a network dependency.
    pub fn fs(path: &str, options: RemoteOptions) -> Result<Provider, String> {
        let mut builder = opendal::services::Fs::default();
        builder.root(path).enable_path_check();
        Provider::new(builder, options)
    }

    /// A provider backed by an S3-compatible object store.
    pub fn s3(
        bucket: &str,
        root: &str,
        endpoint: Option<&str>,
        region: Option<&str>,
        options: RemoteOptions,
    ) -> Result<Provider, String> {
        let mut builder = opendal::services::S3::default();
        builder.bucket(bucket).root(root);
        if let Some(endpoint) = endpoint {
            builder.endpoint(endpoint);
        }
        if let Some(region) = region {
            builder.region(region);
        }
        Provider::new(builder, options)
    }

    /// An in-memory provider, for unit tests that do not want to touch the filesystem at all.
    pub fn memory(options: RemoteOptions) -> Result<Provider, String> {
        Provider::new(opendal::services::Memory::default(), options)
    }
}

#[async_trait]
impl RemoteStorageProvider for Provider {
    async fn upload_bytes_direct(&self, remote_path: &str, bytes: Bytes) -> Result<(), String> {
        self.operator
            .write(remote_path, bytes)
            .await
            .map_err(|e| format!("failed to write bytes to {remote_path}: {e}"))
    }

    async fn upload_file_direct(&self, remote_path: &str, mut file: File) -> Result<(), String> {
        let mut writer = self
            .operator
            .writer(remote_path)
            .await
            .map_err(|e| format!("failed to start write to {remote_path}: {e}"))?;

        match tokio::io::copy(&mut file, &mut writer).await {
            Ok(_) => writer
                .close()
                .await
                .map_err(|e| format!("uploading to {remote_path}: failed to commit: {e}")),
            Err(e) => {
                let abort_err = writer.abort().await.err().map_or(String::new(), |e| {
                    format!(" (additional error while aborting = {e})")
                });
                Err(format!(
                    "uploading to {remote_path}: failed to copy: {e}{abort_err}"
                ))
            }
        }
    }

    async fn download_file_direct(
        &self,
        remote_path: &str,
        destination: &mut dyn LoadDestination,
    ) -> Result<bool, String> {
        let mut reader = match self.operator.reader(remote_path).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(format!("failed to read {remote_path}: {e}")),
        };
        tokio::io::copy(&mut reader, destination)
            .await
            .map_err(|e| format!("failed to read {remote_path}: {e}"))?;
        Ok(true)
    }

    async fn delete_file_direct(&self, remote_path: &str) -> Result<(), String> {
        // opendal's `delete` is already idempotent-tolerant: deleting an absent path succeeds.
        self.operator
            .delete(remote_path)
            .await
            .map_err(|e| format!("failed to delete {remote_path}: {e}"))
    }

    async fn enumerate_files(&self, prefix: &str, recursive: bool) -> Result<Vec<String>, String> {
        let entries = self
            .operator
            .list_with(prefix)
            .recursive(recursive)
            .await
            .map_err(|e| format!("failed to list {prefix}: {e}"))?;

        Ok(entries
            .into_iter()
            .map(|entry| entry.path().to_string())
            .filter(|path| path != prefix)
            .collect())
    }
}
