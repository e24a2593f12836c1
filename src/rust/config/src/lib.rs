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

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use remote_provider::RemoteOptions;

/// Command-line configuration for a running Remote File State Cache. Mirrors this workspace's
/// existing `StoreCliOpt`: every field is independently settable, with `new_local_only`-style
/// sensible defaults available via `#[derive(Default)]` where clap allows it, and construction
/// fails fast via `build()` rather than panicking on an invalid combination.
#[derive(Debug, Clone, Parser)]
pub struct RfscOptions {
    /// Debounce window, in milliseconds, between the first write to a batch and that batch being
    /// sealed and queued for upload.
    #[arg(long, default_value = "500")]
    pub batch_upload_consolidation_delay_millis: u64,

    /// Root of local cache state; the action queue lives at `<path>/ActionQueue` and batch files
    /// directly under `<path>`.
    #[arg(long)]
    pub remote_file_state_cache_path: PathBuf,

    /// Optional path to an append-only diagnostic log of cache activity.
    #[arg(long)]
    pub remote_file_state_cache_debug_log_path: Option<PathBuf>,

    /// Address of the remote backend: `file://<path>`, `s3://<bucket>/<root>`, or `memory://`.
    #[arg(long)]
    pub remote_address: String,

    /// Extra header to pass to the remote backend, `key=value`.
    #[arg(long)]
    pub remote_header: Vec<String>,

    /// Number of retries per request to the remote backend.
    #[arg(long, default_value = "3")]
    pub remote_rpc_retries: usize,

    /// Number of concurrent requests to the remote backend.
    #[arg(long, default_value = "128")]
    pub remote_rpc_concurrency: usize,

    /// Per-request timeout, in seconds, for the remote backend.
    #[arg(long, default_value = "30")]
    pub remote_rpc_timeout_secs: u64,
}

impl RfscOptions {
    /// Validates field combinations that clap's declarative parsing can't express, and derives
    /// the collaborator types the RFSC constructor needs. Programmer errors (an empty cache path,
    /// an unparseable header) fail here rather than surfacing lazily during the first cache
    /// operation.
    pub fn build(&self) -> Result<BuiltRfscOptions, String> {
        if self.remote_file_state_cache_path.as_os_str().is_empty() {
            return Err("remote_file_state_cache_path must not be empty".to_owned());
        }
        if self.batch_upload_consolidation_delay_millis == 0 {
            return Err("batch_upload_consolidation_delay_millis must be greater than zero".to_owned());
        }

        let mut headers = std::collections::BTreeMap::new();
        for header in &self.remote_header {
            let (key, value) = header
                .split_once('=')
                .ok_or_else(|| format!("remote_header {header:?} is not in key=value form"))?;
            headers.insert(key.to_owned(), value.to_owned());
        }

        let remote_options = RemoteOptions {
            instance_name: None,
            headers,
            rpc_timeout: Duration::from_secs(self.remote_rpc_timeout_secs),
            rpc_retries: self.remote_rpc_retries,
            rpc_concurrency_limit: self.remote_rpc_concurrency,
        };

        Ok(BuiltRfscOptions {
            batch_upload_consolidation_delay: Duration::from_millis(
                self.batch_upload_consolidation_delay_millis,
            ),
            remote_file_state_cache_path: self.remote_file_state_cache_path.clone(),
            remote_file_state_cache_debug_log_path: self
                .remote_file_state_cache_debug_log_path
                .clone(),
            remote_address: self.remote_address.clone(),
            remote_options,
        })
    }
}

/// The validated, ready-to-use form of `RfscOptions`: durations parsed, headers parsed, and the
/// remote backend's own options assembled.
#[derive(Debug, Clone)]
pub struct BuiltRfscOptions {
    pub batch_upload_consolidation_delay: Duration,
    pub remote_file_state_cache_path: PathBuf,
    pub remote_file_state_cache_debug_log_path: Option<PathBuf>,
    pub remote_address: String,
    pub remote_options: RemoteOptions,
}
