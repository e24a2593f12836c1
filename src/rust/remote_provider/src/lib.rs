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

use std::sync::Arc;

// Re-export these so that consumers don't have to know about the exact arrangement of underlying
// crates.
pub use remote_provider_traits::{LoadDestination, RemoteOptions, RemoteStorageProvider};

/// Parses a `root://...`-style address and builds the matching `RemoteStorageProvider`. Supported
/// schemes: `file://<path>` (local filesystem, also handy for tests), `s3://<bucket>/<root>`, and
/// `memory://` (in-process, for unit tests that should not touch disk or network at all).
pub fn choose_remote_storage_provider(
  address: &str,
  options: RemoteOptions,
) -> Result<Arc<dyn RemoteStorageProvider>, String> {
  if let Some(path) = address.strip_prefix("file://") {
    Ok(Arc::new(remote_provider_opendal::Provider::fs(
      path, options,
    )?))
  } else if let Some(rest) = address.strip_prefix("s3://") {
    let mut parts = rest.splitn(2, '/');
    let bucket = parts
      .next()
      .filter(|b| !b.is_empty())
      .ok_or_else(|| format!("s3 address {address} is missing a bucket name"))?;
    let root = parts.next().unwrap_or("");
    Ok(Arc::new(remote_provider_opendal::Provider::s3(
      bucket, root, None, None, options,
    )?))
  } else if address == "memory://" || address.starts_with("memory://") {
    Ok(Arc::new(remote_provider_opendal::Provider::memory(
      options,
    )?))
  } else {
    Err(format!(
      "Cannot initialise remote storage provider with address {address}, as the scheme is not supported",
    ))
  }
}
