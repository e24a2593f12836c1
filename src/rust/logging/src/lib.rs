// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
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

///
/// Macro to allow fatal logging to a file which bypasses the standard logging systems. Useful for
/// code paths that must not interact with stdio or the `log` backend, and for one-off debugging.
///
#[macro_export]
macro_rules! fatal_log {
    ($($arg:tt)+) => {
      {
        use ::std::io::Write;
        let mut f = ::std::fs::OpenOptions::new().create(true).append(true).open("fatal.log").unwrap();
        writeln!(f, $($arg)+).unwrap()
      }
    };
}

pub mod diagnostic;

pub use diagnostic::{DiagnosticOutput, FileDiagnosticOutput, NullDiagnosticOutput};

/// Initializes the global `log` backend from `RUST_LOG` (or `level` if the environment variable
/// is unset). Only the binary entry point should call this; library crates just log through the
/// `log` facade and let their caller decide how those records are rendered.
pub fn init(level: log::LevelFilter) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }
    // Allow repeated calls (e.g. from multiple test harnesses within one process) to be no-ops.
    let _ = builder.try_init();
}
