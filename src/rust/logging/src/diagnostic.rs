// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::Local;
use parking_lot::Mutex;

/// A verbose logging sink, injected into components that want to record more detail than the
/// `log` facade's leveled records without forcing every caller up to `debug`/`trace`. Analogous
/// to the "DiagnosticOutput" collaborator referenced by higher layers of this system.
pub trait DiagnosticOutput: Send + Sync {
    fn write_line(&self, line: &str);
}

/// Discards everything written to it. Used when no debug log path is configured.
pub struct NullDiagnosticOutput;

impl DiagnosticOutput for NullDiagnosticOutput {
    fn write_line(&self, _line: &str) {}
}

/// Appends timestamped lines to a file, flushing after every write so that a crash does not lose
/// diagnostic context that was already handed to this sink. Mirrors the append-and-flush idiom
/// of `fatal_log!`, but as a reusable, injectable collaborator rather than a macro that always
/// targets the same hardcoded path.
pub struct FileDiagnosticOutput {
    file: Mutex<File>,
}

impl FileDiagnosticOutput {
    pub fn open(path: &Path) -> Result<FileDiagnosticOutput, String> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| format!("failed to open diagnostic log {}: {e}", path.display()))?;
        Ok(FileDiagnosticOutput {
            file: Mutex::new(file),
        })
    }
}

impl DiagnosticOutput for FileDiagnosticOutput {
    fn write_line(&self, line: &str) {
        let mut file = self.file.lock();
        let now = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        // Best-effort: a diagnostic sink must never be the reason a caller's operation fails.
        if let Err(e) = writeln!(file, "[{now}] {line}") {
            log::warn!("failed to write to diagnostic log: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn appends_and_flushes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("debug.log");

        let output = FileDiagnosticOutput::open(&path).unwrap();
        output.write_line("first");
        output.write_line("second");

        let mut contents = String::new();
        File::open(&path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert!(contents.contains("first"));
        assert!(contents.contains("second"));
        assert!(contents.lines().count() == 2);
    }

    #[test]
    fn null_sink_accepts_anything() {
        let sink = NullDiagnosticOutput;
        sink.write_line("ignored");
    }
}
