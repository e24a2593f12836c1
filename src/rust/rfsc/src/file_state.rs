// Copyright 2026 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

/// A path's size and checksum as of the last observation, or a tombstone marking the path as
/// removed. `file_size = -1` and `checksum = "-"` together are the tombstone encoding; nothing
/// else may produce that pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileState {
    pub path: String,
    pub file_size: i64,
    pub checksum: String,
}

const TOMBSTONE_CHECKSUM: &str = "-";
const TOMBSTONE_SIZE: i64 = -1;

impl FileState {
    pub fn live(path: impl Into<String>, file_size: u64, checksum: impl Into<String>) -> FileState {
        FileState {
            path: path.into(),
            file_size: file_size as i64,
            checksum: checksum.into(),
        }
    }

    pub fn tombstone(path: impl Into<String>) -> FileState {
        FileState {
            path: path.into(),
            file_size: TOMBSTONE_SIZE,
            checksum: TOMBSTONE_CHECKSUM.to_owned(),
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.file_size == TOMBSTONE_SIZE && self.checksum == TOMBSTONE_CHECKSUM
    }

    /// Returns a copy with `path` forced to `path`, reaffirming the map key onto the line that
    /// gets appended to the current batch.
    pub fn with_path(&self, path: impl Into<String>) -> FileState {
        FileState {
            path: path.into(),
            file_size: self.file_size,
            checksum: self.checksum.clone(),
        }
    }
}

// `path` is written last and takes the remainder of the line, so that paths containing spaces
// (legal on most filesystems) still round-trip: only `fileSize` and `checksum` need to be
// space-free, and neither one ever is.
pub fn format_file_state(state: &FileState) -> String {
    format!(
        "fileSize={} checksum={} path={}",
        state.file_size, state.checksum, state.path
    )
}

pub fn parse_file_state(line: &str) -> Result<FileState, String> {
    let rest = line
        .strip_prefix("fileSize=")
        .ok_or_else(|| format!("line {line:?} is missing fileSize"))?;
    let (file_size, rest) = rest
        .split_once(' ')
        .ok_or_else(|| format!("line {line:?} is missing checksum"))?;
    let file_size = file_size
        .parse::<i64>()
        .map_err(|e| format!("invalid fileSize in line {line:?}: {e}"))?;

    let rest = rest
        .strip_prefix("checksum=")
        .ok_or_else(|| format!("line {line:?} is missing checksum"))?;
    let (checksum, path) = rest
        .split_once(" path=")
        .ok_or_else(|| format!("line {line:?} is missing path"))?;

    Ok(FileState {
        path: path.to_owned(),
        file_size,
        checksum: checksum.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_a_live_entry() {
        let state = FileState::live("/a", 10, "X");
        let parsed = parse_file_state(&format_file_state(&state)).unwrap();
        assert_eq!(parsed, state);
    }

    #[test]
    fn roundtrips_a_tombstone() {
        let state = FileState::tombstone("/a");
        assert!(state.is_tombstone());
        let parsed = parse_file_state(&format_file_state(&state)).unwrap();
        assert!(parsed.is_tombstone());
        assert_eq!(parsed.path, "/a");
    }

    #[test]
    fn rejects_a_line_missing_a_field() {
        assert!(parse_file_state("fileSize=10 checksum=X").is_err());
    }

    #[test]
    fn roundtrips_a_path_containing_spaces() {
        let state = FileState::live("/My Documents/a file.txt", 10, "X");
        let parsed = parse_file_state(&format_file_state(&state)).unwrap();
        assert_eq!(parsed, state);
    }
}
