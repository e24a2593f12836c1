// Copyright 2026 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;
use std::path::PathBuf;

use crate::{ActionKind, CacheAction};

/// A persisted action that could not be parsed back into a `CacheAction`. Kept on disk for
/// manual inspection; the caller is expected to log this and skip the action during replay
/// rather than abort startup.
#[derive(Debug)]
pub struct ParseActionError(String);

impl ParseActionError {
    pub(crate) fn new(message: impl Into<String>) -> ParseActionError {
        ParseActionError(message.into())
    }
}

impl fmt::Display for ParseActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ParseActionError {}

const SENTINEL_NONE: &str = "-";

pub(crate) fn format_action(action: &CacheAction) -> String {
    let kind = match action.kind {
        ActionKind::UploadFile => "UploadFile",
        ActionKind::DeleteFile => "DeleteFile",
    };
    let source_path = action
        .source_path
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| SENTINEL_NONE.to_owned());

    format!(
        "kind={kind}\nremote_path={}\nsource_path={source_path}\nis_complete={}\n",
        action.remote_path, action.is_complete,
    )
}

pub(crate) fn parse_action(key: u64, contents: &str) -> Result<CacheAction, ParseActionError> {
    let mut kind = None;
    let mut remote_path = None;
    let mut source_path = None;
    let mut is_complete = None;

    for line in contents.lines() {
        let Some((field, value)) = line.split_once('=') else {
            continue;
        };
        match field {
            "kind" => {
                kind = Some(match value {
                    "UploadFile" => ActionKind::UploadFile,
                    "DeleteFile" => ActionKind::DeleteFile,
                    other => {
                        return Err(ParseActionError::new(format!(
                            "action {key} has unrecognised kind {other:?}"
                        )))
                    }
                });
            }
            "remote_path" => remote_path = Some(value.to_owned()),
            "source_path" => {
                source_path = if value == SENTINEL_NONE {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            "is_complete" => {
                is_complete = Some(value.parse::<bool>().map_err(|e| {
                    ParseActionError::new(format!("action {key} has invalid is_complete: {e}"))
                })?);
            }
            _ => {}
        }
    }

    let kind = kind.ok_or_else(|| ParseActionError::new(format!("action {key} is missing kind")))?;
    let remote_path = remote_path
        .ok_or_else(|| ParseActionError::new(format!("action {key} is missing remote_path")))?;
    let is_complete = is_complete.unwrap_or(false);

    Ok(CacheAction {
        action_key: key,
        kind,
        remote_path,
        source_path,
        is_complete,
        backing_file: None,
    })
}
