//! Per-session cache of uploaded experiment documents
//!
//! Uploads live only as long as the session that made them. Sessions are
//! independent: closing one never touches another, and there is no shared
//! list that every viewer appends to.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use crate::interchange::{ExperimentOutput, OutputPoint};
use crate::{Error, Result};

/// Identifier of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SessionId(u64);

impl SessionId {
    /// Raw id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// A parsed upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    /// `"File {n}: {generator}"`
    pub label: String,
    /// Name the file was uploaded under
    pub file_name: String,
    /// Parsed document
    pub output: ExperimentOutput,
}

impl UploadedFile {
    /// Chart points of the document.
    #[must_use]
    pub fn points(&self) -> Vec<OutputPoint> {
        self.output.points()
    }
}

/// Listing entry for an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadSummary {
    /// Position within the session
    pub index: usize,
    /// Display label
    pub label: String,
    /// Original file name
    pub file_name: String,
    /// Number of collisions in the document
    pub collisions: usize,
}

/// Concurrent map from session to its uploads.
pub struct UploadCache {
    sessions: DashMap<SessionId, Vec<UploadedFile>>,
    next: AtomicU64,
}

impl UploadCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next: AtomicU64::new(1),
        }
    }

    /// Number of open sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Allocate a new, empty session.
    pub fn open_session(&self) -> SessionId {
        let id = SessionId(self.next.fetch_add(1, Ordering::Relaxed));
        self.sessions.insert(id, Vec::new());
        debug!(%id, "opened upload session");
        id
    }

    /// Parse and keep an uploaded document, returning its index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the session is not open, the file
    /// name is not `.json`, or the bytes are not UTF-8. Returns a JSON error
    /// if the document has no `collisions_data`.
    pub fn upload(&self, session: SessionId, file_name: &str, bytes: &[u8]) -> Result<usize> {
        let is_json = std::path::Path::new(file_name)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if !is_json {
            return Err(Error::validation(format!(
                "'{file_name}' is not a JSON file"
            )));
        }
        let text = std::str::from_utf8(bytes)
            .map_err(|e| Error::validation(format!("'{file_name}' is not UTF-8: {e}")))?;
        let output = ExperimentOutput::from_json_str(text)?;

        let mut uploads = self
            .sessions
            .get_mut(&session)
            .ok_or_else(|| unknown_session(session))?;
        let index = uploads.len();
        let label = format!("File {}: {}", index + 1, output.config.generator_type());
        debug!(%session, %label, "stored upload");
        uploads.push(UploadedFile {
            label,
            file_name: file_name.to_string(),
            output,
        });
        Ok(index)
    }

    /// Summaries of a session's uploads, in upload order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the session is not open.
    pub fn uploads(&self, session: SessionId) -> Result<Vec<UploadSummary>> {
        let uploads = self
            .sessions
            .get(&session)
            .ok_or_else(|| unknown_session(session))?;
        Ok(uploads
            .iter()
            .enumerate()
            .map(|(index, file)| UploadSummary {
                index,
                label: file.label.clone(),
                file_name: file.file_name.clone(),
                collisions: file.output.collisions_data.len(),
            })
            .collect())
    }

    /// One upload of a session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the session is not open or the index
    /// is out of range.
    pub fn get(&self, session: SessionId, index: usize) -> Result<UploadedFile> {
        let uploads = self
            .sessions
            .get(&session)
            .ok_or_else(|| unknown_session(session))?;
        uploads.get(index).cloned().ok_or_else(|| {
            Error::validation(format!(
                "{session} has {} uploads, no index {index}",
                uploads.len()
            ))
        })
    }

    /// Drop a session and everything uploaded in it. Returns whether it was
    /// open.
    pub fn close_session(&self, session: SessionId) -> bool {
        let removed = self.sessions.remove(&session).is_some();
        debug!(%session, removed, "closed upload session");
        removed
    }
}

impl Default for UploadCache {
    fn default() -> Self {
        Self::new()
    }
}

fn unknown_session(session: SessionId) -> Error {
    Error::validation(format!("{session} is not open"))
}
