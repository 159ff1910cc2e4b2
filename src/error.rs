//! Error taxonomy for the engine.
//!
//! Each phase of the pipeline gets its own `thiserror` enum so call sites can
//! match on the concrete error they expect, while `ErrorKind` gives the
//! orchestrator a flat, `Copy` tag to drive retry/rollback decisions without
//! matching the full error type.

use std::fmt;

/// Nominal error kind, independent of which phase produced it.
///
/// Mirrors the error taxonomy table: each kind has a fixed handling policy
/// (retry, rollback, skip, fatal) that the orchestrator applies uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    EmptyDocument,
    Unreadable,
    TimeoutExceeded,
    ModelUnavailable,
    StoreUnavailable,
    ValidationFailed,
    QueryDeadlineExceeded,
    InvariantViolation,
}

impl ErrorKind {
    /// Whether the orchestrator should retry a task that failed with this kind.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::TimeoutExceeded | ErrorKind::ModelUnavailable | ErrorKind::StoreUnavailable
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::EmptyDocument => "empty_document",
            ErrorKind::Unreadable => "unreadable",
            ErrorKind::TimeoutExceeded => "timeout_exceeded",
            ErrorKind::ModelUnavailable => "model_unavailable",
            ErrorKind::StoreUnavailable => "store_unavailable",
            ErrorKind::ValidationFailed => "validation_failed",
            ErrorKind::QueryDeadlineExceeded => "query_deadline_exceeded",
            ErrorKind::InvariantViolation => "invariant_violation",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("PDF stream unreadable: {0}")]
    Unreadable(String),
    #[error("document produced no usable text (extracted {chars} chars, OCR attempted: {ocr_attempted})")]
    EmptyDocument { chars: usize, ocr_attempted: bool },
    #[error("extraction exceeded its wall-clock budget")]
    TimeoutExceeded,
}

impl ExtractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::Unreadable(_) => ErrorKind::Unreadable,
            ExtractError::EmptyDocument { .. } => ErrorKind::EmptyDocument,
            ExtractError::TimeoutExceeded => ErrorKind::TimeoutExceeded,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("chunker invariant violated: {0}")]
    InvariantViolation(String),
}

impl ChunkError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvariantViolation
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("embedding request timed out")]
    TimeoutExceeded,
}

impl EmbedError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EmbedError::ModelUnavailable(_) => ErrorKind::ModelUnavailable,
            EmbedError::TimeoutExceeded => ErrorKind::TimeoutExceeded,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NerError {
    #[error("entity extraction timed out")]
    TimeoutExceeded,
}

impl NerError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::TimeoutExceeded
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("graph store unavailable: {0}")]
    Unavailable(String),
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Unavailable(_) => ErrorKind::StoreUnavailable,
            StoreError::InvariantViolation(_) => ErrorKind::InvariantViolation,
            StoreError::NotFound(_) => ErrorKind::InvariantViolation,
        }
    }
}

/// Error surfaced by the ingestion orchestrator, one per document.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Chunk(#[from] ChunkError),
    #[error(transparent)]
    Embed(#[from] EmbedError),
    #[error(transparent)]
    Ner(#[from] NerError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("validation failed: {0}")]
    ValidationFailed(String),
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::Extract(e) => e.kind(),
            IngestError::Chunk(e) => e.kind(),
            IngestError::Embed(e) => e.kind(),
            IngestError::Ner(e) => e.kind(),
            IngestError::Store(e) => e.kind(),
            IngestError::ValidationFailed(_) => ErrorKind::ValidationFailed,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("query deadline exceeded")]
    DeadlineExceeded,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::DeadlineExceeded => ErrorKind::QueryDeadlineExceeded,
            QueryError::Store(e) => e.kind(),
        }
    }
}

/// One line of the append-only error tracking file (spec.md §6).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorLogEntry {
    pub document_id: String,
    pub phase: String,
    pub error_kind: ErrorKind,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub retryable: bool,
}

impl serde::Serialize for ErrorKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for ErrorKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "empty_document" => ErrorKind::EmptyDocument,
            "unreadable" => ErrorKind::Unreadable,
            "timeout_exceeded" => ErrorKind::TimeoutExceeded,
            "model_unavailable" => ErrorKind::ModelUnavailable,
            "store_unavailable" => ErrorKind::StoreUnavailable,
            "validation_failed" => ErrorKind::ValidationFailed,
            "query_deadline_exceeded" => ErrorKind::QueryDeadlineExceeded,
            _ => ErrorKind::InvariantViolation,
        })
    }
}

/// Append-only JSON-lines writer for [`ErrorLogEntry`] records.
///
/// Generalized from the append-only idiom of an in-memory broadcast of
/// structured events onto an on-disk log: every ingestion failure gets one
/// line, never rewritten.
pub struct ErrorLog {
    path: std::path::PathBuf,
}

impl ErrorLog {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn append(&self, entry: &ErrorLogEntry) -> std::io::Result<()> {
        use std::io::Write;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&self.path)?;
        let line = serde_json::to_string(entry).unwrap_or_default();
        writeln!(file, "{line}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_round_trips_through_json() {
        let json = serde_json::to_string(&ErrorKind::ValidationFailed).unwrap();
        let back: ErrorKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ErrorKind::ValidationFailed);
    }

    #[test]
    fn retryable_kinds_match_spec_table() {
        assert!(ErrorKind::TimeoutExceeded.is_retryable());
        assert!(ErrorKind::ModelUnavailable.is_retryable());
        assert!(ErrorKind::StoreUnavailable.is_retryable());
        assert!(!ErrorKind::ValidationFailed.is_retryable());
        assert!(!ErrorKind::InvariantViolation.is_retryable());
    }

    #[test]
    fn append_only_log_accumulates_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("errors.jsonl");
        let log = ErrorLog::new(&path);
        let entry = ErrorLogEntry {
            document_id: "doc1".into(),
            phase: "validate".into(),
            error_kind: ErrorKind::ValidationFailed,
            timestamp: chrono::Utc::now(),
            retryable: false,
        };
        log.append(&entry).unwrap();
        log.append(&entry).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
