//! Errores del subsistema de linaje.
//!
//! Ninguno de estos errores cruza `capture_on_completion`, `log_event` ni
//! `add_raw_input`: se registran y se convierten a `bool`/`Option` en el borde.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LineageError {
    #[error("lineage already exists for report generation {0}")]
    DuplicateReportGeneration(Uuid),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("compression failure: {0}")]
    CompressionFailure(String),
    #[error("unknown pipeline run {0}")]
    UnknownRun(Uuid),
    #[error("lineage capture disabled")]
    CaptureDisabled,
}

impl From<serde_json::Error> for LineageError {
    fn from(e: serde_json::Error) -> Self {
        LineageError::CompressionFailure(format!("serialize: {e}"))
    }
}

impl From<std::io::Error> for LineageError {
    fn from(e: std::io::Error) -> Self {
        LineageError::CompressionFailure(format!("io: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_message_names_report() {
        let id = Uuid::nil();
        let err = LineageError::DuplicateReportGeneration(id);
        assert_eq!(err.to_string(), format!("lineage already exists for report generation {id}"));
    }

    #[test]
    fn io_errors_map_to_compression_failure() {
        let err: LineageError = std::io::Error::other("disk").into();
        assert!(matches!(err, LineageError::CompressionFailure(m) if m.contains("disk")));
    }
}
