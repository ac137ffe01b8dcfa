//! Error taxonomy for the resident import pipeline.
//!
//! Two layers:
//!
//! - [`ImportError`] halts a run (file-level and mapping-level failures, plus
//!   session bookkeeping). Nothing is written when one of these is raised.
//! - [`RowErrorKind`] is row- or record-local. The row is counted as ignored,
//!   its reason is recorded, and the run continues.

use crate::import::mapping::ImportField;
use crate::import::pipeline::PipelineStage;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Failures that stop a run before any row is persisted.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("unsupported file format `{extension}` (accepted: {accepted})")]
    UnsupportedFormat { extension: String, accepted: String },
    #[error("file exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },
    #[error("file is empty")]
    EmptyFile,
    #[error("file has no header columns")]
    NoColumns,
    #[error("file has no data rows")]
    NoDataRows,
    #[error("spreadsheet could not be read: {0}")]
    Spreadsheet(String),
    #[error("file could not be read as delimited text: {0}")]
    Malformed(String),
    #[error("required fields are not mapped: {}", field_list(.missing))]
    MappingIncomplete { missing: Vec<ImportField> },
    #[error("field `{field}` points at column {index}, but the file has {columns} columns")]
    MappingOutOfRange {
        field: ImportField,
        index: usize,
        columns: usize,
    },
    #[error("import session {0} not found")]
    SessionNotFound(Uuid),
    #[error("import session is {actual}, expected {expected}")]
    InvalidStage {
        expected: PipelineStage,
        actual: PipelineStage,
    },
    #[error("{rows} rows exceed the confirmation threshold of {threshold}")]
    ConfirmationRequired { rows: usize, threshold: usize },
}

fn field_list(fields: &[ImportField]) -> String {
    fields
        .iter()
        .map(|field| field.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Why a single row or record was not imported.
///
/// The `Display` output is the `reason` string shown to users and written to
/// the error report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowErrorKind {
    #[error("required field empty")]
    RequiredFieldEmpty,
    #[error("name too short")]
    NameTooShort,
    #[error("invalid phone")]
    InvalidPhone,
    #[error("invalid email")]
    InvalidEmail,
    #[error("duplicate email in file")]
    DuplicateEmailInFile,
    #[error("persistence error: tenant isolation violation")]
    TenantIsolationViolation,
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("persistence error: timed out after {0:?}")]
    Timeout(Duration),
    #[error("import cancelled")]
    Cancelled,
}

/// Failures while rendering CSV exports (template and error report).
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("report is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_error_reasons_match_report_wording() {
        assert_eq!(RowErrorKind::RequiredFieldEmpty.to_string(), "required field empty");
        assert_eq!(
            RowErrorKind::DuplicateEmailInFile.to_string(),
            "duplicate email in file"
        );
        assert_eq!(
            RowErrorKind::Timeout(Duration::from_secs(30)).to_string(),
            "persistence error: timed out after 30s"
        );
    }

    #[test]
    fn mapping_incomplete_lists_fields() {
        let err = ImportError::MappingIncomplete {
            missing: vec![ImportField::Phone, ImportField::Email],
        };
        assert_eq!(err.to_string(), "required fields are not mapped: phone, email");
    }
}
