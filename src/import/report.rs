//! Result aggregation and CSV exports.
//!
//! [`ResultAggregator`] folds every rejection (validation, dedup,
//! persistence, cancellation) into one error list and keeps the running
//! success counter. The aggregate is exposed as an [`ImportResult`], which
//! can be rendered as the `Line,Reason` error report.

use crate::import::error::{ReportError, RowErrorKind};
use crate::import::sanitize::MappedRecord;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Header row of the downloadable error report.
pub const ERROR_REPORT_HEADERS: [&str; 2] = ["Line", "Reason"];

/// One rejected row. `line` is 1-based and counts the header row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RowError {
    pub line: usize,
    pub reason: String,
}

impl RowError {
    pub fn new(line: usize, kind: &RowErrorKind) -> Self {
        Self {
            line,
            reason: kind.to_string(),
        }
    }
}

/// File line of a data row given its zero-based index.
pub fn line_number(data_row_index: usize) -> usize {
    data_row_index + 2
}

/// Outcome of a run. `total_rows == succeeded + ignored` always holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub total_rows: usize,
    pub succeeded: usize,
    pub ignored: usize,
    pub errors: Vec<RowError>,
    pub imported: Vec<MappedRecord>,
}

impl ImportResult {
    /// Render the error list as CSV with a `Line,Reason` header.
    pub fn error_report_csv(&self) -> Result<String, ReportError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(ERROR_REPORT_HEADERS)?;
        for error in &self.errors {
            writer.write_record([error.line.to_string().as_str(), error.reason.as_str()])?;
        }

        let bytes = writer.into_inner().map_err(|err| err.into_error())?;
        Ok(String::from_utf8(bytes)?)
    }
}

/// Running tallies for one run.
#[derive(Debug)]
pub struct ResultAggregator {
    total_rows: usize,
    succeeded: usize,
    ignored: usize,
    errors: Vec<RowError>,
    imported: Vec<MappedRecord>,
}

impl ResultAggregator {
    pub fn new(total_rows: usize) -> Self {
        Self {
            total_rows,
            succeeded: 0,
            ignored: 0,
            errors: Vec::new(),
            imported: Vec::with_capacity(total_rows),
        }
    }

    /// Row rejected before persistence (validation or dedup).
    pub fn reject(&mut self, line: usize, kind: &RowErrorKind) {
        self.ignored += 1;
        self.errors.push(RowError::new(line, kind));
    }

    /// Row passed validation and dedup and is queued for persistence.
    pub fn accept(&mut self) {
        self.succeeded += 1;
    }

    /// Queued record was written.
    pub fn record_persisted(&mut self, record: MappedRecord) {
        self.imported.push(record);
    }

    /// Queued record was not written; moves it from succeeded to ignored.
    pub fn record_failure(&mut self, line: usize, kind: &RowErrorKind) {
        self.succeeded = self.succeeded.saturating_sub(1);
        self.reject(line, kind);
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn ignored(&self) -> usize {
        self.ignored
    }

    pub fn finish(mut self) -> ImportResult {
        self.errors.sort_by_key(|error| error.line);
        debug_assert_eq!(self.total_rows, self.succeeded + self.ignored);

        ImportResult {
            total_rows: self.total_rows,
            succeeded: self.succeeded,
            ignored: self.ignored,
            errors: self.errors,
            imported: self.imported,
        }
    }
}
