//! Bulk resident import.
//!
//! A run moves through ingest, tokenizing (or workbook decoding), header
//! mapping, per-row sanitizing, in-file de-duplication and batched
//! persistence, ending in an [`ImportResult`]. [`pipeline::ImportRun`]
//! ties the stages together; [`sessions::ImportSessions`] parks runs
//! between HTTP requests.

pub mod config;
pub mod dedup;
pub mod error;
pub mod ingest;
pub mod mapping;
pub mod parser;
pub mod persister;
pub mod pipeline;
pub mod report;
pub mod sanitize;
pub mod sessions;
pub mod spreadsheet;
pub mod template;

pub use config::ImportConfig;
pub use error::{ImportError, ReportError, RowErrorKind};
pub use ingest::RawFile;
pub use mapping::{ConfirmedMapping, FieldMapping, ImportField};
pub use parser::{LineMode, ParsedTable};
pub use pipeline::{ImportRun, PipelineStage, ProcessOptions};
pub use report::{ImportResult, RowError};
pub use sanitize::MappedRecord;
pub use sessions::{CancelOutcome, ImportSessions, ImportStatus};
