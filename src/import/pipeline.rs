//! Typestate import run.
//!
//! `Uploading -> Parsed -> Mapped -> (Processing) -> Reported`. Every
//! transition consumes the run, so a stage can only be reached through the
//! one before it. `Processing` has no value of its own: it is the lifetime
//! of the [`ImportRun::execute`] future.

use crate::import::config::ImportConfig;
use crate::import::dedup::DedupGuard;
use crate::import::error::ImportError;
use crate::import::ingest::{FileIngester, IngestedFile, RawFile};
use crate::import::mapping::{ConfirmedMapping, FieldMapping};
use crate::import::parser::{DelimitedParser, ParsedTable};
use crate::import::persister::{BatchPersister, PendingRecord};
use crate::import::report::{ImportResult, ResultAggregator, line_number};
use crate::import::sanitize::RowSanitizer;
use crate::import::spreadsheet::decode_workbook;
use crate::residents::ResidentStore;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum PipelineStage {
    Uploading,
    Parsed,
    Mapped,
    Processing,
    Reported,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Uploading => "uploading",
            PipelineStage::Parsed => "parsed",
            PipelineStage::Mapped => "mapped",
            PipelineStage::Processing => "processing",
            PipelineStage::Reported => "reported",
        };
        f.write_str(name)
    }
}

pub trait Stage {
    const STAGE: PipelineStage;
}

#[derive(Debug)]
pub struct Uploading {
    file: RawFile,
}

#[derive(Debug)]
pub struct Parsed {
    table: ParsedTable,
}

#[derive(Debug)]
pub struct Mapped {
    table: ParsedTable,
    mapping: ConfirmedMapping,
}

#[derive(Debug)]
pub struct Reported {
    mapping: FieldMapping,
    result: ImportResult,
}

impl Stage for Uploading {
    const STAGE: PipelineStage = PipelineStage::Uploading;
}

impl Stage for Parsed {
    const STAGE: PipelineStage = PipelineStage::Parsed;
}

impl Stage for Mapped {
    const STAGE: PipelineStage = PipelineStage::Mapped;
}

impl Stage for Reported {
    const STAGE: PipelineStage = PipelineStage::Reported;
}

/// Knobs for the processing stage.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub batch_size: usize,
    pub write_timeout: Duration,
    pub cancel: CancellationToken,
}

impl ProcessOptions {
    pub fn from_config(config: &ImportConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            write_timeout: config.write_timeout,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self::from_config(&ImportConfig::default())
    }
}

#[derive(Debug)]
pub struct ImportRun<S> {
    id: Uuid,
    tenant_id: Uuid,
    file_name: String,
    state: S,
}

impl<S: Stage> ImportRun<S> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn stage(&self) -> PipelineStage {
        S::STAGE
    }
}

impl<S> ImportRun<S> {
    /// Move the run identity onto a new state, returning the old one.
    fn split(self) -> (ImportRun<()>, S) {
        let ImportRun {
            id,
            tenant_id,
            file_name,
            state,
        } = self;
        (
            ImportRun {
                id,
                tenant_id,
                file_name,
                state: (),
            },
            state,
        )
    }
}

impl ImportRun<()> {
    fn with_state<T>(self, state: T) -> ImportRun<T> {
        ImportRun {
            id: self.id,
            tenant_id: self.tenant_id,
            file_name: self.file_name,
            state,
        }
    }
}

impl ImportRun<Uploading> {
    /// Start a run for `tenant_id`. The tenant comes from the caller, never the file.
    pub fn new(tenant_id: Uuid, file: RawFile) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            file_name: file.file_name.clone(),
            state: Uploading { file },
        }
    }

    /// Ingest and tokenize the upload. Nothing is written on failure.
    pub fn parse(self, config: &ImportConfig) -> Result<ImportRun<Parsed>, ImportError> {
        let ImportRun {
            id,
            tenant_id,
            file_name,
            state: Uploading { file },
        } = self;

        let table = match FileIngester::new(config).ingest(file)? {
            IngestedFile::Text(text) => DelimitedParser::new(config.line_mode).parse(&text)?,
            IngestedFile::Spreadsheet(bytes) => decode_workbook(bytes)?,
        };

        log::info!(
            "run {}: parsed {} ({} columns, {} data rows)",
            id,
            file_name,
            table.column_count(),
            table.row_count()
        );

        Ok(ImportRun {
            id,
            tenant_id,
            file_name,
            state: Parsed { table },
        })
    }
}

impl ImportRun<Parsed> {
    pub fn table(&self) -> &ParsedTable {
        &self.state.table
    }

    pub fn proposed_mapping(&self) -> FieldMapping {
        FieldMapping::propose(&self.state.table.headers)
    }

    pub fn validate_mapping(&self, mapping: FieldMapping) -> Result<ConfirmedMapping, ImportError> {
        mapping.confirm(self.state.table.column_count())
    }

    pub fn confirm(self, mapping: ConfirmedMapping) -> ImportRun<Mapped> {
        log::debug!("run {}: mapping confirmed {:?}", self.id, mapping.as_mapping());

        let (run, parsed) = self.split();
        run.with_state(Mapped {
            table: parsed.table,
            mapping,
        })
    }
}

impl ImportRun<Mapped> {
    pub fn table(&self) -> &ParsedTable {
        &self.state.table
    }

    pub fn mapping(&self) -> &ConfirmedMapping {
        &self.state.mapping
    }

    pub fn row_count(&self) -> usize {
        self.state.table.row_count()
    }

    pub fn needs_confirmation(&self, threshold: usize) -> bool {
        self.row_count() > threshold
    }

    /// Drop the confirmed mapping and go back to [`Parsed`].
    pub fn remap(self) -> ImportRun<Parsed> {
        let (run, mapped) = self.split();
        run.with_state(Parsed {
            table: mapped.table,
        })
    }

    /// Sanitize, de-duplicate and persist every row.
    ///
    /// Row- and record-level failures are folded into the report; this
    /// never fails as a whole.
    pub async fn execute(
        self,
        store: &dyn ResidentStore,
        options: &ProcessOptions,
    ) -> ImportRun<Reported> {
        let id = self.id;
        let tenant_id = self.tenant_id;
        let (run, Mapped { table, mapping }) = self.split();

        log::info!("run {}: processing {} rows for tenant {}", id, table.row_count(), tenant_id);

        let mut aggregator = ResultAggregator::new(table.row_count());
        let mut dedup = DedupGuard::default();
        let mut pending = Vec::new();

        let sanitizer = RowSanitizer::new(&mapping, tenant_id);
        for (index, row) in table.rows.iter().enumerate() {
            let line = line_number(index);
            match sanitizer.sanitize(row).and_then(|record| dedup.admit(record)) {
                Ok(record) => {
                    aggregator.accept();
                    pending.push(PendingRecord { line, record });
                }
                Err(kind) => aggregator.reject(line, &kind),
            }
        }

        log::debug!(
            "run {}: {} rows accepted, {} rejected before persistence",
            id,
            pending.len(),
            aggregator.ignored()
        );

        BatchPersister::new(
            store,
            tenant_id,
            options.batch_size,
            options.write_timeout,
            options.cancel.clone(),
        )
        .persist(pending, &mut aggregator)
        .await;

        let result = aggregator.finish();
        log::info!(
            "run {}: finished, {} succeeded, {} ignored",
            id,
            result.succeeded,
            result.ignored
        );

        run.with_state(Reported {
            mapping: mapping.into_mapping(),
            result,
        })
    }
}

impl ImportRun<Reported> {
    pub fn mapping(&self) -> &FieldMapping {
        &self.state.mapping
    }

    pub fn result(&self) -> &ImportResult {
        &self.state.result
    }

    pub fn into_result(self) -> ImportResult {
        self.state.result
    }
}
