//! Concurrency-bounded writes through the [`ResidentStore`].
//!
//! Records are written in fixed-size batches. Calls inside a batch run
//! concurrently; the next batch starts only after every call of the current
//! one has settled. Each outcome is captured independently, so one failed
//! write never aborts its siblings or later batches.

use crate::import::error::RowErrorKind;
use crate::import::report::ResultAggregator;
use crate::import::sanitize::MappedRecord;
use crate::residents::ResidentStore;
use futures::future::join_all;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// An accepted record waiting to be written, with its file line.
#[derive(Debug, Clone)]
pub struct PendingRecord {
    pub line: usize,
    pub record: MappedRecord,
}

pub struct BatchPersister<'a> {
    store: &'a dyn ResidentStore,
    tenant_id: Uuid,
    batch_size: usize,
    write_timeout: Duration,
    cancel: CancellationToken,
}

impl<'a> BatchPersister<'a> {
    pub fn new(
        store: &'a dyn ResidentStore,
        tenant_id: Uuid,
        batch_size: usize,
        write_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            tenant_id,
            batch_size: batch_size.max(1),
            write_timeout,
            cancel,
        }
    }

    /// Write every pending record, folding outcomes into `aggregator`.
    ///
    /// Each record must already be counted as succeeded; failures move it to
    /// ignored. Once the token is cancelled, the remaining batches are
    /// recorded as cancelled without being written.
    pub async fn persist(&self, pending: Vec<PendingRecord>, aggregator: &mut ResultAggregator) {
        let total = pending.len();
        let mut remaining = pending.into_iter();
        let mut batch_index = 0usize;

        loop {
            let batch: Vec<PendingRecord> = remaining.by_ref().take(self.batch_size).collect();
            if batch.is_empty() {
                break;
            }

            if self.cancel.is_cancelled() {
                let mut skipped = 0usize;
                for pending in batch.into_iter().chain(remaining.by_ref()) {
                    aggregator.record_failure(pending.line, &RowErrorKind::Cancelled);
                    skipped += 1;
                }
                log::info!(
                    "tenant {}: import cancelled before batch {}, {} records skipped",
                    self.tenant_id,
                    batch_index + 1,
                    skipped
                );
                break;
            }

            let outcomes = join_all(batch.iter().map(|pending| self.write(pending))).await;

            let mut failed = 0usize;
            for (pending, outcome) in batch.into_iter().zip(outcomes) {
                match outcome {
                    Ok(()) => aggregator.record_persisted(pending.record),
                    Err(kind) => {
                        log::warn!(
                            "tenant {}: line {} not written: {}",
                            self.tenant_id,
                            pending.line,
                            kind
                        );
                        aggregator.record_failure(pending.line, &kind);
                        failed += 1;
                    }
                }
            }

            batch_index += 1;
            log::debug!(
                "tenant {}: batch {} settled ({} failed, {}/{} records processed)",
                self.tenant_id,
                batch_index,
                failed,
                (batch_index * self.batch_size).min(total),
                total
            );
        }
    }

    async fn write(&self, pending: &PendingRecord) -> Result<(), RowErrorKind> {
        if pending.record.tenant_id != self.tenant_id {
            return Err(RowErrorKind::TenantIsolationViolation);
        }

        match tokio::time::timeout(self.write_timeout, self.store.create(&pending.record)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(RowErrorKind::Persistence(err.to_string())),
            Err(_) => Err(RowErrorKind::Timeout(self.write_timeout)),
        }
    }
}
