//! Per-tenant registry of in-progress import runs.
//!
//! The HTTP flow spans several requests, so each run is parked here between
//! them. Lookups are tenant-scoped: a run owned by another tenant is
//! reported as not found. No map guard is ever held across an `.await`;
//! a run is taken out of the map before it is processed and put back once
//! it is reported.

use crate::import::config::ImportConfig;
use crate::import::error::ImportError;
use crate::import::mapping::{FieldMapping, ImportField};
use crate::import::pipeline::{ImportRun, Mapped, Parsed, PipelineStage, Reported};
use crate::import::report::ImportResult;
use dashmap::DashMap;
use dashmap::mapref::one::RefMut;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

enum SessionState {
    Parsed(ImportRun<Parsed>),
    Mapped(ImportRun<Mapped>),
    Processing {
        cancel: CancellationToken,
        started_at: Instant,
    },
    Reported(ImportRun<Reported>),
}

impl SessionState {
    fn stage(&self) -> PipelineStage {
        match self {
            SessionState::Parsed(_) => PipelineStage::Parsed,
            SessionState::Mapped(_) => PipelineStage::Mapped,
            SessionState::Processing { .. } => PipelineStage::Processing,
            SessionState::Reported(_) => PipelineStage::Reported,
        }
    }
}

struct SessionEntry {
    tenant_id: Uuid,
    file_name: String,
    headers: Vec<String>,
    sample_rows: Vec<Vec<String>>,
    row_count: usize,
    created_at: Instant,
    /// Only `None` while a transition holds the entry guard.
    state: Option<SessionState>,
}

impl SessionEntry {
    fn stage(&self) -> Option<PipelineStage> {
        self.state.as_ref().map(SessionState::stage)
    }
}

/// JSON view of a session.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportStatus {
    pub id: Uuid,
    pub stage: PipelineStage,
    pub file_name: String,
    pub headers: Vec<String>,
    pub row_count: usize,
    pub sample_rows: Vec<Vec<String>>,
    /// Proposed mapping while parsed, confirmed mapping afterwards.
    pub mapping: Option<FieldMapping>,
    pub missing_required: Vec<ImportField>,
    /// The run request must carry `confirmLarge: true`.
    pub confirmation_required: bool,
    pub result: Option<ImportResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum CancelOutcome {
    /// A running import was asked to stop after its current batch.
    Cancelled,
    /// An idle session was removed.
    Discarded,
}

pub struct ImportSessions {
    entries: DashMap<Uuid, SessionEntry>,
    ttl: Duration,
    confirm_threshold: usize,
    sample_rows: usize,
}

impl ImportSessions {
    pub fn new(ttl: Duration, confirm_threshold: usize, sample_rows: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            confirm_threshold,
            sample_rows,
        }
    }

    pub fn from_config(config: &ImportConfig) -> Self {
        Self::new(config.session_ttl, config.confirm_threshold, config.sample_rows)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Park a freshly parsed run. Expired sessions are purged first.
    pub fn insert_parsed(&self, run: ImportRun<Parsed>) -> ImportStatus {
        let purged = self.purge_expired();
        if purged > 0 {
            log::debug!("purged {} expired import sessions", purged);
        }

        let id = run.id();
        let table = run.table();
        let entry = SessionEntry {
            tenant_id: run.tenant_id(),
            file_name: run.file_name().to_string(),
            headers: table.headers.clone(),
            sample_rows: table.rows.iter().take(self.sample_rows).cloned().collect(),
            row_count: table.row_count(),
            created_at: Instant::now(),
            state: Some(SessionState::Parsed(run)),
        };

        let status = self.render(id, &entry);
        self.entries.insert(id, entry);
        status
    }

    /// Drop sessions older than the TTL.
    ///
    /// A running import is aged from the moment it started processing. One
    /// that outlives the TTL is cancelled before its session is dropped, so
    /// an abandoned run stops writing after its current batch.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|id, entry| match &entry.state {
            Some(SessionState::Processing { cancel, started_at }) => {
                if started_at.elapsed() < ttl {
                    return true;
                }
                cancel.cancel();
                log::warn!("run {}: still processing after the session TTL, cancelled", id);
                false
            }
            _ => entry.created_at.elapsed() < ttl,
        });
        before.saturating_sub(self.entries.len())
    }

    pub fn status(&self, tenant_id: Uuid, id: Uuid) -> Result<ImportStatus, ImportError> {
        let entry = self.entry(tenant_id, id)?;
        Ok(self.render(id, &entry))
    }

    /// Confirm (or replace) the mapping of a parsed or mapped run.
    ///
    /// An invalid mapping leaves the session parsed, with nothing confirmed.
    pub fn confirm_mapping(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        mapping: FieldMapping,
    ) -> Result<ImportStatus, ImportError> {
        self.transition(tenant_id, id, |state| {
            let run = match state {
                SessionState::Parsed(run) => run,
                SessionState::Mapped(run) => run.remap(),
                other => {
                    let actual = other.stage();
                    return (
                        other,
                        Err(ImportError::InvalidStage {
                            expected: PipelineStage::Parsed,
                            actual,
                        }),
                    );
                }
            };

            match run.validate_mapping(mapping) {
                Ok(confirmed) => (SessionState::Mapped(run.confirm(confirmed)), Ok(())),
                Err(err) => (SessionState::Parsed(run), Err(err)),
            }
        })?;

        self.status(tenant_id, id)
    }

    /// Take a mapped run out of the registry for processing.
    ///
    /// The session stays visible as `processing` and keeps the returned
    /// token so it can be cancelled. Runs above the confirmation threshold
    /// need `confirm_large`.
    pub fn begin_processing(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        confirm_large: bool,
    ) -> Result<(ImportRun<Mapped>, CancellationToken), ImportError> {
        let threshold = self.confirm_threshold;
        self.transition(tenant_id, id, |state| match state {
            SessionState::Mapped(run) if run.needs_confirmation(threshold) && !confirm_large => {
                let rows = run.row_count();
                (
                    SessionState::Mapped(run),
                    Err(ImportError::ConfirmationRequired { rows, threshold }),
                )
            }
            SessionState::Mapped(run) => {
                let cancel = CancellationToken::new();
                (
                    SessionState::Processing {
                        cancel: cancel.clone(),
                        started_at: Instant::now(),
                    },
                    Ok((run, cancel)),
                )
            }
            other => {
                let actual = other.stage();
                (
                    other,
                    Err(ImportError::InvalidStage {
                        expected: PipelineStage::Mapped,
                        actual,
                    }),
                )
            }
        })
    }

    /// Put a reported run back so its result can be fetched.
    pub fn finish(&self, run: ImportRun<Reported>) {
        match self.entries.get_mut(&run.id()) {
            Some(mut entry) => entry.state = Some(SessionState::Reported(run)),
            None => log::warn!("run {}: session vanished before the report was stored", run.id()),
        }
    }

    /// Stop a running import after its current batch, or discard an idle session.
    pub fn cancel(&self, tenant_id: Uuid, id: Uuid) -> Result<CancelOutcome, ImportError> {
        {
            let entry = self.entry(tenant_id, id)?;
            if let Some(SessionState::Processing { cancel, .. }) = &entry.state {
                cancel.cancel();
                log::info!("run {}: cancellation requested", id);
                return Ok(CancelOutcome::Cancelled);
            }
        }

        self.entries.remove(&id);
        log::info!("run {}: session discarded", id);
        Ok(CancelOutcome::Discarded)
    }

    pub fn result(&self, tenant_id: Uuid, id: Uuid) -> Result<ImportResult, ImportError> {
        let entry = self.entry(tenant_id, id)?;
        match &entry.state {
            Some(SessionState::Reported(run)) => Ok(run.result().clone()),
            other => Err(ImportError::InvalidStage {
                expected: PipelineStage::Reported,
                actual: other
                    .as_ref()
                    .map(SessionState::stage)
                    .unwrap_or(PipelineStage::Processing),
            }),
        }
    }

    fn entry(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<RefMut<'_, Uuid, SessionEntry>, ImportError> {
        match self.entries.get_mut(&id) {
            Some(entry) if entry.tenant_id == tenant_id => Ok(entry),
            _ => Err(ImportError::SessionNotFound(id)),
        }
    }

    fn transition<T>(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        step: impl FnOnce(SessionState) -> (SessionState, Result<T, ImportError>),
    ) -> Result<T, ImportError> {
        let mut entry = self.entry(tenant_id, id)?;
        let state = entry.state.take().ok_or(ImportError::SessionNotFound(id))?;
        let (next, outcome) = step(state);
        entry.state = Some(next);
        outcome
    }

    fn render(&self, id: Uuid, entry: &SessionEntry) -> ImportStatus {
        let (mapping, result) = match &entry.state {
            Some(SessionState::Parsed(run)) => (Some(run.proposed_mapping()), None),
            Some(SessionState::Mapped(run)) => (Some(run.mapping().as_mapping().clone()), None),
            Some(SessionState::Reported(run)) => {
                (Some(run.mapping().clone()), Some(run.result().clone()))
            }
            Some(SessionState::Processing { .. }) | None => (None, None),
        };

        let missing_required = match (&entry.state, &mapping) {
            (Some(SessionState::Parsed(_)), Some(mapping)) => mapping.missing_required(),
            _ => Vec::new(),
        };

        ImportStatus {
            id,
            stage: entry.stage().unwrap_or(PipelineStage::Processing),
            file_name: entry.file_name.clone(),
            headers: entry.headers.clone(),
            row_count: entry.row_count,
            sample_rows: entry.sample_rows.clone(),
            mapping,
            missing_required,
            confirmation_required: entry.row_count > self.confirm_threshold,
            result,
        }
    }
}

impl Default for ImportSessions {
    fn default() -> Self {
        Self::from_config(&ImportConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::ingest::RawFile;
    use crate::import::pipeline::ProcessOptions;
    use crate::test_support::InMemoryResidentStore;

    const CSV: &str = "Name,Address,Phone,Email\n\
        Maria Silva,Rua A,11987654321,maria@example.com\n\
        Ana Lima,Rua B,11987654322,ana@example.com\n\
        Rui Alves,Rua C,11987654323,rui@example.com\n";

    fn parsed(tenant_id: Uuid) -> ImportRun<Parsed> {
        ImportRun::new(tenant_id, RawFile::new("residents.csv", CSV.as_bytes().to_vec()))
            .parse(&ImportConfig::default())
            .expect("file parses")
    }

    fn complete_mapping() -> FieldMapping {
        FieldMapping {
            name: Some(0),
            address: Some(1),
            phone: Some(2),
            email: Some(3),
            ..Default::default()
        }
    }

    #[test]
    fn sessions_are_tenant_scoped() {
        let sessions = ImportSessions::default();
        let owner = Uuid::new_v4();
        let status = sessions.insert_parsed(parsed(owner));

        assert_eq!(status.stage, PipelineStage::Parsed);
        assert_eq!(status.row_count, 3);
        assert!(sessions.status(owner, status.id).is_ok());
        assert!(matches!(
            sessions.status(Uuid::new_v4(), status.id),
            Err(ImportError::SessionNotFound(_))
        ));
    }

    #[test]
    fn invalid_mapping_keeps_session_parsed() {
        let sessions = ImportSessions::default();
        let tenant = Uuid::new_v4();
        let id = sessions.insert_parsed(parsed(tenant)).id;

        let mut mapping = complete_mapping();
        mapping.email = None;
        assert!(matches!(
            sessions.confirm_mapping(tenant, id, mapping),
            Err(ImportError::MappingIncomplete { .. })
        ));
        assert_eq!(sessions.status(tenant, id).expect("exists").stage, PipelineStage::Parsed);

        let status = sessions
            .confirm_mapping(tenant, id, complete_mapping())
            .expect("mapping confirmed");
        assert_eq!(status.stage, PipelineStage::Mapped);
    }

    #[test]
    fn large_runs_need_confirmation() {
        let sessions = ImportSessions::new(Duration::from_secs(60), 2, 5);
        let tenant = Uuid::new_v4();
        let id = sessions.insert_parsed(parsed(tenant)).id;
        sessions
            .confirm_mapping(tenant, id, complete_mapping())
            .expect("mapping confirmed");

        assert!(matches!(
            sessions.begin_processing(tenant, id, false),
            Err(ImportError::ConfirmationRequired { rows: 3, threshold: 2 })
        ));
        assert_eq!(sessions.status(tenant, id).expect("exists").stage, PipelineStage::Mapped);
        assert!(sessions.begin_processing(tenant, id, true).is_ok());
    }

    #[test]
    fn running_before_mapping_is_a_stage_error() {
        let sessions = ImportSessions::default();
        let tenant = Uuid::new_v4();
        let id = sessions.insert_parsed(parsed(tenant)).id;

        assert!(matches!(
            sessions.begin_processing(tenant, id, false),
            Err(ImportError::InvalidStage {
                expected: PipelineStage::Mapped,
                actual: PipelineStage::Parsed
            })
        ));
    }

    #[tokio::test]
    async fn full_session_lifecycle() {
        let sessions = ImportSessions::default();
        let store = InMemoryResidentStore::new();
        let tenant = Uuid::new_v4();
        let id = sessions.insert_parsed(parsed(tenant)).id;
        sessions
            .confirm_mapping(tenant, id, complete_mapping())
            .expect("mapping confirmed");

        let (run, cancel) = sessions.begin_processing(tenant, id, false).expect("run starts");
        assert_eq!(
            sessions.status(tenant, id).expect("exists").stage,
            PipelineStage::Processing
        );
        assert!(matches!(
            sessions.begin_processing(tenant, id, false),
            Err(ImportError::InvalidStage { .. })
        ));

        let options = ProcessOptions::default().with_cancel(cancel);
        sessions.finish(run.execute(&store, &options).await);

        let result = sessions.result(tenant, id).expect("reported");
        assert_eq!(result.succeeded, 3);
        assert_eq!(
            sessions.status(tenant, id).expect("exists").stage,
            PipelineStage::Reported
        );
    }

    #[test]
    fn cancel_discards_idle_sessions_and_signals_running_ones() {
        let sessions = ImportSessions::default();
        let tenant = Uuid::new_v4();

        let idle = sessions.insert_parsed(parsed(tenant)).id;
        assert_eq!(sessions.cancel(tenant, idle).expect("found"), CancelOutcome::Discarded);
        assert!(sessions.status(tenant, idle).is_err());

        let running = sessions.insert_parsed(parsed(tenant)).id;
        sessions
            .confirm_mapping(tenant, running, complete_mapping())
            .expect("mapping confirmed");
        let (_run, token) = sessions.begin_processing(tenant, running, false).expect("starts");
        assert_eq!(
            sessions.cancel(tenant, running).expect("found"),
            CancelOutcome::Cancelled
        );
        assert!(token.is_cancelled());
        assert!(sessions.status(tenant, running).is_ok());
    }

    #[tokio::test]
    async fn abandoned_runs_are_cancelled_and_purged_after_the_ttl() {
        let sessions = ImportSessions::new(Duration::ZERO, 500, 5);
        let store = InMemoryResidentStore::new();
        let tenant = Uuid::new_v4();
        let id = sessions.insert_parsed(parsed(tenant)).id;
        sessions
            .confirm_mapping(tenant, id, complete_mapping())
            .expect("mapping confirmed");
        let (run, token) = sessions.begin_processing(tenant, id, false).expect("starts");

        sessions.insert_parsed(parsed(tenant));
        assert!(token.is_cancelled());
        assert!(matches!(
            sessions.status(tenant, id),
            Err(ImportError::SessionNotFound(_))
        ));

        let options = ProcessOptions::default().with_cancel(token);
        let reported = run.execute(&store, &options).await;
        assert_eq!(store.calls(), 0);
        assert_eq!(reported.result().ignored, 3);
        sessions.finish(reported);
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn expired_sessions_are_purged_on_upload() {
        let sessions = ImportSessions::new(Duration::ZERO, 500, 5);
        assert!(sessions.is_empty());
        let tenant = Uuid::new_v4();
        let first = sessions.insert_parsed(parsed(tenant)).id;
        let second = sessions.insert_parsed(parsed(tenant)).id;

        assert!(sessions.status(tenant, first).is_err());
        assert!(sessions.status(tenant, second).is_ok());
        assert_eq!(sessions.len(), 1);
    }
}
