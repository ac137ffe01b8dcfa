//! Resident persistence collaborator.
//!
//! The import pipeline only needs `create`; everything else about resident
//! storage lives behind [`ResidentStore`].

pub mod postgres;

pub use postgres::PgResidentStore;

use crate::import::sanitize::MappedRecord;
use crate::models::Resident;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("email {0} is already registered for this tenant")]
    Duplicate(String),
    #[error("{0}")]
    Rejected(String),
}

#[rocket::async_trait]
pub trait ResidentStore: Send + Sync {
    async fn create(&self, record: &MappedRecord) -> Result<Resident, StoreError>;
}

/// Store handle kept in Rocket state.
pub type SharedResidentStore = Arc<dyn ResidentStore>;
