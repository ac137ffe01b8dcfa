use super::{ResidentStore, StoreError};
use crate::import::sanitize::MappedRecord;
use crate::models::Resident;
use rocket_db_pools::sqlx::{self, PgPool};
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";

/// `residents` table writer.
#[derive(Clone)]
pub struct PgResidentStore {
    pool: PgPool,
}

impl PgResidentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn count_for_tenant(&self, tenant_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM residents WHERE tenant_id = $1")
            .bind(tenant_id)
            .fetch_one(&self.pool)
            .await
    }
}

#[rocket::async_trait]
impl ResidentStore for PgResidentStore {
    async fn create(&self, record: &MappedRecord) -> Result<Resident, StoreError> {
        let result = sqlx::query_as::<_, Resident>(
            r#"
            INSERT INTO residents (id, tenant_id, name, address, complement, short_code, phone, email)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, tenant_id, name, address, complement, short_code, phone, email, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(record.tenant_id)
        .bind(&record.name)
        .bind(&record.address)
        .bind(&record.complement)
        .bind(&record.short_code)
        .bind(&record.phone)
        .bind(&record.email)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(resident) => Ok(resident),
            Err(err) if is_unique_violation(&err) => Err(StoreError::Duplicate(record.email.clone())),
            Err(err) => Err(StoreError::Database(err)),
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err)
            if db_err.code().map(|code| code == UNIQUE_VIOLATION).unwrap_or(false)
    )
}
