use condo_api::import::MappedRecord;
use condo_api::residents::{PgResidentStore, ResidentStore, StoreError};
use condo_api::test_support::{TestDatabase, TestDatabaseError};
use uuid::Uuid;

fn record(tenant_id: Uuid, email: &str) -> MappedRecord {
    MappedRecord {
        name: "Maria Silva".into(),
        address: "Rua das Flores, 100".into(),
        complement: "Apto 12".into(),
        short_code: "FLORES100-12".into(),
        phone: "11987654321".into(),
        email: email.into(),
        tenant_id,
    }
}

#[tokio::test]
async fn creates_residents_and_rejects_duplicate_emails_per_tenant() {
    let test_db = match TestDatabase::new_from_env().await {
        Ok(db) => db,
        Err(TestDatabaseError::MissingUrl) => {
            eprintln!("skipping resident store test: TEST_DATABASE_URL not set");
            return;
        }
        Err(err) => panic!("failed to provision test database: {err:?}"),
    };

    let store = PgResidentStore::new(test_db.pool_clone());
    let tenant = Uuid::new_v4();
    let other_tenant = Uuid::new_v4();

    let resident = store
        .create(&record(tenant, "maria@example.com"))
        .await
        .expect("insert succeeds");
    assert_eq!(resident.tenant_id, tenant);
    assert_eq!(resident.short_code, "FLORES100-12");

    let duplicate = store.create(&record(tenant, "maria@example.com")).await;
    assert!(matches!(duplicate, Err(StoreError::Duplicate(email)) if email == "maria@example.com"));

    store
        .create(&record(other_tenant, "maria@example.com"))
        .await
        .expect("same email is allowed for another tenant");

    assert_eq!(store.count_for_tenant(tenant).await.expect("count"), 1);
    assert_eq!(store.count_for_tenant(other_tenant).await.expect("count"), 1);

    drop(store);
    test_db.close().await.expect("failed to drop test database");
}
