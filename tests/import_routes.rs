use condo_api::import::{
    CancelOutcome, FieldMapping, ImportConfig, ImportResult, ImportStatus, PipelineStage,
};
use condo_api::models::DataResponse;
use condo_api::residents::SharedResidentStore;
use condo_api::routes::imports::{
    cancel_import, download_error_report, download_template, get_import, run_import,
    update_mapping, upload_import,
};
use condo_api::tenant::TENANT_HEADER;
use condo_api::test_support::{InMemoryResidentStore, TestRocketBuilder};
use rocket::http::{ContentType, Header, Status};
use rocket::local::blocking::Client;
use rocket::routes;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

const CSV: &str = "Name,Address,Phone,Email\n\
    Maria Silva,Rua A 10,(11) 98765-4321,maria@example.com\n\
    Ana Lima,Rua B 20,123,ana@example.com\n\
    Rui Alves,Rua C 30,(11) 98765-4323,MARIA@example.com\n";

fn client_with(store: Arc<InMemoryResidentStore>, config: ImportConfig) -> Client {
    let shared: SharedResidentStore = store;
    TestRocketBuilder::new()
        .manage_import_state(shared, config)
        .mount_api_routes(routes![
            download_template,
            upload_import,
            get_import,
            update_mapping,
            run_import,
            download_error_report,
            cancel_import
        ])
        .blocking_client()
}

fn tenant_header(tenant: Uuid) -> Header<'static> {
    Header::new(TENANT_HEADER, tenant.to_string())
}

fn upload(client: &Client, tenant: Uuid, file_name: &str, body: &str) -> ImportStatus {
    let response = client
        .post(format!("/api/v1/residents/import?file_name={file_name}"))
        .header(tenant_header(tenant))
        .body(body)
        .dispatch();
    assert_eq!(response.status(), Status::Ok);

    let payload: DataResponse<ImportStatus> = response.into_json().expect("status payload");
    payload.data
}

fn map(client: &Client, tenant: Uuid, id: Uuid, mapping: &FieldMapping) -> Status {
    client
        .put(format!("/api/v1/residents/import/{id}/mapping"))
        .header(tenant_header(tenant))
        .header(ContentType::JSON)
        .body(serde_json::to_string(mapping).expect("mapping serializes"))
        .dispatch()
        .status()
}

#[test]
fn full_import_flow_over_http() {
    let store = Arc::new(InMemoryResidentStore::new());
    let client = client_with(store.clone(), ImportConfig::default());
    let tenant = Uuid::new_v4();

    let preview = upload(&client, tenant, "residents.csv", CSV);
    assert_eq!(preview.stage, PipelineStage::Parsed);
    assert_eq!(preview.headers, vec!["Name", "Address", "Phone", "Email"]);
    assert_eq!(preview.row_count, 3);
    assert!(preview.missing_required.is_empty());
    let mapping = preview.mapping.expect("proposed mapping");

    assert_eq!(map(&client, tenant, preview.id, &mapping), Status::Ok);

    let response = client
        .post(format!("/api/v1/residents/import/{}/run", preview.id))
        .header(tenant_header(tenant))
        .header(ContentType::JSON)
        .body("{}")
        .dispatch();
    assert_eq!(response.status(), Status::Ok);
    let result: DataResponse<ImportResult> = response.into_json().expect("result payload");
    assert_eq!(result.data.succeeded, 1);
    assert_eq!(result.data.ignored, 2);
    assert_eq!(store.residents().len(), 1);
    assert_eq!(store.residents()[0].tenant_id, tenant);

    let response = client
        .get(format!("/api/v1/residents/import/{}/errors.csv", preview.id))
        .header(tenant_header(tenant))
        .dispatch();
    assert_eq!(response.status(), Status::Ok);
    assert_eq!(response.content_type(), Some(ContentType::CSV));
    assert_eq!(
        response.into_string().expect("csv body"),
        "Line,Reason\n3,invalid phone\n4,duplicate email in file\n"
    );

    let response = client
        .get(format!("/api/v1/residents/import/{}", preview.id))
        .header(tenant_header(tenant))
        .dispatch();
    let status: DataResponse<ImportStatus> = response.into_json().expect("status payload");
    assert_eq!(status.data.stage, PipelineStage::Reported);
    assert_eq!(status.data.result.map(|r| r.succeeded), Some(1));
}

#[test]
fn template_download_is_csv() {
    let client = client_with(Arc::new(InMemoryResidentStore::new()), ImportConfig::default());

    let response = client.get("/api/v1/residents/import/template").dispatch();
    assert_eq!(response.status(), Status::Ok);
    assert_eq!(response.content_type(), Some(ContentType::CSV));
    let body = response.into_string().expect("template body");
    assert!(body.starts_with("Name,Address,Complement,ShortCode,Phone,Email\n"));
}

#[test]
fn requests_without_tenant_are_unauthorized() {
    let client = client_with(Arc::new(InMemoryResidentStore::new()), ImportConfig::default());

    let response = client
        .post("/api/v1/residents/import?file_name=residents.csv")
        .body(CSV)
        .dispatch();
    assert_eq!(response.status(), Status::Unauthorized);
    let body: Value = response.into_json().expect("json error body");
    assert_eq!(body["error"], "Unauthorized");

    let response = client
        .get(format!("/api/v1/residents/import/{}", Uuid::new_v4()))
        .header(Header::new(TENANT_HEADER, "not-a-uuid"))
        .dispatch();
    assert_eq!(response.status(), Status::BadRequest);
}

#[test]
fn file_level_errors_map_to_statuses() {
    let config = ImportConfig {
        max_file_bytes: 64,
        ..ImportConfig::default()
    };
    let client = client_with(Arc::new(InMemoryResidentStore::new()), config);
    let tenant = Uuid::new_v4();

    let response = client
        .post("/api/v1/residents/import?file_name=residents.pdf")
        .header(tenant_header(tenant))
        .body("Name,Address\n")
        .dispatch();
    assert_eq!(response.status(), Status::UnsupportedMediaType);
    let body: Value = response.into_json().expect("json error body");
    assert_eq!(body["error"], "UnsupportedFormat");

    let response = client
        .post("/api/v1/residents/import?file_name=residents.csv")
        .header(tenant_header(tenant))
        .body(CSV)
        .dispatch();
    assert_eq!(response.status(), Status::PayloadTooLarge);

    let response = client
        .post("/api/v1/residents/import?file_name=residents.csv")
        .header(tenant_header(tenant))
        .body("Name,Address\n")
        .dispatch();
    assert_eq!(response.status(), Status::BadRequest);
    let body: Value = response.into_json().expect("json error body");
    assert_eq!(body["error"], "NoDataRows");
}

#[test]
fn incomplete_mapping_is_unprocessable_and_run_is_blocked() {
    let store = Arc::new(InMemoryResidentStore::new());
    let client = client_with(store.clone(), ImportConfig::default());
    let tenant = Uuid::new_v4();
    let preview = upload(&client, tenant, "residents.csv", CSV);

    let mut mapping = preview.mapping.expect("proposed mapping");
    mapping.email = None;
    assert_eq!(
        map(&client, tenant, preview.id, &mapping),
        Status::UnprocessableEntity
    );

    let response = client
        .post(format!("/api/v1/residents/import/{}/run", preview.id))
        .header(tenant_header(tenant))
        .header(ContentType::JSON)
        .body("{}")
        .dispatch();
    assert_eq!(response.status(), Status::Conflict);
    assert_eq!(store.calls(), 0);
}

#[test]
fn large_runs_need_explicit_confirmation() {
    let config = ImportConfig {
        confirm_threshold: 2,
        ..ImportConfig::default()
    };
    let store = Arc::new(InMemoryResidentStore::new());
    let client = client_with(store.clone(), config);
    let tenant = Uuid::new_v4();

    let preview = upload(&client, tenant, "residents.csv", CSV);
    assert!(preview.confirmation_required);
    let mapping = preview.mapping.expect("proposed mapping");
    assert_eq!(map(&client, tenant, preview.id, &mapping), Status::Ok);

    let run = |body: &str| {
        client
            .post(format!("/api/v1/residents/import/{}/run", preview.id))
            .header(tenant_header(tenant))
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch()
            .status()
    };

    assert_eq!(run("{}"), Status::Conflict);
    assert_eq!(store.calls(), 0);
    assert_eq!(run(r#"{"confirmLarge":true}"#), Status::Ok);
    assert_eq!(store.residents().len(), 1);
}

#[test]
fn sessions_are_invisible_to_other_tenants() {
    let client = client_with(Arc::new(InMemoryResidentStore::new()), ImportConfig::default());
    let owner = Uuid::new_v4();
    let preview = upload(&client, owner, "residents.csv", CSV);

    let response = client
        .get(format!("/api/v1/residents/import/{}", preview.id))
        .header(tenant_header(Uuid::new_v4()))
        .dispatch();
    assert_eq!(response.status(), Status::NotFound);

    let response = client
        .delete(format!("/api/v1/residents/import/{}", preview.id))
        .header(tenant_header(owner))
        .dispatch();
    assert_eq!(response.status(), Status::Ok);
    let outcome: DataResponse<CancelOutcome> = response.into_json().expect("cancel payload");
    assert_eq!(outcome.data, CancelOutcome::Discarded);

    let response = client
        .get(format!("/api/v1/residents/import/{}", preview.id))
        .header(tenant_header(owner))
        .dispatch();
    assert_eq!(response.status(), Status::NotFound);
}

#[test]
fn malformed_import_ids_are_bad_requests() {
    let client = client_with(Arc::new(InMemoryResidentStore::new()), ImportConfig::default());

    let response = client
        .get("/api/v1/residents/import/not-a-uuid")
        .header(tenant_header(Uuid::new_v4()))
        .dispatch();
    assert_eq!(response.status(), Status::BadRequest);
    let body: Value = response.into_json().expect("json error body");
    assert_eq!(body["error"], "BadRequest");
}
