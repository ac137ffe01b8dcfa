//! Resident import endpoints.
//!
//! The import is a multi-request session: upload the file, confirm the
//! column mapping, run it, then fetch the report. Every endpoint is scoped
//! to the tenant in the `X-Tenant-Id` header.

use crate::error::ApiError;
use crate::import::config::ImportConfig;
use crate::import::error::ImportError;
use crate::import::ingest::RawFile;
use crate::import::mapping::FieldMapping;
use crate::import::pipeline::{ImportRun, ProcessOptions};
use crate::import::report::ImportResult;
use crate::import::sessions::{CancelOutcome, ImportSessions, ImportStatus};
use crate::import::template::{TEMPLATE_FILE_NAME, template_csv};
use crate::models::DataResponse;
use crate::residents::SharedResidentStore;
use crate::tenant::TenantContext;
use rocket::data::{ByteUnit, Data};
use rocket::http::{ContentType, Header, Status};
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use rocket::{Request, Response, State};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::Map;
use rocket_okapi::okapi::openapi3::{MediaType, RefOr, Response as OpenApiResponse, Responses};
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use rocket_okapi::response::OpenApiResponderInner;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use uuid::Uuid;

/// Body of the run request.
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    /// Required when the file has more rows than the confirmation threshold.
    #[serde(default)]
    pub confirm_large: bool,
}

/// CSV attachment download.
#[derive(Debug)]
pub struct CsvDownload {
    pub file_name: String,
    pub body: String,
}

impl<'r> Responder<'r, 'static> for CsvDownload {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        Response::build()
            .status(Status::Ok)
            .header(ContentType::CSV)
            .header(Header::new(
                "Content-Disposition",
                format!("attachment; filename=\"{}\"", self.file_name),
            ))
            .sized_body(self.body.len(), Cursor::new(self.body))
            .ok()
    }
}

impl OpenApiResponderInner for CsvDownload {
    fn responses(_generator: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        let mut content = Map::new();
        content.insert("text/csv".to_owned(), MediaType::default());

        let mut responses = Responses::default();
        responses.responses.insert(
            "200".to_owned(),
            RefOr::Object(OpenApiResponse {
                description: "CSV attachment".to_owned(),
                content,
                ..Default::default()
            }),
        );
        Ok(responses)
    }
}

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("invalid import id '{raw}'")))
}

/// Download the CSV template with the expected headers and example rows.
#[openapi(tag = "Resident Import")]
#[get("/residents/import/template")]
pub fn download_template() -> Result<CsvDownload, ApiError> {
    Ok(CsvDownload {
        file_name: TEMPLATE_FILE_NAME.to_string(),
        body: template_csv()?,
    })
}

/// Upload a resident file as the raw request body.
///
/// Parses the file and opens an import session with a proposed column
/// mapping. Nothing is written yet.
#[openapi(tag = "Resident Import")]
#[post("/residents/import?<file_name>", data = "<data>")]
pub async fn upload_import(
    tenant: TenantContext,
    file_name: String,
    data: Data<'_>,
    config: &State<ImportConfig>,
    sessions: &State<ImportSessions>,
) -> Result<Json<DataResponse<ImportStatus>>, ApiError> {
    // One byte over the ceiling so an oversize body is detected, not truncated.
    let limit = ByteUnit::from(config.max_file_bytes.saturating_add(1));
    let body = data
        .open(limit)
        .into_bytes()
        .await
        .map_err(|err| ApiError::BadRequest(format!("failed to read upload: {err}")))?;

    if !body.is_complete() {
        return Err(ImportError::TooLarge {
            limit: config.max_file_bytes,
        }
        .into());
    }

    let run = ImportRun::new(tenant.tenant_id, RawFile::new(file_name, body.into_inner()))
        .parse(config)?;

    Ok(Json(DataResponse::new(sessions.insert_parsed(run))))
}

/// Current stage, preview and (once reported) result of an import session.
#[openapi(tag = "Resident Import")]
#[get("/residents/import/<id>")]
pub fn get_import(
    tenant: TenantContext,
    id: String,
    sessions: &State<ImportSessions>,
) -> Result<Json<DataResponse<ImportStatus>>, ApiError> {
    let status = sessions.status(tenant.tenant_id, parse_id(&id)?)?;
    Ok(Json(DataResponse::new(status)))
}

/// Confirm or replace the field-to-column mapping.
#[openapi(tag = "Resident Import")]
#[put("/residents/import/<id>/mapping", data = "<mapping>")]
pub fn update_mapping(
    tenant: TenantContext,
    id: String,
    mapping: Json<FieldMapping>,
    sessions: &State<ImportSessions>,
) -> Result<Json<DataResponse<ImportStatus>>, ApiError> {
    let status = sessions.confirm_mapping(tenant.tenant_id, parse_id(&id)?, mapping.into_inner())?;
    Ok(Json(DataResponse::new(status)))
}

/// Validate and persist every row of a mapped import.
///
/// Row failures are reported in the result, not as an error response.
#[openapi(tag = "Resident Import")]
#[post("/residents/import/<id>/run", data = "<request>")]
pub async fn run_import(
    tenant: TenantContext,
    id: String,
    request: Json<RunRequest>,
    config: &State<ImportConfig>,
    sessions: &State<ImportSessions>,
    store: &State<SharedResidentStore>,
) -> Result<Json<DataResponse<ImportResult>>, ApiError> {
    let id = parse_id(&id)?;
    let (run, cancel) = sessions.begin_processing(tenant.tenant_id, id, request.confirm_large)?;

    let options = ProcessOptions::from_config(config).with_cancel(cancel);
    let reported = run.execute(store.inner().as_ref(), &options).await;
    let result = reported.result().clone();
    sessions.finish(reported);

    Ok(Json(DataResponse::new(result)))
}

/// Download the `Line,Reason` error report of a finished import.
#[openapi(tag = "Resident Import")]
#[get("/residents/import/<id>/errors.csv")]
pub fn download_error_report(
    tenant: TenantContext,
    id: String,
    sessions: &State<ImportSessions>,
) -> Result<CsvDownload, ApiError> {
    let id = parse_id(&id)?;
    let result = sessions.result(tenant.tenant_id, id)?;

    Ok(CsvDownload {
        file_name: format!("import-{id}-errors.csv"),
        body: result.error_report_csv()?,
    })
}

/// Cancel a running import after its current batch, or discard an idle session.
#[openapi(tag = "Resident Import")]
#[delete("/residents/import/<id>")]
pub fn cancel_import(
    tenant: TenantContext,
    id: String,
    sessions: &State<ImportSessions>,
) -> Result<Json<DataResponse<CancelOutcome>>, ApiError> {
    let outcome = sessions.cancel(tenant.tenant_id, parse_id(&id)?)?;
    Ok(Json(DataResponse::new(outcome)))
}
