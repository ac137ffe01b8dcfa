//! Lightweight service health endpoint used for readiness checks and tests.

use crate::import::sessions::ImportSessions;
use crate::models::DataResponse;
use rocket::State;
use rocket::serde::json::Json;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Static status string reporting application readiness.
    pub status: String,
    /// Import sessions currently parked in memory.
    pub import_sessions: usize,
}

#[openapi(tag = "Health")]
#[get("/health")]
pub fn health_check(sessions: &State<ImportSessions>) -> Json<DataResponse<HealthResponse>> {
    Json(DataResponse::new(HealthResponse {
        status: "ok".to_string(),
        import_sessions: sessions.len(),
    }))
}
