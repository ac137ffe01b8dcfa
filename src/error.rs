use crate::import::{ImportError, ReportError};
use rocket::http::Status;
use rocket::response::{self, Responder};
use rocket::{Request, Response};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{RefOr, Response as OpenApiResponse, Responses};
use rocket_okapi::response::OpenApiResponderInner;
use serde::Serialize;
use std::io::Cursor;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    InternalError(String),
    Import(ImportError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl ApiError {
    fn parts(self) -> (Status, &'static str, String) {
        match self {
            ApiError::BadRequest(msg) => {
                log::debug!("bad request: {}", msg);
                (Status::BadRequest, "BadRequest", msg)
            }
            ApiError::InternalError(msg) => {
                log::error!("internal error: {}", msg);
                (Status::InternalServerError, "InternalError", msg)
            }
            ApiError::Import(err) => {
                let (status, kind) = import_status(&err);
                log::debug!("import rejected ({}): {}", kind, err);
                (status, kind, err.to_string())
            }
        }
    }
}

fn import_status(err: &ImportError) -> (Status, &'static str) {
    match err {
        ImportError::UnsupportedFormat { .. } => (Status::UnsupportedMediaType, "UnsupportedFormat"),
        ImportError::TooLarge { .. } => (Status::PayloadTooLarge, "TooLarge"),
        ImportError::EmptyFile => (Status::BadRequest, "EmptyFile"),
        ImportError::NoColumns => (Status::BadRequest, "NoColumns"),
        ImportError::NoDataRows => (Status::BadRequest, "NoDataRows"),
        ImportError::Spreadsheet(_) => (Status::BadRequest, "SpreadsheetError"),
        ImportError::Malformed(_) => (Status::BadRequest, "MalformedFile"),
        ImportError::MappingIncomplete { .. } => (Status::UnprocessableEntity, "MappingIncomplete"),
        ImportError::MappingOutOfRange { .. } => (Status::UnprocessableEntity, "MappingOutOfRange"),
        ImportError::SessionNotFound(_) => (Status::NotFound, "SessionNotFound"),
        ImportError::InvalidStage { .. } => (Status::Conflict, "InvalidStage"),
        ImportError::ConfirmationRequired { .. } => (Status::Conflict, "ConfirmationRequired"),
    }
}

fn json_body(error: &str, message: String) -> String {
    let error_response = ErrorResponse {
        error: error.to_string(),
        message,
    };

    serde_json::to_string(&error_response).unwrap_or_else(|_| {
        r#"{"error":"SerializationError","message":"Failed to serialize error"}"#.to_string()
    })
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let (status, error_type, message) = self.parts();
        let json = json_body(error_type, message);

        Response::build()
            .status(status)
            .header(rocket::http::ContentType::JSON)
            .sized_body(json.len(), Cursor::new(json))
            .ok()
    }
}

impl OpenApiResponderInner for ApiError {
    fn responses(_generator: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        let mut responses = Responses::default();
        for (code, description) in [
            ("400", "Malformed request or unreadable file"),
            ("401", "Missing tenant context"),
            ("404", "Resource or import session not found"),
            ("409", "Import session is in the wrong stage or needs confirmation"),
            ("413", "File exceeds the size limit"),
            ("415", "Unsupported file format"),
            ("422", "Field mapping is incomplete or out of range"),
            ("500", "Report rendering failure"),
        ] {
            responses.responses.insert(
                code.to_string(),
                RefOr::Object(OpenApiResponse {
                    description: description.to_string(),
                    ..Default::default()
                }),
            );
        }
        Ok(responses)
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        ApiError::Import(err)
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        ApiError::InternalError(err.to_string())
    }
}

pub mod catchers {
    //! JSON bodies for failures raised before a handler runs (guards, limits).

    use super::json_body;
    use crate::tenant::TenantError;
    use rocket::Request;
    use rocket::http::Status;
    use rocket::response::content::RawJson;

    #[catch(default)]
    pub fn default_catcher(status: Status, request: &Request<'_>) -> RawJson<String> {
        let message = match request.local_cache(|| None::<String>) {
            Some(message) => message.clone(),
            None => status.reason_lossy().to_string(),
        };
        RawJson(json_body(error_name(status), message))
    }

    /// Record why a guard failed so the catcher can report it.
    pub fn remember_tenant_error(request: &Request<'_>, err: &TenantError) {
        request.local_cache(|| Some(err.to_string()));
    }

    fn error_name(status: Status) -> &'static str {
        match status.code {
            400 => "BadRequest",
            401 => "Unauthorized",
            404 => "NotFound",
            409 => "Conflict",
            413 => "TooLarge",
            415 => "UnsupportedFormat",
            422 => "UnprocessableEntity",
            code if code >= 500 => "InternalError",
            _ => "Error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::mapping::ImportField;
    use crate::import::pipeline::PipelineStage;

    #[test]
    fn import_errors_map_to_http_statuses() {
        let cases = [
            (
                ImportError::UnsupportedFormat {
                    extension: "pdf".into(),
                    accepted: "csv".into(),
                },
                Status::UnsupportedMediaType,
            ),
            (ImportError::TooLarge { limit: 1 }, Status::PayloadTooLarge),
            (ImportError::NoDataRows, Status::BadRequest),
            (
                ImportError::MappingIncomplete {
                    missing: vec![ImportField::Email],
                },
                Status::UnprocessableEntity,
            ),
            (ImportError::SessionNotFound(uuid::Uuid::nil()), Status::NotFound),
            (
                ImportError::InvalidStage {
                    expected: PipelineStage::Mapped,
                    actual: PipelineStage::Parsed,
                },
                Status::Conflict,
            ),
            (
                ImportError::ConfirmationRequired {
                    rows: 600,
                    threshold: 500,
                },
                Status::Conflict,
            ),
        ];

        for (err, expected) in cases {
            let (status, _, _) = ApiError::from(err).parts();
            assert_eq!(status, expected);
        }
    }

    #[test]
    fn report_failures_are_internal_errors() {
        let err = ReportError::Io(std::io::Error::other("disk gone"));
        let (status, kind, message) = ApiError::from(err).parts();
        assert_eq!(status, Status::InternalServerError);
        assert_eq!(kind, "InternalError");
        assert_eq!(message, "io error: disk gone");
    }
}
