//! Tenant context request guard.
//!
//! The tenant is injected by the caller in the `X-Tenant-Id` header and is
//! the only tenant a request can read or write.

use crate::error::catchers::remember_tenant_error;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use rocket_okapi::request::OpenApiFromRequest;
use thiserror::Error;
use uuid::Uuid;

pub const TENANT_HEADER: &str = "X-Tenant-Id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, OpenApiFromRequest)]
pub struct TenantContext {
    pub tenant_id: Uuid,
}

#[derive(Debug, Error)]
pub enum TenantError {
    #[error("missing X-Tenant-Id header")]
    Missing,
    #[error("X-Tenant-Id is not a valid UUID: {0}")]
    Invalid(String),
}

impl TenantContext {
    pub fn parse(raw: &str) -> Result<Self, TenantError> {
        Uuid::parse_str(raw.trim())
            .map(|tenant_id| Self { tenant_id })
            .map_err(|_| TenantError::Invalid(raw.to_string()))
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for TenantContext {
    type Error = TenantError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let parsed = match request.headers().get_one(TENANT_HEADER) {
            Some(raw) => TenantContext::parse(raw).map_err(|err| (Status::BadRequest, err)),
            None => Err((Status::Unauthorized, TenantError::Missing)),
        };

        match parsed {
            Ok(context) => {
                request.local_cache(|| Some(context.tenant_id));
                Outcome::Success(context)
            }
            Err((status, err)) => {
                remember_tenant_error(request, &err);
                Outcome::Error((status, err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_uuid_headers() {
        let id = Uuid::new_v4();
        assert_eq!(
            TenantContext::parse(&format!(" {id} ")).expect("valid").tenant_id,
            id
        );
        assert!(matches!(
            TenantContext::parse("condo-42"),
            Err(TenantError::Invalid(_))
        ));
    }
}
