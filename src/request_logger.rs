use rocket::fairing::{Fairing, Info, Kind};
use rocket::{Data, Request, Response};
use std::time::Instant;
use uuid::Uuid;

/// Fairing to log one line per HTTP request with timing and tenant
pub struct RequestLogger;

#[rocket::async_trait]
impl Fairing for RequestLogger {
    fn info(&self) -> Info {
        Info {
            name: "Request Logger",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        request.local_cache(Instant::now);
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let duration = request.local_cache(Instant::now).elapsed();
        // Set by the tenant guard when the route asked for one.
        let tenant = match request.local_cache(|| None::<Uuid>) {
            Some(tenant_id) => tenant_id.to_string(),
            None => "-".to_string(),
        };

        log::info!(
            "{} {} -> {} tenant={} ({:.2}ms)",
            request.method(),
            request.uri(),
            response.status().code,
            tenant,
            duration.as_secs_f64() * 1000.0
        );
    }
}
