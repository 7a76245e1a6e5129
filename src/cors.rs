use rocket::{
    fairing::{Fairing, Info, Kind},
    http::{Header, Method, Status},
    Request, Response,
};

use crate::env::CorsConfig;
use crate::telemetry::REQUEST_ID_HEADER;

/// Adds CORS headers for permitted origins. Preflight requests are answered
/// by [`preflight`]; the fairing only decorates responses.
pub struct CorsFairing {
    config: CorsConfig,
}

impl CorsFairing {
    pub fn new(config: CorsConfig) -> Self {
        Self { config }
    }
}

#[rocket::async_trait]
impl Fairing for CorsFairing {
    fn info(&self) -> Info {
        Info {
            name: "CORS",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let Some(origin) = request.headers().get_one("Origin") else {
            return;
        };

        if !self.config.allows(origin) {
            tracing::debug!(origin, "Cross-origin request from unlisted origin");
            return;
        }

        response.set_header(Header::new("Access-Control-Allow-Origin", origin.to_string()));
        response.set_header(Header::new("Access-Control-Allow-Credentials", "true"));
        response.set_header(Header::new(
            "Access-Control-Expose-Headers",
            format!("Content-Length, {}", REQUEST_ID_HEADER),
        ));
        response.set_header(Header::new("Vary", "Origin"));

        if request.method() == Method::Options {
            response.set_header(Header::new(
                "Access-Control-Allow-Methods",
                self.config.allowed_methods.join(", "),
            ));
            response.set_header(Header::new(
                "Access-Control-Allow-Headers",
                self.config.allowed_headers.join(", "),
            ));
            response.set_header(Header::new(
                "Access-Control-Max-Age",
                self.config.max_age_secs.to_string(),
            ));
        }
    }
}

#[options("/<_..>")]
pub fn preflight() -> Status {
    Status::NoContent
}
