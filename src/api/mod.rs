pub mod admin;
pub mod auth;
pub mod common;
pub mod shared;
pub mod trainee;
pub mod trainer;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use rocket::serde::json::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::AppError;
use crate::validation::ApiResponse;

/// Wall clock for request handling, in UTC. Session dates and start times are
/// stored without a zone and compared against this, so "today" for streaks,
/// calendars and the past-booking check is the UTC day.
pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Parses an optional `YYYY-MM-DD` query value.
pub fn parse_date(field: &str, value: Option<&str>) -> Result<Option<NaiveDate>, AppError> {
    value
        .map(|raw| {
            NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
                AppError::Validation(format!("{} must be a date in YYYY-MM-DD format", field))
            })
        })
        .transpose()
}

/// Parses an optional snake_case enum filter, e.g. `status=no_show`.
pub fn parse_filter<T: DeserializeOwned>(
    field: &str,
    value: Option<&str>,
) -> Result<Option<T>, AppError> {
    value
        .map(|raw| {
            serde_json::from_value(serde_json::Value::String(raw.trim().to_string()))
                .map_err(|_| AppError::Validation(format!("Unknown {} value: {}", field, raw)))
        })
        .transpose()
}

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
}

#[get("/health")]
pub fn health() -> Json<ApiResponse<HealthStatus>> {
    ApiResponse::ok(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
