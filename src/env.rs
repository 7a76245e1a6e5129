use std::path::Path;

use tracing::{info, warn};

use crate::error::AppError;
use crate::stats::{DEFAULT_WINDOW_DAYS, MAX_WINDOW_DAYS};

pub const MIN_BCRYPT_COST: u32 = 10;
const DEFAULT_BCRYPT_COST: u32 = 12;
const DEFAULT_SESSION_TTL_HOURS: i64 = 24;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_CORS_ORIGINS: [&str; 1] = ["http://localhost:5173"];
const DEFAULT_CORS_METHODS: [&str; 6] = ["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"];
const DEFAULT_CORS_HEADERS: [&str; 4] = ["Origin", "Content-Type", "Accept", "Authorization"];
const DEFAULT_CORS_MAX_AGE_SECS: u64 = 12 * 60 * 60;

pub fn load_environment() -> Result<(), Box<dyn std::error::Error>> {
    let is_production =
        dotenvy::var("ROCKET_PROFILE").unwrap_or("development".to_string()) == "production";

    let env_files = if is_production {
        vec!["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        vec!["config/common.env", "config/dev.env", ".secrets.env"]
    };

    for env_file in env_files {
        load_env_file(env_file)?;
    }

    Ok(())
}

fn load_env_file(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !Path::new(path).exists() {
        warn!("Warning: Environment file {} not found, skipping", path);
        return Ok(());
    }

    dotenvy::from_filename_override(path)?;
    info!("Loaded environment from: {}", path);
    Ok(())
}

/// Runtime settings, read once at startup and handed to Rocket as managed state.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub session_ttl_hours: i64,
    pub bcrypt_cost: u32,
    pub default_upcoming_days: i64,
    pub deployment_environment: String,
    pub otlp_endpoint: Option<String>,
    pub honeycomb_api_key: Option<String>,
    pub cors: CorsConfig,
}

/// Cross-origin policy for the browser client. Credentials are always allowed,
/// so a permitted origin is echoed back rather than answered with `*`.
#[derive(Debug, Clone, PartialEq)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    /// Accept every origin. Meant for local development.
    pub allow_any_origin: bool,
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: to_strings(&DEFAULT_CORS_ORIGINS),
            allowed_methods: to_strings(&DEFAULT_CORS_METHODS),
            allowed_headers: to_strings(&DEFAULT_CORS_HEADERS),
            allow_any_origin: false,
            max_age_secs: DEFAULT_CORS_MAX_AGE_SECS,
        }
    }
}

impl CorsConfig {
    pub fn allows(&self, origin: &str) -> bool {
        self.allow_any_origin
            || self
                .allowed_origins
                .iter()
                .any(|allowed| allowed == "*" || allowed.eq_ignore_ascii_case(origin))
    }

    fn from_env(defaults: CorsConfig) -> Result<Self, AppError> {
        Ok(Self {
            allowed_origins: parse_list("CORS_ALLOWED_ORIGINS", defaults.allowed_origins),
            allowed_methods: parse_list("CORS_ALLOWED_METHODS", defaults.allowed_methods),
            allowed_headers: parse_list("CORS_ALLOWED_HEADERS", defaults.allowed_headers),
            allow_any_origin: parse_var("CORS_ALLOW_ANY_ORIGIN", defaults.allow_any_origin)?,
            max_age_secs: parse_var("CORS_MAX_AGE_SECS", defaults.max_age_secs)?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
            default_upcoming_days: DEFAULT_WINDOW_DAYS,
            deployment_environment: "develop".to_string(),
            otlp_endpoint: None,
            honeycomb_api_key: None,
            cors: CorsConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Config::default();

        let database_url = dotenvy::var("DATABASE_URL")
            .map_err(|_| AppError::Validation("DATABASE_URL must be set".to_string()))?;

        let bcrypt_cost = parse_var("BCRYPT_COST", defaults.bcrypt_cost)?;
        if bcrypt_cost < MIN_BCRYPT_COST {
            return Err(AppError::Validation(format!(
                "BCRYPT_COST must be at least {}, got {}",
                MIN_BCRYPT_COST, bcrypt_cost
            )));
        }

        let session_ttl_hours = parse_var("SESSION_TTL_HOURS", defaults.session_ttl_hours)?;
        if session_ttl_hours <= 0 {
            return Err(AppError::Validation(
                "SESSION_TTL_HOURS must be positive".to_string(),
            ));
        }

        let default_upcoming_days =
            parse_var("DEFAULT_UPCOMING_DAYS", defaults.default_upcoming_days)?;
        if !(1..=MAX_WINDOW_DAYS).contains(&default_upcoming_days) {
            return Err(AppError::Validation(format!(
                "DEFAULT_UPCOMING_DAYS must be between 1 and {}",
                MAX_WINDOW_DAYS
            )));
        }

        Ok(Self {
            database_url,
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS", defaults.max_connections)?,
            session_ttl_hours,
            bcrypt_cost,
            default_upcoming_days,
            deployment_environment: dotenvy::var("DEPLOYMENT_ENVIRONMENT")
                .unwrap_or(defaults.deployment_environment),
            otlp_endpoint: dotenvy::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
            honeycomb_api_key: dotenvy::var("HONEYCOMB_API_KEY").ok(),
            cors: CorsConfig::from_env(defaults.cors)?,
        })
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match dotenvy::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Validation(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(default),
    }
}

/// Comma-separated list; blank entries are dropped.
fn parse_list(key: &str, default: Vec<String>) -> Vec<String> {
    match dotenvy::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
        Err(_) => default,
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}
