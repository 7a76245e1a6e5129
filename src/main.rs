#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod cors;
mod db;
mod env;
mod error;
mod models;
mod stats;
mod telemetry;
#[cfg(test)]
mod test;
mod validation;

use std::sync::Mutex;

use cors::CorsFairing;
use db::clean_expired_sessions;
use env::{load_environment, Config};
use once_cell::sync::Lazy;
use rocket::fairing::AdHoc;
use rocket::{tokio, Build, Rocket};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use telemetry::{init_tracing, shutdown_telemetry, OtelGuard, TelemetryFairing};

pub static TELEMETRY_GUARD: Lazy<Mutex<Option<OtelGuard>>> = Lazy::new(|| Mutex::new(None));

const SESSION_SWEEP_SECS: u64 = 3600;

#[launch]
async fn rocket() -> _ {
    if let Err(e) = load_environment() {
        eprintln!("Failed to load environment files: {}", e);
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => panic!("Invalid configuration: {}", e),
    };

    let guard = init_tracing(&config);
    if let Ok(mut slot) = TELEMETRY_GUARD.lock() {
        *slot = guard;
    }

    let options = match SqliteConnectOptions::from_str(&config.database_url) {
        Ok(options) => options.create_if_missing(true).foreign_keys(true),
        Err(e) => panic!("Invalid DATABASE_URL: {}", e),
    };

    let pool = match SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await
    {
        Ok(pool) => pool,
        Err(e) => panic!("Failed to connect to SQLite database: {}", e),
    };

    let pool_clone = pool.clone();

    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

        loop {
            match clean_expired_sessions(&pool_clone).await {
                Ok(count) => {
                    if count > 0 {
                        tracing::info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to clean expired sessions: {}", e);
                }
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(SESSION_SWEEP_SECS)).await;
        }
    });

    tracing::info!("Running database migrations...");
    match sqlx::migrate!("./migrations").run(&pool).await {
        Ok(_) => tracing::info!("Migrations completed successfully"),
        Err(e) => {
            tracing::error!("Failed to run migrations: {}", e);
            panic!("Database migration failed: {}", e);
        }
    }

    init_rocket(pool, config).await
}

pub async fn init_rocket(pool: SqlitePool, config: Config) -> Rocket<Build> {
    tracing::info!(
        environment = %config.deployment_environment,
        "Starting trainer hub"
    );

    let cors = CorsFairing::new(config.cors.clone());

    rocket::build()
        .manage(pool)
        .manage(config)
        .mount("/", routes![cors::preflight])
        .mount("/api/v1", routes![api::health])
        .mount("/api/v1/auth", api::auth::routes())
        .mount("/api/v1/common", api::common::routes())
        .mount("/api/v1", api::shared::routes())
        .mount("/api/v1/trainee", api::trainee::routes())
        .mount("/api/v1/trainer", api::trainer::routes())
        .mount("/api/v1/admin", api::admin::routes())
        .register(
            "/",
            catchers![
                auth::bad_request,
                auth::unauthorized,
                auth::forbidden,
                auth::not_found,
                auth::conflict,
                auth::unprocessable,
                auth::internal_error,
                auth::default_catcher
            ],
        )
        .attach(TelemetryFairing)
        .attach(cors)
        .attach(AdHoc::on_shutdown("Telemetry shutdown", |_| {
            Box::pin(async move {
                shutdown_telemetry();
            })
        }))
}
