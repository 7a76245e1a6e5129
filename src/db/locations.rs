use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::Location;

#[instrument(skip(pool))]
pub async fn list_locations(pool: &Pool<Sqlite>) -> Result<Vec<Location>, AppError> {
    info!("Listing locations");
    let locations = sqlx::query_as::<_, Location>(
        "SELECT id, name, address, floor, building, map_url, is_active
         FROM locations WHERE is_active = 1 ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    Ok(locations)
}

#[instrument(skip(pool))]
pub async fn get_location(pool: &Pool<Sqlite>, id: i64) -> Result<Location, AppError> {
    sqlx::query_as::<_, Location>(
        "SELECT id, name, address, floor, building, map_url, is_active FROM locations WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Location {} not found", id)))
}

#[instrument(skip(pool))]
pub async fn create_location(
    pool: &Pool<Sqlite>,
    name: &str,
    address: Option<&str>,
    floor: Option<&str>,
    building: Option<&str>,
) -> Result<i64, AppError> {
    info!("Creating location");
    let res = sqlx::query("INSERT INTO locations (name, address, floor, building) VALUES (?, ?, ?, ?)")
        .bind(name)
        .bind(address)
        .bind(floor)
        .bind(building)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}
