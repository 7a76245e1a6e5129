use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::TrainerProfile;
use crate::validation::Page;

const TRAINER_SELECT: &str = "SELECT t.id, t.user_id, u.name, u.email, u.profile_image, t.bio,
            t.specialization, t.certifications, t.experience_years, t.rating,
            t.total_ratings, t.total_clients, t.availability
     FROM trainers t
     JOIN users u ON u.id = t.user_id";

/// Public trainer directory, active accounts only.
#[instrument(skip(pool))]
pub async fn list_trainers(
    pool: &Pool<Sqlite>,
    search: Option<&str>,
    page: Page,
) -> Result<(Vec<TrainerProfile>, i64), AppError> {
    info!("Listing trainers");
    let pattern = search.map(|s| format!("%{}%", s.trim()));

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM trainers t JOIN users u ON u.id = t.user_id
         WHERE u.is_active = 1 AND (? IS NULL OR u.name LIKE ?)",
    )
    .bind(&pattern)
    .bind(&pattern)
    .fetch_one(pool)
    .await?;

    let trainers = sqlx::query_as::<_, TrainerProfile>(&format!(
        "{} WHERE u.is_active = 1 AND (? IS NULL OR u.name LIKE ?)
         ORDER BY t.rating DESC, u.name LIMIT ? OFFSET ?",
        TRAINER_SELECT
    ))
    .bind(&pattern)
    .bind(&pattern)
    .bind(page.page_size)
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok((trainers, total))
}

#[instrument(skip(pool))]
pub async fn get_trainer(pool: &Pool<Sqlite>, trainer_id: i64) -> Result<TrainerProfile, AppError> {
    info!("Fetching trainer");
    sqlx::query_as::<_, TrainerProfile>(&format!(
        "{} WHERE t.id = ? AND u.is_active = 1",
        TRAINER_SELECT
    ))
    .bind(trainer_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Trainer {} not found", trainer_id)))
}
