use sqlx::types::Json;
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::{CategoryCount, Exercise, SkillLevel};
use crate::validation::Page;

const EXERCISE_COLUMNS: &str = "id, trainer_id, name, category, description, muscle_groups, \
     equipment, difficulty, instructions, video_url, is_public, usage_count";

#[derive(Debug, Clone)]
pub struct ExerciseInput {
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub muscle_groups: Vec<String>,
    pub equipment: Vec<String>,
    pub difficulty: Option<SkillLevel>,
    pub instructions: Option<String>,
    pub video_url: Option<String>,
    pub is_public: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ExerciseUpdate {
    pub name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub muscle_groups: Option<Vec<String>>,
    pub equipment: Option<Vec<String>>,
    pub difficulty: Option<SkillLevel>,
    pub instructions: Option<String>,
    pub video_url: Option<String>,
    pub is_public: Option<bool>,
}

/// Library entries visible to a trainer: public ones plus their own.
#[instrument(skip(pool))]
pub async fn list_exercises(
    pool: &Pool<Sqlite>,
    trainer_id: i64,
    category: Option<&str>,
    search: Option<&str>,
    page: Page,
) -> Result<(Vec<Exercise>, i64), AppError> {
    info!("Listing exercises");
    let pattern = search.map(|s| format!("%{}%", s.trim()));

    let predicate = "(is_public = 1 OR trainer_id = ?)
           AND (? IS NULL OR category = ?)
           AND (? IS NULL OR name LIKE ?)";

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM exercise_library WHERE {}",
        predicate
    ))
    .bind(trainer_id)
    .bind(category)
    .bind(category)
    .bind(&pattern)
    .bind(&pattern)
    .fetch_one(pool)
    .await?;

    let exercises = sqlx::query_as::<_, Exercise>(&format!(
        "SELECT {} FROM exercise_library WHERE {} ORDER BY name LIMIT ? OFFSET ?",
        EXERCISE_COLUMNS, predicate
    ))
    .bind(trainer_id)
    .bind(category)
    .bind(category)
    .bind(&pattern)
    .bind(&pattern)
    .bind(page.page_size)
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok((exercises, total))
}

#[instrument(skip(pool))]
pub async fn get_exercise(pool: &Pool<Sqlite>, id: i64) -> Result<Exercise, AppError> {
    sqlx::query_as::<_, Exercise>(&format!(
        "SELECT {} FROM exercise_library WHERE id = ?",
        EXERCISE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Exercise {} not found", id)))
}

#[instrument(skip(pool, input), fields(name = %input.name))]
pub async fn create_exercise(
    pool: &Pool<Sqlite>,
    trainer_id: i64,
    input: &ExerciseInput,
) -> Result<Exercise, AppError> {
    info!("Creating exercise");
    let id = sqlx::query(
        "INSERT INTO exercise_library
         (trainer_id, name, category, description, muscle_groups, equipment, difficulty,
          instructions, video_url, is_public)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(trainer_id)
    .bind(&input.name)
    .bind(&input.category)
    .bind(&input.description)
    .bind(Json(&input.muscle_groups))
    .bind(Json(&input.equipment))
    .bind(input.difficulty)
    .bind(&input.instructions)
    .bind(&input.video_url)
    .bind(input.is_public)
    .execute(pool)
    .await?
    .last_insert_rowid();

    get_exercise(pool, id).await
}

/// Trainers may only edit entries they authored.
#[instrument(skip(pool, update))]
pub async fn update_exercise(
    pool: &Pool<Sqlite>,
    trainer_id: i64,
    id: i64,
    update: &ExerciseUpdate,
) -> Result<Exercise, AppError> {
    info!("Updating exercise");
    let res = sqlx::query(
        "UPDATE exercise_library
         SET name = COALESCE(?, name),
             category = COALESCE(?, category),
             description = COALESCE(?, description),
             muscle_groups = COALESCE(?, muscle_groups),
             equipment = COALESCE(?, equipment),
             difficulty = COALESCE(?, difficulty),
             instructions = COALESCE(?, instructions),
             video_url = COALESCE(?, video_url),
             is_public = COALESCE(?, is_public),
             updated_at = CURRENT_TIMESTAMP
         WHERE id = ? AND trainer_id = ?",
    )
    .bind(&update.name)
    .bind(&update.category)
    .bind(&update.description)
    .bind(update.muscle_groups.as_ref().map(Json))
    .bind(update.equipment.as_ref().map(Json))
    .bind(update.difficulty)
    .bind(&update.instructions)
    .bind(&update.video_url)
    .bind(update.is_public)
    .bind(id)
    .bind(trainer_id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Exercise {} not found", id)));
    }

    get_exercise(pool, id).await
}

#[instrument(skip(pool))]
pub async fn delete_exercise(pool: &Pool<Sqlite>, trainer_id: i64, id: i64) -> Result<(), AppError> {
    info!("Deleting exercise");
    let res = sqlx::query("DELETE FROM exercise_library WHERE id = ? AND trainer_id = ?")
        .bind(id)
        .bind(trainer_id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Exercise {} not found", id)));
    }

    Ok(())
}

#[instrument(skip(pool))]
pub async fn exercise_categories(pool: &Pool<Sqlite>) -> Result<Vec<CategoryCount>, AppError> {
    let categories = sqlx::query_as::<_, CategoryCount>(
        "SELECT category, COUNT(*) AS count FROM exercise_library
         WHERE is_public = 1 GROUP BY category ORDER BY category",
    )
    .fetch_all(pool)
    .await?;

    Ok(categories)
}

pub async fn bump_exercise_usage(
    conn: &mut SqliteConnection,
    exercise_id: i64,
) -> Result<(), AppError> {
    sqlx::query("UPDATE exercise_library SET usage_count = usage_count + 1 WHERE id = ?")
        .bind(exercise_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}
