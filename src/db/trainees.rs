use chrono::NaiveDateTime;
use sqlx::types::Json;
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::{SkillLevel, TraineeProfile, TraineeStatus};
use crate::stats::{compute_trainee_stats, ScheduleFact, TraineeStats};
use crate::validation::Page;

const TRAINEE_SELECT: &str = "SELECT te.id, te.user_id, te.trainer_id, u.name, u.email, u.phone_number,
            u.profile_image, te.height, te.weight, te.goals, te.fitness_level,
            te.medical_notes, te.status, te.join_date, te.total_sessions,
            te.completed_sessions, te.cancelled_sessions, te.current_streak,
            te.longest_streak, te.total_workout_hours, te.last_session_date
     FROM trainees te
     JOIN users u ON u.id = te.user_id";

#[derive(Debug, Clone, Default)]
pub struct TraineeUpdate {
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub goals: Option<Vec<String>>,
    pub fitness_level: Option<SkillLevel>,
    pub medical_notes: Option<String>,
    pub status: Option<TraineeStatus>,
}

#[instrument(skip(pool))]
pub async fn get_trainee(pool: &Pool<Sqlite>, trainee_id: i64) -> Result<TraineeProfile, AppError> {
    info!("Fetching trainee");
    sqlx::query_as::<_, TraineeProfile>(&format!("{} WHERE te.id = ?", TRAINEE_SELECT))
        .bind(trainee_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Trainee {} not found", trainee_id)))
}

/// Same as `get_trainee`, but a trainee assigned to someone else is reported as absent.
#[instrument(skip(pool))]
pub async fn get_trainee_for_trainer(
    pool: &Pool<Sqlite>,
    trainer_id: i64,
    trainee_id: i64,
) -> Result<TraineeProfile, AppError> {
    sqlx::query_as::<_, TraineeProfile>(&format!(
        "{} WHERE te.id = ? AND te.trainer_id = ?",
        TRAINEE_SELECT
    ))
    .bind(trainee_id)
    .bind(trainer_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Client {} not found", trainee_id)))
}

#[instrument(skip(pool))]
pub async fn list_trainees_for_trainer(
    pool: &Pool<Sqlite>,
    trainer_id: i64,
    search: Option<&str>,
    status: Option<TraineeStatus>,
    page: Page,
) -> Result<(Vec<TraineeProfile>, i64), AppError> {
    info!("Listing clients");
    let pattern = search.map(|s| format!("%{}%", s.trim()));

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM trainees te JOIN users u ON u.id = te.user_id
         WHERE te.trainer_id = ?
           AND (? IS NULL OR u.name LIKE ? OR u.email LIKE ?)
           AND (? IS NULL OR te.status = ?)",
    )
    .bind(trainer_id)
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .bind(status)
    .bind(status)
    .fetch_one(pool)
    .await?;

    let trainees = sqlx::query_as::<_, TraineeProfile>(&format!(
        "{} WHERE te.trainer_id = ?
           AND (? IS NULL OR u.name LIKE ? OR u.email LIKE ?)
           AND (? IS NULL OR te.status = ?)
         ORDER BY u.name LIMIT ? OFFSET ?",
        TRAINEE_SELECT
    ))
    .bind(trainer_id)
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .bind(status)
    .bind(status)
    .bind(page.page_size)
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok((trainees, total))
}

/// Total and active client counts for a trainer.
#[instrument(skip(pool))]
pub async fn count_clients(pool: &Pool<Sqlite>, trainer_id: i64) -> Result<(i64, i64), AppError> {
    let counts: (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COALESCE(SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END), 0)
         FROM trainees WHERE trainer_id = ?",
    )
    .bind(trainer_id)
    .fetch_one(pool)
    .await?;

    Ok(counts)
}

#[instrument(skip(pool, update))]
pub async fn update_trainee(
    pool: &Pool<Sqlite>,
    trainee_id: i64,
    update: &TraineeUpdate,
) -> Result<TraineeProfile, AppError> {
    info!("Updating trainee");
    sqlx::query(
        "UPDATE trainees
         SET height = COALESCE(?, height),
             weight = COALESCE(?, weight),
             goals = COALESCE(?, goals),
             fitness_level = COALESCE(?, fitness_level),
             medical_notes = COALESCE(?, medical_notes),
             status = COALESCE(?, status),
             updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(update.height)
    .bind(update.weight)
    .bind(update.goals.as_ref().map(Json))
    .bind(update.fitness_level)
    .bind(&update.medical_notes)
    .bind(update.status)
    .bind(trainee_id)
    .execute(pool)
    .await?;

    get_trainee(pool, trainee_id).await
}

/// Detaches a client from their trainer. Schedules and history stay in place.
#[instrument(skip(pool))]
pub async fn unassign_trainee(
    pool: &Pool<Sqlite>,
    trainer_id: i64,
    trainee_id: i64,
) -> Result<(), AppError> {
    info!("Removing client from trainer");
    let mut tx = pool.begin().await?;

    let res = sqlx::query(
        "UPDATE trainees SET trainer_id = NULL, updated_at = CURRENT_TIMESTAMP
         WHERE id = ? AND trainer_id = ?",
    )
    .bind(trainee_id)
    .bind(trainer_id)
    .execute(&mut *tx)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Client {} not found", trainee_id)));
    }

    sqlx::query(
        "UPDATE trainers SET total_clients = MAX(total_clients - 1, 0) WHERE id = ?",
    )
    .bind(trainer_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

pub async fn trainee_schedule_facts(
    conn: &mut SqliteConnection,
    trainee_id: i64,
) -> Result<Vec<ScheduleFact>, AppError> {
    let facts = sqlx::query_as::<_, ScheduleFact>(
        "SELECT id, session_date, start_time, duration_minutes, status
         FROM schedules WHERE trainee_id = ?",
    )
    .bind(trainee_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(facts)
}

/// Recomputes the cached counters on the trainee row from their schedules.
/// Safe to call any number of times.
#[instrument(skip(conn))]
pub async fn refresh_trainee_stats(
    conn: &mut SqliteConnection,
    trainee_id: i64,
    now: NaiveDateTime,
) -> Result<TraineeStats, AppError> {
    let facts = trainee_schedule_facts(conn, trainee_id).await?;
    let stats = compute_trainee_stats(&facts, now);

    sqlx::query(
        "UPDATE trainees
         SET total_sessions = ?, completed_sessions = ?, cancelled_sessions = ?,
             current_streak = ?, longest_streak = ?, total_workout_hours = ?,
             last_session_date = ?, updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(stats.total_sessions)
    .bind(stats.completed_sessions)
    .bind(stats.cancelled_sessions)
    .bind(stats.current_streak)
    .bind(stats.longest_streak)
    .bind(stats.total_workout_hours)
    .bind(stats.last_session_date)
    .bind(trainee_id)
    .execute(&mut *conn)
    .await?;

    info!(
        completed = stats.completed_sessions,
        current_streak = stats.current_streak,
        "Refreshed trainee stats"
    );

    Ok(stats)
}

/// Fresh stats for a trainee, written back to the cache columns.
#[instrument(skip(pool))]
pub async fn trainee_stats(
    pool: &Pool<Sqlite>,
    trainee_id: i64,
    now: NaiveDateTime,
) -> Result<TraineeStats, AppError> {
    let mut conn = pool.acquire().await?;
    refresh_trainee_stats(&mut conn, trainee_id, now).await
}

#[instrument(skip(pool))]
pub async fn set_trainee_weight(
    pool: &Pool<Sqlite>,
    trainee_id: i64,
    weight: f64,
) -> Result<(), AppError> {
    sqlx::query("UPDATE trainees SET weight = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(weight)
        .bind(trainee_id)
        .execute(pool)
        .await?;

    Ok(())
}
