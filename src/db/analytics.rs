use chrono::NaiveDate;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::stats::{ClientFact, ExerciseSetRow};

use super::CardOwner;

#[instrument(skip(pool))]
pub async fn trainer_client_facts(
    pool: &Pool<Sqlite>,
    trainer_id: i64,
) -> Result<Vec<ClientFact>, AppError> {
    info!("Loading client facts for analytics");
    let facts = sqlx::query_as::<_, ClientFact>(
        "SELECT join_date, status, last_session_date FROM trainees WHERE trainer_id = ?",
    )
    .bind(trainer_id)
    .fetch_all(pool)
    .await?;

    Ok(facts)
}

/// Every recorded set on the owner's cards, optionally only from `since` on.
#[instrument(skip(pool))]
pub async fn exercise_set_rows(
    pool: &Pool<Sqlite>,
    owner: CardOwner,
    since: Option<NaiveDate>,
) -> Result<Vec<ExerciseSetRow>, AppError> {
    info!("Loading exercise sets for analytics");
    let (column, owner_id) = owner.column();

    let rows = sqlx::query_as::<_, ExerciseSetRow>(&format!(
        "SELECT c.id AS session_card_id, se.name, es.reps, es.weight, es.completed
         FROM exercise_sets es
         JOIN session_exercises se ON se.id = es.session_exercise_id
         JOIN session_cards c ON c.id = se.session_card_id
         WHERE c.{} = ? AND (? IS NULL OR c.session_date >= ?)
         ORDER BY c.session_date, se.exercise_order, es.set_number",
        column
    ))
    .bind(owner_id)
    .bind(since)
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
