use chrono::{NaiveDate, NaiveDateTime};
use sqlx::types::Json;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::{
    ExerciseSet, NewNotification, NotificationType, Priority, ScheduleStatus, SessionCard,
    SessionExercise,
};
use crate::stats::{summarize_card, summarize_sets, SetFigures};
use crate::validation::Page;

use super::{
    adjust_assignment_progress, bump_exercise_usage, get_schedule_for_trainer,
    insert_notification, refresh_trainee_stats,
};

const CARD_SELECT: &str = "SELECT c.id, c.schedule_id, c.trainer_id, u.name AS trainer_name, c.trainee_id,
            c.session_date, c.title, c.duration_minutes, c.overall_feedback,
            c.next_session_goals, c.trainer_rating, c.trainee_rating, c.total_exercises,
            c.total_sets, c.total_reps, c.total_volume, c.created_at
     FROM session_cards c
     JOIN trainers t ON t.id = c.trainer_id
     JOIN users u ON u.id = t.user_id";

#[derive(Debug, Clone)]
pub struct NewExerciseSet {
    pub reps: Option<i64>,
    pub weight: Option<f64>,
    pub duration_seconds: Option<i64>,
    pub distance: Option<f64>,
    pub rest_seconds: Option<i64>,
    pub completed: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewSessionExercise {
    pub exercise_library_id: Option<i64>,
    pub name: String,
    pub category: Option<String>,
    pub notes: Option<String>,
    pub form_notes: Option<String>,
    pub is_pr: bool,
    pub pr_note: Option<String>,
    pub sets: Vec<NewExerciseSet>,
}

#[derive(Debug, Clone)]
pub struct NewSessionCard {
    pub schedule_id: i64,
    pub overall_feedback: Option<String>,
    pub next_session_goals: Vec<String>,
    pub trainer_rating: Option<i64>,
    pub trainee_rating: Option<i64>,
    pub exercises: Vec<NewSessionExercise>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionCardUpdate {
    pub overall_feedback: Option<String>,
    pub next_session_goals: Option<Vec<String>>,
    pub trainer_rating: Option<i64>,
    pub trainee_rating: Option<i64>,
}

/// Filters for searching an owner's cards. Exercise filters match when any
/// exercise on the card fits.
#[derive(Debug, Clone, Default)]
pub struct CardSearch {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub category: Option<String>,
    pub exercise_name: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub enum CardOwner {
    Trainer(i64),
    Trainee(i64),
}

impl CardOwner {
    pub(super) fn column(self) -> (&'static str, i64) {
        match self {
            CardOwner::Trainer(id) => ("trainer_id", id),
            CardOwner::Trainee(id) => ("trainee_id", id),
        }
    }
}

fn set_figures(set: &NewExerciseSet) -> SetFigures {
    SetFigures {
        reps: set.reps,
        weight: set.weight,
        completed: set.completed,
    }
}

/// Records a finished session. Everything happens in one transaction: the
/// card with its exercises and sets, completing the schedule, program
/// progress, the trainee's cached stats and a notification.
#[instrument(skip(pool, card), fields(schedule_id = card.schedule_id))]
pub async fn create_session_card(
    pool: &Pool<Sqlite>,
    trainer_id: i64,
    card: &NewSessionCard,
    now: NaiveDateTime,
) -> Result<SessionCard, AppError> {
    info!("Creating session card");
    let schedule = get_schedule_for_trainer(pool, trainer_id, card.schedule_id).await?;

    if schedule.session_card_id.is_some() {
        return Err(AppError::Conflict(
            "This schedule already has a session card".to_string(),
        ));
    }
    if !schedule.status.can_transition_to(ScheduleStatus::Completed) {
        return Err(AppError::Validation(format!(
            "Only confirmed schedules can be completed, this one is {}",
            schedule.status.as_str()
        )));
    }

    let exercise_totals: Vec<_> = card
        .exercises
        .iter()
        .map(|e| summarize_sets(&e.sets.iter().map(set_figures).collect::<Vec<_>>()))
        .collect();
    let totals = summarize_card(&exercise_totals);

    let mut tx = pool.begin().await?;

    let card_id = sqlx::query(
        "INSERT INTO session_cards
         (schedule_id, trainer_id, trainee_id, session_date, title, duration_minutes,
          overall_feedback, next_session_goals, trainer_rating, trainee_rating,
          total_exercises, total_sets, total_reps, total_volume)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(schedule.id)
    .bind(trainer_id)
    .bind(schedule.trainee_id)
    .bind(schedule.session_date)
    .bind(&schedule.title)
    .bind(schedule.duration_minutes)
    .bind(&card.overall_feedback)
    .bind(Json(&card.next_session_goals))
    .bind(card.trainer_rating)
    .bind(card.trainee_rating)
    .bind(totals.total_exercises)
    .bind(totals.total_sets)
    .bind(totals.total_reps)
    .bind(totals.total_volume)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    for (index, (exercise, exercise_total)) in card.exercises.iter().zip(&exercise_totals).enumerate() {
        let exercise_id = sqlx::query(
            "INSERT INTO session_exercises
             (session_card_id, exercise_library_id, name, category, exercise_order, notes,
              form_notes, total_sets, total_reps, total_weight, total_volume, is_pr, pr_note)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(card_id)
        .bind(exercise.exercise_library_id)
        .bind(&exercise.name)
        .bind(&exercise.category)
        .bind(index as i64 + 1)
        .bind(&exercise.notes)
        .bind(&exercise.form_notes)
        .bind(exercise_total.total_sets)
        .bind(exercise_total.total_reps)
        .bind(exercise_total.total_weight)
        .bind(exercise_total.total_volume)
        .bind(exercise.is_pr)
        .bind(&exercise.pr_note)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for (set_index, set) in exercise.sets.iter().enumerate() {
            sqlx::query(
                "INSERT INTO exercise_sets
                 (session_exercise_id, set_number, reps, weight, duration_seconds, distance,
                  rest_seconds, completed, notes)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(exercise_id)
            .bind(set_index as i64 + 1)
            .bind(set.reps)
            .bind(set.weight)
            .bind(set.duration_seconds)
            .bind(set.distance)
            .bind(set.rest_seconds)
            .bind(set.completed)
            .bind(&set.notes)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(library_id) = exercise.exercise_library_id {
            bump_exercise_usage(&mut tx, library_id).await?;
        }
    }

    sqlx::query(
        "UPDATE schedules SET status = 'completed', session_card_id = ?, updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(card_id)
    .bind(schedule.id)
    .execute(&mut *tx)
    .await?;

    if let Some(assignment_id) = schedule.program_assignment_id {
        adjust_assignment_progress(&mut tx, assignment_id, 1, now.date()).await?;
    }

    refresh_trainee_stats(&mut tx, schedule.trainee_id, now).await?;

    let user_id: i64 = sqlx::query_scalar("SELECT user_id FROM trainees WHERE id = ?")
        .bind(schedule.trainee_id)
        .fetch_one(&mut *tx)
        .await?;

    insert_notification(
        &mut tx,
        &NewNotification {
            user_id,
            notification_type: NotificationType::Progress,
            title: "Session recorded".to_string(),
            message: format!(
                "{}: {} exercises, {} sets",
                schedule.title, totals.total_exercises, totals.total_sets
            ),
            related_id: Some(card_id),
            related_type: Some("session_card".to_string()),
            action_url: Some(format!("/sessions/{}", card_id)),
            priority: Priority::Low,
        },
    )
    .await?;

    tx.commit().await?;

    get_session_card(pool, card_id).await
}

/// Full card with exercises and sets in recorded order.
#[instrument(skip(pool))]
pub async fn get_session_card(pool: &Pool<Sqlite>, id: i64) -> Result<SessionCard, AppError> {
    let mut card = sqlx::query_as::<_, SessionCard>(&format!("{} WHERE c.id = ?", CARD_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Session card {} not found", id)))?;

    let mut exercises = sqlx::query_as::<_, SessionExercise>(
        "SELECT id, session_card_id, exercise_library_id, name, category, exercise_order, notes,
                form_notes, total_sets, total_reps, total_weight, total_volume, is_pr, pr_note
         FROM session_exercises WHERE session_card_id = ? ORDER BY exercise_order",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let sets = sqlx::query_as::<_, ExerciseSet>(
        "SELECT es.id, es.session_exercise_id, es.set_number, es.reps, es.weight,
                es.duration_seconds, es.distance, es.rest_seconds, es.completed, es.notes
         FROM exercise_sets es
         JOIN session_exercises se ON se.id = es.session_exercise_id
         WHERE se.session_card_id = ?
         ORDER BY es.session_exercise_id, es.set_number",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    for set in sets {
        if let Some(exercise) = exercises.iter_mut().find(|e| e.id == set.session_exercise_id) {
            exercise.sets.push(set);
        }
    }

    card.exercises = exercises;
    Ok(card)
}

#[instrument(skip(pool))]
pub async fn get_session_card_for(
    pool: &Pool<Sqlite>,
    owner: CardOwner,
    id: i64,
) -> Result<SessionCard, AppError> {
    let (column, owner_id) = owner.column();
    let owned: Option<i64> = sqlx::query_scalar(&format!(
        "SELECT id FROM session_cards WHERE id = ? AND {} = ?",
        column
    ))
    .bind(id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await?;

    match owned {
        Some(_) => get_session_card(pool, id).await,
        None => Err(AppError::NotFound(format!("Session card {} not found", id))),
    }
}

/// Card summaries, newest first. Exercises are not loaded.
#[instrument(skip(pool))]
pub async fn list_session_cards(
    pool: &Pool<Sqlite>,
    owner: CardOwner,
    trainee_id: Option<i64>,
    page: Page,
) -> Result<(Vec<SessionCard>, i64), AppError> {
    info!("Listing session cards");
    let (column, owner_id) = owner.column();
    let predicate = format!("c.{} = ? AND (? IS NULL OR c.trainee_id = ?)", column);

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM session_cards c WHERE {}",
        predicate
    ))
    .bind(owner_id)
    .bind(trainee_id)
    .bind(trainee_id)
    .fetch_one(pool)
    .await?;

    let cards = sqlx::query_as::<_, SessionCard>(&format!(
        "{} WHERE {} ORDER BY c.session_date DESC, c.id DESC LIMIT ? OFFSET ?",
        CARD_SELECT, predicate
    ))
    .bind(owner_id)
    .bind(trainee_id)
    .bind(trainee_id)
    .bind(page.page_size)
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok((cards, total))
}

/// Card summaries matching `search`, newest first. Category matches exactly
/// and the exercise name by substring, both ignoring case.
#[instrument(skip(pool))]
pub async fn search_session_cards(
    pool: &Pool<Sqlite>,
    owner: CardOwner,
    search: &CardSearch,
    page: Page,
) -> Result<(Vec<SessionCard>, i64), AppError> {
    info!("Searching session cards");
    if let (Some(from), Some(to)) = (search.from, search.to) {
        if from > to {
            return Err(AppError::Validation(
                "fromDate must not be after toDate".to_string(),
            ));
        }
    }

    let (column, owner_id) = owner.column();
    let predicate = format!(
        "c.{} = ?
         AND (? IS NULL OR c.session_date >= ?)
         AND (? IS NULL OR c.session_date <= ?)
         AND (? IS NULL OR EXISTS (
             SELECT 1 FROM session_exercises se
             WHERE se.session_card_id = c.id AND LOWER(se.category) = LOWER(?)))
         AND (? IS NULL OR EXISTS (
             SELECT 1 FROM session_exercises se
             WHERE se.session_card_id = c.id AND INSTR(LOWER(se.name), LOWER(?)) > 0))",
        column
    );

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM session_cards c WHERE {}",
        predicate
    ))
    .bind(owner_id)
    .bind(search.from)
    .bind(search.from)
    .bind(search.to)
    .bind(search.to)
    .bind(&search.category)
    .bind(&search.category)
    .bind(&search.exercise_name)
    .bind(&search.exercise_name)
    .fetch_one(pool)
    .await?;

    let cards = sqlx::query_as::<_, SessionCard>(&format!(
        "{} WHERE {} ORDER BY c.session_date DESC, c.id DESC LIMIT ? OFFSET ?",
        CARD_SELECT, predicate
    ))
    .bind(owner_id)
    .bind(search.from)
    .bind(search.from)
    .bind(search.to)
    .bind(search.to)
    .bind(&search.category)
    .bind(&search.category)
    .bind(&search.exercise_name)
    .bind(&search.exercise_name)
    .bind(page.page_size)
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok((cards, total))
}

#[instrument(skip(pool, update))]
pub async fn update_session_card(
    pool: &Pool<Sqlite>,
    trainer_id: i64,
    id: i64,
    update: &SessionCardUpdate,
) -> Result<SessionCard, AppError> {
    info!("Updating session card");
    let res = sqlx::query(
        "UPDATE session_cards
         SET overall_feedback = COALESCE(?, overall_feedback),
             next_session_goals = COALESCE(?, next_session_goals),
             trainer_rating = COALESCE(?, trainer_rating),
             trainee_rating = COALESCE(?, trainee_rating),
             updated_at = CURRENT_TIMESTAMP
         WHERE id = ? AND trainer_id = ?",
    )
    .bind(&update.overall_feedback)
    .bind(update.next_session_goals.as_ref().map(Json))
    .bind(update.trainer_rating)
    .bind(update.trainee_rating)
    .bind(id)
    .bind(trainer_id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Session card {} not found", id)));
    }

    get_session_card(pool, id).await
}

/// Removes a card and reopens its schedule as confirmed, undoing the
/// progress and stats it contributed.
#[instrument(skip(pool))]
pub async fn delete_session_card(
    pool: &Pool<Sqlite>,
    trainer_id: i64,
    id: i64,
    now: NaiveDateTime,
) -> Result<(), AppError> {
    info!("Deleting session card");
    let card = get_session_card_for(pool, CardOwner::Trainer(trainer_id), id).await?;
    let schedule = get_schedule_for_trainer(pool, trainer_id, card.schedule_id).await?;

    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE schedules SET status = 'confirmed', session_card_id = NULL, updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(schedule.id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM session_cards WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    if let Some(assignment_id) = schedule.program_assignment_id {
        adjust_assignment_progress(&mut tx, assignment_id, -1, now.date()).await?;
    }

    refresh_trainee_stats(&mut tx, card.trainee_id, now).await?;

    tx.commit().await?;
    Ok(())
}
