use chrono::{Duration, NaiveDate, NaiveDateTime};
use sqlx::types::Json;
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument, warn};

use crate::error::AppError;
use crate::models::{NewNotification, NotificationType, Priority, Schedule, ScheduleStatus};
use crate::stats::{build_upcoming, find_overlap, schedule_start, ScheduleFact, UpcomingSchedules};
use crate::validation::Page;

use super::{insert_notification, refresh_trainee_stats};

const SCHEDULE_SELECT: &str = "SELECT s.id, s.trainer_id, tu.name AS trainer_name, s.trainee_id,
            eu.name AS trainee_name, s.location_id, l.name AS location_name,
            s.program_assignment_id, p.name AS program_name, s.session_date, s.start_time,
            s.duration_minutes, s.title, s.description, s.session_type, s.planned_exercises,
            s.status, s.notes, s.cancellation_reason, s.cancelled_at, s.cancelled_by,
            s.session_card_id, s.created_at
     FROM schedules s
     JOIN trainers tr ON tr.id = s.trainer_id
     JOIN users tu ON tu.id = tr.user_id
     JOIN trainees te ON te.id = s.trainee_id
     JOIN users eu ON eu.id = te.user_id
     LEFT JOIN locations l ON l.id = s.location_id
     LEFT JOIN program_assignments pa ON pa.id = s.program_assignment_id
     LEFT JOIN programs p ON p.id = pa.program_id";

#[derive(Debug, Clone)]
pub struct NewSchedule {
    pub trainee_id: i64,
    pub location_id: Option<i64>,
    pub program_assignment_id: Option<i64>,
    pub session_date: NaiveDate,
    pub start_time: String,
    pub duration_minutes: i64,
    pub title: String,
    pub description: Option<String>,
    pub session_type: Option<String>,
    pub planned_exercises: Vec<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ScheduleUpdate {
    pub location_id: Option<i64>,
    pub session_date: Option<NaiveDate>,
    pub start_time: Option<String>,
    pub duration_minutes: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub session_type: Option<String>,
    pub planned_exercises: Option<Vec<String>>,
    pub notes: Option<String>,
    pub status: Option<ScheduleStatus>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleFilter {
    pub trainee_id: Option<i64>,
    pub status: Option<ScheduleStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[instrument(skip(pool))]
pub async fn get_schedule(pool: &Pool<Sqlite>, id: i64) -> Result<Schedule, AppError> {
    sqlx::query_as::<_, Schedule>(&format!("{} WHERE s.id = ?", SCHEDULE_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Schedule {} not found", id)))
}

#[instrument(skip(pool))]
pub async fn get_schedule_for_trainee(
    pool: &Pool<Sqlite>,
    trainee_id: i64,
    id: i64,
) -> Result<Schedule, AppError> {
    info!("Fetching trainee schedule");
    sqlx::query_as::<_, Schedule>(&format!(
        "{} WHERE s.id = ? AND s.trainee_id = ?",
        SCHEDULE_SELECT
    ))
    .bind(id)
    .bind(trainee_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Schedule {} not found", id)))
}

#[instrument(skip(pool))]
pub async fn get_schedule_for_trainer(
    pool: &Pool<Sqlite>,
    trainer_id: i64,
    id: i64,
) -> Result<Schedule, AppError> {
    info!("Fetching trainer schedule");
    sqlx::query_as::<_, Schedule>(&format!(
        "{} WHERE s.id = ? AND s.trainer_id = ?",
        SCHEDULE_SELECT
    ))
    .bind(id)
    .bind(trainer_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Schedule {} not found", id)))
}

/// Paged schedules owned by a trainer or a trainee, newest first.
#[instrument(skip(pool))]
pub async fn list_schedules(
    pool: &Pool<Sqlite>,
    owner: ScheduleOwner,
    filter: ScheduleFilter,
    page: Page,
) -> Result<(Vec<Schedule>, i64), AppError> {
    info!("Listing schedules");
    let (owner_column, owner_id) = owner.column();
    let trainee_id = filter.trainee_id;

    let predicate = format!(
        "s.{} = ?
           AND (? IS NULL OR s.trainee_id = ?)
           AND (? IS NULL OR s.status = ?)
           AND (? IS NULL OR s.session_date >= ?)
           AND (? IS NULL OR s.session_date <= ?)",
        owner_column
    );

    let total: i64 =
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM schedules s WHERE {}", predicate))
            .bind(owner_id)
            .bind(trainee_id)
            .bind(trainee_id)
            .bind(filter.status)
            .bind(filter.status)
            .bind(filter.from)
            .bind(filter.from)
            .bind(filter.to)
            .bind(filter.to)
            .fetch_one(pool)
            .await?;

    let schedules = sqlx::query_as::<_, Schedule>(&format!(
        "{} WHERE {} ORDER BY s.session_date DESC, s.start_time DESC LIMIT ? OFFSET ?",
        SCHEDULE_SELECT, predicate
    ))
    .bind(owner_id)
    .bind(trainee_id)
    .bind(trainee_id)
    .bind(filter.status)
    .bind(filter.status)
    .bind(filter.from)
    .bind(filter.from)
    .bind(filter.to)
    .bind(filter.to)
    .bind(page.page_size)
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok((schedules, total))
}

#[derive(Debug, Clone, Copy)]
pub enum ScheduleOwner {
    Trainer(i64),
    Trainee(i64),
}

impl ScheduleOwner {
    fn column(self) -> (&'static str, i64) {
        match self {
            ScheduleOwner::Trainer(id) => ("trainer_id", id),
            ScheduleOwner::Trainee(id) => ("trainee_id", id),
        }
    }
}

/// Upcoming window for a trainee. Candidate rows are narrowed by date in SQL,
/// the exact window and the calendar come from `build_upcoming`.
#[instrument(skip(pool))]
pub async fn upcoming_schedules(
    pool: &Pool<Sqlite>,
    trainee_id: i64,
    now: NaiveDateTime,
    days: i64,
) -> Result<UpcomingSchedules, AppError> {
    info!("Fetching upcoming schedules");
    let today = now.date();
    let last_day = today + Duration::days(days);

    let candidates = sqlx::query_as::<_, Schedule>(&format!(
        "{} WHERE s.trainee_id = ? AND s.session_date >= ? AND s.session_date <= ?
           AND s.status IN ('scheduled', 'confirmed')",
        SCHEDULE_SELECT
    ))
    .bind(trainee_id)
    .bind(today)
    .bind(last_day)
    .fetch_all(pool)
    .await?;

    Ok(build_upcoming(candidates, now, days))
}

/// Next active session for a trainee, if any.
#[instrument(skip(pool))]
pub async fn next_schedule(
    pool: &Pool<Sqlite>,
    trainee_id: i64,
    now: NaiveDateTime,
) -> Result<Option<Schedule>, AppError> {
    let upcoming = upcoming_schedules(pool, trainee_id, now, crate::stats::MAX_WINDOW_DAYS).await?;
    Ok(upcoming.upcoming_sessions.into_iter().next())
}

#[instrument(skip(pool))]
pub async fn trainer_schedule_facts(
    pool: &Pool<Sqlite>,
    trainer_id: i64,
) -> Result<Vec<ScheduleFact>, AppError> {
    let facts = sqlx::query_as::<_, ScheduleFact>(
        "SELECT id, session_date, start_time, duration_minutes, status
         FROM schedules WHERE trainer_id = ?",
    )
    .bind(trainer_id)
    .fetch_all(pool)
    .await?;

    Ok(facts)
}

/// Returns the first of the trainer's active schedules overlapping the slot.
/// Neighbouring days are loaded too so sessions crossing midnight are seen.
pub async fn find_conflict(
    conn: &mut SqliteConnection,
    trainer_id: i64,
    start: NaiveDateTime,
    duration_minutes: i64,
    exclude_id: Option<i64>,
) -> Result<Option<ScheduleFact>, AppError> {
    let date = start.date();
    let nearby = sqlx::query_as::<_, ScheduleFact>(
        "SELECT id, session_date, start_time, duration_minutes, status
         FROM schedules
         WHERE trainer_id = ? AND session_date BETWEEN ? AND ?
           AND status IN ('scheduled', 'confirmed')",
    )
    .bind(trainer_id)
    .bind(date - Duration::days(1))
    .bind(date + Duration::days(1))
    .fetch_all(&mut *conn)
    .await?;

    Ok(find_overlap(start, duration_minutes, &nearby, exclude_id).cloned())
}

fn slot_start(date: NaiveDate, time: &str) -> Result<NaiveDateTime, AppError> {
    schedule_start(date, time)
        .ok_or_else(|| AppError::Validation(format!("Invalid start time: {}", time)))
}

async fn trainee_user_id(conn: &mut SqliteConnection, trainee_id: i64) -> Result<i64, AppError> {
    sqlx::query_scalar("SELECT user_id FROM trainees WHERE id = ?")
        .bind(trainee_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Trainee {} not found", trainee_id)))
}

async fn reject_conflict(
    conn: &mut SqliteConnection,
    trainer_id: i64,
    start: NaiveDateTime,
    duration_minutes: i64,
    exclude_id: Option<i64>,
) -> Result<(), AppError> {
    if let Some(existing) = find_conflict(conn, trainer_id, start, duration_minutes, exclude_id).await? {
        warn!(existing_id = existing.id, "Schedule conflict");
        return Err(AppError::Conflict(format!(
            "Time slot overlaps schedule {} on {} at {}",
            existing.id, existing.session_date, existing.start_time
        )));
    }
    Ok(())
}

/// Books a session. The caller must already have checked that the trainee is
/// assigned to this trainer.
#[instrument(skip(pool, new_schedule), fields(trainee_id = new_schedule.trainee_id))]
pub async fn create_schedule(
    pool: &Pool<Sqlite>,
    trainer_id: i64,
    new_schedule: &NewSchedule,
    now: NaiveDateTime,
) -> Result<Schedule, AppError> {
    info!("Creating schedule");
    let start = slot_start(new_schedule.session_date, &new_schedule.start_time)?;
    if start < now {
        return Err(AppError::Validation(
            "Sessions cannot be scheduled in the past".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    reject_conflict(&mut tx, trainer_id, start, new_schedule.duration_minutes, None).await?;

    let id = sqlx::query(
        "INSERT INTO schedules
         (trainer_id, trainee_id, location_id, program_assignment_id, session_date, start_time,
          duration_minutes, title, description, session_type, planned_exercises, notes)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(trainer_id)
    .bind(new_schedule.trainee_id)
    .bind(new_schedule.location_id)
    .bind(new_schedule.program_assignment_id)
    .bind(new_schedule.session_date)
    .bind(&new_schedule.start_time)
    .bind(new_schedule.duration_minutes)
    .bind(&new_schedule.title)
    .bind(&new_schedule.description)
    .bind(&new_schedule.session_type)
    .bind(Json(&new_schedule.planned_exercises))
    .bind(&new_schedule.notes)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    refresh_trainee_stats(&mut tx, new_schedule.trainee_id, now).await?;

    let user_id = trainee_user_id(&mut tx, new_schedule.trainee_id).await?;
    insert_notification(
        &mut tx,
        &NewNotification {
            user_id,
            notification_type: NotificationType::Schedule,
            title: "New session scheduled".to_string(),
            message: format!(
                "{} on {} at {}",
                new_schedule.title, new_schedule.session_date, new_schedule.start_time
            ),
            related_id: Some(id),
            related_type: Some("schedule".to_string()),
            action_url: Some(format!("/schedules/{}", id)),
            priority: Priority::Medium,
        },
    )
    .await?;

    tx.commit().await?;

    get_schedule(pool, id).await
}

/// Edits a schedule that is not yet closed. Time changes are re-checked for
/// conflicts; status changes must follow the lifecycle, and completion only
/// happens by recording a session card.
#[instrument(skip(pool, update))]
pub async fn update_schedule(
    pool: &Pool<Sqlite>,
    trainer_id: i64,
    id: i64,
    actor_user_id: i64,
    update: &ScheduleUpdate,
    now: NaiveDateTime,
) -> Result<Schedule, AppError> {
    info!("Updating schedule");
    let current = get_schedule_for_trainer(pool, trainer_id, id).await?;

    if current.status.is_terminal() {
        return Err(AppError::Validation(format!(
            "A {} schedule can no longer be changed",
            current.status.as_str()
        )));
    }

    if let Some(next) = update.status {
        if next == ScheduleStatus::Completed {
            return Err(AppError::Validation(
                "Record a session card to complete a schedule".to_string(),
            ));
        }
        if next != current.status && !current.status.can_transition_to(next) {
            return Err(AppError::Validation(format!(
                "Cannot move schedule from {} to {}",
                current.status.as_str(),
                next.as_str()
            )));
        }
    }

    let session_date = update.session_date.unwrap_or(current.session_date);
    let start_time = update
        .start_time
        .clone()
        .unwrap_or_else(|| current.start_time.clone());
    let duration_minutes = update.duration_minutes.unwrap_or(current.duration_minutes);
    let time_changed = session_date != current.session_date
        || start_time != current.start_time
        || duration_minutes != current.duration_minutes;

    let mut tx = pool.begin().await?;

    if time_changed {
        let start = slot_start(session_date, &start_time)?;
        if start < now {
            return Err(AppError::Validation(
                "Sessions cannot be moved into the past".to_string(),
            ));
        }
        reject_conflict(&mut tx, trainer_id, start, duration_minutes, Some(id)).await?;
    }

    let cancelling = update.status == Some(ScheduleStatus::Cancelled);

    sqlx::query(
        "UPDATE schedules
         SET location_id = COALESCE(?, location_id),
             session_date = ?, start_time = ?, duration_minutes = ?,
             title = COALESCE(?, title),
             description = COALESCE(?, description),
             session_type = COALESCE(?, session_type),
             planned_exercises = COALESCE(?, planned_exercises),
             notes = COALESCE(?, notes),
             status = COALESCE(?, status),
             cancelled_at = CASE WHEN ? THEN ? ELSE cancelled_at END,
             cancelled_by = CASE WHEN ? THEN ? ELSE cancelled_by END,
             updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(update.location_id)
    .bind(session_date)
    .bind(&start_time)
    .bind(duration_minutes)
    .bind(&update.title)
    .bind(&update.description)
    .bind(&update.session_type)
    .bind(update.planned_exercises.as_ref().map(Json))
    .bind(&update.notes)
    .bind(update.status)
    .bind(cancelling)
    .bind(now)
    .bind(cancelling)
    .bind(actor_user_id)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    refresh_trainee_stats(&mut tx, current.trainee_id, now).await?;

    if time_changed || update.status.is_some_and(|s| s != current.status) {
        let user_id = trainee_user_id(&mut tx, current.trainee_id).await?;
        insert_notification(
            &mut tx,
            &NewNotification {
                user_id,
                notification_type: NotificationType::Schedule,
                title: "Session updated".to_string(),
                message: format!("{} is now on {} at {}", current.title, session_date, start_time),
                related_id: Some(id),
                related_type: Some("schedule".to_string()),
                action_url: Some(format!("/schedules/{}", id)),
                priority: Priority::Medium,
            },
        )
        .await?;
    }

    tx.commit().await?;

    get_schedule(pool, id).await
}

#[instrument(skip(pool))]
pub async fn cancel_schedule(
    pool: &Pool<Sqlite>,
    trainer_id: i64,
    id: i64,
    actor_user_id: i64,
    reason: Option<&str>,
    now: NaiveDateTime,
) -> Result<Schedule, AppError> {
    info!("Cancelling schedule");
    let current = get_schedule_for_trainer(pool, trainer_id, id).await?;

    if !current.status.can_transition_to(ScheduleStatus::Cancelled) {
        return Err(AppError::Validation(format!(
            "A {} schedule cannot be cancelled",
            current.status.as_str()
        )));
    }

    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE schedules
         SET status = 'cancelled', cancellation_reason = ?, cancelled_at = ?, cancelled_by = ?,
             updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(reason)
    .bind(now)
    .bind(actor_user_id)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    refresh_trainee_stats(&mut tx, current.trainee_id, now).await?;

    let user_id = trainee_user_id(&mut tx, current.trainee_id).await?;
    insert_notification(
        &mut tx,
        &NewNotification {
            user_id,
            notification_type: NotificationType::Schedule,
            title: "Session cancelled".to_string(),
            message: match reason {
                Some(reason) => format!(
                    "{} on {} was cancelled: {}",
                    current.title, current.session_date, reason
                ),
                None => format!("{} on {} was cancelled", current.title, current.session_date),
            },
            related_id: Some(id),
            related_type: Some("schedule".to_string()),
            action_url: None,
            priority: Priority::High,
        },
    )
    .await?;

    tx.commit().await?;

    get_schedule(pool, id).await
}
