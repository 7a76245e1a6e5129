use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::{
    AssignmentStatus, NewNotification, NotificationType, Priority, Program, ProgramAssignment,
    ProgramStatus, SkillLevel,
};
use crate::stats::{current_week, progress_percentage};
use crate::validation::Page;

use super::insert_notification;

const PROGRAM_SELECT: &str = "SELECT p.id, p.trainer_id, u.name AS trainer_name, p.name, p.description,
            p.total_weeks, p.sessions_per_week, p.goals, p.target_fitness_level, p.status,
            p.total_assignments, p.created_at
     FROM programs p
     JOIN trainers t ON t.id = p.trainer_id
     JOIN users u ON u.id = t.user_id";

const ASSIGNMENT_SELECT: &str = "SELECT pa.id, pa.program_id, p.name AS program_name, pa.trainee_id,
            pa.start_date, pa.end_date, pa.current_week, pa.progress_percentage,
            pa.sessions_completed, pa.total_sessions, pa.status, pa.notes
     FROM program_assignments pa
     JOIN programs p ON p.id = pa.program_id";

#[derive(Debug, Clone)]
pub struct ProgramInput {
    pub name: String,
    pub description: Option<String>,
    pub total_weeks: i64,
    pub sessions_per_week: i64,
    pub goals: Vec<String>,
    pub target_fitness_level: Option<SkillLevel>,
    pub status: ProgramStatus,
}

#[derive(Debug, Clone, Default)]
pub struct ProgramUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub total_weeks: Option<i64>,
    pub sessions_per_week: Option<i64>,
    pub goals: Option<Vec<String>>,
    pub target_fitness_level: Option<SkillLevel>,
    pub status: Option<ProgramStatus>,
}

/// A program as seen by an enrolled trainee.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrolledProgram {
    pub program: Program,
    pub assignment: ProgramAssignment,
}

#[instrument(skip(pool))]
pub async fn get_program(pool: &Pool<Sqlite>, id: i64) -> Result<Program, AppError> {
    sqlx::query_as::<_, Program>(&format!("{} WHERE p.id = ?", PROGRAM_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Program {} not found", id)))
}

#[instrument(skip(pool))]
pub async fn get_program_for_trainer(
    pool: &Pool<Sqlite>,
    trainer_id: i64,
    id: i64,
) -> Result<Program, AppError> {
    sqlx::query_as::<_, Program>(&format!(
        "{} WHERE p.id = ? AND p.trainer_id = ?",
        PROGRAM_SELECT
    ))
    .bind(id)
    .bind(trainer_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Program {} not found", id)))
}

#[instrument(skip(pool))]
pub async fn list_programs_for_trainer(
    pool: &Pool<Sqlite>,
    trainer_id: i64,
    status: Option<ProgramStatus>,
    page: Page,
) -> Result<(Vec<Program>, i64), AppError> {
    info!("Listing programs");
    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM programs WHERE trainer_id = ? AND (? IS NULL OR status = ?)",
    )
    .bind(trainer_id)
    .bind(status)
    .bind(status)
    .fetch_one(pool)
    .await?;

    let programs = sqlx::query_as::<_, Program>(&format!(
        "{} WHERE p.trainer_id = ? AND (? IS NULL OR p.status = ?)
         ORDER BY p.created_at DESC, p.id DESC LIMIT ? OFFSET ?",
        PROGRAM_SELECT
    ))
    .bind(trainer_id)
    .bind(status)
    .bind(status)
    .bind(page.page_size)
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok((programs, total))
}

#[instrument(skip(pool, input), fields(name = %input.name))]
pub async fn create_program(
    pool: &Pool<Sqlite>,
    trainer_id: i64,
    input: &ProgramInput,
) -> Result<Program, AppError> {
    info!("Creating program");
    let id = sqlx::query(
        "INSERT INTO programs
         (trainer_id, name, description, total_weeks, sessions_per_week, goals,
          target_fitness_level, status)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(trainer_id)
    .bind(&input.name)
    .bind(&input.description)
    .bind(input.total_weeks)
    .bind(input.sessions_per_week)
    .bind(Json(&input.goals))
    .bind(input.target_fitness_level)
    .bind(input.status)
    .execute(pool)
    .await?
    .last_insert_rowid();

    get_program(pool, id).await
}

#[instrument(skip(pool, update))]
pub async fn update_program(
    pool: &Pool<Sqlite>,
    trainer_id: i64,
    id: i64,
    update: &ProgramUpdate,
) -> Result<Program, AppError> {
    info!("Updating program");
    let res = sqlx::query(
        "UPDATE programs
         SET name = COALESCE(?, name),
             description = COALESCE(?, description),
             total_weeks = COALESCE(?, total_weeks),
             sessions_per_week = COALESCE(?, sessions_per_week),
             goals = COALESCE(?, goals),
             target_fitness_level = COALESCE(?, target_fitness_level),
             status = COALESCE(?, status),
             updated_at = CURRENT_TIMESTAMP
         WHERE id = ? AND trainer_id = ?",
    )
    .bind(&update.name)
    .bind(&update.description)
    .bind(update.total_weeks)
    .bind(update.sessions_per_week)
    .bind(update.goals.as_ref().map(Json))
    .bind(update.target_fitness_level)
    .bind(update.status)
    .bind(id)
    .bind(trainer_id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Program {} not found", id)));
    }

    get_program(pool, id).await
}

/// Programs with an active enrollment cannot be deleted; archive them instead.
#[instrument(skip(pool))]
pub async fn delete_program(pool: &Pool<Sqlite>, trainer_id: i64, id: i64) -> Result<(), AppError> {
    info!("Deleting program");
    get_program_for_trainer(pool, trainer_id, id).await?;

    let active: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM program_assignments WHERE program_id = ? AND status = 'active'",
    )
    .bind(id)
    .fetch_one(pool)
    .await?;

    if active > 0 {
        return Err(AppError::Conflict(format!(
            "Program {} has {} active assignment(s)",
            id, active
        )));
    }

    sqlx::query("DELETE FROM programs WHERE id = ? AND trainer_id = ?")
        .bind(id)
        .bind(trainer_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Enrolls a trainee. The caller must already have checked that the trainee
/// belongs to this trainer. A trainee holds at most one active assignment.
#[instrument(skip(pool))]
pub async fn assign_program(
    pool: &Pool<Sqlite>,
    trainer_id: i64,
    program_id: i64,
    trainee_id: i64,
    start_date: NaiveDate,
    notes: Option<&str>,
) -> Result<ProgramAssignment, AppError> {
    info!("Assigning program");
    let program = get_program_for_trainer(pool, trainer_id, program_id).await?;

    if program.status != ProgramStatus::Active {
        return Err(AppError::Validation(
            "Only active programs can be assigned".to_string(),
        ));
    }

    let total_sessions = program.total_weeks * program.sessions_per_week;
    let end_date = start_date + Duration::days(program.total_weeks * 7 - 1);

    let mut tx = pool.begin().await?;

    let active: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM program_assignments WHERE trainee_id = ? AND status = 'active'",
    )
    .bind(trainee_id)
    .fetch_one(&mut *tx)
    .await?;

    if active > 0 {
        return Err(AppError::Conflict(
            "Trainee already has an active program".to_string(),
        ));
    }

    let id = sqlx::query(
        "INSERT INTO program_assignments
         (program_id, trainee_id, start_date, end_date, total_sessions, notes)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(program_id)
    .bind(trainee_id)
    .bind(start_date)
    .bind(end_date)
    .bind(total_sessions)
    .bind(notes)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    sqlx::query("UPDATE programs SET total_assignments = total_assignments + 1 WHERE id = ?")
        .bind(program_id)
        .execute(&mut *tx)
        .await?;

    let user_id: i64 = sqlx::query_scalar("SELECT user_id FROM trainees WHERE id = ?")
        .bind(trainee_id)
        .fetch_one(&mut *tx)
        .await?;

    insert_notification(
        &mut tx,
        &NewNotification {
            user_id,
            notification_type: NotificationType::Progress,
            title: "New program assigned".to_string(),
            message: format!("You have been enrolled in {} starting {}", program.name, start_date),
            related_id: Some(id),
            related_type: Some("program_assignment".to_string()),
            action_url: Some("/programs/current".to_string()),
            priority: Priority::Medium,
        },
    )
    .await?;

    tx.commit().await?;

    get_assignment(pool, id).await
}

#[instrument(skip(pool))]
pub async fn get_assignment(pool: &Pool<Sqlite>, id: i64) -> Result<ProgramAssignment, AppError> {
    sqlx::query_as::<_, ProgramAssignment>(&format!("{} WHERE pa.id = ?", ASSIGNMENT_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Program assignment {} not found", id)))
}

#[instrument(skip(pool))]
pub async fn get_assignment_for_trainee(
    pool: &Pool<Sqlite>,
    trainee_id: i64,
    id: i64,
) -> Result<ProgramAssignment, AppError> {
    sqlx::query_as::<_, ProgramAssignment>(&format!(
        "{} WHERE pa.id = ? AND pa.trainee_id = ?",
        ASSIGNMENT_SELECT
    ))
    .bind(id)
    .bind(trainee_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Program assignment {} not found", id)))
}

/// The trainee's active enrollment, latest start first.
#[instrument(skip(pool))]
pub async fn current_program(
    pool: &Pool<Sqlite>,
    trainee_id: i64,
) -> Result<Option<EnrolledProgram>, AppError> {
    info!("Fetching current program");
    let assignment = sqlx::query_as::<_, ProgramAssignment>(&format!(
        "{} WHERE pa.trainee_id = ? AND pa.status = 'active'
         ORDER BY pa.start_date DESC, pa.id DESC LIMIT 1",
        ASSIGNMENT_SELECT
    ))
    .bind(trainee_id)
    .fetch_optional(pool)
    .await?;

    match assignment {
        Some(assignment) => {
            let program = get_program(pool, assignment.program_id).await?;
            Ok(Some(EnrolledProgram {
                program,
                assignment,
            }))
        }
        None => Ok(None),
    }
}

#[instrument(skip(pool))]
pub async fn enrolled_programs(
    pool: &Pool<Sqlite>,
    trainee_id: i64,
) -> Result<Vec<EnrolledProgram>, AppError> {
    info!("Fetching enrolled programs");
    let assignments = sqlx::query_as::<_, ProgramAssignment>(&format!(
        "{} WHERE pa.trainee_id = ? ORDER BY pa.start_date DESC, pa.id DESC",
        ASSIGNMENT_SELECT
    ))
    .bind(trainee_id)
    .fetch_all(pool)
    .await?;

    let mut enrolled = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        let program = get_program(pool, assignment.program_id).await?;
        enrolled.push(EnrolledProgram {
            program,
            assignment,
        });
    }

    Ok(enrolled)
}

/// One program as seen by an enrolled trainee, with their latest enrollment in
/// it. Programs the trainee was never assigned are reported as absent.
#[instrument(skip(pool))]
pub async fn enrolled_program(
    pool: &Pool<Sqlite>,
    trainee_id: i64,
    program_id: i64,
) -> Result<EnrolledProgram, AppError> {
    let assignment = sqlx::query_as::<_, ProgramAssignment>(&format!(
        "{} WHERE pa.trainee_id = ? AND pa.program_id = ?
         ORDER BY pa.start_date DESC, pa.id DESC LIMIT 1",
        ASSIGNMENT_SELECT
    ))
    .bind(trainee_id)
    .bind(program_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Program {} not found", program_id)))?;

    let program = get_program(pool, program_id).await?;
    Ok(EnrolledProgram {
        program,
        assignment,
    })
}

/// Moves an assignment's completed-session counter by `delta` and re-derives
/// progress, current week and status from it.
pub async fn adjust_assignment_progress(
    conn: &mut SqliteConnection,
    assignment_id: i64,
    delta: i64,
    today: NaiveDate,
) -> Result<(), AppError> {
    let row: Option<(i64, i64, i64, NaiveDate, i64, AssignmentStatus)> = sqlx::query_as(
        "SELECT pa.trainee_id, pa.sessions_completed, pa.total_sessions, pa.start_date,
                p.total_weeks, pa.status
         FROM program_assignments pa JOIN programs p ON p.id = pa.program_id
         WHERE pa.id = ?",
    )
    .bind(assignment_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some((trainee_id, completed, total, start_date, total_weeks, status)) = row else {
        return Err(AppError::NotFound(format!(
            "Program assignment {} not found",
            assignment_id
        )));
    };

    let completed = (completed + delta).max(0);
    let progress = progress_percentage(completed, total);
    let status = match status {
        AssignmentStatus::Active if completed >= total => AssignmentStatus::Completed,
        AssignmentStatus::Completed if completed < total => {
            // a trainee holds at most one active assignment
            let others: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM program_assignments
                 WHERE trainee_id = ? AND status = 'active' AND id != ?",
            )
            .bind(trainee_id)
            .bind(assignment_id)
            .fetch_one(&mut *conn)
            .await?;

            if others == 0 {
                AssignmentStatus::Active
            } else {
                info!(
                    assignment_id,
                    trainee_id,
                    "Assignment stays completed, trainee has a newer active program"
                );
                AssignmentStatus::Completed
            }
        }
        other => other,
    };

    sqlx::query(
        "UPDATE program_assignments
         SET sessions_completed = ?, progress_percentage = ?, current_week = ?, status = ?,
             updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(completed)
    .bind(progress)
    .bind(current_week(start_date, today, total_weeks))
    .bind(status)
    .bind(assignment_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
