use chrono::NaiveDate;
use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::Deserialize;
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::api::trainee::ScheduleQuery;
use crate::api::now;
use crate::auth::{Permission, TrainerUser};
use crate::db::{
    cancel_schedule, create_schedule, get_assignment_for_trainee, get_location,
    get_schedule_for_trainer, get_trainee_for_trainer, list_schedules, update_schedule,
    NewSchedule, ScheduleOwner, ScheduleUpdate,
};
use crate::models::{Schedule, ScheduleStatus};
use crate::validation::{
    validate_string_list, ApiResponse, ApiResult, JsonValidateExt, Paginated, TIME_OF_DAY,
};

pub fn routes() -> Vec<Route> {
    routes![
        api_list_schedules,
        api_get_schedule,
        api_create_schedule,
        api_update_schedule,
        api_cancel_schedule
    ]
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateScheduleRequest {
    pub trainee_id: i64,
    pub location_id: Option<i64>,
    pub program_assignment_id: Option<i64>,
    pub session_date: NaiveDate,
    #[validate(regex(path = *TIME_OF_DAY, message = "Start time must be HH:MM"))]
    pub start_time: String,
    #[validate(range(min = 15, max = 480, message = "Duration must be 15-480 minutes"))]
    pub duration_minutes: i64,
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(max = 50))]
    pub session_type: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "validate_string_list"))]
    pub planned_exercises: Vec<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateScheduleRequest {
    pub location_id: Option<i64>,
    pub session_date: Option<NaiveDate>,
    #[validate(regex(path = *TIME_OF_DAY, message = "Start time must be HH:MM"))]
    pub start_time: Option<String>,
    #[validate(range(min = 15, max = 480, message = "Duration must be 15-480 minutes"))]
    pub duration_minutes: Option<i64>,
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(max = 50))]
    pub session_type: Option<String>,
    #[validate(custom(function = "validate_string_list"))]
    pub planned_exercises: Option<Vec<String>>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    pub status: Option<ScheduleStatus>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CancelScheduleRequest {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[get("/schedules?<query..>")]
pub async fn api_list_schedules(
    trainer: TrainerUser,
    query: ScheduleQuery<'_>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Paginated<Schedule>> {
    let page = query.paging().resolve()?;
    let filter = query.filter()?;

    let (schedules, total) =
        list_schedules(db, ScheduleOwner::Trainer(trainer.trainer_id), filter, page).await?;

    Ok(ApiResponse::ok(Paginated::new(schedules, page, total)))
}

#[get("/schedules/<id>")]
pub async fn api_get_schedule(
    id: i64,
    trainer: TrainerUser,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Schedule> {
    Ok(ApiResponse::ok(
        get_schedule_for_trainer(db, trainer.trainer_id, id).await?,
    ))
}

#[post("/schedules", data = "<request>")]
pub async fn api_create_schedule(
    trainer: TrainerUser,
    request: Json<CreateScheduleRequest>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Schedule> {
    trainer
        .identity
        .require_permission(Permission::ManageSchedules)?;
    let request = request.validated()?;

    get_trainee_for_trainer(db, trainer.trainer_id, request.trainee_id).await?;
    if let Some(location_id) = request.location_id {
        get_location(db, location_id).await?;
    }
    if let Some(assignment_id) = request.program_assignment_id {
        get_assignment_for_trainee(db, request.trainee_id, assignment_id).await?;
    }

    let new_schedule = NewSchedule {
        trainee_id: request.trainee_id,
        location_id: request.location_id,
        program_assignment_id: request.program_assignment_id,
        session_date: request.session_date,
        start_time: request.start_time,
        duration_minutes: request.duration_minutes,
        title: request.title,
        description: request.description,
        session_type: request.session_type,
        planned_exercises: request.planned_exercises,
        notes: request.notes,
    };

    Ok(ApiResponse::ok_with_message(
        create_schedule(db, trainer.trainer_id, &new_schedule, now()).await?,
        "Schedule created",
    ))
}

#[patch("/schedules/<id>", data = "<request>")]
pub async fn api_update_schedule(
    id: i64,
    trainer: TrainerUser,
    request: Json<UpdateScheduleRequest>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Schedule> {
    trainer
        .identity
        .require_permission(Permission::ManageSchedules)?;
    let request = request.validated()?;

    if let Some(location_id) = request.location_id {
        get_location(db, location_id).await?;
    }

    let update = ScheduleUpdate {
        location_id: request.location_id,
        session_date: request.session_date,
        start_time: request.start_time,
        duration_minutes: request.duration_minutes,
        title: request.title,
        description: request.description,
        session_type: request.session_type,
        planned_exercises: request.planned_exercises,
        notes: request.notes,
        status: request.status,
    };

    Ok(ApiResponse::ok_with_message(
        update_schedule(
            db,
            trainer.trainer_id,
            id,
            trainer.identity.user_id,
            &update,
            now(),
        )
        .await?,
        "Schedule updated",
    ))
}

#[post("/schedules/<id>/cancel", data = "<request>")]
pub async fn api_cancel_schedule(
    id: i64,
    trainer: TrainerUser,
    request: Option<Json<CancelScheduleRequest>>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Schedule> {
    trainer
        .identity
        .require_permission(Permission::ManageSchedules)?;
    let request = match request {
        Some(body) => body.validated()?,
        None => CancelScheduleRequest::default(),
    };

    Ok(ApiResponse::ok_with_message(
        cancel_schedule(
            db,
            trainer.trainer_id,
            id,
            trainer.identity.user_id,
            request.reason.as_deref(),
            now(),
        )
        .await?,
        "Schedule cancelled",
    ))
}
