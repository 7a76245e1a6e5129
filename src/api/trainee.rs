use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::Deserialize;
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::auth::{Permission, TraineeUser};
use crate::db::{
    current_program, enrolled_program, enrolled_programs, get_schedule_for_trainee,
    get_session_card_for, get_trainee, list_metrics, list_schedules, list_session_cards,
    next_schedule, search_session_cards, trainee_stats, update_trainee, upcoming_schedules,
    CardOwner, CardSearch, EnrolledProgram, ScheduleFilter, ScheduleOwner, TraineeUpdate,
};
use crate::env::Config;
use crate::error::AppError;
use crate::models::{Metric, MetricType, Schedule, ScheduleStatus, SessionCard, TraineeProfile};
use crate::stats::{normalize_window_days, UpcomingSchedules};
use crate::validation::{
    validate_string_list, ApiResponse, ApiResult, JsonValidateExt, PageParams, Paginated,
};

use super::shared::TraineeStatsResponse;
use super::{now, parse_date, parse_filter};

pub fn routes() -> Vec<Route> {
    routes![
        api_upcoming_schedules,
        api_list_schedules,
        api_get_schedule,
        api_current_program,
        api_list_programs,
        api_get_program,
        api_stats,
        api_list_sessions,
        api_search_sessions,
        api_get_session,
        api_list_metrics,
        api_get_profile,
        api_update_profile
    ]
}

#[derive(Debug, FromForm)]
pub struct ScheduleQuery<'r> {
    #[field(name = "traineeId")]
    pub trainee_id: Option<i64>,
    pub status: Option<&'r str>,
    pub from: Option<&'r str>,
    pub to: Option<&'r str>,
    pub page: Option<i64>,
    #[field(name = "pageSize")]
    pub page_size: Option<i64>,
}

impl ScheduleQuery<'_> {
    pub fn filter(&self) -> Result<ScheduleFilter, AppError> {
        Ok(ScheduleFilter {
            trainee_id: self.trainee_id,
            status: parse_filter::<ScheduleStatus>("status", self.status)?,
            from: parse_date("from", self.from)?,
            to: parse_date("to", self.to)?,
        })
    }

    pub fn paging(&self) -> PageParams {
        PageParams {
            page: self.page,
            page_size: self.page_size,
        }
    }
}

#[derive(Debug, FromForm)]
pub struct SessionSearchQuery<'r> {
    #[field(name = "fromDate")]
    pub from_date: Option<&'r str>,
    #[field(name = "toDate")]
    pub to_date: Option<&'r str>,
    pub category: Option<&'r str>,
    #[field(name = "exerciseName")]
    pub exercise_name: Option<&'r str>,
    pub page: Option<i64>,
    #[field(name = "pageSize")]
    pub page_size: Option<i64>,
}

impl SessionSearchQuery<'_> {
    pub fn search(&self) -> Result<CardSearch, AppError> {
        let text = |value: Option<&str>| {
            value
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Ok(CardSearch {
            from: parse_date("fromDate", self.from_date)?,
            to: parse_date("toDate", self.to_date)?,
            category: text(self.category),
            exercise_name: text(self.exercise_name),
        })
    }
}

#[derive(Debug, FromForm)]
pub struct MetricQuery<'r> {
    #[field(name = "type")]
    pub kind: Option<&'r str>,
    pub from: Option<&'r str>,
    pub to: Option<&'r str>,
}

/// Fields a trainee may change on their own profile.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTraineeProfileRequest {
    #[validate(range(min = 50.0, max = 300.0, message = "Height must be 50-300 cm"))]
    pub height: Option<f64>,
    #[validate(custom(function = "validate_string_list"))]
    pub goals: Option<Vec<String>>,
    #[validate(length(max = 2000))]
    pub medical_notes: Option<String>,
}

#[get("/schedules/upcoming?<days>")]
pub async fn api_upcoming_schedules(
    trainee: TraineeUser,
    days: Option<&str>,
    db: &State<Pool<Sqlite>>,
    config: &State<Config>,
) -> ApiResult<UpcomingSchedules> {
    trainee
        .identity
        .require_permission(Permission::ViewOwnSchedules)?;

    let days = normalize_window_days(
        days.and_then(|d| d.trim().parse().ok()),
        config.default_upcoming_days,
    );

    Ok(ApiResponse::ok(
        upcoming_schedules(db, trainee.trainee_id, now(), days).await?,
    ))
}

#[get("/schedules?<query..>")]
pub async fn api_list_schedules(
    trainee: TraineeUser,
    query: ScheduleQuery<'_>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Paginated<Schedule>> {
    let page = query.paging().resolve()?;
    // a trainee only ever sees their own schedules
    let filter = ScheduleFilter {
        trainee_id: None,
        ..query.filter()?
    };

    let (schedules, total) =
        list_schedules(db, ScheduleOwner::Trainee(trainee.trainee_id), filter, page).await?;

    Ok(ApiResponse::ok(Paginated::new(schedules, page, total)))
}

#[get("/schedules/<id>")]
pub async fn api_get_schedule(
    id: i64,
    trainee: TraineeUser,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Schedule> {
    Ok(ApiResponse::ok(
        get_schedule_for_trainee(db, trainee.trainee_id, id).await?,
    ))
}

#[get("/programs/current")]
pub async fn api_current_program(
    trainee: TraineeUser,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Option<EnrolledProgram>> {
    Ok(ApiResponse::ok(current_program(db, trainee.trainee_id).await?))
}

#[get("/programs")]
pub async fn api_list_programs(
    trainee: TraineeUser,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<EnrolledProgram>> {
    Ok(ApiResponse::ok(
        enrolled_programs(db, trainee.trainee_id).await?,
    ))
}

#[get("/programs/<id>")]
pub async fn api_get_program(
    id: i64,
    trainee: TraineeUser,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<EnrolledProgram> {
    Ok(ApiResponse::ok(
        enrolled_program(db, trainee.trainee_id, id).await?,
    ))
}

#[get("/stats")]
pub async fn api_stats(
    trainee: TraineeUser,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<TraineeStatsResponse> {
    trainee
        .identity
        .require_permission(Permission::ViewOwnProgress)?;

    let at = now();
    let stats = trainee_stats(db, trainee.trainee_id, at).await?;
    let current_program = current_program(db, trainee.trainee_id).await?;
    let next_session = next_schedule(db, trainee.trainee_id, at).await?;

    Ok(ApiResponse::ok(TraineeStatsResponse {
        stats,
        current_program,
        next_session,
    }))
}

#[get("/sessions?<paging..>")]
pub async fn api_list_sessions(
    trainee: TraineeUser,
    paging: PageParams,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Paginated<SessionCard>> {
    let page = paging.resolve()?;

    let (cards, total) =
        list_session_cards(db, CardOwner::Trainee(trainee.trainee_id), None, page).await?;

    Ok(ApiResponse::ok(Paginated::new(cards, page, total)))
}

#[get("/sessions/search?<query..>")]
pub async fn api_search_sessions(
    trainee: TraineeUser,
    query: SessionSearchQuery<'_>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Paginated<SessionCard>> {
    let page = PageParams {
        page: query.page,
        page_size: query.page_size,
    }
    .resolve()?;
    let search = query.search()?;

    let (cards, total) =
        search_session_cards(db, CardOwner::Trainee(trainee.trainee_id), &search, page).await?;

    Ok(ApiResponse::ok(Paginated::new(cards, page, total)))
}

#[get("/sessions/<id>")]
pub async fn api_get_session(
    id: i64,
    trainee: TraineeUser,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<SessionCard> {
    Ok(ApiResponse::ok(
        get_session_card_for(db, CardOwner::Trainee(trainee.trainee_id), id).await?,
    ))
}

#[get("/metrics?<query..>")]
pub async fn api_list_metrics(
    trainee: TraineeUser,
    query: MetricQuery<'_>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<Metric>> {
    let metric_type = parse_filter::<MetricType>("type", query.kind)?;
    let from = parse_date("from", query.from)?;
    let to = parse_date("to", query.to)?;

    Ok(ApiResponse::ok(
        list_metrics(db, trainee.trainee_id, metric_type, from, to).await?,
    ))
}

#[get("/me")]
pub async fn api_get_profile(
    trainee: TraineeUser,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<TraineeProfile> {
    Ok(ApiResponse::ok(get_trainee(db, trainee.trainee_id).await?))
}

#[patch("/me", data = "<request>")]
pub async fn api_update_profile(
    trainee: TraineeUser,
    request: Json<UpdateTraineeProfileRequest>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<TraineeProfile> {
    trainee
        .identity
        .require_permission(Permission::EditOwnProfile)?;
    let request = request.validated()?;

    let update = TraineeUpdate {
        height: request.height,
        goals: request.goals,
        medical_notes: request.medical_notes,
        ..Default::default()
    };

    Ok(ApiResponse::ok_with_message(
        update_trainee(db, trainee.trainee_id, &update).await?,
        "Profile updated",
    ))
}
