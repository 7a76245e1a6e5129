use chrono::NaiveDate;
use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::Deserialize;
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::api::{now, parse_filter};
use crate::auth::{Permission, TrainerUser};
use crate::db::{
    assign_program, create_program, delete_program, get_program_for_trainer,
    get_trainee_for_trainer, list_programs_for_trainer, update_program, ProgramInput,
    ProgramUpdate,
};
use crate::models::{Program, ProgramAssignment, ProgramStatus, SkillLevel};
use crate::validation::{
    validate_string_list, ApiResponse, ApiResult, JsonValidateExt, PageParams, Paginated,
};

pub fn routes() -> Vec<Route> {
    routes![
        api_list_programs,
        api_get_program,
        api_create_program,
        api_update_program,
        api_delete_program,
        api_assign_program
    ]
}

#[derive(Debug, FromForm)]
pub struct ProgramQuery<'r> {
    pub status: Option<&'r str>,
    pub page: Option<i64>,
    #[field(name = "pageSize")]
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProgramRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(range(min = 1, max = 104, message = "Programs run 1-104 weeks"))]
    pub total_weeks: i64,
    #[validate(range(min = 1, max = 14, message = "Sessions per week must be 1-14"))]
    pub sessions_per_week: i64,
    #[serde(default)]
    #[validate(custom(function = "validate_string_list"))]
    pub goals: Vec<String>,
    pub target_fitness_level: Option<SkillLevel>,
    pub status: Option<ProgramStatus>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProgramRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(range(min = 1, max = 104, message = "Programs run 1-104 weeks"))]
    pub total_weeks: Option<i64>,
    #[validate(range(min = 1, max = 14, message = "Sessions per week must be 1-14"))]
    pub sessions_per_week: Option<i64>,
    #[validate(custom(function = "validate_string_list"))]
    pub goals: Option<Vec<String>>,
    pub target_fitness_level: Option<SkillLevel>,
    pub status: Option<ProgramStatus>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AssignProgramRequest {
    pub trainee_id: i64,
    pub start_date: Option<NaiveDate>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[get("/programs?<query..>")]
pub async fn api_list_programs(
    trainer: TrainerUser,
    query: ProgramQuery<'_>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Paginated<Program>> {
    let page = PageParams {
        page: query.page,
        page_size: query.page_size,
    }
    .resolve()?;
    let status = parse_filter::<ProgramStatus>("status", query.status)?;

    let (programs, total) =
        list_programs_for_trainer(db, trainer.trainer_id, status, page).await?;

    Ok(ApiResponse::ok(Paginated::new(programs, page, total)))
}

#[get("/programs/<id>")]
pub async fn api_get_program(
    id: i64,
    trainer: TrainerUser,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Program> {
    Ok(ApiResponse::ok(
        get_program_for_trainer(db, trainer.trainer_id, id).await?,
    ))
}

#[post("/programs", data = "<request>")]
pub async fn api_create_program(
    trainer: TrainerUser,
    request: Json<CreateProgramRequest>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Program> {
    trainer
        .identity
        .require_permission(Permission::ManagePrograms)?;
    let request = request.validated()?;

    let input = ProgramInput {
        name: request.name,
        description: request.description,
        total_weeks: request.total_weeks,
        sessions_per_week: request.sessions_per_week,
        goals: request.goals,
        target_fitness_level: request.target_fitness_level,
        status: request.status.unwrap_or(ProgramStatus::Active),
    };

    Ok(ApiResponse::ok_with_message(
        create_program(db, trainer.trainer_id, &input).await?,
        "Program created",
    ))
}

#[patch("/programs/<id>", data = "<request>")]
pub async fn api_update_program(
    id: i64,
    trainer: TrainerUser,
    request: Json<UpdateProgramRequest>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Program> {
    trainer
        .identity
        .require_permission(Permission::ManagePrograms)?;
    let request = request.validated()?;

    let update = ProgramUpdate {
        name: request.name,
        description: request.description,
        total_weeks: request.total_weeks,
        sessions_per_week: request.sessions_per_week,
        goals: request.goals,
        target_fitness_level: request.target_fitness_level,
        status: request.status,
    };

    Ok(ApiResponse::ok_with_message(
        update_program(db, trainer.trainer_id, id, &update).await?,
        "Program updated",
    ))
}

#[delete("/programs/<id>")]
pub async fn api_delete_program(
    id: i64,
    trainer: TrainerUser,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<()> {
    trainer
        .identity
        .require_permission(Permission::ManagePrograms)?;
    delete_program(db, trainer.trainer_id, id).await?;

    Ok(ApiResponse::message("Program deleted"))
}

#[post("/programs/<id>/assign", data = "<request>")]
pub async fn api_assign_program(
    id: i64,
    trainer: TrainerUser,
    request: Json<AssignProgramRequest>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<ProgramAssignment> {
    trainer
        .identity
        .require_permission(Permission::ManagePrograms)?;
    let request = request.validated()?;
    get_trainee_for_trainer(db, trainer.trainer_id, request.trainee_id).await?;

    let assignment = assign_program(
        db,
        trainer.trainer_id,
        id,
        request.trainee_id,
        request.start_date.unwrap_or_else(|| now().date()),
        request.notes.as_deref(),
    )
    .await?;

    Ok(ApiResponse::ok_with_message(assignment, "Program assigned"))
}
