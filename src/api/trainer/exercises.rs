use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::Deserialize;
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::auth::{Permission, TrainerUser};
use crate::db::{
    create_exercise, delete_exercise, get_exercise, list_exercises, update_exercise,
    ExerciseInput, ExerciseUpdate,
};
use crate::error::AppError;
use crate::models::{Exercise, SkillLevel};
use crate::validation::{
    validate_string_list, ApiResponse, ApiResult, JsonValidateExt, PageParams, Paginated,
};

pub fn routes() -> Vec<Route> {
    routes![
        api_list_exercises,
        api_get_exercise,
        api_create_exercise,
        api_update_exercise,
        api_delete_exercise
    ]
}

#[derive(Debug, FromForm)]
pub struct ExerciseQuery<'r> {
    pub category: Option<&'r str>,
    pub search: Option<&'r str>,
    pub page: Option<i64>,
    #[field(name = "pageSize")]
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateExerciseRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 50, message = "Category must be 1-50 characters"))]
    pub category: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "validate_string_list"))]
    pub muscle_groups: Vec<String>,
    #[serde(default)]
    #[validate(custom(function = "validate_string_list"))]
    pub equipment: Vec<String>,
    pub difficulty: Option<SkillLevel>,
    #[validate(length(max = 5000))]
    pub instructions: Option<String>,
    #[validate(url(message = "Must be a valid URL"))]
    pub video_url: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateExerciseRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 50, message = "Category must be 1-50 characters"))]
    pub category: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(custom(function = "validate_string_list"))]
    pub muscle_groups: Option<Vec<String>>,
    #[validate(custom(function = "validate_string_list"))]
    pub equipment: Option<Vec<String>>,
    pub difficulty: Option<SkillLevel>,
    #[validate(length(max = 5000))]
    pub instructions: Option<String>,
    #[validate(url(message = "Must be a valid URL"))]
    pub video_url: Option<String>,
    pub is_public: Option<bool>,
}

#[get("/exercises?<query..>")]
pub async fn api_list_exercises(
    trainer: TrainerUser,
    query: ExerciseQuery<'_>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Paginated<Exercise>> {
    let page = PageParams {
        page: query.page,
        page_size: query.page_size,
    }
    .resolve()?;
    let category = query.category.filter(|c| !c.trim().is_empty());
    let search = query.search.filter(|s| !s.trim().is_empty());

    let (exercises, total) =
        list_exercises(db, trainer.trainer_id, category, search, page).await?;

    Ok(ApiResponse::ok(Paginated::new(exercises, page, total)))
}

#[get("/exercises/<id>")]
pub async fn api_get_exercise(
    id: i64,
    trainer: TrainerUser,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Exercise> {
    let exercise = get_exercise(db, id).await?;

    // private entries of other trainers are reported as absent
    if !exercise.is_public && exercise.trainer_id != Some(trainer.trainer_id) {
        return Err(AppError::NotFound(format!("Exercise {} not found", id)));
    }

    Ok(ApiResponse::ok(exercise))
}

#[post("/exercises", data = "<request>")]
pub async fn api_create_exercise(
    trainer: TrainerUser,
    request: Json<CreateExerciseRequest>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Exercise> {
    trainer
        .identity
        .require_permission(Permission::ManageExercises)?;
    let request = request.validated()?;

    let input = ExerciseInput {
        name: request.name,
        category: request.category,
        description: request.description,
        muscle_groups: request.muscle_groups,
        equipment: request.equipment,
        difficulty: request.difficulty,
        instructions: request.instructions,
        video_url: request.video_url,
        is_public: request.is_public,
    };

    Ok(ApiResponse::ok_with_message(
        create_exercise(db, trainer.trainer_id, &input).await?,
        "Exercise created",
    ))
}

#[patch("/exercises/<id>", data = "<request>")]
pub async fn api_update_exercise(
    id: i64,
    trainer: TrainerUser,
    request: Json<UpdateExerciseRequest>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Exercise> {
    trainer
        .identity
        .require_permission(Permission::ManageExercises)?;
    let request = request.validated()?;

    let update = ExerciseUpdate {
        name: request.name,
        category: request.category,
        description: request.description,
        muscle_groups: request.muscle_groups,
        equipment: request.equipment,
        difficulty: request.difficulty,
        instructions: request.instructions,
        video_url: request.video_url,
        is_public: request.is_public,
    };

    Ok(ApiResponse::ok_with_message(
        update_exercise(db, trainer.trainer_id, id, &update).await?,
        "Exercise updated",
    ))
}

#[delete("/exercises/<id>")]
pub async fn api_delete_exercise(
    id: i64,
    trainer: TrainerUser,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<()> {
    trainer
        .identity
        .require_permission(Permission::ManageExercises)?;
    delete_exercise(db, trainer.trainer_id, id).await?;

    Ok(ApiResponse::message("Exercise deleted"))
}
