use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::api::now;
use crate::auth::{Permission, TrainerUser};
use crate::db::{
    create_session_card, delete_session_card, get_exercise, get_session_card_for,
    list_session_cards, update_session_card, CardOwner, NewExerciseSet, NewSessionCard,
    NewSessionExercise, SessionCardUpdate,
};
use crate::error::AppError;
use crate::models::SessionCard;
use crate::validation::{
    validate_string_list, ApiResponse, ApiResult, JsonValidateExt, PageParams, Paginated,
};

pub fn routes() -> Vec<Route> {
    routes![
        api_list_sessions,
        api_get_session,
        api_create_session,
        api_update_session,
        api_delete_session
    ]
}

fn default_completed() -> bool {
    true
}

#[derive(Debug, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SetEntry {
    #[validate(range(min = 0, max = 1000))]
    pub reps: Option<i64>,
    #[validate(range(min = 0.0, max = 2000.0))]
    pub weight: Option<f64>,
    #[validate(range(min = 0, max = 86400))]
    pub duration_seconds: Option<i64>,
    #[validate(range(min = 0.0))]
    pub distance: Option<f64>,
    #[validate(range(min = 0, max = 3600))]
    pub rest_seconds: Option<i64>,
    #[serde(default = "default_completed")]
    pub completed: bool,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseEntry {
    /// Library entry this exercise was picked from. Name and category
    /// default to the library's when omitted.
    pub exercise_id: Option<i64>,
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(max = 50))]
    pub category: Option<String>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    #[validate(length(max = 1000))]
    pub form_notes: Option<String>,
    #[serde(default)]
    pub is_pr: bool,
    #[validate(length(max = 200))]
    pub pr_note: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub sets: Vec<SetEntry>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub schedule_id: i64,
    #[validate(length(max = 5000))]
    pub overall_feedback: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "validate_string_list"))]
    pub next_session_goals: Vec<String>,
    #[validate(range(min = 1, max = 5, message = "Rating must be 1-5"))]
    pub trainer_rating: Option<i64>,
    #[validate(range(min = 1, max = 5, message = "Rating must be 1-5"))]
    pub trainee_rating: Option<i64>,
    #[validate(length(min = 1, message = "At least one exercise is required"))]
    #[validate(nested)]
    pub exercises: Vec<ExerciseEntry>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSessionRequest {
    #[validate(length(max = 5000))]
    pub overall_feedback: Option<String>,
    #[validate(custom(function = "validate_string_list"))]
    pub next_session_goals: Option<Vec<String>>,
    #[validate(range(min = 1, max = 5, message = "Rating must be 1-5"))]
    pub trainer_rating: Option<i64>,
    #[validate(range(min = 1, max = 5, message = "Rating must be 1-5"))]
    pub trainee_rating: Option<i64>,
}

#[derive(Debug, FromForm)]
pub struct SessionQuery {
    #[field(name = "traineeId")]
    pub trainee_id: Option<i64>,
    pub page: Option<i64>,
    #[field(name = "pageSize")]
    pub page_size: Option<i64>,
}

async fn resolve_exercise(
    db: &Pool<Sqlite>,
    trainer_id: i64,
    entry: ExerciseEntry,
) -> Result<NewSessionExercise, AppError> {
    let (name, category) = match (entry.exercise_id, entry.name) {
        (Some(id), name) => {
            let library = get_exercise(db, id).await?;
            if !library.is_public && library.trainer_id != Some(trainer_id) {
                return Err(AppError::NotFound(format!("Exercise {} not found", id)));
            }
            (
                name.unwrap_or(library.name),
                entry.category.or(Some(library.category)),
            )
        }
        (None, Some(name)) => (name, entry.category),
        (None, None) => {
            return Err(AppError::Validation(
                "Each exercise needs a name or an exerciseId".to_string(),
            ))
        }
    };

    Ok(NewSessionExercise {
        exercise_library_id: entry.exercise_id,
        name,
        category,
        notes: entry.notes,
        form_notes: entry.form_notes,
        is_pr: entry.is_pr,
        pr_note: entry.pr_note,
        sets: entry
            .sets
            .into_iter()
            .map(|set| NewExerciseSet {
                reps: set.reps,
                weight: set.weight,
                duration_seconds: set.duration_seconds,
                distance: set.distance,
                rest_seconds: set.rest_seconds,
                completed: set.completed,
                notes: set.notes,
            })
            .collect(),
    })
}

#[get("/sessions?<query..>")]
pub async fn api_list_sessions(
    trainer: TrainerUser,
    query: SessionQuery,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Paginated<SessionCard>> {
    let page = PageParams {
        page: query.page,
        page_size: query.page_size,
    }
    .resolve()?;

    let (cards, total) = list_session_cards(
        db,
        CardOwner::Trainer(trainer.trainer_id),
        query.trainee_id,
        page,
    )
    .await?;

    Ok(ApiResponse::ok(Paginated::new(cards, page, total)))
}

#[get("/sessions/<id>")]
pub async fn api_get_session(
    id: i64,
    trainer: TrainerUser,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<SessionCard> {
    Ok(ApiResponse::ok(
        get_session_card_for(db, CardOwner::Trainer(trainer.trainer_id), id).await?,
    ))
}

/// Records a session card, which is also what completes the schedule.
#[post("/sessions", data = "<request>")]
pub async fn api_create_session(
    trainer: TrainerUser,
    request: Json<CreateSessionRequest>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<SessionCard> {
    trainer
        .identity
        .require_permission(Permission::ManageSessionCards)?;
    let request = request.validated()?;

    let mut exercises = Vec::with_capacity(request.exercises.len());
    for entry in request.exercises {
        exercises.push(resolve_exercise(db, trainer.trainer_id, entry).await?);
    }

    let card = NewSessionCard {
        schedule_id: request.schedule_id,
        overall_feedback: request.overall_feedback,
        next_session_goals: request.next_session_goals,
        trainer_rating: request.trainer_rating,
        trainee_rating: request.trainee_rating,
        exercises,
    };

    Ok(ApiResponse::ok_with_message(
        create_session_card(db, trainer.trainer_id, &card, now()).await?,
        "Session recorded",
    ))
}

#[patch("/sessions/<id>", data = "<request>")]
pub async fn api_update_session(
    id: i64,
    trainer: TrainerUser,
    request: Json<UpdateSessionRequest>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<SessionCard> {
    trainer
        .identity
        .require_permission(Permission::ManageSessionCards)?;
    let request = request.validated()?;

    let update = SessionCardUpdate {
        overall_feedback: request.overall_feedback,
        next_session_goals: request.next_session_goals,
        trainer_rating: request.trainer_rating,
        trainee_rating: request.trainee_rating,
    };

    Ok(ApiResponse::ok_with_message(
        update_session_card(db, trainer.trainer_id, id, &update).await?,
        "Session updated",
    ))
}

#[delete("/sessions/<id>")]
pub async fn api_delete_session(
    id: i64,
    trainer: TrainerUser,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<()> {
    trainer
        .identity
        .require_permission(Permission::ManageSessionCards)?;
    delete_session_card(db, trainer.trainer_id, id, now()).await?;

    Ok(ApiResponse::message("Session deleted"))
}
