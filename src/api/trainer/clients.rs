use chrono::NaiveDate;
use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::api::trainee::MetricQuery;
use crate::api::{now, parse_date, parse_filter};
use crate::auth::{Permission, Role, TrainerUser};
use crate::db::{
    create_notification, create_user, current_program, get_identity, get_trainee_for_trainer,
    list_metrics, list_session_cards, list_trainees_for_trainer, next_schedule, record_metric,
    unassign_trainee, update_trainee, CardOwner, EnrolledProgram, NewMetric, NewUser,
    TraineeUpdate,
};
use crate::env::Config;
use crate::error::AppError;
use crate::models::{
    Metric, MetricType, NewNotification, Notification, NotificationType, Priority, Schedule,
    SessionCard, SkillLevel, TraineeProfile, TraineeStatus,
};
use crate::validation::{
    validate_password, validate_string_list, ApiResponse, ApiResult, JsonValidateExt, PageParams,
    Paginated, PHONE_NUMBER,
};

pub fn routes() -> Vec<Route> {
    routes![
        api_list_clients,
        api_get_client,
        api_create_client,
        api_update_client,
        api_remove_client,
        api_client_metrics,
        api_record_client_metric,
        api_client_sessions,
        api_notify_client
    ]
}

#[derive(Debug, FromForm)]
pub struct ClientQuery<'r> {
    pub search: Option<&'r str>,
    pub status: Option<&'r str>,
    pub page: Option<i64>,
    #[field(name = "pageSize")]
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateClientRequest {
    #[validate(email(message = "Must be a valid email address"))]
    pub email: String,
    #[validate(custom(function = "validate_password"))]
    pub password: String,
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    #[validate(regex(path = *PHONE_NUMBER, message = "Invalid phone number"))]
    pub phone_number: Option<String>,
    #[validate(range(min = 50.0, max = 300.0, message = "Height must be 50-300 cm"))]
    pub height: Option<f64>,
    #[validate(range(min = 20.0, max = 500.0, message = "Weight must be 20-500 kg"))]
    pub weight: Option<f64>,
    #[serde(default)]
    #[validate(custom(function = "validate_string_list"))]
    pub goals: Vec<String>,
    pub fitness_level: Option<SkillLevel>,
    #[validate(length(max = 2000))]
    pub medical_notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClientRequest {
    #[validate(range(min = 50.0, max = 300.0, message = "Height must be 50-300 cm"))]
    pub height: Option<f64>,
    #[validate(range(min = 20.0, max = 500.0, message = "Weight must be 20-500 kg"))]
    pub weight: Option<f64>,
    #[validate(custom(function = "validate_string_list"))]
    pub goals: Option<Vec<String>>,
    pub fitness_level: Option<SkillLevel>,
    #[validate(length(max = 2000))]
    pub medical_notes: Option<String>,
    pub status: Option<TraineeStatus>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetricRequest {
    pub recorded_on: Option<NaiveDate>,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    #[validate(range(exclusive_min = 0.0, message = "Value must be positive"))]
    pub value: f64,
    #[validate(length(min = 1, max = 20, message = "Unit must be 1-20 characters"))]
    pub unit: String,
    #[validate(length(max = 50))]
    pub measurement_type: Option<String>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NotifyClientRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 2000, message = "Message must be 1-2000 characters"))]
    pub message: String,
    #[serde(rename = "type")]
    pub notification_type: Option<NotificationType>,
    #[serde(default)]
    pub priority: Priority,
    pub action_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDetail {
    pub client: TraineeProfile,
    pub current_program: Option<EnrolledProgram>,
    pub next_session: Option<Schedule>,
}

#[get("/clients?<query..>")]
pub async fn api_list_clients(
    trainer: TrainerUser,
    query: ClientQuery<'_>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Paginated<TraineeProfile>> {
    let page = PageParams {
        page: query.page,
        page_size: query.page_size,
    }
    .resolve()?;
    let status = parse_filter::<TraineeStatus>("status", query.status)?;
    let search = query.search.filter(|s| !s.trim().is_empty());

    let (clients, total) =
        list_trainees_for_trainer(db, trainer.trainer_id, search, status, page).await?;

    Ok(ApiResponse::ok(Paginated::new(clients, page, total)))
}

#[get("/clients/<id>")]
pub async fn api_get_client(
    id: i64,
    trainer: TrainerUser,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<ClientDetail> {
    let client = get_trainee_for_trainer(db, trainer.trainer_id, id).await?;
    let current_program = current_program(db, client.id).await?;
    let next_session = next_schedule(db, client.id, now()).await?;

    Ok(ApiResponse::ok(ClientDetail {
        client,
        current_program,
        next_session,
    }))
}

/// Creates a trainee account already assigned to the calling trainer.
#[post("/clients", data = "<request>")]
pub async fn api_create_client(
    trainer: TrainerUser,
    request: Json<CreateClientRequest>,
    db: &State<Pool<Sqlite>>,
    config: &State<Config>,
) -> ApiResult<TraineeProfile> {
    trainer
        .identity
        .require_permission(Permission::ManageClients)?;
    let request = request.validated()?;

    let user_id = create_user(
        db,
        &NewUser {
            email: request.email,
            password: request.password,
            name: request.name,
            role: Role::Trainee,
            phone_number: request.phone_number,
            trainer_id: Some(trainer.trainer_id),
        },
        config.bcrypt_cost,
    )
    .await?;

    let trainee_id = get_identity(db, user_id)
        .await?
        .trainee_id
        .ok_or_else(|| AppError::Internal(format!("User {} has no trainee profile", user_id)))?;

    let update = TraineeUpdate {
        height: request.height,
        weight: request.weight,
        goals: Some(request.goals),
        fitness_level: request.fitness_level,
        medical_notes: request.medical_notes,
        status: None,
    };

    Ok(ApiResponse::ok_with_message(
        update_trainee(db, trainee_id, &update).await?,
        "Client created",
    ))
}

#[patch("/clients/<id>", data = "<request>")]
pub async fn api_update_client(
    id: i64,
    trainer: TrainerUser,
    request: Json<UpdateClientRequest>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<TraineeProfile> {
    trainer
        .identity
        .require_permission(Permission::ManageClients)?;
    let request = request.validated()?;
    get_trainee_for_trainer(db, trainer.trainer_id, id).await?;

    let update = TraineeUpdate {
        height: request.height,
        weight: request.weight,
        goals: request.goals,
        fitness_level: request.fitness_level,
        medical_notes: request.medical_notes,
        status: request.status,
    };

    Ok(ApiResponse::ok_with_message(
        update_trainee(db, id, &update).await?,
        "Client updated",
    ))
}

#[delete("/clients/<id>")]
pub async fn api_remove_client(
    id: i64,
    trainer: TrainerUser,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<()> {
    trainer
        .identity
        .require_permission(Permission::ManageClients)?;
    unassign_trainee(db, trainer.trainer_id, id).await?;

    Ok(ApiResponse::message("Client removed"))
}

#[get("/clients/<id>/metrics?<query..>")]
pub async fn api_client_metrics(
    id: i64,
    trainer: TrainerUser,
    query: MetricQuery<'_>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Vec<Metric>> {
    get_trainee_for_trainer(db, trainer.trainer_id, id).await?;

    let metric_type = parse_filter::<MetricType>("type", query.kind)?;
    let from = parse_date("from", query.from)?;
    let to = parse_date("to", query.to)?;

    Ok(ApiResponse::ok(
        list_metrics(db, id, metric_type, from, to).await?,
    ))
}

#[post("/clients/<id>/metrics", data = "<request>")]
pub async fn api_record_client_metric(
    id: i64,
    trainer: TrainerUser,
    request: Json<RecordMetricRequest>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Metric> {
    trainer
        .identity
        .require_permission(Permission::RecordMetrics)?;
    let request = request.validated()?;
    get_trainee_for_trainer(db, trainer.trainer_id, id).await?;

    let metric = NewMetric {
        recorded_on: request.recorded_on.unwrap_or_else(|| now().date()),
        metric_type: request.metric_type,
        value: request.value,
        unit: request.unit,
        measurement_type: request.measurement_type,
        notes: request.notes,
    };

    Ok(ApiResponse::ok_with_message(
        record_metric(db, id, trainer.identity.user_id, &metric).await?,
        "Metric recorded",
    ))
}

#[get("/clients/<id>/sessions?<paging..>")]
pub async fn api_client_sessions(
    id: i64,
    trainer: TrainerUser,
    paging: PageParams,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Paginated<SessionCard>> {
    let page = paging.resolve()?;
    get_trainee_for_trainer(db, trainer.trainer_id, id).await?;

    let (cards, total) =
        list_session_cards(db, CardOwner::Trainer(trainer.trainer_id), Some(id), page).await?;

    Ok(ApiResponse::ok(Paginated::new(cards, page, total)))
}

#[post("/clients/<id>/notifications", data = "<request>")]
pub async fn api_notify_client(
    id: i64,
    trainer: TrainerUser,
    request: Json<NotifyClientRequest>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Notification> {
    trainer
        .identity
        .require_permission(Permission::SendNotifications)?;
    let request = request.validated()?;
    let client = get_trainee_for_trainer(db, trainer.trainer_id, id).await?;

    let notification = create_notification(
        db,
        &NewNotification {
            user_id: client.user_id,
            notification_type: request
                .notification_type
                .unwrap_or(NotificationType::Message),
            title: request.title,
            message: request.message,
            related_id: Some(trainer.trainer_id),
            related_type: Some("trainer".to_string()),
            action_url: request.action_url,
            priority: request.priority,
        },
    )
    .await?;

    Ok(ApiResponse::ok_with_message(notification, "Notification sent"))
}
