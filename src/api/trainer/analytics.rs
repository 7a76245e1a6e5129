use chrono::Duration;
use rocket::{Route, State};
use sqlx::{Pool, Sqlite};

use crate::api::now;
use crate::auth::{Permission, TrainerUser};
use crate::db::{
    exercise_set_rows, get_trainee_for_trainer, list_metrics, trainee_schedule_facts,
    trainer_client_facts, trainer_schedule_facts, CardOwner,
};
use crate::stats::{
    analytics_overview, client_analytics, AnalyticsOverview, ClientAnalytics,
    DEFAULT_ANALYTICS_WEEKS, MAX_ANALYTICS_WEEKS,
};
use crate::validation::{ApiResponse, ApiResult};

pub fn routes() -> Vec<Route> {
    routes![api_analytics_overview, api_client_analytics]
}

/// Practice-wide figures over the last `weeks` weeks (default 8, at most 52).
#[get("/analytics/overview?<weeks>")]
pub async fn api_analytics_overview(
    trainer: TrainerUser,
    weeks: Option<&str>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<AnalyticsOverview> {
    trainer
        .identity
        .require_permission(Permission::ViewAnalytics)?;

    let weeks = weeks
        .and_then(|w| w.trim().parse::<i64>().ok())
        .filter(|w| *w >= 1)
        .unwrap_or(DEFAULT_ANALYTICS_WEEKS)
        .min(MAX_ANALYTICS_WEEKS);

    let at = now();
    let since = at.date() - Duration::weeks(weeks);
    let schedules = trainer_schedule_facts(db, trainer.trainer_id).await?;
    let clients = trainer_client_facts(db, trainer.trainer_id).await?;
    let exercises =
        exercise_set_rows(db, CardOwner::Trainer(trainer.trainer_id), Some(since)).await?;

    Ok(ApiResponse::ok(analytics_overview(
        &schedules, &clients, &exercises, at, weeks,
    )))
}

#[get("/analytics/clients/<id>")]
pub async fn api_client_analytics(
    id: i64,
    trainer: TrainerUser,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<ClientAnalytics> {
    trainer
        .identity
        .require_permission(Permission::ViewAnalytics)?;
    let client = get_trainee_for_trainer(db, trainer.trainer_id, id).await?;

    let schedules = {
        let mut conn = db.acquire().await?;
        trainee_schedule_facts(&mut conn, client.id).await?
    };
    let metrics = list_metrics(db, client.id, None, None, None).await?;
    let exercises = exercise_set_rows(db, CardOwner::Trainee(client.id), None).await?;

    Ok(ApiResponse::ok(client_analytics(
        &client, &schedules, &metrics, &exercises,
    )))
}
