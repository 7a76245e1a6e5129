pub mod analytics;
pub mod clients;
pub mod exercises;
pub mod programs;
pub mod schedules;
pub mod sessions;

use rocket::{Route, State};
use sqlx::{Pool, Sqlite};

use crate::auth::TrainerUser;
use crate::db::{count_clients, trainer_schedule_facts};
use crate::stats::{trainer_dashboard, TrainerDashboard};
use crate::validation::{ApiResponse, ApiResult};

use super::now;

pub fn routes() -> Vec<Route> {
    let mut routes = routes![api_dashboard_stats];
    routes.extend(clients::routes());
    routes.extend(schedules::routes());
    routes.extend(sessions::routes());
    routes.extend(programs::routes());
    routes.extend(exercises::routes());
    routes.extend(analytics::routes());
    routes
}

#[get("/dashboard/stats")]
pub async fn api_dashboard_stats(
    trainer: TrainerUser,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<TrainerDashboard> {
    let (total_clients, active_clients) = count_clients(db, trainer.trainer_id).await?;
    let rows = trainer_schedule_facts(db, trainer.trainer_id).await?;

    Ok(ApiResponse::ok(trainer_dashboard(
        &rows,
        total_clients,
        active_clients,
        now(),
    )))
}
