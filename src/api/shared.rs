use rocket::{Route, State};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};

use crate::auth::{ensure_owner, ensure_trainee_access, Identity, Permission, Role};
use crate::db::{
    current_program, get_trainee, list_notifications, mark_all_notifications_read,
    mark_notification_read, next_schedule, trainee_stats, upcoming_schedules, EnrolledProgram,
    NotificationFilter, NotificationPage,
};
use crate::env::Config;
use crate::error::AppError;
use crate::models::{NotificationType, Schedule, TraineeProfile};
use crate::stats::{normalize_window_days, TraineeStats, UpcomingSchedules};
use crate::validation::{ApiResponse, ApiResult, PageParams};

use super::{now, parse_filter};

pub fn routes() -> Vec<Route> {
    routes![
        api_list_notifications,
        api_mark_notification_read,
        api_mark_all_notifications_read,
        api_trainee_stats,
        api_trainee_upcoming
    ]
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraineeStatsResponse {
    pub stats: TraineeStats,
    pub current_program: Option<EnrolledProgram>,
    pub next_session: Option<Schedule>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAllResponse {
    pub updated: u64,
}

#[derive(Debug, FromForm)]
pub struct NotificationQuery<'r> {
    #[field(name = "unreadOnly")]
    pub unread_only: Option<bool>,
    #[field(name = "type")]
    pub kind: Option<&'r str>,
    pub page: Option<i64>,
    #[field(name = "pageSize")]
    pub page_size: Option<i64>,
}

#[get("/notifications?<query..>")]
pub async fn api_list_notifications(
    identity: Identity,
    query: NotificationQuery<'_>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<NotificationPage> {
    identity.require_permission(Permission::ManageOwnNotifications)?;
    let page = PageParams {
        page: query.page,
        page_size: query.page_size,
    }
    .resolve()?;

    let filter = NotificationFilter {
        unread_only: query.unread_only.unwrap_or(false),
        notification_type: parse_filter::<NotificationType>("type", query.kind)?,
    };

    let notifications = list_notifications(db, identity.user_id, filter, page).await?;
    Ok(ApiResponse::ok(notifications))
}

#[put("/notifications/<id>/read")]
pub async fn api_mark_notification_read(
    id: i64,
    identity: Identity,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<()> {
    mark_notification_read(db, id, identity.user_id, now()).await?;
    Ok(ApiResponse::message("Notification marked as read"))
}

#[put("/notifications/read-all")]
pub async fn api_mark_all_notifications_read(
    identity: Identity,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<MarkAllResponse> {
    let updated = mark_all_notifications_read(db, identity.user_id, now()).await?;
    Ok(ApiResponse::ok_with_message(
        MarkAllResponse { updated },
        "All notifications marked as read",
    ))
}

/// Resolves a trainee for a trainee-scoped shared route. Trainees are checked
/// against their own id before any lookup, and trainers get the same 403 for
/// an absent trainee as for one assigned elsewhere.
async fn accessible_trainee(
    db: &Pool<Sqlite>,
    identity: &Identity,
    id: i64,
) -> Result<TraineeProfile, AppError> {
    if identity.role == Role::Trainee {
        ensure_owner(identity, id)?;
    }

    let trainee = match get_trainee(db, id).await {
        Err(AppError::NotFound(_)) if identity.role == Role::Trainer => {
            tracing::warn!(
                user_id = identity.user_id,
                trainee_id = id,
                "Trainer requested unknown trainee"
            );
            return Err(AppError::Authorization(
                "This trainee is not assigned to you".to_string(),
            ));
        }
        other => other?,
    };

    ensure_trainee_access(identity, &trainee)?;
    Ok(trainee)
}

/// Stats for one trainee, visible to the trainee, their trainer and admins.
#[get("/trainees/<id>/stats")]
pub async fn api_trainee_stats(
    id: i64,
    identity: Identity,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<TraineeStatsResponse> {
    let trainee = accessible_trainee(db, &identity, id).await?;

    let at = now();
    let stats = trainee_stats(db, trainee.id, at).await?;
    let current_program = current_program(db, trainee.id).await?;
    let next_session = next_schedule(db, trainee.id, at).await?;

    Ok(ApiResponse::ok(TraineeStatsResponse {
        stats,
        current_program,
        next_session,
    }))
}

#[get("/trainees/<id>/schedules/upcoming?<days>")]
pub async fn api_trainee_upcoming(
    id: i64,
    days: Option<&str>,
    identity: Identity,
    db: &State<Pool<Sqlite>>,
    config: &State<Config>,
) -> ApiResult<UpcomingSchedules> {
    let trainee = accessible_trainee(db, &identity, id).await?;

    let days = normalize_window_days(
        days.and_then(|d| d.trim().parse().ok()),
        config.default_upcoming_days,
    );

    Ok(ApiResponse::ok(
        upcoming_schedules(db, trainee.id, now(), days).await?,
    ))
}
