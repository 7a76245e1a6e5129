use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::{NewNotification, Notification, NotificationType};
use crate::validation::{Page, Paginated};

const NOTIFICATION_COLUMNS: &str = "id, user_id, notification_type, title, message, related_id, \
     related_type, action_url, priority, is_read, read_at, created_at";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPage {
    #[serde(flatten)]
    pub page: Paginated<Notification>,
    pub unread_count: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NotificationFilter {
    pub unread_only: bool,
    pub notification_type: Option<NotificationType>,
}

#[instrument(skip(pool))]
pub async fn list_notifications(
    pool: &Pool<Sqlite>,
    user_id: i64,
    filter: NotificationFilter,
    page: Page,
) -> Result<NotificationPage, AppError> {
    info!("Listing notifications");

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications
         WHERE user_id = ? AND (? = 0 OR is_read = 0) AND (? IS NULL OR notification_type = ?)",
    )
    .bind(user_id)
    .bind(filter.unread_only)
    .bind(filter.notification_type)
    .bind(filter.notification_type)
    .fetch_one(pool)
    .await?;

    let notifications = sqlx::query_as::<_, Notification>(&format!(
        "SELECT {} FROM notifications
         WHERE user_id = ? AND (? = 0 OR is_read = 0) AND (? IS NULL OR notification_type = ?)
         ORDER BY created_at DESC, id DESC
         LIMIT ? OFFSET ?",
        NOTIFICATION_COLUMNS
    ))
    .bind(user_id)
    .bind(filter.unread_only)
    .bind(filter.notification_type)
    .bind(filter.notification_type)
    .bind(page.page_size)
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    let unread_count = unread_count(pool, user_id).await?;

    Ok(NotificationPage {
        page: Paginated::new(notifications, page, total),
        unread_count,
    })
}

#[instrument(skip(pool))]
pub async fn unread_count(pool: &Pool<Sqlite>, user_id: i64) -> Result<i64, AppError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0")
            .bind(user_id)
            .fetch_one(pool)
            .await?;

    Ok(count)
}

/// Marks one notification read. The update is scoped by owner, so a foreign
/// notification and a missing one both come back as `NotFound`. Repeat calls
/// keep the first read time.
#[instrument(skip(pool))]
pub async fn mark_notification_read(
    pool: &Pool<Sqlite>,
    notification_id: i64,
    owner_user_id: i64,
    now: NaiveDateTime,
) -> Result<(), AppError> {
    info!("Marking notification read");

    let res = sqlx::query(
        "UPDATE notifications SET is_read = 1, read_at = COALESCE(read_at, ?)
         WHERE id = ? AND user_id = ?",
    )
    .bind(now)
    .bind(notification_id)
    .bind(owner_user_id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(
            "Notification not found or not accessible".to_string(),
        ));
    }

    Ok(())
}

/// Returns how many notifications actually changed state.
#[instrument(skip(pool))]
pub async fn mark_all_notifications_read(
    pool: &Pool<Sqlite>,
    owner_user_id: i64,
    now: NaiveDateTime,
) -> Result<u64, AppError> {
    info!("Marking all notifications read");

    let res = sqlx::query(
        "UPDATE notifications SET is_read = 1, read_at = ? WHERE user_id = ? AND is_read = 0",
    )
    .bind(now)
    .bind(owner_user_id)
    .execute(pool)
    .await?;

    Ok(res.rows_affected())
}

pub async fn insert_notification(
    conn: &mut SqliteConnection,
    notification: &NewNotification,
) -> Result<i64, AppError> {
    let res = sqlx::query(
        "INSERT INTO notifications
         (user_id, notification_type, title, message, related_id, related_type, action_url, priority)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(notification.user_id)
    .bind(notification.notification_type)
    .bind(&notification.title)
    .bind(&notification.message)
    .bind(notification.related_id)
    .bind(&notification.related_type)
    .bind(&notification.action_url)
    .bind(notification.priority)
    .execute(&mut *conn)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, notification), fields(user_id = notification.user_id))]
pub async fn create_notification(
    pool: &Pool<Sqlite>,
    notification: &NewNotification,
) -> Result<Notification, AppError> {
    info!("Creating notification");
    let mut conn = pool.acquire().await?;
    let id = insert_notification(&mut conn, notification).await?;

    let created = sqlx::query_as::<_, Notification>(&format!(
        "SELECT {} FROM notifications WHERE id = ?",
        NOTIFICATION_COLUMNS
    ))
    .bind(id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(created)
}
