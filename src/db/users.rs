use chrono::NaiveDateTime;
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument, warn};

use crate::auth::{DbIdentity, DbUser, Identity, Role, User};
use crate::error::AppError;
use crate::validation::Page;

const USER_COLUMNS: &str = "id, email, name, role, phone_number, profile_image, email_verified, \
     is_active, last_login_at, created_at";

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: Role,
    pub phone_number: Option<String>,
    /// Only meaningful for trainees: the trainer they are assigned to.
    pub trainer_id: Option<i64>,
}

/// Creates the user and, for trainers and trainees, the matching profile row.
/// Returns the new user id.
#[instrument(skip(pool, new_user), fields(email = %new_user.email, role = %new_user.role))]
pub async fn create_user(
    pool: &Pool<Sqlite>,
    new_user: &NewUser,
    bcrypt_cost: u32,
) -> Result<i64, AppError> {
    info!("Creating user");
    let hashed_password = bcrypt::hash(&new_user.password, bcrypt_cost)?;

    let mut tx = pool.begin().await?;

    let user_id = sqlx::query(
        "INSERT INTO users (email, password_hash, name, role, phone_number) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(new_user.email.to_lowercase())
    .bind(&hashed_password)
    .bind(&new_user.name)
    .bind(new_user.role.as_str())
    .bind(&new_user.phone_number)
    .execute(&mut *tx)
    .await
    .map_err(|e| match AppError::from(e) {
        AppError::Conflict(_) => AppError::Conflict("Email is already registered".to_string()),
        other => other,
    })?
    .last_insert_rowid();

    match new_user.role {
        Role::Trainer => {
            sqlx::query("INSERT INTO trainers (user_id) VALUES (?)")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }
        Role::Trainee => {
            sqlx::query("INSERT INTO trainees (user_id, trainer_id) VALUES (?, ?)")
                .bind(user_id)
                .bind(new_user.trainer_id)
                .execute(&mut *tx)
                .await?;

            if let Some(trainer_id) = new_user.trainer_id {
                sqlx::query("UPDATE trainers SET total_clients = total_clients + 1 WHERE id = ?")
                    .bind(trainer_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        Role::Admin => {}
    }

    tx.commit().await?;

    Ok(user_id)
}

#[instrument(skip(pool))]
pub async fn get_user(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    info!("Fetching user by ID");
    let row = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {} FROM users WHERE id = ?",
        USER_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(user) => User::try_from(user),
        None => Err(AppError::NotFound(format!("User with id {} not found", id))),
    }
}

/// Checks an email/password pair. `Ok(None)` means the credentials do not match.
#[instrument(skip(pool, password))]
pub async fn authenticate_user(
    pool: &Pool<Sqlite>,
    email: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    info!("Authenticating user");

    let row: Option<(i64, Option<String>)> =
        sqlx::query_as("SELECT id, password_hash FROM users WHERE email = ?")
            .bind(email.to_lowercase())
            .fetch_optional(pool)
            .await?;

    let Some((user_id, Some(hash))) = row else {
        warn!("No password login available for email");
        return Ok(None);
    };

    if !bcrypt::verify(password, &hash)? {
        warn!(user_id, "Password mismatch");
        return Ok(None);
    }

    get_user(pool, user_id).await.map(Some)
}

#[instrument(skip(pool))]
pub async fn record_login(
    pool: &Pool<Sqlite>,
    user_id: i64,
    now: NaiveDateTime,
) -> Result<(), AppError> {
    sqlx::query("UPDATE users SET last_login_at = ? WHERE id = ?")
        .bind(now)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Resolves the request identity, joining the trainer or trainee profile id.
/// Inactive accounts resolve to an authentication error.
#[instrument(skip(pool))]
pub async fn get_identity(pool: &Pool<Sqlite>, user_id: i64) -> Result<Identity, AppError> {
    let row = sqlx::query_as::<_, DbIdentity>(
        "SELECT u.id AS user_id, u.email, u.name, u.role, u.is_active,
                tr.id AS trainer_id, te.id AS trainee_id
         FROM users u
         LEFT JOIN trainers tr ON tr.user_id = u.id
         LEFT JOIN trainees te ON te.user_id = u.id
         WHERE u.id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) if row.is_active => Identity::try_from(row),
        Some(_) => Err(AppError::Authentication("Account is disabled".to_string())),
        None => Err(AppError::Authentication("Unknown user".to_string())),
    }
}

#[instrument(skip(pool))]
pub async fn update_user_profile(
    pool: &Pool<Sqlite>,
    user_id: i64,
    name: Option<&str>,
    phone_number: Option<&str>,
    profile_image: Option<&str>,
) -> Result<User, AppError> {
    info!("Updating user profile");
    sqlx::query(
        "UPDATE users
         SET name = COALESCE(?, name),
             phone_number = COALESCE(?, phone_number),
             profile_image = COALESCE(?, profile_image),
             updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(name)
    .bind(phone_number)
    .bind(profile_image)
    .bind(user_id)
    .execute(pool)
    .await?;

    get_user(pool, user_id).await
}

/// Replaces the password once the current one checks out. Every other
/// session of the user is dropped.
#[instrument(skip(pool, current_password, new_password, keep_token))]
pub async fn change_password(
    pool: &Pool<Sqlite>,
    user_id: i64,
    current_password: &str,
    new_password: &str,
    keep_token: Option<&str>,
    bcrypt_cost: u32,
) -> Result<(), AppError> {
    info!("Changing password");
    let hash: Option<String> = sqlx::query_scalar("SELECT password_hash FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .flatten();

    let Some(hash) = hash else {
        return Err(AppError::Validation(
            "This account has no password to change".to_string(),
        ));
    };

    if !bcrypt::verify(current_password, &hash)? {
        warn!(user_id, "Current password mismatch");
        return Err(AppError::Authentication(
            "Current password is incorrect".to_string(),
        ));
    }

    let new_hash = bcrypt::hash(new_password, bcrypt_cost)?;

    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE users SET password_hash = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(&new_hash)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM user_sessions WHERE user_id = ? AND (? IS NULL OR token != ?)")
        .bind(user_id)
        .bind(keep_token)
        .bind(keep_token)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

#[instrument(skip(pool))]
pub async fn list_users(
    pool: &Pool<Sqlite>,
    role: Option<Role>,
    page: Page,
) -> Result<(Vec<User>, i64), AppError> {
    info!("Listing users");
    let role = role.map(|r| r.as_str());

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE (? IS NULL OR role = ?)")
        .bind(role)
        .bind(role)
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {} FROM users WHERE (? IS NULL OR role = ?) ORDER BY id LIMIT ? OFFSET ?",
        USER_COLUMNS
    ))
    .bind(role)
    .bind(role)
    .bind(page.page_size)
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    let users = rows
        .into_iter()
        .map(User::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok((users, total))
}

/// Admin update. Changing the role creates the matching profile row when missing
/// and removes a profile of the other kind, refusing when that profile already
/// has history. Deactivating a user also drops their sessions.
#[instrument(skip(pool))]
pub async fn admin_update_user(
    pool: &Pool<Sqlite>,
    user_id: i64,
    is_active: Option<bool>,
    role: Option<Role>,
) -> Result<User, AppError> {
    info!("Admin updating user");
    // existence check before opening the transaction
    get_user(pool, user_id).await?;

    let mut tx = pool.begin().await?;

    if let Some(active) = is_active {
        sqlx::query("UPDATE users SET is_active = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(active)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        if !active {
            sqlx::query("DELETE FROM user_sessions WHERE user_id = ?")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }
    }

    if let Some(role) = role {
        sqlx::query("UPDATE users SET role = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(role.as_str())
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        if role != Role::Trainer {
            retire_profile(&mut tx, user_id, TRAINER_HISTORY, "trainers").await?;
        }
        if role != Role::Trainee {
            retire_profile(&mut tx, user_id, TRAINEE_HISTORY, "trainees").await?;
        }

        match role {
            Role::Trainer => {
                sqlx::query("INSERT OR IGNORE INTO trainers (user_id) VALUES (?)")
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?;
            }
            Role::Trainee => {
                sqlx::query("INSERT OR IGNORE INTO trainees (user_id) VALUES (?)")
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?;
            }
            Role::Admin => {}
        }
    }

    tx.commit().await?;

    get_user(pool, user_id).await
}

const TRAINER_HISTORY: &str = "SELECT (SELECT COUNT(*) FROM trainees WHERE trainer_id = t.id)
        + (SELECT COUNT(*) FROM programs WHERE trainer_id = t.id)
        + (SELECT COUNT(*) FROM schedules WHERE trainer_id = t.id)
        + (SELECT COUNT(*) FROM session_cards WHERE trainer_id = t.id)
        + (SELECT COUNT(*) FROM exercise_library WHERE trainer_id = t.id)
     FROM trainers t WHERE t.user_id = ?";

const TRAINEE_HISTORY: &str = "SELECT (SELECT COUNT(*) FROM program_assignments WHERE trainee_id = t.id)
        + (SELECT COUNT(*) FROM schedules WHERE trainee_id = t.id)
        + (SELECT COUNT(*) FROM session_cards WHERE trainee_id = t.id)
        + (SELECT COUNT(*) FROM metrics WHERE trainee_id = t.id)
     FROM trainees t WHERE t.user_id = ?";

/// Drops a profile row the user no longer qualifies for. A profile with
/// recorded history blocks the role change instead.
async fn retire_profile(
    conn: &mut SqliteConnection,
    user_id: i64,
    history_query: &str,
    table: &str,
) -> Result<(), AppError> {
    let history: Option<i64> = sqlx::query_scalar(history_query)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

    match history {
        None => Ok(()),
        Some(0) => {
            info!(user_id, table, "Removing unused profile after role change");
            sqlx::query(&format!("DELETE FROM {} WHERE user_id = ?", table))
                .bind(user_id)
                .execute(&mut *conn)
                .await?;
            Ok(())
        }
        Some(_) => Err(AppError::Conflict(format!(
            "User still has {} history; the role cannot be changed",
            table.trim_end_matches('s')
        ))),
    }
}
