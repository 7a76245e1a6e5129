use chrono::Duration;
use rocket::http::{Cookie, CookieJar, SameSite};
use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::auth::{Identity, Permission, Role, SessionToken, User, UserSession, SESSION_COOKIE};
use crate::db::{
    authenticate_user, change_password, create_user, create_user_session, get_trainee,
    get_trainer, get_user, invalidate_session, record_login, update_user_profile, NewUser,
};
use crate::env::Config;
use crate::error::AppError;
use crate::models::{TraineeProfile, TrainerProfile};
use crate::validation::{
    validate_password, ApiResponse, ApiResult, JsonValidateExt, PHONE_NUMBER,
};

use super::now;

pub fn routes() -> Vec<Route> {
    routes![
        api_register,
        api_login,
        api_logout,
        api_me,
        api_update_me,
        api_change_password
    ]
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(email(message = "Must be a valid email address"))]
    pub email: String,
    #[validate(custom(function = "validate_password"))]
    pub password: String,
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    pub role: Role,
    #[validate(regex(path = *PHONE_NUMBER, message = "Invalid phone number"))]
    pub phone_number: Option<String>,
    pub trainer_id: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
    #[validate(regex(path = *PHONE_NUMBER, message = "Invalid phone number"))]
    pub phone_number: Option<String>,
    #[validate(url(message = "Must be a valid URL"))]
    pub profile_image: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(custom(function = "validate_password"))]
    pub new_password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub expires_at: chrono::NaiveDateTime,
    pub user: User,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user: User,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trainer: Option<TrainerProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trainee: Option<TraineeProfile>,
}

async fn start_session(
    db: &Pool<Sqlite>,
    config: &Config,
    cookies: &CookieJar<'_>,
    user: User,
) -> Result<AuthResponse, AppError> {
    let token = UserSession::generate_token();
    let issued_at = now();
    let expires_at = issued_at + Duration::hours(config.session_ttl_hours);

    create_user_session(db, user.id, &token, expires_at).await?;
    record_login(db, user.id, issued_at).await?;

    let cookie = Cookie::build((SESSION_COOKIE, token.clone()))
        .same_site(SameSite::Lax)
        .http_only(true)
        .max_age(rocket::time::Duration::hours(config.session_ttl_hours));
    cookies.add_private(cookie);

    Ok(AuthResponse {
        token,
        expires_at,
        user,
    })
}

#[post("/register", data = "<request>")]
pub async fn api_register(
    request: Json<RegisterRequest>,
    cookies: &CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
    config: &State<Config>,
) -> ApiResult<AuthResponse> {
    let request = request.validated()?;

    if request.role == Role::Admin {
        return Err(AppError::Authorization(
            "Admin accounts cannot be self-registered".to_string(),
        ));
    }

    let trainer_id = match (request.role, request.trainer_id) {
        (Role::Trainee, Some(trainer_id)) => {
            get_trainer(db, trainer_id).await.map_err(|_| {
                AppError::Validation(format!("Trainer {} does not exist", trainer_id))
            })?;
            Some(trainer_id)
        }
        _ => None,
    };

    let user_id = create_user(
        db,
        &NewUser {
            email: request.email,
            password: request.password,
            name: request.name,
            role: request.role,
            phone_number: request.phone_number,
            trainer_id,
        },
        config.bcrypt_cost,
    )
    .await?;

    let user = get_user(db, user_id).await?;
    let response = start_session(db, config, cookies, user).await?;

    Ok(ApiResponse::ok_with_message(response, "Registration successful"))
}

#[post("/login", data = "<request>")]
pub async fn api_login(
    request: Json<LoginRequest>,
    cookies: &CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
    config: &State<Config>,
) -> ApiResult<AuthResponse> {
    let request = request.validated()?;

    let Some(user) = authenticate_user(db, &request.email, &request.password).await? else {
        return Err(AppError::Authentication(
            "Invalid email or password".to_string(),
        ));
    };

    if !user.is_active {
        return Err(AppError::Authentication(
            "This account has been deactivated".to_string(),
        ));
    }

    tracing::info!(user_id = user.id, "Login successful");
    let response = start_session(db, config, cookies, user).await?;

    Ok(ApiResponse::ok_with_message(response, "Login successful"))
}

#[post("/logout")]
pub async fn api_logout(
    _identity: Identity,
    token: SessionToken,
    cookies: &CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<()> {
    if let Some(token) = token.0 {
        invalidate_session(db, &token).await?;
    }
    cookies.remove_private(SESSION_COOKIE);

    Ok(ApiResponse::message("Logged out"))
}

#[get("/me")]
pub async fn api_me(identity: Identity, db: &State<Pool<Sqlite>>) -> ApiResult<MeResponse> {
    let user = get_user(db, identity.user_id).await?;

    let trainer = match identity.trainer_id {
        Some(id) => Some(get_trainer(db, id).await?),
        None => None,
    };
    let trainee = match identity.trainee_id {
        Some(id) => Some(get_trainee(db, id).await?),
        None => None,
    };

    Ok(ApiResponse::ok(MeResponse {
        user,
        trainer,
        trainee,
    }))
}

#[patch("/me", data = "<request>")]
pub async fn api_update_me(
    identity: Identity,
    request: Json<UpdateProfileRequest>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<User> {
    identity.require_permission(Permission::EditOwnProfile)?;
    let request = request.validated()?;

    let user = update_user_profile(
        db,
        identity.user_id,
        request.name.as_deref(),
        request.phone_number.as_deref(),
        request.profile_image.as_deref(),
    )
    .await?;

    Ok(ApiResponse::ok_with_message(user, "Profile updated"))
}

#[put("/password", data = "<request>")]
pub async fn api_change_password(
    identity: Identity,
    token: SessionToken,
    request: Json<ChangePasswordRequest>,
    db: &State<Pool<Sqlite>>,
    config: &State<Config>,
) -> ApiResult<()> {
    let request = request.validated()?;

    change_password(
        db,
        identity.user_id,
        &request.current_password,
        &request.new_password,
        token.0.as_deref(),
        config.bcrypt_cost,
    )
    .await?;

    Ok(ApiResponse::message("Password changed"))
}
