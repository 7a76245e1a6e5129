use rocket::http::Status;
use rocket::outcome::try_outcome;
use rocket::request::{FromRequest, Outcome};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rocket::Request;
use sqlx::SqlitePool;

use crate::db::{get_identity, get_session_by_token};
use crate::error::error_code;
use crate::validation::ApiResponse;

use super::{authorize_roles, Identity, Role};

pub const SESSION_COOKIE: &str = "session_token";

/// Session token from `Authorization: Bearer <token>`, falling back to the
/// private session cookie.
pub fn request_token(request: &Request<'_>) -> Option<String> {
    let bearer = request
        .headers()
        .get_one("Authorization")
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty());

    bearer.or_else(|| {
        request
            .cookies()
            .get_private(SESSION_COOKIE)
            .map(|c| c.value().to_string())
    })
}

/// The raw session token a request carried, if any.
pub struct SessionToken(pub Option<String>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for SessionToken {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(SessionToken(request_token(request)))
    }
}

#[tracing::instrument(name = "identity_guard", skip_all)]
async fn resolve_identity(request: &Request<'_>) -> Result<Identity, Status> {
    let Some(token) = request_token(request) else {
        return Err(Status::Unauthorized);
    };

    let Some(pool) = request.rocket().state::<SqlitePool>() else {
        tracing::error!("Database pool not found in managed state");
        return Err(Status::InternalServerError);
    };

    let session = match get_session_by_token(pool, &token).await {
        Ok(session) => session,
        Err(err) => {
            tracing::warn!(error = %err, "Invalid session token");
            return Err(err.status_code());
        }
    };

    if !session.is_valid() {
        tracing::warn!(session_id = session.id, "Session token expired");
        return Err(Status::Unauthorized);
    }

    match get_identity(pool, session.user_id).await {
        Ok(identity) => {
            tracing::info!(
                user_id = identity.user_id,
                role = %identity.role,
                "User authenticated via session token"
            );
            Ok(identity)
        }
        Err(err) => Err(err.to_status_with_log("resolve_identity")),
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Identity {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let resolved = request
            .local_cache_async(async { resolve_identity(request).await })
            .await;

        match resolved {
            Ok(identity) => Outcome::Success(identity.clone()),
            Err(status) => Outcome::Error((*status, ())),
        }
    }
}

async fn identity_with_role<'r>(
    request: &'r Request<'_>,
    allowed: &[Role],
) -> Outcome<Identity, ()> {
    let identity = try_outcome!(request.guard::<Identity>().await);

    match authorize_roles(Some(&identity), allowed) {
        Ok(_) => Outcome::Success(identity),
        Err(err) => Outcome::Error((err.status_code(), ())),
    }
}

/// Caller with the trainer role and a trainer profile.
pub struct TrainerUser {
    pub identity: Identity,
    pub trainer_id: i64,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for TrainerUser {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let identity = try_outcome!(identity_with_role(request, &[Role::Trainer]).await);

        match identity.trainer_id {
            Some(trainer_id) => Outcome::Success(TrainerUser {
                identity,
                trainer_id,
            }),
            None => {
                tracing::error!(user_id = identity.user_id, "Trainer has no profile row");
                Outcome::Error((Status::Forbidden, ()))
            }
        }
    }
}

/// Caller with the trainee role and a trainee profile.
pub struct TraineeUser {
    pub identity: Identity,
    pub trainee_id: i64,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for TraineeUser {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let identity = try_outcome!(identity_with_role(request, &[Role::Trainee]).await);

        match identity.trainee_id {
            Some(trainee_id) => Outcome::Success(TraineeUser {
                identity,
                trainee_id,
            }),
            None => {
                tracing::error!(user_id = identity.user_id, "Trainee has no profile row");
                Outcome::Error((Status::Forbidden, ()))
            }
        }
    }
}

pub struct AdminUser(pub Identity);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminUser {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        identity_with_role(request, &[Role::Admin])
            .await
            .map(AdminUser)
    }
}

fn envelope(status: Status, message: &str) -> Custom<Json<ApiResponse<()>>> {
    Custom(
        status,
        Json(ApiResponse::failure(
            error_code(status),
            message.to_string(),
            None,
        )),
    )
}

#[catch(400)]
pub fn bad_request(_req: &Request) -> Custom<Json<ApiResponse<()>>> {
    envelope(Status::BadRequest, "Malformed request")
}

#[catch(401)]
pub fn unauthorized(req: &Request) -> Custom<Json<ApiResponse<()>>> {
    tracing::warn!(uri = %req.uri(), "Unauthorized access attempt");
    envelope(Status::Unauthorized, "Authentication required")
}

#[catch(403)]
pub fn forbidden(req: &Request) -> Custom<Json<ApiResponse<()>>> {
    tracing::warn!(uri = %req.uri(), "Forbidden access attempt");
    envelope(
        Status::Forbidden,
        "You don't have permission to access this resource",
    )
}

#[catch(404)]
pub fn not_found(_req: &Request) -> Custom<Json<ApiResponse<()>>> {
    envelope(Status::NotFound, "Resource not found")
}

#[catch(409)]
pub fn conflict(_req: &Request) -> Custom<Json<ApiResponse<()>>> {
    envelope(Status::Conflict, "Request conflicts with existing data")
}

#[catch(422)]
pub fn unprocessable(_req: &Request) -> Custom<Json<ApiResponse<()>>> {
    envelope(Status::UnprocessableEntity, "Request body could not be parsed")
}

#[catch(500)]
pub fn internal_error(_req: &Request) -> Custom<Json<ApiResponse<()>>> {
    envelope(Status::InternalServerError, "Internal server error")
}

#[catch(default)]
pub fn default_catcher(status: Status, _req: &Request) -> Custom<Json<ApiResponse<()>>> {
    envelope(status, status.reason().unwrap_or("Request failed"))
}
