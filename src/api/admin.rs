use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::Deserialize;
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::auth::{AdminUser, Permission, Role, User};
use crate::db::{admin_update_user, create_location, get_location, list_users};
use crate::error::AppError;
use crate::models::Location;
use crate::validation::{ApiResponse, ApiResult, JsonValidateExt, PageParams, Paginated};

pub fn routes() -> Vec<Route> {
    routes![api_list_users, api_update_user, api_create_location]
}

#[derive(Debug, FromForm)]
pub struct UserQuery<'r> {
    pub role: Option<&'r str>,
    pub page: Option<i64>,
    #[field(name = "pageSize")]
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AdminUpdateUserRequest {
    pub is_active: Option<bool>,
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateLocationRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,
    #[validate(length(max = 500))]
    pub address: Option<String>,
    #[validate(length(max = 50))]
    pub floor: Option<String>,
    #[validate(length(max = 100))]
    pub building: Option<String>,
}

#[get("/users?<query..>")]
pub async fn api_list_users(
    admin: AdminUser,
    query: UserQuery<'_>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Paginated<User>> {
    admin.0.require_permission(Permission::ManageUsers)?;
    let page = PageParams {
        page: query.page,
        page_size: query.page_size,
    }
    .resolve()?;

    let role = query
        .role
        .map(|r| Role::from_str(r).map_err(|e| AppError::Validation(e.to_string())))
        .transpose()?;

    let (users, total) = list_users(db, role, page).await?;

    Ok(ApiResponse::ok(Paginated::new(users, page, total)))
}

#[patch("/users/<id>", data = "<request>")]
pub async fn api_update_user(
    id: i64,
    admin: AdminUser,
    request: Json<AdminUpdateUserRequest>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<User> {
    admin.0.require_permission(Permission::ManageUsers)?;
    let request = request.validated()?;

    if request.role.is_some() {
        admin.0.require_permission(Permission::EditUserRoles)?;
    }
    if id == admin.0.user_id && (request.is_active == Some(false) || request.role.is_some()) {
        return Err(AppError::Validation(
            "Admins cannot deactivate or demote themselves".to_string(),
        ));
    }

    Ok(ApiResponse::ok_with_message(
        admin_update_user(db, id, request.is_active, request.role).await?,
        "User updated",
    ))
}

#[post("/locations", data = "<request>")]
pub async fn api_create_location(
    admin: AdminUser,
    request: Json<CreateLocationRequest>,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Location> {
    admin.0.require_permission(Permission::ManageUsers)?;
    let request = request.validated()?;

    let id = create_location(
        db,
        &request.name,
        request.address.as_deref(),
        request.floor.as_deref(),
        request.building.as_deref(),
    )
    .await?;

    Ok(ApiResponse::ok_with_message(
        get_location(db, id).await?,
        "Location created",
    ))
}
