use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

use super::{Permission, Role};

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub phone_number: Option<String>,
    pub profile_image: Option<String>,
    pub email_verified: bool,
    pub is_active: bool,
    pub last_login_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUser {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: String,
    pub phone_number: Option<String>,
    pub profile_image: Option<String>,
    pub email_verified: bool,
    pub is_active: bool,
    pub last_login_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl TryFrom<DbUser> for User {
    type Error = AppError;

    fn try_from(user: DbUser) -> Result<Self, Self::Error> {
        let role = Role::from_str(&user.role)
            .map_err(|e| AppError::Internal(format!("User {} has {}", user.id, e)))?;

        Ok(Self {
            id: user.id,
            email: user.email,
            name: user.name,
            role,
            phone_number: user.phone_number,
            profile_image: user.profile_image,
            email_verified: user.email_verified,
            is_active: user.is_active,
            last_login_at: user.last_login_at,
            created_at: user.created_at,
        })
    }
}

/// The caller of a request, resolved once from its session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: i64,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub trainer_id: Option<i64>,
    pub trainee_id: Option<i64>,
}

#[derive(sqlx::FromRow)]
pub struct DbIdentity {
    pub user_id: i64,
    pub email: String,
    pub name: String,
    pub role: String,
    pub is_active: bool,
    pub trainer_id: Option<i64>,
    pub trainee_id: Option<i64>,
}

impl TryFrom<DbIdentity> for Identity {
    type Error = AppError;

    fn try_from(row: DbIdentity) -> Result<Self, Self::Error> {
        let role = Role::from_str(&row.role)
            .map_err(|e| AppError::Internal(format!("User {} has {}", row.user_id, e)))?;

        Ok(Self {
            user_id: row.user_id,
            email: row.email,
            name: row.name,
            role,
            trainer_id: row.trainer_id,
            trainee_id: row.trainee_id,
        })
    }
}

impl Identity {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.role.has_permission(permission)
    }

    pub fn require_permission(&self, permission: Permission) -> Result<(), AppError> {
        if self.role.has_permission(permission) {
            Ok(())
        } else {
            tracing::warn!(
                user_id = self.user_id,
                role = %self.role.as_str(),
                permission = ?permission,
                "Permission denied"
            );
            Err(AppError::Authorization(format!(
                "Missing permission {:?}",
                permission
            )))
        }
    }
}
