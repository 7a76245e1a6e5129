use anyhow::Error;
use once_cell::sync::Lazy;
use rocket::serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::AppError;
use crate::models::TraineeProfile;

use super::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ViewOwnProfile,
    EditOwnProfile,
    ManageOwnNotifications,

    ViewOwnSchedules,
    ViewOwnProgress,

    ViewAllTrainees,
    ManageClients,
    ManageSchedules,
    ManageSessionCards,
    ManagePrograms,
    ManageExercises,
    RecordMetrics,
    SendNotifications,
    ViewAnalytics,

    ManageUsers,
    EditUserRoles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Trainer,
    Trainee,
    Admin,
}

static BASE_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::ViewOwnProfile);
    permissions.insert(Permission::EditOwnProfile);
    permissions.insert(Permission::ManageOwnNotifications);

    permissions
});

static TRAINEE_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(BASE_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ViewOwnSchedules);
    permissions.insert(Permission::ViewOwnProgress);

    permissions
});

static TRAINER_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(BASE_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ViewAllTrainees);
    permissions.insert(Permission::ManageClients);
    permissions.insert(Permission::ManageSchedules);
    permissions.insert(Permission::ManageSessionCards);
    permissions.insert(Permission::ManagePrograms);
    permissions.insert(Permission::ManageExercises);
    permissions.insert(Permission::RecordMetrics);
    permissions.insert(Permission::SendNotifications);
    permissions.insert(Permission::ViewAnalytics);

    permissions
});

static ADMIN_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(TRAINEE_PERMISSIONS.iter().copied());
    permissions.extend(TRAINER_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ManageUsers);
    permissions.insert(Permission::EditUserRoles);

    permissions
});

impl Role {
    pub fn permissions(&self) -> &'static HashSet<Permission> {
        match self {
            Role::Trainee => &TRAINEE_PERMISSIONS,
            Role::Trainer => &TRAINER_PERMISSIONS,
            Role::Admin => &ADMIN_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Trainer => "trainer",
            Role::Trainee => "trainee",
            Role::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "trainer" => Ok(Role::Trainer),
            "trainee" => Ok(Role::Trainee),
            "admin" => Ok(Role::Admin),
            _ => Err(Error::msg(format!("Unknown role: {}", s))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role gate. A missing identity is an authentication failure, a present
/// identity outside `allowed` is an authorization failure.
pub fn authorize_roles<'a>(
    identity: Option<&'a Identity>,
    allowed: &[Role],
) -> Result<&'a Identity, AppError> {
    let Some(identity) = identity else {
        return Err(AppError::Authentication(
            "Authentication required".to_string(),
        ));
    };

    if allowed.contains(&identity.role) {
        Ok(identity)
    } else {
        tracing::warn!(
            user_id = identity.user_id,
            role = %identity.role,
            allowed = ?allowed,
            "Role not permitted"
        );
        Err(AppError::Authorization(
            "You don't have permission to access this resource".to_string(),
        ))
    }
}

/// Trainee callers may only reach their own trainee-scoped resources; roles
/// that can view all trainees pass.
pub fn ensure_owner(identity: &Identity, owner_trainee_id: i64) -> Result<(), AppError> {
    if identity.has_permission(Permission::ViewAllTrainees) {
        return Ok(());
    }

    if identity.trainee_id == Some(owner_trainee_id) {
        Ok(())
    } else {
        tracing::warn!(
            user_id = identity.user_id,
            owner_trainee_id,
            "Ownership check failed"
        );
        Err(AppError::Authorization(
            "You can only access your own data".to_string(),
        ))
    }
}

/// Ownership check with the trainee row at hand: trainers are further limited
/// to trainees assigned to them.
pub fn ensure_trainee_access(identity: &Identity, trainee: &TraineeProfile) -> Result<(), AppError> {
    match identity.role {
        Role::Admin => Ok(()),
        Role::Trainee => ensure_owner(identity, trainee.id),
        Role::Trainer => {
            ensure_owner(identity, trainee.id)?;
            if identity.trainer_id.is_some() && identity.trainer_id == trainee.trainer_id {
                Ok(())
            } else {
                tracing::warn!(
                    user_id = identity.user_id,
                    trainee_id = trainee.id,
                    "Trainer is not assigned to trainee"
                );
                Err(AppError::Authorization(
                    "This trainee is not assigned to you".to_string(),
                ))
            }
        }
    }
}
