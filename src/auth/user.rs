use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use crate::error::AppError;

use super::{Permission, Role};

#[derive(Debug, Serialize, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub business_name: String,
    pub business_type: String,
    pub owner_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUser {
    pub id: i64,
    pub username: String,
    pub role: String,
    pub business_name: String,
    pub business_type: String,
    pub owner_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: NaiveDateTime,
}

impl From<DbUser> for User {
    fn from(user: DbUser) -> Self {
        Self {
            id: user.id,
            username: user.username,
            // An unknown role string falls back to the least-privileged role.
            role: Role::from_str(&user.role).unwrap_or(Role::Customer),
            business_name: user.business_name,
            business_type: user.business_type,
            owner_name: user.owner_name,
            email: user.email,
            phone: user.phone,
            address: user.address,
            created_at: DateTime::<Utc>::from_naive_utc_and_offset(user.created_at, Utc),
        }
    }
}

/// Registration payload after boundary validation. The password arrives
/// in the clear and is hashed inside the repository layer.
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub business_name: String,
    pub business_type: String,
    pub owner_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role: Role,
}

impl User {
    pub fn require_permission(&self, permission: Permission) -> Result<(), AppError> {
        if self.role.has_permission(permission) {
            Ok(())
        } else {
            tracing::warn!(
                username = %self.username,
                role = %self.role.as_str(),
                permission = ?permission,
                "Permission denied"
            );
            Err(AppError::Authorization(
                "You don't have permission to perform this action".to_string(),
            ))
        }
    }
}
