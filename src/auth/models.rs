//! Authentication Models
//! Mission: Administrator accounts and JWT claims for the tenant boundary

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Administrator account. Each admin owns zero or more leagues; the
/// username is the tenant key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // bcrypt hash - never serialize
    pub role: UserRole,
    pub created_at: String,
}

/// Roles for RBAC
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum UserRole {
    #[serde(rename = "super_admin")]
    SuperAdmin, // Sees every league
    #[serde(rename = "admin")]
    Admin, // Sees only leagues it owns
}

impl UserRole {
    pub fn as_str(&self) -> &str {
        match self {
            UserRole::SuperAdmin => "super_admin",
            UserRole::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "super_admin" => Some(UserRole::SuperAdmin),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }
}

/// JWT Claims payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // subject (user_id)
    pub username: String,
    pub role: UserRole,
    pub exp: usize, // expiration timestamp
}

/// Login request body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: usize, // seconds until expiration
    pub role: UserRole,
    pub user: UserResponse,
}

/// User response (sanitized)
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub role: UserRole,
    pub created_at: String,
}

impl UserResponse {
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            username: user.username.clone(),
            role: user.role.clone(),
            created_at: user.created_at.clone(),
        }
    }
}
