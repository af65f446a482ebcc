use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed role set used for route authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Sme,
    User,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Sme => "sme",
            Role::User => "user",
        }
    }

    /// Parses a role value after trim + lowercase. Anything outside the
    /// closed set is rejected.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "sme" => Some(Role::Sme),
            "user" => Some(Role::User),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body for Google sign-in.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct GoogleLoginRequest {
    /// Google ID token obtained from Google Identity Services.
    pub credential: String,
}

/// The session user as returned by login and `/auth/me`.
#[derive(Serialize, utoipa::ToSchema)]
pub struct UserResponse {
    #[schema(example = "alice@pw.live")]
    pub email: String,
    #[schema(example = "Alice")]
    pub name: String,
    pub role: Role,
    /// Profile picture URL when Google provides one.
    pub picture: Option<String>,
}

/// Successful login response.
#[derive(Serialize, utoipa::ToSchema)]
pub struct LoginResponse {
    pub user: UserResponse,
}
