use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::CookieJar;

use crate::error::AppError;
use crate::models::auth::Role;
use crate::state::AppState;
use crate::utils::jwt;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "sid";

/// Authenticated user extracted from the session cookie.
///
/// Add this as a handler parameter to require authentication.
/// Role checks happen via `require_role()` in the handler body.
pub struct AuthUser {
    pub email: String,
    pub name: String,
    pub role: Role,
    pub picture: Option<String>,
}

impl AuthUser {
    /// Returns `Ok(())` if the user's role is in the allowed set,
    /// `Err(PermissionDenied)` otherwise.
    pub fn require_role(&self, roles: &[Role]) -> Result<(), AppError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::PermissionDenied)
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::TokenMissing)?;

        let token = jar
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .ok_or(AppError::TokenMissing)?;

        let claims = jwt::verify(&token, &state.config.auth.session_secret)
            .map_err(|_| AppError::TokenInvalid)?;

        Ok(AuthUser {
            email: claims.sub,
            name: claims.name,
            role: claims.role,
            picture: claims.picture,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_gate_checks_membership() {
        let user = AuthUser {
            email: "sme@pw.live".into(),
            name: "Sme".into(),
            role: Role::Sme,
            picture: None,
        };
        assert!(user.require_role(&[Role::Sme]).is_ok());
        assert!(user.require_role(&[Role::Admin, Role::Sme]).is_ok());
        assert!(matches!(
            user.require_role(&[Role::Admin]),
            Err(AppError::PermissionDenied)
        ));
    }
}
