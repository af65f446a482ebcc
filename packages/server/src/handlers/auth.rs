use axum::{Json, extract::State};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use sea_orm::sea_query::OnConflict;
use sea_orm::{EntityTrait, Set};
use tracing::instrument;

use crate::entity::user;
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::{AuthUser, SESSION_COOKIE};
use crate::extractors::json::AppJson;
use crate::models::auth::{GoogleLoginRequest, LoginResponse, UserResponse};
use crate::models::shared::OkResponse;
use crate::state::AppState;
use crate::utils::jwt;

fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::days(7))
        .build()
}

fn domain_allowed(email: &str, allowed: &[String]) -> bool {
    allowed
        .iter()
        .any(|domain| email.ends_with(&format!("@{}", domain.to_lowercase())))
}

#[utoipa::path(
    post,
    path = "/google",
    tag = "Auth",
    operation_id = "googleLogin",
    summary = "Sign in with a Google ID token",
    description = "Verifies the Google credential, enforces the email-domain allowlist, \
        resolves the user's role from the directory sheet and sets the session cookie.",
    request_body = GoogleLoginRequest,
    responses(
        (status = 200, description = "Signed in", body = LoginResponse),
        (status = 400, description = "Missing credential (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Credential rejected (TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Domain not allowed (PERMISSION_DENIED)", body = ErrorBody),
        (status = 502, description = "Directory lookup failed (UPSTREAM_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, jar, payload))]
pub async fn google_login(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(payload): AppJson<GoogleLoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    if payload.credential.trim().is_empty() {
        return Err(AppError::Validation("Missing credential".into()));
    }

    let identity = state.verifier.verify(&payload.credential).await?;
    let email = identity.email.trim().to_lowercase();

    if !domain_allowed(&email, &state.config.auth.allowed_email_domains) {
        tracing::warn!(%email, "sign-in from disallowed domain");
        return Err(AppError::PermissionDenied);
    }

    let role = state.roles.role_for(&email).await?;
    let name = identity
        .name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

    // Keep the directory record current. Authorization never reads it; the
    // role column just mirrors the resolver's answer at last login.
    let now = chrono::Utc::now();
    let record = user::ActiveModel {
        email: Set(email.clone()),
        name: Set(Some(name.clone())),
        role: Set(role.as_str().to_string()),
        last_login_at: Set(Some(now)),
        created_at: Set(now),
        ..Default::default()
    };
    user::Entity::insert(record)
        .on_conflict(
            OnConflict::column(user::Column::Email)
                .update_columns([
                    user::Column::Name,
                    user::Column::Role,
                    user::Column::LastLoginAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(&state.db)
        .await?;

    let token = jwt::sign(
        &email,
        &name,
        role,
        identity.picture.clone(),
        &state.config.auth.session_secret,
    )
    .map_err(|e| AppError::Internal(format!("Session sign error: {}", e)))?;

    let jar = jar.add(session_cookie(token, state.config.auth.secure_cookies));

    Ok((
        jar,
        Json(LoginResponse {
            user: UserResponse {
                email,
                name,
                role,
                picture: identity.picture,
            },
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/me",
    tag = "Auth",
    operation_id = "me",
    summary = "Current session user",
    responses(
        (status = 200, description = "Session user", body = UserResponse),
        (status = 401, description = "No session (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
)]
#[instrument(skip(auth_user), fields(email = %auth_user.email))]
pub async fn me(auth_user: AuthUser) -> Json<UserResponse> {
    Json(UserResponse {
        email: auth_user.email,
        name: auth_user.name,
        role: auth_user.role,
        picture: auth_user.picture,
    })
}

#[utoipa::path(
    post,
    path = "/logout",
    tag = "Auth",
    operation_id = "logout",
    summary = "Clear the session cookie",
    responses((status = 200, description = "Logged out", body = OkResponse)),
)]
#[instrument(skip(jar))]
pub async fn logout(jar: CookieJar) -> (CookieJar, Json<OkResponse>) {
    let cookie = Cookie::build((SESSION_COOKIE, "")).path("/").build();
    (jar.remove(cookie), Json(OkResponse::new()))
}
