//! Bearer authentication: registration, login, and the request middleware.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use super::{api_error, AppState};
use crate::db::{UserError, UserRepository};
use crate::models::User;

/// The resolved caller, added to request extensions by [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
}

/// Pulls the token out of an `Authorization: Bearer <token>` header.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.to_string())
}

/// Resolves the bearer token to a user and stores it in the request
/// extensions, or rejects the request with 401.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(request.headers()) else {
        return api_error(
            StatusCode::UNAUTHORIZED,
            "missing_auth",
            "Authorization header with Bearer token required",
        );
    };

    let user_id = match state.tokens.verify(&token).await {
        Ok(Some(user_id)) => user_id,
        Ok(None) => {
            return api_error(
                StatusCode::UNAUTHORIZED,
                "invalid_token",
                "Token is unknown or expired",
            );
        }
        Err(e) => {
            tracing::error!("token lookup failed: {}", e);
            return internal_error();
        }
    };

    let users = UserRepository::new(state.pool.clone());
    match users.get_by_id(user_id).await {
        Ok(Some(user)) => {
            request.extensions_mut().insert(AuthUser { user });
            next.run(request).await
        }
        Ok(None) => api_error(
            StatusCode::UNAUTHORIZED,
            "invalid_token",
            "Token refers to a deleted account",
        ),
        Err(e) => {
            tracing::error!("user lookup failed: {}", e);
            internal_error()
        }
    }
}

pub(crate) fn internal_error() -> Response {
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal",
        "Internal server error",
    )
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Response {
    if body.username.trim().is_empty() || body.email.trim().is_empty() || body.password.is_empty() {
        return api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "validation_error",
            "Username, email, and password are required",
        );
    }

    let users = UserRepository::new(state.pool.clone());
    match users.create(&body.username, &body.email, &body.password).await {
        Ok(user) => (StatusCode::CREATED, Json(user)).into_response(),
        Err(UserError::AlreadyExists) => api_error(
            StatusCode::CONFLICT,
            "conflict",
            "User with this username or email already exists",
        ),
        Err(UserError::Database(e)) => {
            tracing::error!("failed to register user: {}", e);
            internal_error()
        }
    }
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    token: String,
    user: User,
}

pub async fn login(State(state): State<AppState>, Json(body): Json<LoginRequest>) -> Response {
    let users = UserRepository::new(state.pool.clone());
    let user = match users.verify_credentials(&body.username, &body.password).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return api_error(
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                "Invalid username or password",
            );
        }
        Err(e) => {
            tracing::error!("credential check failed: {}", e);
            return internal_error();
        }
    };

    match state.tokens.issue(user.id).await {
        Ok(token) => Json(LoginResponse { token, user }).into_response(),
        Err(e) => {
            tracing::error!("failed to issue token: {}", e);
            internal_error()
        }
    }
}

pub async fn me(Extension(auth): Extension<AuthUser>) -> Json<User> {
    Json(auth.user)
}
