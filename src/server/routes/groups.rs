//! Group membership endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::group_error;
use crate::db::GroupRepository;
use crate::server::auth::AuthUser;
use crate::server::{api_error, AppState};

#[derive(Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub description: Option<String>,
    /// Invite emails; addresses that match no account are skipped.
    #[serde(default)]
    pub members: Vec<String>,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<CreateGroupRequest>,
) -> Response {
    if body.name.trim().is_empty() {
        return api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "validation_error",
            "Group name is required",
        );
    }

    let groups = GroupRepository::new(state.pool.clone());
    match groups
        .create(
            &body.name,
            body.description.as_deref(),
            auth.user.id,
            &body.members,
        )
        .await
    {
        Ok(group) => (StatusCode::CREATED, Json(group)).into_response(),
        Err(e) => group_error(e),
    }
}

pub async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Response {
    let groups = GroupRepository::new(state.pool.clone());
    match groups.list_for_user(auth.user.id).await {
        Ok(groups) => Json(groups).into_response(),
        Err(e) => group_error(e),
    }
}

#[derive(Deserialize)]
pub struct AddMemberRequest {
    pub id: Uuid,
    pub email: String,
}

pub async fn add_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<AddMemberRequest>,
) -> Response {
    let groups = GroupRepository::new(state.pool.clone());
    match groups.add_member(body.id, auth.user.id, &body.email).await {
        Ok(group) => Json(group).into_response(),
        Err(e) => group_error(e),
    }
}

pub async fn detail(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(group_id): Path<Uuid>,
) -> Response {
    let groups = GroupRepository::new(state.pool.clone());
    match groups.detail(group_id, auth.user.id).await {
        Ok(group) => Json(group).into_response(),
        Err(e) => group_error(e),
    }
}

#[derive(Serialize)]
struct LeaveResponse {
    group_id: Uuid,
    message: String,
    remaining_members: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    new_admin: Option<String>,
}

pub async fn leave(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(group_id): Path<Uuid>,
) -> Response {
    let groups = GroupRepository::new(state.pool.clone());
    match groups.leave(group_id, auth.user.id).await {
        Ok(outcome) => {
            tracing::info!(
                "user {} left group {}{}",
                auth.user.id,
                group_id,
                if outcome.deleted { " (deleted)" } else { "" }
            );
            Json(LeaveResponse {
                group_id: outcome.group_id,
                message: outcome.message(),
                remaining_members: outcome.remaining_members,
                new_admin: outcome.new_admin,
            })
            .into_response()
        }
        Err(e) => group_error(e),
    }
}
