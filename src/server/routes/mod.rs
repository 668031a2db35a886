//! HTTP route handlers, one module per domain area.

pub mod budgets;
pub mod expenses;
pub mod groups;
pub mod splits;

use axum::http::StatusCode;
use axum::response::Response;

use super::api_error;
use super::auth::internal_error;
use crate::db::{GroupError, SplitError};

/// Maps membership-manager errors onto the API error envelope.
fn group_error(err: GroupError) -> Response {
    match err {
        GroupError::GroupNotFound => {
            api_error(StatusCode::NOT_FOUND, "not_found", "Group not found")
        }
        GroupError::UserNotFound => api_error(
            StatusCode::NOT_FOUND,
            "not_found",
            "User with this email not found",
        ),
        GroupError::Forbidden => api_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            "You do not have permission to access this group",
        ),
        GroupError::AlreadyMember => api_error(
            StatusCode::CONFLICT,
            "conflict",
            "This user is already a member of the group",
        ),
        GroupError::NotInGroup => api_error(
            StatusCode::BAD_REQUEST,
            "invalid_state",
            "You are not a member of this group",
        ),
        GroupError::Database(e) => {
            tracing::error!("group storage error: {}", e);
            internal_error()
        }
    }
}

/// Maps split-ledger errors onto the API error envelope.
fn split_error(err: SplitError) -> Response {
    match err {
        SplitError::GroupNotFound => {
            api_error(StatusCode::NOT_FOUND, "not_found", "Group not found")
        }
        SplitError::NotAMember(user_id) => api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "validation_error",
            format!("User {} is not a member of this group", user_id),
        ),
        SplitError::Validation(message) => {
            api_error(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", message)
        }
        SplitError::Database(e) => {
            tracing::error!("ledger storage error: {}", e);
            internal_error()
        }
    }
}
