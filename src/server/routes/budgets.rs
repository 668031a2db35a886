//! Monthly budget endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;

use crate::db::BudgetRepository;
use crate::server::auth::{internal_error, AuthUser};
use crate::server::{api_error, AppState};

fn validate_month(month: u32) -> Option<Response> {
    if (1..=12).contains(&month) {
        None
    } else {
        Some(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "validation_error",
            "Month must be between 1 and 12",
        ))
    }
}

#[derive(Deserialize)]
pub struct SetBudgetRequest {
    pub month: u32,
    pub year: i32,
    pub amount: f64,
}

pub async fn set(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<SetBudgetRequest>,
) -> Response {
    if let Some(rejection) = validate_month(body.month) {
        return rejection;
    }
    if !body.amount.is_finite() || body.amount <= 0.0 {
        return api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "validation_error",
            "Budget amount must be positive",
        );
    }

    let budgets = BudgetRepository::new(state.pool.clone());
    match budgets
        .upsert(auth.user.id, body.month, body.year, body.amount)
        .await
    {
        Ok(budget) => (StatusCode::CREATED, Json(budget)).into_response(),
        Err(e) => {
            tracing::error!("failed to set budget: {}", e);
            internal_error()
        }
    }
}

pub async fn get(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path((year, month)): Path<(i32, u32)>,
) -> Response {
    if let Some(rejection) = validate_month(month) {
        return rejection;
    }

    let budgets = BudgetRepository::new(state.pool.clone());
    match budgets.get(auth.user.id, month, year).await {
        Ok(Some(budget)) => Json(budget).into_response(),
        Ok(None) => api_error(
            StatusCode::NOT_FOUND,
            "not_found",
            "No budget set for this month",
        ),
        Err(e) => {
            tracing::error!("failed to load budget: {}", e);
            internal_error()
        }
    }
}

pub async fn remaining(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path((year, month)): Path<(i32, u32)>,
) -> Response {
    if let Some(rejection) = validate_month(month) {
        return rejection;
    }

    let budgets = BudgetRepository::new(state.pool.clone());
    match budgets.status(auth.user.id, month, year).await {
        Ok(status) => Json(status).into_response(),
        Err(e) => {
            tracing::error!("failed to compute remaining budget: {}", e);
            internal_error()
        }
    }
}
