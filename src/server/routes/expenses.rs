//! Personal expense endpoints and spending analytics.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::{ExpenseChanges, ExpenseFilter, ExpenseRepository};
use crate::models::{Expense, ExpenseCategory};
use crate::server::auth::{internal_error, AuthUser};
use crate::server::{api_error, AppState};

fn expense_not_found() -> Response {
    api_error(StatusCode::NOT_FOUND, "not_found", "Expense not found")
}

fn invalid_amount() -> Response {
    api_error(
        StatusCode::UNPROCESSABLE_ENTITY,
        "validation_error",
        "Expense amount must be positive",
    )
}

#[derive(Deserialize)]
pub struct CreateExpenseRequest {
    pub description: String,
    pub amount: f64,
    pub category: Option<ExpenseCategory>,
    pub spent_at: Option<DateTime<Utc>>,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<CreateExpenseRequest>,
) -> Response {
    if !body.amount.is_finite() || body.amount <= 0.0 {
        return invalid_amount();
    }

    let mut expense = Expense::new(auth.user.id, body.description, body.amount);
    if let Some(category) = body.category {
        expense = expense.with_category(category);
    }
    if let Some(spent_at) = body.spent_at {
        expense = expense.with_spent_at(spent_at);
    }

    let expenses = ExpenseRepository::new(state.pool.clone());
    match expenses.create(&expense).await {
        Ok(()) => (StatusCode::CREATED, Json(expense)).into_response(),
        Err(e) => {
            tracing::error!("failed to create expense: {}", e);
            internal_error()
        }
    }
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub skip: i64,
    pub limit: Option<i64>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub category: Option<ExpenseCategory>,
}

pub async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> Response {
    let filter = ExpenseFilter {
        skip: query.skip.max(0),
        limit: query.limit,
        start_date: query.start_date,
        end_date: query.end_date,
        category: query.category,
    };

    let expenses = ExpenseRepository::new(state.pool.clone());
    match expenses.list(auth.user.id, &filter).await {
        Ok(expenses) => Json(expenses).into_response(),
        Err(e) => {
            tracing::error!("failed to list expenses: {}", e);
            internal_error()
        }
    }
}

pub async fn get(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Response {
    let expenses = ExpenseRepository::new(state.pool.clone());
    match expenses.get(auth.user.id, id).await {
        Ok(Some(expense)) => Json(expense).into_response(),
        Ok(None) => expense_not_found(),
        Err(e) => {
            tracing::error!("failed to load expense: {}", e);
            internal_error()
        }
    }
}

pub async fn update(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(changes): Json<ExpenseChanges>,
) -> Response {
    if let Some(amount) = changes.amount {
        if !amount.is_finite() || amount <= 0.0 {
            return invalid_amount();
        }
    }

    let expenses = ExpenseRepository::new(state.pool.clone());
    match expenses.update(auth.user.id, id, changes).await {
        Ok(Some(expense)) => Json(expense).into_response(),
        Ok(None) => expense_not_found(),
        Err(e) => {
            tracing::error!("failed to update expense: {}", e);
            internal_error()
        }
    }
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Response {
    let expenses = ExpenseRepository::new(state.pool.clone());
    match expenses.delete(auth.user.id, id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => expense_not_found(),
        Err(e) => {
            tracing::error!("failed to delete expense: {}", e);
            internal_error()
        }
    }
}

pub async fn monthly_spending(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Response {
    let expenses = ExpenseRepository::new(state.pool.clone());
    match expenses.monthly_spending(auth.user.id).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => {
            tracing::error!("failed to aggregate monthly spending: {}", e);
            internal_error()
        }
    }
}

#[derive(Deserialize)]
pub struct CategoryQuery {
    pub month: Option<u32>,
    pub year: Option<i32>,
}

pub async fn spending_by_category(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<CategoryQuery>,
) -> Response {
    let expenses = ExpenseRepository::new(state.pool.clone());
    match expenses
        .spending_by_category(auth.user.id, query.month, query.year)
        .await
    {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => {
            tracing::error!("failed to aggregate category spending: {}", e);
            internal_error()
        }
    }
}
