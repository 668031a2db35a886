//! Group ledger endpoints: shared expenses, settlements, and balances.
//!
//! Writes broadcast a ledger event to the group's realtime subscribers
//! after the storage commit; a delivery problem is the subscriber's
//! problem, never the writer's.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::{group_error, split_error};
use crate::db::{GroupRepository, NewShare, SplitRepository};
use crate::ledger::compute_balances;
use crate::server::auth::AuthUser;
use crate::server::hub::LedgerEvent;
use crate::server::AppState;

#[derive(Deserialize)]
pub struct CreateExpenseRequest {
    pub description: String,
    pub amount: f64,
    /// Explicit allocation; empty means an even split across current
    /// members at balance time.
    #[serde(default)]
    pub shares: Vec<NewShare>,
}

pub async fn create_expense(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(group_id): Path<Uuid>,
    Json(body): Json<CreateExpenseRequest>,
) -> Response {
    // The caller is the payer and must be in the group
    let groups = GroupRepository::new(state.pool.clone());
    if let Err(e) = groups.detail(group_id, auth.user.id).await {
        return group_error(e);
    }

    let splits = SplitRepository::new(state.pool.clone());
    let expense = match splits
        .record_expense(
            group_id,
            auth.user.id,
            &body.description,
            body.amount,
            &body.shares,
        )
        .await
    {
        Ok(expense) => expense,
        Err(e) => return split_error(e),
    };

    let delivered = state
        .hub
        .broadcast(
            group_id,
            LedgerEvent::NewExpense {
                expense: expense.clone(),
            },
        )
        .await;
    tracing::debug!(
        "expense {} broadcast to {} subscriber(s) of group {}",
        expense.id,
        delivered,
        group_id
    );

    (StatusCode::CREATED, Json(expense)).into_response()
}

pub async fn list_expenses(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(group_id): Path<Uuid>,
) -> Response {
    let groups = GroupRepository::new(state.pool.clone());
    match groups.detail(group_id, auth.user.id).await {
        Ok(_) => {}
        Err(e) => return group_error(e),
    }

    let splits = SplitRepository::new(state.pool.clone());
    match splits.list_expenses(group_id).await {
        Ok(expenses) => Json(expenses).into_response(),
        Err(e) => split_error(e),
    }
}

#[derive(Deserialize)]
pub struct CreateSettlementRequest {
    pub receiver_id: Uuid,
    pub amount: f64,
}

pub async fn create_settlement(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(group_id): Path<Uuid>,
    Json(body): Json<CreateSettlementRequest>,
) -> Response {
    let splits = SplitRepository::new(state.pool.clone());
    let settlement = match splits
        .record_settlement(group_id, auth.user.id, body.receiver_id, body.amount)
        .await
    {
        Ok(settlement) => settlement,
        Err(e) => return split_error(e),
    };

    state
        .hub
        .broadcast(
            group_id,
            LedgerEvent::NewSettlement {
                settlement: settlement.clone(),
            },
        )
        .await;

    (StatusCode::CREATED, Json(settlement)).into_response()
}

pub async fn balances(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(group_id): Path<Uuid>,
) -> Response {
    let groups = GroupRepository::new(state.pool.clone());
    let group = match groups.detail(group_id, auth.user.id).await {
        Ok(group) => group,
        Err(e) => return group_error(e),
    };

    let splits = SplitRepository::new(state.pool.clone());
    let expenses = match splits.list_expenses(group_id).await {
        Ok(expenses) => expenses,
        Err(e) => return split_error(e),
    };
    let settlements = match splits.list_settlements(group_id).await {
        Ok(settlements) => settlements,
        Err(e) => return split_error(e),
    };

    Json(compute_balances(&group, &expenses, &settlements, auth.user.id)).into_response()
}
