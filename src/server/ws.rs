//! Per-group WebSocket subscriptions.
//!
//! `GET /ws/groups/{group_id}` upgrades to a WebSocket that pushes the
//! group's ledger events as JSON text frames. The caller authenticates
//! with a token (query parameter or Authorization header) and must be a
//! current member of the group. Client frames carry no semantics beyond
//! keep-alive; dropping the connection is the unsubscribe.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use super::auth::{bearer_token, internal_error};
use super::hub::EventHub;
use super::{api_error, AppState};
use crate::db::GroupRepository;

#[derive(Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

pub async fn subscribe_group(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = query.token.or_else(|| bearer_token(&headers)) else {
        return api_error(
            StatusCode::UNAUTHORIZED,
            "missing_auth",
            "Token required (query parameter or Authorization header)",
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

    let groups = GroupRepository::new(state.pool.clone());
    match groups.is_member(group_id, user_id).await {
        Ok(true) => {}
        Ok(false) => {
            return api_error(
                StatusCode::FORBIDDEN,
                "forbidden",
                "You are not a member of this group",
            );
        }
        Err(e) => {
            tracing::error!("membership check failed: {}", e);
            return internal_error();
        }
    }

    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| serve_subscription(socket, hub, group_id, user_id))
}

async fn serve_subscription(socket: WebSocket, hub: Arc<EventHub>, group_id: Uuid, user_id: Uuid) {
    tracing::debug!("user {} subscribed to group {}", user_id, group_id);

    let mut events = hub.subscribe(group_id).await;
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let frame = match serde_json::to_string(&event) {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::error!("failed to encode ledger event: {}", e);
                            continue;
                        }
                    };
                    if sink.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(
                        "subscriber of group {} lagged, {} event(s) dropped",
                        group_id,
                        missed
                    );
                }
                Err(RecvError::Closed) => break,
            },
            incoming = stream.next() => match incoming {
                // Client text/ping frames are treated as keep-alives
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!("websocket error for group {}: {}", group_id, e);
                    break;
                }
            },
        }
    }

    // The receiver drops here, which is the unsubscribe
    tracing::debug!("user {} disconnected from group {}", user_id, group_id);
}
