//! HTTP and WebSocket server wiring.

pub mod auth;
pub mod hub;
pub mod routes;
pub mod tokens;
pub mod ws;

pub use hub::{EventHub, LedgerEvent};
pub use tokens::TokenStore;

use axum::{
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub hub: Arc<EventHub>,
    pub tokens: Arc<TokenStore>,
}

impl AppState {
    pub fn new(pool: SqlitePool, token_ttl_days: i64) -> Self {
        Self {
            tokens: Arc::new(TokenStore::new(pool.clone(), token_ttl_days)),
            hub: Arc::new(EventHub::new()),
            pool,
        }
    }
}

/// Error envelope returned by every failing endpoint.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

pub(crate) fn api_error(
    status: StatusCode,
    error: &'static str,
    message: impl Into<String>,
) -> Response {
    (
        status,
        Json(ErrorBody {
            error,
            message: message.into(),
        }),
    )
        .into_response()
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Builds the full application router.
pub fn app(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/me", get(auth::me))
        .route("/groups", post(routes::groups::create).get(routes::groups::list))
        .route("/groups/addMember", post(routes::groups::add_member))
        .route("/groups/{id}/detail", get(routes::groups::detail))
        .route("/groups/{id}/leave", delete(routes::groups::leave))
        .route(
            "/groups/{id}/expenses",
            post(routes::splits::create_expense).get(routes::splits::list_expenses),
        )
        .route(
            "/groups/{id}/settlements",
            post(routes::splits::create_settlement),
        )
        .route("/groups/{id}/balances", get(routes::splits::balances))
        .route(
            "/expenses",
            post(routes::expenses::create).get(routes::expenses::list),
        )
        .route(
            "/expenses/{id}",
            get(routes::expenses::get)
                .put(routes::expenses::update)
                .delete(routes::expenses::delete),
        )
        .route("/budgets", post(routes::budgets::set))
        .route("/budgets/{year}/{month}", get(routes::budgets::get))
        .route(
            "/budgets/{year}/{month}/remaining",
            get(routes::budgets::remaining),
        )
        .route("/analytics/monthly_spending", get(routes::expenses::monthly_spending))
        .route(
            "/analytics/spending_by_category",
            get(routes::expenses::spending_by_category),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    // The WebSocket route authenticates inside the handler (token query
    // parameter or header), so it stays outside the middleware stack.
    let ws_routes = Router::new().route("/ws/groups/{group_id}", get(ws::subscribe_group));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use axum::body::Body;
    use axum::http::{header, Request};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct TestContext {
        app: Router,
        _temp_dir: TempDir,
    }

    async fn setup() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = init_db(Some(db_path)).await.unwrap();
        TestContext {
            app: app(AppState::new(pool, 30)),
            _temp_dir: temp_dir,
        }
    }

    fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Registers a user and returns a login token.
    async fn register_and_login(app: &Router, username: &str) -> String {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/auth/register",
                None,
                json!({
                    "username": username,
                    "email": format!("{}@example.com", username),
                    "password": "secret",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/auth/login",
                None,
                json!({"username": username, "password": "secret"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let ctx = setup().await;

        let response = ctx.app.oneshot(get_request("/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_protected_routes_require_token() {
        let ctx = setup().await;

        let response = ctx
            .app
            .clone()
            .oneshot(get_request("/groups", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["error"], "missing_auth");

        let response = ctx
            .app
            .oneshot(get_request("/me", Some("bogus-token")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_register_login_me_flow() {
        let ctx = setup().await;

        let token = register_and_login(&ctx.app, "alice").await;

        let response = ctx
            .app
            .oneshot(get_request("/me", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["username"], "alice");
        assert_eq!(body["email"], "alice@example.com");
    }

    #[tokio::test]
    async fn test_duplicate_registration_conflicts() {
        let ctx = setup().await;
        register_and_login(&ctx.app, "alice").await;

        let response = ctx
            .app
            .oneshot(json_request(
                "POST",
                "/auth/register",
                None,
                json!({
                    "username": "alice",
                    "email": "other@example.com",
                    "password": "secret",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_group_expense_and_balances_flow() {
        let ctx = setup().await;
        let alice = register_and_login(&ctx.app, "alice").await;
        let bob = register_and_login(&ctx.app, "bob").await;

        // Alice creates a group with Bob
        let response = ctx
            .app
            .clone()
            .oneshot(json_request(
                "POST",
                "/groups",
                Some(&alice),
                json!({"name": "Trip", "members": ["bob@example.com"]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let group = body_json(response).await;
        let group_id = group["id"].as_str().unwrap().to_string();
        assert_eq!(group["members"].as_array().unwrap().len(), 2);

        // Alice records a $30 dinner, split evenly at balance time
        let response = ctx
            .app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/groups/{}/expenses", group_id),
                Some(&alice),
                json!({"description": "Dinner", "amount": 30.0}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        // A non-member cannot read the ledger
        let carol = register_and_login(&ctx.app, "carol").await;
        let response = ctx
            .app
            .clone()
            .oneshot(get_request(
                &format!("/groups/{}/expenses", group_id),
                Some(&carol),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // Bob sees himself owing half
        let response = ctx
            .app
            .clone()
            .oneshot(get_request(
                &format!("/groups/{}/balances", group_id),
                Some(&bob),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let balances = body_json(response).await;
        assert_eq!(balances["total_owed_by_you"].as_f64().unwrap(), 15.0);
        assert_eq!(balances["total_owed_to_you"].as_f64().unwrap(), 0.0);

        // Bob settles up and drops out of the itemized list
        let response = ctx
            .app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/groups/{}/settlements", group_id),
                Some(&bob),
                json!({
                    "receiver_id": group["created_by"],
                    "amount": 15.0,
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = ctx
            .app
            .oneshot(get_request(
                &format!("/groups/{}/balances", group_id),
                Some(&bob),
            ))
            .await
            .unwrap();
        let balances = body_json(response).await;
        assert_eq!(balances["total_owed_by_you"].as_f64().unwrap(), 0.0);
        let itemized = balances["balances"].as_array().unwrap();
        assert!(itemized
            .iter()
            .all(|entry| entry["username"] != "bob"));
    }

    #[tokio::test]
    async fn test_expense_validation_rejected() {
        let ctx = setup().await;
        let alice = register_and_login(&ctx.app, "alice").await;

        let response = ctx
            .app
            .oneshot(json_request(
                "POST",
                "/expenses",
                Some(&alice),
                json!({"description": "Nothing", "amount": -1.0}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["error"], "validation_error");
    }
}
