//! The REST + SSE wire surface: translates HTTP requests into `Store`
//! operations and JSON responses. Holds no durable state of its own.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod sse;
pub mod state;

pub use state::AppState;

use axum::http::{header, Method};
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

const PREFLIGHT_MAX_AGE: std::time::Duration = std::time::Duration::from_secs(86_400);

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(PREFLIGHT_MAX_AGE);

    let router = Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/sessions",
            get(handlers::list_sessions).post(handlers::create_session),
        )
        .route(
            "/sessions/:id",
            get(handlers::get_session)
                .patch(handlers::update_session)
                .delete(handlers::delete_session),
        )
        .route(
            "/sessions/:id/annotations",
            post(handlers::add_annotation),
        )
        .route("/sessions/:id/pending", get(handlers::session_pending))
        .route("/sessions/:id/events", get(sse::session_events))
        .route(
            "/annotations/:id",
            get(handlers::get_annotation)
                .patch(handlers::update_annotation)
                .delete(handlers::delete_annotation),
        )
        .route(
            "/annotations/:id/thread",
            post(handlers::add_thread_message),
        )
        .route("/pending", get(handlers::all_pending))
        .route("/events", get(sse::domain_events));

    let router = if state.api_key.is_some() {
        router.layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ))
    } else {
        router
    };

    router.layer(cors).with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn test_app() -> Router {
        let store = agentation_store::open_store("memory", 7).await.unwrap();
        build_router(AppState::new(std::sync::Arc::new(store), None))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_check_reports_ok() {
        let app = test_app().await;
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_and_list_sessions() {
        let app = test_app().await;
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/sessions")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({ "url": "http://localhost:3000/x" }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        assert_eq!(created["status"], "active");
        assert_eq!(created["url"], "http://localhost:3000/x");

        let response = app
            .oneshot(Request::builder().uri("/sessions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let sessions = body_json(response).await;
        assert_eq!(sessions.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_url_is_rejected() {
        let app = test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/sessions")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn annotation_lifecycle_and_illegal_transition() {
        let app = test_app().await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/sessions")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({ "url": "http://localhost:3000/x" }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let session = body_json(response).await;
        let session_id = session["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/sessions/{session_id}/annotations"))
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({
                            "comment": "fix me",
                            "element": "button",
                            "elementPath": "body>button"
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let annotation = body_json(response).await;
        assert_eq!(annotation["status"], "pending");
        let annotation_id = annotation["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PATCH")
                    .uri(format!("/annotations/{annotation_id}"))
                    .header("content-type", "application/json")
                    .body(Body::from(json!({ "status": "resolved" }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PATCH")
                    .uri(format!("/annotations/{annotation_id}"))
                    .header("content-type", "application/json")
                    .body(Body::from(json!({ "status": "acknowledged" }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/sessions/{session_id}/pending"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let pending = body_json(response).await;
        assert_eq!(pending["count"], 1);
    }

    #[tokio::test]
    async fn unknown_session_is_404() {
        let app = test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/sessions/does-not-exist")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bearer_auth_rejects_missing_and_wrong_credential() {
        let store = agentation_store::open_store("memory", 7).await.unwrap();
        let app = build_router(AppState::new(
            std::sync::Arc::new(store),
            Some("secret".to_string()),
        ));

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/sessions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/sessions")
                    .header("authorization", "Bearer secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
