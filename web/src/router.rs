use crate::controller::{
    health_check_controller, push_controller, sse_controller, webhook_controller,
};
use crate::AppState;
use axum::{
    routing::{any, get, post},
    Router,
};
use tower_http::cors::CorsLayer;

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(webhook_routes(app_state.clone()))
        .merge(sse_routes(app_state.clone()))
        .merge(push_routes(app_state))
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn webhook_routes(app_state: AppState) -> Router {
    Router::new()
        // Any method is relayed, not only POST
        .route("/webhook", any(webhook_controller::receive))
        .with_state(app_state)
}

fn sse_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/sse", get(sse_controller::subscribe))
        .with_state(app_state)
}

fn push_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/signalr/negotiate", post(push_controller::negotiate))
        .route("/signalr", get(push_controller::connect))
        // Browser hub clients negotiate cross-origin with credentials
        .layer(CorsLayer::very_permissive())
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::app_state;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_check_responds_healthy() {
        let app = define_routes(app_state());

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"healthy");
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let app = define_routes(app_state());

        let request = Request::builder()
            .uri("/webhooks")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_negotiate_preflight_allows_cross_origin() {
        let app = define_routes(app_state());

        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/signalr/negotiate")
            .header("origin", "http://localhost:8080")
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "http://localhost:8080"
        );
    }
}
