use crate::AppState;
use axum::extract::State;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONNECTION,
};
use axum::response::sse::{KeepAlive, Sse};
use axum::response::IntoResponse;
use log::*;

/// GET a long-lived stream of encrypted events, one `data:` frame per relayed webhook.
pub async fn subscribe(State(app_state): State<AppState>) -> impl IntoResponse {
    // Subscribe before responding: the frame stream is lazy
    let connection = app_state.sse_manager.connect();
    debug!("Establishing SSE connection {}", connection.id());

    let headers = [
        (ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        (ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
        (CACHE_CONTROL, "no-cache"),
        (CONNECTION, "keep-alive"),
    ];
    let keep_alive = KeepAlive::new().interval(app_state.config.sse_keep_alive());

    (headers, Sse::new(connection.into_stream()).keep_alive(keep_alive))
}
