//! Controller for the webhook intake.
//!
//! Every request on `/webhook` is captured as text (request line, headers, body) and
//! published on the event bus for the SSE and push publishers to relay.

use crate::{AppState, Error};

use axum::body::to_bytes;
use axum::extract::{Request, State};
use axum::http::{header::HOST, HeaderMap, HeaderValue, Method, StatusCode, Version};
use axum::response::IntoResponse;
use domain::error::Error as DomainError;
use events::Event;
use log::*;

/// ANY accept a webhook and relay it to every connected client
pub async fn receive(
    State(app_state): State<AppState>,
    request: Request,
) -> Result<impl IntoResponse, Error> {
    let (parts, body) = request.into_parts();
    debug!("Webhook received: {} {}", parts.method, parts.uri.path());

    let body = to_bytes(body, app_state.config.webhook_body_limit)
        .await
        .map_err(DomainError::invalid_request)?;

    let event = Event::new(capture(
        &parts.method,
        parts.uri.path(),
        parts.version,
        &parts.headers,
        &body,
    ));
    let event_id = event.id();
    let report = app_state.bus.publish(event);
    info!(
        "Webhook relayed as event {event_id} to {} subscriber(s), {} dropped",
        report.delivered, report.dropped
    );

    Ok((StatusCode::OK, "OK"))
}

/// Render a request the way it is relayed:
///
/// ```text
/// <METHOD> <PATH> <PROTO>\n
/// <Header-Name>: <value>\r\n   (one line per value, sorted by name)
/// \n
/// <body>
/// ```
///
/// The path excludes the query string and `Host` is not part of the header block.
/// Non UTF-8 bytes are replaced with U+FFFD.
pub(crate) fn capture(
    method: &Method,
    path: &str,
    version: Version,
    headers: &HeaderMap,
    body: &[u8],
) -> String {
    let mut lines: Vec<(String, &HeaderValue)> = headers
        .iter()
        .filter(|(name, _)| *name != HOST)
        .map(|(name, value)| (canonical_header_name(name.as_str()), value))
        .collect();
    // Stable, so repeated headers keep their order
    lines.sort_by(|a, b| a.0.cmp(&b.0));

    let mut text = format!("{method} {path} {version:?}\n");
    for (name, value) in lines {
        text.push_str(&name);
        text.push_str(": ");
        text.push_str(&String::from_utf8_lossy(value.as_bytes()));
        text.push_str("\r\n");
    }
    text.push('\n');
    text.push_str(&String::from_utf8_lossy(body));
    text
}

/// `x-request-id` -> `X-Request-Id`
fn canonical_header_name(name: &str) -> String {
    let mut upper = true;
    name.chars()
        .map(|c| {
            let out = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            out
        })
        .collect()
}
