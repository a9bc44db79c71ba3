use core::str::FromStr;

use axum::http::{HeaderMap, StatusCode};
use uuid::Uuid;

use serialtrack_core::{ActorId, SerialUnitId};

use crate::app::errors;

/// Acting admin identity, carried on domain events for audit.
///
/// Session plumbing is outside this service; the upstream gateway forwards the
/// authenticated actor in `X-Actor-Id`. Absent or malformed, the nil actor is
/// recorded rather than rejecting the request.
pub fn actor_from_headers(headers: &HeaderMap) -> ActorId {
    headers
        .get("x-actor-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| ActorId::from_uuid(Uuid::nil()))
}

/// Parse a path/body identifier, mapping failure to a 400 response.
pub fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, axum::response::Response> {
    raw.parse().map_err(|_| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("invalid {what}"),
        )
    })
}

/// Parse a batch of serial unit ids.
pub fn parse_serial_ids(raw: &[String]) -> Result<Vec<SerialUnitId>, axum::response::Response> {
    raw.iter().map(|s| parse_id(s, "serial id")).collect()
}
