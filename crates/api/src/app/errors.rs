use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use serialtrack_infra::engine::EngineError;
use serialtrack_infra::serial_store::SerialStoreError;
use serialtrack_serials::UnavailableReason;

pub fn engine_error_to_response(err: EngineError) -> axum::response::Response {
    match err {
        EngineError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        EngineError::Validation(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        EngineError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        EngineError::NotInStock(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "not_in_stock", msg)
        }
        EngineError::NotAssigned(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "not_assigned", msg)
        }
        EngineError::ProductMismatch(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "product_mismatch", msg)
        }
        EngineError::QuantityExceeded(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "quantity_exceeded", msg)
        }
        EngineError::Store(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            format!("{e}"),
        ),
        EngineError::Publish(msg) => json_error(StatusCode::BAD_GATEWAY, "publish_error", msg),
    }
}

pub fn store_error_to_response(err: SerialStoreError) -> axum::response::Response {
    match err {
        SerialStoreError::NotFound(id) => json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("serial unit not found: {id}"),
        ),
        SerialStoreError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        other => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            format!("{other}"),
        ),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn parse_unavailable_reason(s: &str) -> Result<UnavailableReason, axum::response::Response> {
    match s.to_uppercase().as_str() {
        "DAMAGED" => Ok(UnavailableReason::Damaged),
        "SOLD" => Ok(UnavailableReason::Sold),
        _ => Err(json_error(
            StatusCode::BAD_REQUEST,
            "invalid_reason",
            "reason must be one of: DAMAGED, SOLD",
        )),
    }
}
