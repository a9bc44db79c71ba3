use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};

use serialtrack_core::{DealerAccountId, OrderItemId, ProductId, SerialUnitId};
use serialtrack_serials::SerialNumber;

use crate::app::routes::common;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(receive_serials))
        .route("/available/:product_id", get(available_serials))
        .route("/order-items/:order_item_id", get(assigned_serials))
        .route(
            "/order-items/:order_item_id/allocated",
            get(allocated_serials),
        )
        .route("/assign", post(assign_serials))
        .route("/unassign", post(unassign_serials))
        .route("/allocate", post(allocate_serials))
        .route("/mark-unavailable", post(mark_unavailable))
        .route("/number/:serial_number", get(by_serial_number))
        .route("/:id/history", get(unit_history))
}

pub async fn receive_serials(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Json(body): Json<dto::ReceiveSerialsRequest>,
) -> axum::response::Response {
    let actor = common::actor_from_headers(&headers);
    let product_id: ProductId = match common::parse_id(&body.product_id, "product id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let mut serial_numbers = Vec::with_capacity(body.serial_numbers.len());
    for raw in body.serial_numbers {
        match SerialNumber::new(raw) {
            Ok(sn) => serial_numbers.push(sn),
            Err(e) => {
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "validation_error",
                    e.to_string(),
                );
            }
        }
    }

    match services.receive_serials(product_id, serial_numbers, actor) {
        Ok(units) => (
            StatusCode::CREATED,
            Json(dto::serial_units_response(&units)),
        )
            .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn available_serials(
    Extension(services): Extension<Arc<AppServices>>,
    Path(product_id): Path<String>,
) -> axum::response::Response {
    let product_id: ProductId = match common::parse_id(&product_id, "product id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.available_serials(product_id) {
        Ok(units) => Json(dto::serial_units_response(&units)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn assigned_serials(
    Extension(services): Extension<Arc<AppServices>>,
    Path(order_item_id): Path<String>,
) -> axum::response::Response {
    let order_item_id: OrderItemId = match common::parse_id(&order_item_id, "order item id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.assigned_serials(order_item_id) {
        Ok(units) => Json(dto::serial_units_response(&units)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn allocated_serials(
    Extension(services): Extension<Arc<AppServices>>,
    Path(order_item_id): Path<String>,
) -> axum::response::Response {
    let order_item_id: OrderItemId = match common::parse_id(&order_item_id, "order item id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.allocated_serials(order_item_id) {
        Ok(units) => Json(dto::serial_units_response(&units)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn assign_serials(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Json(body): Json<dto::AssignSerialsRequest>,
) -> axum::response::Response {
    let actor = common::actor_from_headers(&headers);
    let order_item_id: OrderItemId = match common::parse_id(&body.order_item_id, "order item id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let product_id: ProductId = match common::parse_id(&body.product_id, "product id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let serial_ids = match common::parse_serial_ids(&body.serial_ids) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.assign_serials(order_item_id, product_id, &serial_ids, actor) {
        Ok(units) => Json(dto::serial_units_response(&units)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn unassign_serials(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Json(body): Json<dto::UnassignSerialsRequest>,
) -> axum::response::Response {
    let actor = common::actor_from_headers(&headers);
    let order_item_id: OrderItemId = match common::parse_id(&body.order_item_id, "order item id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let serial_ids = match common::parse_serial_ids(&body.serial_ids) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.unassign_serials(order_item_id, &serial_ids, actor) {
        Ok(units) => Json(dto::serial_units_response(&units)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn allocate_serials(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Json(body): Json<dto::AllocateSerialsRequest>,
) -> axum::response::Response {
    let actor = common::actor_from_headers(&headers);
    let dealer_account_id: DealerAccountId =
        match common::parse_id(&body.dealer_account_id, "dealer account id") {
            Ok(v) => v,
            Err(resp) => return resp,
        };
    let serial_ids = match common::parse_serial_ids(&body.serial_ids) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.allocate_serials(&serial_ids, dealer_account_id, actor) {
        Ok(units) => Json(dto::serial_units_response(&units)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn mark_unavailable(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Json(body): Json<dto::MarkUnavailableRequest>,
) -> axum::response::Response {
    let actor = common::actor_from_headers(&headers);
    let reason = match errors::parse_unavailable_reason(&body.reason) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let serial_ids = match common::parse_serial_ids(&body.serial_ids) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.mark_unavailable(&serial_ids, reason, actor) {
        Ok(units) => Json(dto::serial_units_response(&units)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn by_serial_number(
    Extension(services): Extension<Arc<AppServices>>,
    Path(serial_number): Path<String>,
) -> axum::response::Response {
    match services.find_by_serial_number(&serial_number) {
        Ok(Some(unit)) => Json(dto::SerialUnitResponse::from(&unit)).into_response(),
        Ok(None) => errors::json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("serial number not found: {serial_number}"),
        ),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn unit_history(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let unit_id: SerialUnitId = match common::parse_id(&id, "serial id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let records = services.unit_history(unit_id);
    Json(
        records
            .iter()
            .map(dto::AuditRecordResponse::from)
            .collect::<Vec<_>>(),
    )
    .into_response()
}
