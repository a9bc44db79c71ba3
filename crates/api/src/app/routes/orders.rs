use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use serialtrack_core::{OrderId, OrderItemId, ProductId};
use serialtrack_orders::OrderItemRef;

use crate::app::routes::common;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/order-items", post(register_order_item))
        .route("/order-items/:id/status", get(order_item_status))
}

/// The Order domain pushes its line references here before serial work starts.
pub async fn register_order_item(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::RegisterOrderItemRequest>,
) -> axum::response::Response {
    let id: OrderItemId = match common::parse_id(&body.id, "order item id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let order_id: OrderId = match common::parse_id(&body.order_id, "order id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let product_id: ProductId = match common::parse_id(&body.product_id, "product id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let item = match OrderItemRef::new(id, order_id, product_id, body.quantity) {
        Ok(item) => item,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string());
        }
    };

    services.register_order_item(item);
    StatusCode::CREATED.into_response()
}

pub async fn order_item_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: OrderItemId = match common::parse_id(&id, "order item id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.order_item_status(id) {
        Ok(Some((item, status))) => {
            Json(dto::OrderItemStatusResponse::new(&item, status)).into_response()
        }
        Ok(None) => errors::json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("order item not found: {id}"),
        ),
        Err(e) => errors::store_error_to_response(e),
    }
}
