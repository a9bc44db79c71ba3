use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    response::IntoResponse,
    routing::get,
};

use serialtrack_core::ProductId;

use crate::app::routes::common;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/:product_id/inventory", get(inventory_counts))
}

/// Aggregate stock counts for the Product domain's displays.
pub async fn inventory_counts(
    Extension(services): Extension<Arc<AppServices>>,
    Path(product_id): Path<String>,
) -> axum::response::Response {
    let product_id: ProductId = match common::parse_id(&product_id, "product id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.inventory_counts(product_id) {
        Ok(counts) => Json(dto::InventoryCountsResponse::from(counts)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
