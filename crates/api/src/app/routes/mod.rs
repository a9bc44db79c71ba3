use axum::Router;

pub mod common;
pub mod orders;
pub mod products;
pub mod serials;
pub mod system;

/// Router for all API endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/serials", serials::router())
        .nest("/products", products::router())
        .merge(orders::router())
}
