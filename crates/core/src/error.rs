//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (lifecycle
/// preconditions, quantity invariants, conflicts). Infrastructure concerns
/// belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (unknown serial/order item/product).
    #[error("not found")]
    NotFound,

    /// A unit is not `InStock`, so it cannot be assigned or written off.
    #[error("not in stock: {0}")]
    NotInStock(String),

    /// A unit is not assigned to the expected order item.
    #[error("not assigned: {0}")]
    NotAssigned(String),

    /// A serial belongs to a different product than the order item.
    #[error("product mismatch: {0}")]
    ProductMismatch(String),

    /// The operation would exceed an order item's required serial quantity.
    #[error("quantity exceeded: {0}")]
    QuantityExceeded(String),

    /// A conflict occurred (optimistic concurrency collision on compare-and-set).
    ///
    /// Retryable after a fresh read; every other variant indicates stale or
    /// wrong caller state.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn not_in_stock(msg: impl Into<String>) -> Self {
        Self::NotInStock(msg.into())
    }

    pub fn not_assigned(msg: impl Into<String>) -> Self {
        Self::NotAssigned(msg.into())
    }

    pub fn product_mismatch(msg: impl Into<String>) -> Self {
        Self::ProductMismatch(msg.into())
    }

    pub fn quantity_exceeded(msg: impl Into<String>) -> Self {
        Self::QuantityExceeded(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Whether the caller may retry after re-reading current state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
