//! Per-order-item quantity invariant.
//!
//! Advisory pre-validation for batch operations. The authoritative guarantee
//! is still the per-unit compare-and-set in the store: a race between this
//! check and the commit degrades to a rejected or retried transition, never a
//! silent overbooking.

use serialtrack_core::{DomainError, DomainResult};

/// Validate a proposed net change to an order item's committed serial count.
///
/// `committed_count` is the current number of units in
/// `{AssignedToOrderItem, AllocatedToDealer}` for the order item;
/// `proposed_delta` is +N for an assign batch and -N for an unassign batch.
///
/// Rejects any post-operation count above `required_quantity`, and bounds
/// unassigns by the currently committed count (the window never underflows).
pub fn validate_quantity(
    required_quantity: u32,
    committed_count: u32,
    proposed_delta: i64,
) -> DomainResult<()> {
    let post = i64::from(committed_count) + proposed_delta;

    if post > i64::from(required_quantity) {
        return Err(DomainError::quantity_exceeded(format!(
            "order item needs {required_quantity} serials, operation would leave {post}"
        )));
    }

    if post < 0 {
        return Err(DomainError::quantity_exceeded(format!(
            "cannot release {} serials, only {committed_count} are committed",
            proposed_delta.unsigned_abs()
        )));
    }

    Ok(())
}
