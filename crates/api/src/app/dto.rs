use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use serialtrack_infra::projections::AuditRecord;
use serialtrack_infra::query::InventoryCounts;
use serialtrack_orders::{OrderItemRef, OrderItemStatus};
use serialtrack_serials::SerialUnit;

// -------------------------
// Request DTOs
// -------------------------
//
// Field names follow the admin client's wire convention (camelCase).

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveSerialsRequest {
    pub product_id: String,
    pub serial_numbers: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignSerialsRequest {
    pub order_item_id: String,
    pub product_id: String,
    pub serial_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnassignSerialsRequest {
    pub order_item_id: String,
    pub serial_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocateSerialsRequest {
    pub serial_ids: Vec<String>,
    pub dealer_account_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkUnavailableRequest {
    pub serial_ids: Vec<String>,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterOrderItemRequest {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub quantity: u32,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SerialUnitResponse {
    pub id: String,
    pub serial_number: String,
    pub product_id: String,
    pub state: &'static str,
    pub order_item_id: Option<String>,
    pub dealer_account_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&SerialUnit> for SerialUnitResponse {
    fn from(unit: &SerialUnit) -> Self {
        Self {
            id: unit.id_typed().to_string(),
            serial_number: unit.serial_number().as_str().to_string(),
            product_id: unit.product_id().to_string(),
            state: unit.state().as_str(),
            order_item_id: unit.order_item_id().map(|id| id.to_string()),
            dealer_account_id: unit.dealer_account_id().map(|id| id.to_string()),
            updated_at: unit.updated_at(),
        }
    }
}

pub fn serial_units_response(units: &[SerialUnit]) -> Vec<SerialUnitResponse> {
    units.iter().map(SerialUnitResponse::from).collect()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryCountsResponse {
    pub available_count: u64,
    pub assigned_count: u64,
    pub allocated_count: u64,
    pub sold_count: u64,
    pub damaged_count: u64,
    pub total_count: u64,
}

impl From<InventoryCounts> for InventoryCountsResponse {
    fn from(counts: InventoryCounts) -> Self {
        Self {
            available_count: counts.available,
            assigned_count: counts.assigned,
            allocated_count: counts.allocated,
            sold_count: counts.sold,
            damaged_count: counts.damaged,
            total_count: counts.total,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemStatusResponse {
    pub order_item_id: String,
    pub order_id: String,
    pub product_id: String,
    pub quantity: u32,
    pub status: &'static str,
}

impl OrderItemStatusResponse {
    pub fn new(item: &OrderItemRef, status: OrderItemStatus) -> Self {
        Self {
            order_item_id: item.id.to_string(),
            order_id: item.order_id.to_string(),
            product_id: item.product_id.to_string(),
            quantity: item.quantity,
            status: status.as_str(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecordResponse {
    pub event_id: String,
    pub unit_id: String,
    pub sequence_number: u64,
    pub event_type: &'static str,
    pub old_state: Option<&'static str>,
    pub new_state: &'static str,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

impl From<&AuditRecord> for AuditRecordResponse {
    fn from(record: &AuditRecord) -> Self {
        Self {
            event_id: record.event_id.to_string(),
            unit_id: record.unit_id.to_string(),
            sequence_number: record.sequence_number,
            event_type: record.event_type,
            old_state: record.old_state.map(|s| s.as_str()),
            new_state: record.new_state.as_str(),
            actor: record.actor.to_string(),
            occurred_at: record.occurred_at,
        }
    }
}
