use std::collections::HashMap;
use std::sync::RwLock;

use serialtrack_core::{OrderItemId, ProductId, SerialUnitId};
use serialtrack_serials::{SerialState, SerialUnit};

use super::r#trait::{ExpectedState, SerialStore, SerialStoreError, TransitionFields};

/// In-memory serial store.
///
/// Intended for tests/dev. Not optimized for performance: lookups by product
/// or order item scan the full map.
#[derive(Debug, Default)]
pub struct InMemorySerialStore {
    units: RwLock<HashMap<SerialUnitId, SerialUnit>>,
}

impl InMemorySerialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sort_by_serial(mut units: Vec<SerialUnit>) -> Vec<SerialUnit> {
    units.sort_by(|a, b| a.serial_number().as_str().cmp(b.serial_number().as_str()));
    units
}

impl SerialStore for InMemorySerialStore {
    fn insert(&self, unit: SerialUnit) -> Result<(), SerialStoreError> {
        if unit.state() != SerialState::InStock {
            return Err(SerialStoreError::InvalidWrite(format!(
                "intake must create units in IN_STOCK, got {}",
                unit.state()
            )));
        }
        unit.check_consistency()
            .map_err(|e| SerialStoreError::InvalidWrite(e.to_string()))?;

        let mut units = self
            .units
            .write()
            .map_err(|_| SerialStoreError::Backend("lock poisoned".to_string()))?;

        if units.contains_key(&unit.id_typed()) {
            return Err(SerialStoreError::DuplicateId(unit.id_typed()));
        }
        if units
            .values()
            .any(|u| u.serial_number() == unit.serial_number())
        {
            return Err(SerialStoreError::DuplicateSerialNumber(
                unit.serial_number().as_str().to_string(),
            ));
        }

        units.insert(unit.id_typed(), unit);
        Ok(())
    }

    fn get(&self, id: SerialUnitId) -> Result<Option<SerialUnit>, SerialStoreError> {
        let units = self
            .units
            .read()
            .map_err(|_| SerialStoreError::Backend("lock poisoned".to_string()))?;
        Ok(units.get(&id).cloned())
    }

    fn find_by_serial_number(
        &self,
        serial_number: &str,
    ) -> Result<Option<SerialUnit>, SerialStoreError> {
        let units = self
            .units
            .read()
            .map_err(|_| SerialStoreError::Backend("lock poisoned".to_string()))?;
        Ok(units
            .values()
            .find(|u| u.serial_number().as_str() == serial_number)
            .cloned())
    }

    fn get_by_product(
        &self,
        product_id: ProductId,
        state: SerialState,
    ) -> Result<Vec<SerialUnit>, SerialStoreError> {
        let units = self
            .units
            .read()
            .map_err(|_| SerialStoreError::Backend("lock poisoned".to_string()))?;
        Ok(sort_by_serial(
            units
                .values()
                .filter(|u| u.product_id() == product_id && u.state() == state)
                .cloned()
                .collect(),
        ))
    }

    fn get_by_order_item(
        &self,
        order_item_id: OrderItemId,
        state: Option<SerialState>,
    ) -> Result<Vec<SerialUnit>, SerialStoreError> {
        let units = self
            .units
            .read()
            .map_err(|_| SerialStoreError::Backend("lock poisoned".to_string()))?;
        Ok(sort_by_serial(
            units
                .values()
                .filter(|u| {
                    u.order_item_id() == Some(order_item_id)
                        && state.is_none_or(|s| u.state() == s)
                })
                .cloned()
                .collect(),
        ))
    }

    fn count_by_product(
        &self,
        product_id: ProductId,
        state: SerialState,
    ) -> Result<u64, SerialStoreError> {
        let units = self
            .units
            .read()
            .map_err(|_| SerialStoreError::Backend("lock poisoned".to_string()))?;
        Ok(units
            .values()
            .filter(|u| u.product_id() == product_id && u.state() == state)
            .count() as u64)
    }

    fn compare_and_set_state(
        &self,
        id: SerialUnitId,
        expected: ExpectedState,
        new_state: SerialState,
        fields: TransitionFields,
    ) -> Result<SerialUnit, SerialStoreError> {
        let mut units = self
            .units
            .write()
            .map_err(|_| SerialStoreError::Backend("lock poisoned".to_string()))?;

        let current = units.get(&id).ok_or(SerialStoreError::NotFound(id))?;

        if !expected.matches(current) {
            return Err(SerialStoreError::Conflict(format!(
                "unit {id}: expected {:?}/{:?}, found {}/{:?}",
                expected.state,
                expected.order_item_id,
                current.state(),
                current.order_item_id()
            )));
        }

        let updated = current.with_transition(
            new_state,
            fields.order_item_id,
            fields.dealer_account_id,
            fields.at,
        );
        updated
            .check_consistency()
            .map_err(|e| SerialStoreError::InvalidWrite(e.to_string()))?;

        units.insert(id, updated.clone());
        Ok(updated)
    }
}
