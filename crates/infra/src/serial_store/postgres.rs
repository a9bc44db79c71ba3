//! Postgres-backed serial store implementation.
//!
//! Persists the serial unit table and expresses the compare-and-set as a
//! conditional `UPDATE`, so the expected-state check and the write are one
//! atomic statement at the database level.
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE serial_units (
//!     id                UUID PRIMARY KEY,
//!     serial_number     TEXT NOT NULL UNIQUE,
//!     product_id        UUID NOT NULL,
//!     state             TEXT NOT NULL,
//!     order_item_id     UUID,
//!     dealer_account_id UUID,
//!     version           BIGINT NOT NULL,
//!     updated_at        TIMESTAMPTZ NOT NULL
//! );
//! CREATE INDEX serial_units_product_state_idx ON serial_units (product_id, state);
//! CREATE INDEX serial_units_order_item_idx ON serial_units (order_item_id);
//! ```
//!
//! ## Error Mapping
//!
//! | SQLx error | PostgreSQL code | SerialStoreError | Scenario |
//! |---|---|---|---|
//! | Database (unique violation) | `23505` | `DuplicateId` / `DuplicateSerialNumber` | Intake collision |
//! | Database (other) | any other | `Backend` | Other database errors |
//! | PoolClosed / network | N/A | `Backend` | Connection failures, timeouts |
//!
//! Timeouts surface as `Backend`, which callers treat like a conflict:
//! re-read, then retry. Never a silent no-op.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use std::sync::Arc;
use tracing::instrument;

use serialtrack_core::{DealerAccountId, OrderItemId, ProductId, SerialUnitId};
use serialtrack_serials::{SerialNumber, SerialState, SerialUnit};

use super::r#trait::{ExpectedState, SerialStore, SerialStoreError, TransitionFields};

/// Postgres-backed serial store.
///
/// The sync `SerialStore` impl bridges into async with the current tokio
/// runtime handle, so it must be called from within a tokio runtime context
/// (e.g. axum handlers).
#[derive(Debug, Clone)]
pub struct PostgresSerialStore {
    pool: Arc<PgPool>,
}

impl PostgresSerialStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    #[instrument(skip(self, unit), fields(unit_id = %unit.id_typed()), err)]
    pub async fn insert_unit(&self, unit: SerialUnit) -> Result<(), SerialStoreError> {
        if unit.state() != SerialState::InStock {
            return Err(SerialStoreError::InvalidWrite(format!(
                "intake must create units in IN_STOCK, got {}",
                unit.state()
            )));
        }
        unit.check_consistency()
            .map_err(|e| SerialStoreError::InvalidWrite(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO serial_units
                (id, serial_number, product_id, state, order_item_id, dealer_account_id, version, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(unit.id_typed().as_uuid())
        .bind(unit.serial_number().as_str())
        .bind(unit.product_id().as_uuid())
        .bind(unit.state().as_str())
        .bind(unit.order_item_id().map(|id| *id.as_uuid()))
        .bind(unit.dealer_account_id().map(|id| *id.as_uuid()))
        .bind(unit.version() as i64)
        .bind(unit.updated_at())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_insert_error(&unit, e))?;

        Ok(())
    }

    #[instrument(skip(self), fields(unit_id = %id), err)]
    pub async fn fetch(&self, id: SerialUnitId) -> Result<Option<SerialUnit>, SerialStoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, serial_number, product_id, state, order_item_id, dealer_account_id, version, updated_at
            FROM serial_units
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch", e))?;

        row.map(|r| row_to_unit(&r)).transpose()
    }

    #[instrument(skip(self), err)]
    pub async fn fetch_by_serial_number(
        &self,
        serial_number: &str,
    ) -> Result<Option<SerialUnit>, SerialStoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, serial_number, product_id, state, order_item_id, dealer_account_id, version, updated_at
            FROM serial_units
            WHERE serial_number = $1
            "#,
        )
        .bind(serial_number)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_by_serial_number", e))?;

        row.map(|r| row_to_unit(&r)).transpose()
    }

    #[instrument(skip(self), fields(product_id = %product_id, state = %state), err)]
    pub async fn fetch_by_product(
        &self,
        product_id: ProductId,
        state: SerialState,
    ) -> Result<Vec<SerialUnit>, SerialStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, serial_number, product_id, state, order_item_id, dealer_account_id, version, updated_at
            FROM serial_units
            WHERE product_id = $1 AND state = $2
            ORDER BY serial_number ASC
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(state.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_by_product", e))?;

        rows.iter().map(row_to_unit).collect()
    }

    #[instrument(skip(self), fields(order_item_id = %order_item_id), err)]
    pub async fn fetch_by_order_item(
        &self,
        order_item_id: OrderItemId,
        state: Option<SerialState>,
    ) -> Result<Vec<SerialUnit>, SerialStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, serial_number, product_id, state, order_item_id, dealer_account_id, version, updated_at
            FROM serial_units
            WHERE order_item_id = $1 AND ($2::TEXT IS NULL OR state = $2)
            ORDER BY serial_number ASC
            "#,
        )
        .bind(order_item_id.as_uuid())
        .bind(state.map(|s| s.as_str()))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_by_order_item", e))?;

        rows.iter().map(row_to_unit).collect()
    }

    #[instrument(skip(self), fields(product_id = %product_id, state = %state), err)]
    pub async fn count_for_product(
        &self,
        product_id: ProductId,
        state: SerialState,
    ) -> Result<u64, SerialStoreError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total
            FROM serial_units
            WHERE product_id = $1 AND state = $2
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(state.as_str())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_for_product", e))?;

        let total: i64 = row
            .try_get("total")
            .map_err(|e| map_sqlx_error("count_for_product", e))?;
        Ok(total as u64)
    }

    /// Compare-and-set as a single conditional UPDATE.
    ///
    /// The WHERE clause compares both the lifecycle state and the ownership
    /// link; zero rows affected means either the unit is unknown or another
    /// writer got there first, distinguished by a follow-up read.
    #[instrument(
        skip(self, fields),
        fields(unit_id = %id, new_state = %new_state),
        err
    )]
    pub async fn cas(
        &self,
        id: SerialUnitId,
        expected: ExpectedState,
        new_state: SerialState,
        fields: TransitionFields,
    ) -> Result<SerialUnit, SerialStoreError> {
        let row = sqlx::query(
            r#"
            UPDATE serial_units
            SET state = $1,
                order_item_id = $2,
                dealer_account_id = $3,
                version = version + 1,
                updated_at = $4
            WHERE id = $5
              AND state = $6
              AND order_item_id IS NOT DISTINCT FROM $7
            RETURNING id, serial_number, product_id, state, order_item_id, dealer_account_id, version, updated_at
            "#,
        )
        .bind(new_state.as_str())
        .bind(fields.order_item_id.map(|v| *v.as_uuid()))
        .bind(fields.dealer_account_id.map(|v| *v.as_uuid()))
        .bind(fields.at)
        .bind(id.as_uuid())
        .bind(expected.state.as_str())
        .bind(expected.order_item_id.map(|v| *v.as_uuid()))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("cas", e))?;

        match row {
            Some(r) => {
                let updated = row_to_unit(&r)?;
                updated
                    .check_consistency()
                    .map_err(|e| SerialStoreError::InvalidWrite(e.to_string()))?;
                Ok(updated)
            }
            None => match self.fetch(id).await? {
                Some(current) => Err(SerialStoreError::Conflict(format!(
                    "unit {id}: expected {:?}/{:?}, found {}/{:?}",
                    expected.state,
                    expected.order_item_id,
                    current.state(),
                    current.order_item_id()
                ))),
                None => Err(SerialStoreError::NotFound(id)),
            },
        }
    }
}

fn row_to_unit(row: &PgRow) -> Result<SerialUnit, SerialStoreError> {
    let id: uuid::Uuid = get_column(row, "id")?;
    let serial_number: String = get_column(row, "serial_number")?;
    let product_id: uuid::Uuid = get_column(row, "product_id")?;
    let state: String = get_column(row, "state")?;
    let order_item_id: Option<uuid::Uuid> = get_column(row, "order_item_id")?;
    let dealer_account_id: Option<uuid::Uuid> = get_column(row, "dealer_account_id")?;
    let version: i64 = get_column(row, "version")?;
    let updated_at: DateTime<Utc> = get_column(row, "updated_at")?;

    let serial_number = SerialNumber::new(serial_number)
        .map_err(|e| SerialStoreError::Backend(format!("corrupt row: {e}")))?;
    let state: SerialState = state
        .parse()
        .map_err(|e| SerialStoreError::Backend(format!("corrupt row: {e}")))?;

    SerialUnit::restore(
        SerialUnitId::from_uuid(id),
        serial_number,
        ProductId::from_uuid(product_id),
        state,
        order_item_id.map(OrderItemId::from_uuid),
        dealer_account_id.map(DealerAccountId::from_uuid),
        version as u64,
        updated_at,
    )
    .map_err(|e| SerialStoreError::Backend(format!("corrupt row: {e}")))
}

fn get_column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, SerialStoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| SerialStoreError::Backend(format!("failed to decode column {name}: {e}")))
}

fn map_insert_error(unit: &SerialUnit, err: sqlx::Error) -> SerialStoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            // Unique violation: primary key vs the serial_number constraint.
            if db_err
                .constraint()
                .is_some_and(|c| c.contains("serial_number"))
            {
                return SerialStoreError::DuplicateSerialNumber(
                    unit.serial_number().as_str().to_string(),
                );
            }
            return SerialStoreError::DuplicateId(unit.id_typed());
        }
    }
    map_sqlx_error("insert_unit", err)
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> SerialStoreError {
    SerialStoreError::Backend(format!("{operation}: {err}"))
}

// The SerialStore trait is synchronous, but Postgres operations require async.
// We use tokio::runtime::Handle to run async code in a sync context, which
// works when called from within a tokio runtime (e.g. from axum handlers).

fn runtime_handle() -> Result<tokio::runtime::Handle, SerialStoreError> {
    tokio::runtime::Handle::try_current().map_err(|_| {
        SerialStoreError::Backend(
            "PostgresSerialStore requires an async runtime (tokio); call from within a tokio runtime context".to_string(),
        )
    })
}

impl SerialStore for PostgresSerialStore {
    fn insert(&self, unit: SerialUnit) -> Result<(), SerialStoreError> {
        runtime_handle()?.block_on(self.insert_unit(unit))
    }

    fn get(&self, id: SerialUnitId) -> Result<Option<SerialUnit>, SerialStoreError> {
        runtime_handle()?.block_on(self.fetch(id))
    }

    fn find_by_serial_number(
        &self,
        serial_number: &str,
    ) -> Result<Option<SerialUnit>, SerialStoreError> {
        runtime_handle()?.block_on(self.fetch_by_serial_number(serial_number))
    }

    fn get_by_product(
        &self,
        product_id: ProductId,
        state: SerialState,
    ) -> Result<Vec<SerialUnit>, SerialStoreError> {
        runtime_handle()?.block_on(self.fetch_by_product(product_id, state))
    }

    fn get_by_order_item(
        &self,
        order_item_id: OrderItemId,
        state: Option<SerialState>,
    ) -> Result<Vec<SerialUnit>, SerialStoreError> {
        runtime_handle()?.block_on(self.fetch_by_order_item(order_item_id, state))
    }

    fn count_by_product(
        &self,
        product_id: ProductId,
        state: SerialState,
    ) -> Result<u64, SerialStoreError> {
        runtime_handle()?.block_on(self.count_for_product(product_id, state))
    }

    fn compare_and_set_state(
        &self,
        id: SerialUnitId,
        expected: ExpectedState,
        new_state: SerialState,
        fields: TransitionFields,
    ) -> Result<SerialUnit, SerialStoreError> {
        runtime_handle()?.block_on(self.cas(id, expected, new_state, fields))
    }
}
