//! PostgreSQL-backed [`FarmStore`] using Diesel.
//!
//! Each [`FarmChange`] runs in one transaction: the farm row is written
//! first under its version guard, then every farmer total is adjusted in
//! farmer-id order with `total = total + delta`. Column `CHECK` constraints
//! reject negative totals, which rolls the whole change back.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::ports::{FarmChange, FarmStore, FarmStoreError, FarmWrite};
use crate::domain::{
    AcreageTotals, Area, BoundingBox, Farm, FarmId, FarmMetadata, FarmRecord, FarmStatus, Farmer,
    FarmerId, Polygon, RollupDelta,
};

use super::diesel_error_mapping::{map_diesel_error, map_farmer_write_error, map_pool_error};
use super::models::{FarmRow, FarmWriteRow, FarmerRow, NewFarmerRow};
use super::pool::DbPool;
use super::schema::{farmers, farms};

/// Partial index over active farm bounding boxes.
pub const ACTIVE_BBOX_INDEX: &str = "farms_active_bbox_idx";

/// Diesel-backed farm store.
#[derive(Clone)]
pub struct DieselFarmStore {
    pool: DbPool,
}

impl DieselFarmStore {
    /// Create a store over `pool`.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use farmland::outbound::persistence::{DbPool, DieselFarmStore, PoolConfig};
    ///
    /// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
    /// let pool = DbPool::new(PoolConfig::new("postgres://localhost/farmland")).await?;
    /// let store = DieselFarmStore::new(pool);
    /// # let _ = store;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Error carried out of a transaction closure.
enum TxError {
    Diesel(DieselError),
    Store(FarmStoreError),
}

impl From<DieselError> for TxError {
    fn from(error: DieselError) -> Self {
        Self::Diesel(error)
    }
}

impl From<FarmStoreError> for TxError {
    fn from(error: FarmStoreError) -> Self {
        Self::Store(error)
    }
}

impl From<TxError> for FarmStoreError {
    fn from(error: TxError) -> Self {
        match error {
            TxError::Diesel(error) => map_diesel_error(error),
            TxError::Store(error) => error,
        }
    }
}

fn farm_write_row(farm: &Farm) -> Result<FarmWriteRow, FarmStoreError> {
    let boundary = serde_json::to_value(farm.polygon()).map_err(|err| {
        FarmStoreError::query(format!("encode boundary of farm {}: {err}", farm.id()))
    })?;
    let bounds = farm.bounding_box();
    Ok(FarmWriteRow {
        id: *farm.id().as_uuid(),
        farmer_id: *farm.farmer_id().as_uuid(),
        boundary,
        area_m2: farm.area().square_metres(),
        min_lng: bounds.min_lng(),
        min_lat: bounds.min_lat(),
        max_lng: bounds.max_lng(),
        max_lat: bounds.max_lat(),
        metadata: farm.metadata().to_value(),
        version: farm.version(),
        deleted_at: farm.status().deleted_at(),
        created_at: farm.created_at(),
        updated_at: farm.updated_at(),
    })
}

/// Convert a stored row into a domain farm, revalidating the boundary.
fn row_to_farm(row: FarmRow) -> Result<Farm, FarmStoreError> {
    let FarmRow {
        id,
        farmer_id,
        boundary,
        area_m2,
        metadata,
        version,
        deleted_at,
        created_at,
        updated_at,
    } = row;

    let polygon: Polygon = serde_json::from_value(boundary)
        .map_err(|err| FarmStoreError::query(format!("decode boundary of farm {id}: {err}")))?;
    let metadata = FarmMetadata::try_from(metadata)
        .map_err(|err| FarmStoreError::query(format!("decode metadata of farm {id}: {err}")))?;

    Ok(Farm::from_record(FarmRecord {
        id: FarmId::from_uuid(id),
        farmer_id: FarmerId::from_uuid(farmer_id),
        polygon,
        area: Area::from_square_metres(area_m2),
        status: FarmStatus::from_deleted_at(deleted_at),
        metadata,
        version,
        created_at,
        updated_at,
    }))
}

fn row_to_farmer(row: FarmerRow) -> Result<Farmer, FarmStoreError> {
    let farmer_id = FarmerId::from_uuid(row.id);
    Farmer::from_parts(
        farmer_id,
        Area::from_square_metres(row.total_area_m2),
        row.farm_count,
    )
    .map_err(|err| FarmStoreError::query(err.to_string()))
}

/// Turn a zero-row versioned write into a conflict or a missing farm.
async fn ensure_matched(
    conn: &mut AsyncPgConnection,
    affected: usize,
    farm_id: FarmId,
    expected_version: i64,
) -> Result<(), TxError> {
    if affected > 0 {
        return Ok(());
    }
    let exists: bool = diesel::select(diesel::dsl::exists(
        farms::table.filter(farms::id.eq(*farm_id.as_uuid())),
    ))
    .get_result(conn)
    .await?;
    if exists {
        Err(FarmStoreError::conflict(format!(
            "farm {farm_id} is no longer at version {expected_version}"
        ))
        .into())
    } else {
        Err(FarmStoreError::farm_not_found(farm_id).into())
    }
}

async fn apply_write(conn: &mut AsyncPgConnection, write: &FarmWrite) -> Result<(), TxError> {
    match write {
        FarmWrite::Insert(farm) => {
            let row = farm_write_row(farm)?;
            diesel::insert_into(farms::table)
                .values(&row)
                .execute(conn)
                .await
                .map_err(|err| map_farmer_write_error(err, farm.farmer_id()))?;
        }
        FarmWrite::Update {
            farm,
            expected_version,
        } => {
            let row = farm_write_row(farm)?;
            let updated = diesel::update(
                farms::table
                    .filter(farms::id.eq(row.id))
                    .filter(farms::version.eq(*expected_version)),
            )
            .set(&row)
            .execute(conn)
            .await
            .map_err(|err| map_farmer_write_error(err, farm.farmer_id()))?;
            ensure_matched(conn, updated, farm.id(), *expected_version).await?;
        }
        FarmWrite::Remove {
            farm_id,
            expected_version,
        } => {
            let removed = diesel::delete(
                farms::table
                    .filter(farms::id.eq(*farm_id.as_uuid()))
                    .filter(farms::version.eq(*expected_version)),
            )
            .execute(conn)
            .await?;
            ensure_matched(conn, removed, *farm_id, *expected_version).await?;
        }
    }
    Ok(())
}

async fn apply_delta(conn: &mut AsyncPgConnection, delta: &RollupDelta) -> Result<(), TxError> {
    let updated = diesel::update(farmers::table.filter(farmers::id.eq(*delta.farmer_id.as_uuid())))
        .set((
            farmers::total_area_m2.eq(farmers::total_area_m2 + delta.area.square_metres()),
            farmers::farm_count.eq(farmers::farm_count + i64::from(delta.farm_count)),
            farmers::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)
        .await
        .map_err(|err| map_farmer_write_error(err, delta.farmer_id))?;
    if updated == 0 {
        return Err(FarmStoreError::farmer_not_found(delta.farmer_id).into());
    }
    Ok(())
}

#[async_trait]
impl FarmStore for DieselFarmStore {
    async fn find_farm(&self, farm_id: &FarmId) -> Result<Option<Farm>, FarmStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = farms::table
            .find(*farm_id.as_uuid())
            .select(FarmRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_farm).transpose()
    }

    async fn find_farmer(&self, farmer_id: &FarmerId) -> Result<Option<Farmer>, FarmStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = farmers::table
            .find(*farmer_id.as_uuid())
            .select(FarmerRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_farmer).transpose()
    }

    async fn register_farmer(&self, farmer_id: &FarmerId) -> Result<Farmer, FarmStoreError> {
        let id = *farmer_id.as_uuid();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let inserted = diesel::insert_into(farmers::table)
            .values(&NewFarmerRow { id })
            .on_conflict(farmers::id)
            .do_nothing()
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        if inserted > 0 {
            debug!(farmer_id = %farmer_id, "farmer registered");
        }
        let row = farmers::table
            .find(id)
            .select(FarmerRow::as_select())
            .first(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        row_to_farmer(row)
    }

    async fn commit(&self, change: &FarmChange) -> Result<(), FarmStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction::<_, TxError, _>(|conn| {
            async move {
                apply_write(conn, &change.write).await?;
                for delta in &change.deltas {
                    apply_delta(conn, delta).await?;
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await?;

        debug!(
            farm_id = %change.write.farm_id(),
            rollups = change.deltas.len(),
            "farm change committed"
        );
        Ok(())
    }

    async fn list_active_farms(
        &self,
        within: Option<BoundingBox>,
    ) -> Result<Vec<Farm>, FarmStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let mut query = farms::table
            .filter(farms::deleted_at.is_null())
            .select(FarmRow::as_select())
            .order(farms::id.asc())
            .into_boxed();
        if let Some(bounds) = within {
            query = query
                .filter(farms::min_lng.le(bounds.max_lng()))
                .filter(farms::max_lng.ge(bounds.min_lng()))
                .filter(farms::min_lat.le(bounds.max_lat()))
                .filter(farms::max_lat.ge(bounds.min_lat()));
        }
        let rows: Vec<FarmRow> = query.load(&mut conn).await.map_err(map_diesel_error)?;
        rows.into_iter().map(row_to_farm).collect()
    }

    async fn reconcile_farmer(&self, farmer_id: &FarmerId) -> Result<Farmer, FarmStoreError> {
        let farmer_id = *farmer_id;
        let id = *farmer_id.as_uuid();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let farmer = conn
            .transaction::<_, TxError, _>(|conn| {
                async move {
                    let locked: Option<Uuid> = farmers::table
                        .find(id)
                        .select(farmers::id)
                        .for_update()
                        .first(conn)
                        .await
                        .optional()?;
                    if locked.is_none() {
                        return Err(FarmStoreError::farmer_not_found(farmer_id).into());
                    }

                    let rows: Vec<FarmRow> = farms::table
                        .filter(farms::farmer_id.eq(id))
                        .filter(farms::deleted_at.is_null())
                        .select(FarmRow::as_select())
                        .load(conn)
                        .await?;
                    let active = rows
                        .into_iter()
                        .map(row_to_farm)
                        .collect::<Result<Vec<_>, _>>()?;
                    let totals = AcreageTotals::from_farms(farmer_id, &active);

                    diesel::update(farmers::table.find(id))
                        .set((
                            farmers::total_area_m2.eq(totals.area.square_metres()),
                            farmers::farm_count.eq(i64::from(totals.farm_count)),
                            farmers::updated_at.eq(diesel::dsl::now),
                        ))
                        .execute(conn)
                        .await?;
                    Ok(Farmer::reconciled(farmer_id, totals))
                }
                .scope_boxed()
            })
            .await?;

        info!(
            farmer_id = %farmer_id,
            total_area_m2 = farmer.total_area().square_metres(),
            farm_count = farmer.farm_count(),
            "farmer totals reconciled"
        );
        Ok(farmer)
    }

    async fn rebuild_spatial_index(&self) -> Result<(), FarmStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::sql_query(format!("REINDEX INDEX {ACTIVE_BBOX_INDEX}"))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        diesel::sql_query("ANALYZE farms")
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        info!(index = ACTIVE_BBOX_INDEX, "spatial index rebuilt");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    //! Row conversion coverage; query behaviour is exercised against a live
    //! database in `tests/diesel_farm_store.rs`.
    use super::*;
    use crate::test_support::{fixed_now, square_boundary};
    use rstest::rstest;
    use serde_json::json;

    fn sample_farm() -> Farm {
        let mut fields = serde_json::Map::new();
        fields.insert("crop".to_owned(), json!("ragi"));
        Farm::create(
            FarmId::random(),
            FarmerId::random(),
            square_boundary(77.59, 12.97, 2.5),
            FarmMetadata::new(fields),
            fixed_now(),
        )
    }

    fn read_back(row: FarmWriteRow) -> FarmRow {
        FarmRow {
            id: row.id,
            farmer_id: row.farmer_id,
            boundary: row.boundary,
            area_m2: row.area_m2,
            metadata: row.metadata,
            version: row.version,
            deleted_at: row.deleted_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    #[rstest]
    fn soft_deleted_farm_survives_storage_shape() {
        let farm = sample_farm().soft_deleted(fixed_now());
        let row = farm_write_row(&farm).expect("encode farm");

        assert_eq!(row.deleted_at, Some(fixed_now()));
        assert_eq!(row.version, 2);
        let bounds = farm.bounding_box();
        assert_eq!(
            [row.min_lng, row.min_lat, row.max_lng, row.max_lat],
            bounds.as_array()
        );
        assert_eq!(row_to_farm(read_back(row)).expect("decode farm"), farm);
    }

    #[rstest]
    fn corrupt_boundary_is_a_query_error() {
        let mut row = read_back(farm_write_row(&sample_farm()).expect("encode farm"));
        row.boundary = json!([{ "lng": 0.0, "lat": 0.0 }, { "lng": 1.0, "lat": 1.0 }]);

        let error = row_to_farm(row).expect_err("two vertices are not a ring");
        assert!(matches!(error, FarmStoreError::Query { .. }));
    }

    #[rstest]
    fn negative_stored_totals_are_rejected() {
        let row = FarmerRow {
            id: Uuid::new_v4(),
            total_area_m2: -1,
            farm_count: 0,
        };
        assert!(matches!(
            row_to_farmer(row),
            Err(FarmStoreError::Query { .. })
        ));
    }
}
