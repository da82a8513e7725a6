//! Port for farm and farmer persistence.
//!
//! A [`FarmChange`] pairs one farm write with the rollup deltas it implies.
//! Adapters must apply both atomically: either the farm row and every
//! affected farmer total change together, or nothing does.

use async_trait::async_trait;

use crate::domain::rollup::{RollupDelta, deltas_between};
use crate::domain::{BoundingBox, Farm, FarmId, Farmer, FarmerId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by farm store adapters.
    pub enum FarmStoreError {
        /// Store connection could not be established.
        Connection { message: String } =>
            "farm store connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "farm store query failed: {message}",
        /// The farm changed since it was read, or a concurrent transaction
        /// won a serialisation race.
        Conflict { message: String } =>
            "farm store write conflict: {message}",
        FarmNotFound { farm_id: FarmId } =>
            "farm {farm_id} is not stored",
        FarmerNotFound { farmer_id: FarmerId } =>
            "farmer {farmer_id} is not stored",
        /// Applying the change would drive a farmer total below zero.
        NegativeAggregate { farmer_id: FarmerId } =>
            "change would drive totals for farmer {farmer_id} below zero",
    }
}

/// The farm-row half of a [`FarmChange`].
#[derive(Debug, Clone, PartialEq)]
pub enum FarmWrite {
    /// Store a farm that must not exist yet.
    Insert(Farm),
    /// Replace a stored farm whose version is still `expected_version`.
    Update { farm: Farm, expected_version: i64 },
    /// Delete a stored farm whose version is still `expected_version`.
    Remove {
        farm_id: FarmId,
        expected_version: i64,
    },
}

impl FarmWrite {
    pub fn farm_id(&self) -> FarmId {
        match self {
            Self::Insert(farm) | Self::Update { farm, .. } => farm.id(),
            Self::Remove { farm_id, .. } => *farm_id,
        }
    }

    /// The farm state after the write, if the farm still exists.
    pub fn farm(&self) -> Option<&Farm> {
        match self {
            Self::Insert(farm) | Self::Update { farm, .. } => Some(farm),
            Self::Remove { .. } => None,
        }
    }
}

/// One atomic unit of work: a farm write plus the farmer rollups it moves.
#[derive(Debug, Clone, PartialEq)]
pub struct FarmChange {
    pub write: FarmWrite,
    /// Ordered by farmer id; adapters take farmer locks in this order.
    pub deltas: Vec<RollupDelta>,
}

impl FarmChange {
    /// Insert a new farm.
    pub fn insert(farm: Farm) -> Self {
        let deltas = deltas_between(None, Some(&farm));
        Self {
            write: FarmWrite::Insert(farm),
            deltas,
        }
    }

    /// Replace `before` with `after`, guarded by `before`'s version.
    pub fn update(before: &Farm, after: Farm) -> Self {
        let deltas = deltas_between(Some(before), Some(&after));
        Self {
            write: FarmWrite::Update {
                farm: after,
                expected_version: before.version(),
            },
            deltas,
        }
    }

    /// Remove `before` permanently, guarded by its version.
    pub fn remove(before: &Farm) -> Self {
        Self {
            write: FarmWrite::Remove {
                farm_id: before.id(),
                expected_version: before.version(),
            },
            deltas: deltas_between(Some(before), None),
        }
    }
}

/// Port for reading farms and committing farm changes with their rollups.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FarmStore: Send + Sync {
    /// Find a farm by id, whatever its status.
    async fn find_farm(&self, farm_id: &FarmId) -> Result<Option<Farm>, FarmStoreError>;

    /// Find a farmer and their current totals.
    async fn find_farmer(&self, farmer_id: &FarmerId) -> Result<Option<Farmer>, FarmStoreError>;

    /// Create a farmer with zero totals, or return the existing one.
    async fn register_farmer(&self, farmer_id: &FarmerId) -> Result<Farmer, FarmStoreError>;

    /// Apply a farm write and its rollup deltas atomically.
    async fn commit(&self, change: &FarmChange) -> Result<(), FarmStoreError>;

    /// Active farms, optionally limited to those whose bounding box
    /// intersects `within`.
    async fn list_active_farms(
        &self,
        within: Option<BoundingBox>,
    ) -> Result<Vec<Farm>, FarmStoreError>;

    /// Recompute a farmer's totals from their active farms and store them.
    async fn reconcile_farmer(&self, farmer_id: &FarmerId) -> Result<Farmer, FarmStoreError>;

    /// Rebuild whatever index backs [`FarmStore::list_active_farms`].
    async fn rebuild_spatial_index(&self) -> Result<(), FarmStoreError>;
}
