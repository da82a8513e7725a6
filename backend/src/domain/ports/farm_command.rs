//! Driving port for farm mutations.
//!
//! Every command validates its boundary before touching storage and commits
//! the farm write together with the owner's acreage rollup.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Farm, FarmId, FarmMetadata, FarmResult, FarmerId, LngLat};

/// Request to register a new farm for a farmer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFarmRequest {
    pub farmer_id: FarmerId,
    /// Closed ring of `(lng, lat)` vertices; validated by the service.
    pub boundary: Vec<LngLat>,
    #[serde(default)]
    pub metadata: FarmMetadata,
}

/// Request to replace a farm's boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFarmGeometryRequest {
    pub farm_id: FarmId,
    pub boundary: Vec<LngLat>,
}

/// Request to move a farm to another farmer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReassignFarmRequest {
    pub farm_id: FarmId,
    pub farmer_id: FarmerId,
}

/// Driving port for farm write operations.
///
/// Soft-deleting a deleted farm, restoring an active farm, and reassigning a
/// farm to its current owner succeed without writing anything.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FarmCommand: Send + Sync {
    /// Validate the boundary, compute its area, and store an active farm.
    async fn create_farm(&self, request: CreateFarmRequest) -> FarmResult<Farm>;

    /// Replace the boundary and move the owner's total by the area change.
    async fn update_geometry(&self, request: UpdateFarmGeometryRequest) -> FarmResult<Farm>;

    /// Mark a farm deleted and withdraw it from its owner's totals.
    async fn soft_delete(&self, farm_id: FarmId) -> FarmResult<Farm>;

    /// Reactivate a soft-deleted farm.
    async fn restore(&self, farm_id: FarmId) -> FarmResult<Farm>;

    /// Remove a farm permanently; totals only move if it was still active.
    async fn hard_delete(&self, farm_id: FarmId) -> FarmResult<()>;

    /// Transfer a farm and its acreage to another farmer in one change.
    async fn reassign(&self, request: ReassignFarmRequest) -> FarmResult<Farm>;
}
