//! Driving ports for farm reads and administrative maintenance.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Farm, FarmId, FarmResult, Farmer, FarmerId, LngLat, OverlapResult};

/// Request to list active farms overlapping a candidate boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindOverlappingRequest {
    pub boundary: Vec<LngLat>,
    /// Usually the farm being edited, so it does not match itself.
    #[serde(default)]
    pub exclude_farm_id: Option<FarmId>,
}

/// Driving port for farm read operations.
///
/// Reads take no locks; an overlap query may miss a farm committed after
/// its candidate list was loaded.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FarmQuery: Send + Sync {
    /// Active farms sharing interior area with the boundary, sorted by id.
    async fn find_overlapping(&self, request: FindOverlappingRequest) -> FarmResult<Vec<FarmId>>;

    /// Every overlapping pair of active farms.
    async fn detect_all_overlaps(&self) -> FarmResult<Vec<OverlapResult>>;

    async fn get_farm(&self, farm_id: FarmId) -> FarmResult<Farm>;

    async fn get_farmer(&self, farmer_id: FarmerId) -> FarmResult<Farmer>;
}

/// Driving port for administrative and integration operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FarmMaintenance: Send + Sync {
    /// Ensure a farmer record exists so farms can be attached to it.
    async fn register_farmer(&self, farmer_id: FarmerId) -> FarmResult<Farmer>;

    /// Recompute a farmer's totals from scratch.
    async fn reconcile_farmer(&self, farmer_id: FarmerId) -> FarmResult<Farmer>;

    async fn rebuild_spatial_index(&self) -> FarmResult<()>;
}
