//! Acreage rollup engine.
//!
//! A farm contributes `(owner, area, 1)` to its owner's totals while active
//! and nothing otherwise. Every lifecycle transition is expressed as the
//! difference between the contribution after and before the change, so
//! create, geometry edits, soft/hard delete, restore and reassignment all go
//! through [`deltas_between`].

use std::collections::BTreeMap;

use super::farm::{Area, Farm};
use super::ids::FarmerId;

/// Change to apply to one farmer's totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollupDelta {
    pub farmer_id: FarmerId,
    pub area: Area,
    pub farm_count: i32,
}

impl RollupDelta {
    pub fn new(farmer_id: FarmerId, area: Area, farm_count: i32) -> Self {
        Self {
            farmer_id,
            area,
            farm_count,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.area == Area::ZERO && self.farm_count == 0
    }
}

/// What `farm` adds to its owner's totals.
pub fn contribution(farm: &Farm) -> Option<RollupDelta> {
    farm.is_active()
        .then(|| RollupDelta::new(farm.farmer_id(), farm.area(), 1))
}

/// Deltas that move farmer totals from reflecting `before` to reflecting
/// `after`. Pass `None` for a farm that does not exist on that side.
///
/// Deltas are merged per farmer, zero deltas are dropped, and the result is
/// ordered by farmer id; adapters lock farmers in this order.
///
/// # Examples
/// ```
/// use chrono::Utc;
/// use farmland::domain::rollup::deltas_between;
/// use farmland::domain::{Farm, FarmId, FarmMetadata, FarmerId, Polygon};
///
/// let polygon = Polygon::from_pairs(&[(0.0, 0.0), (0.001, 0.0), (0.001, 0.001), (0.0, 0.0)])?;
/// let farm = Farm::create(FarmId::random(), FarmerId::random(), polygon, FarmMetadata::default(), Utc::now());
///
/// let created = deltas_between(None, Some(&farm));
/// assert_eq!(created[0].farm_count, 1);
///
/// let deleted = farm.soft_deleted(Utc::now());
/// assert!(deltas_between(Some(&deleted), Some(&deleted.soft_deleted(Utc::now()))).is_empty());
/// # Ok::<(), farmland::domain::GeometryError>(())
/// ```
pub fn deltas_between(before: Option<&Farm>, after: Option<&Farm>) -> Vec<RollupDelta> {
    let mut merged: BTreeMap<FarmerId, (Area, i32)> = BTreeMap::new();

    if let Some(removed) = before.and_then(contribution) {
        let entry = merged.entry(removed.farmer_id).or_default();
        entry.0 = entry.0 - removed.area;
        entry.1 -= removed.farm_count;
    }
    if let Some(added) = after.and_then(contribution) {
        let entry = merged.entry(added.farmer_id).or_default();
        entry.0 = entry.0 + added.area;
        entry.1 += added.farm_count;
    }

    merged
        .into_iter()
        .map(|(farmer_id, (area, farm_count))| RollupDelta::new(farmer_id, area, farm_count))
        .filter(|delta| !delta.is_zero())
        .collect()
}
