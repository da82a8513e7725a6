//! The farmer aggregate: acreage and farm-count totals over active farms.

use serde::{Deserialize, Serialize};

use super::farm::{Area, Farm};
use super::ids::FarmerId;
use super::rollup::RollupDelta;

/// Errors raised when applying a rollup delta to a farmer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RollupError {
    #[error("rollup would drive totals for farmer {farmer_id} below zero")]
    Negative { farmer_id: FarmerId },
    #[error("rollup overflowed totals for farmer {farmer_id}")]
    Overflow { farmer_id: FarmerId },
    #[error("delta for farmer {delta_farmer_id} applied to farmer {farmer_id}")]
    MismatchedFarmer {
        farmer_id: FarmerId,
        delta_farmer_id: FarmerId,
    },
}

/// Totals recomputed from scratch over a farmer's active farms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcreageTotals {
    pub area: Area,
    pub farm_count: u32,
}

impl AcreageTotals {
    /// Sum the active farms in `farms` that belong to `farmer_id`.
    pub fn from_farms<'a>(farmer_id: FarmerId, farms: impl IntoIterator<Item = &'a Farm>) -> Self {
        farms
            .into_iter()
            .filter(|farm| farm.is_active() && farm.farmer_id() == farmer_id)
            .fold(Self::default(), |totals, farm| Self {
                area: totals.area + farm.area(),
                farm_count: totals.farm_count.saturating_add(1),
            })
    }
}

/// A farmer and the rollups maintained over their active farms.
///
/// ## Invariants
/// - `total_area` and `farm_count` are never negative.
///
/// # Examples
/// ```
/// use farmland::domain::{Farmer, FarmerId};
///
/// let farmer = Farmer::new(FarmerId::random());
/// assert_eq!(farmer.total_acreage_ha(), 0.0);
/// assert_eq!(farmer.farm_count(), 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Farmer {
    id: FarmerId,
    total_area: Area,
    farm_count: u32,
}

impl Farmer {
    /// A farmer with no farms.
    pub fn new(id: FarmerId) -> Self {
        Self {
            id,
            total_area: Area::ZERO,
            farm_count: 0,
        }
    }

    /// Rehydrate stored totals, rejecting negative values.
    pub fn from_parts(id: FarmerId, total_area: Area, farm_count: i64) -> Result<Self, RollupError> {
        if total_area.is_negative() {
            return Err(RollupError::Negative { farmer_id: id });
        }
        let farm_count =
            u32::try_from(farm_count).map_err(|_| RollupError::Negative { farmer_id: id })?;
        Ok(Self {
            id,
            total_area,
            farm_count,
        })
    }

    /// A farmer whose totals were recomputed from their farms.
    pub fn reconciled(id: FarmerId, totals: AcreageTotals) -> Self {
        Self {
            id,
            total_area: totals.area,
            farm_count: totals.farm_count,
        }
    }

    pub fn id(&self) -> FarmerId {
        self.id
    }

    /// Sum of active farm areas.
    pub fn total_area(&self) -> Area {
        self.total_area
    }

    /// Sum of active farm areas in hectares, exact to four decimal places.
    pub fn total_acreage_ha(&self) -> f64 {
        self.total_area.hectares()
    }

    pub fn farm_count(&self) -> u32 {
        self.farm_count
    }

    /// Apply a rollup delta, refusing to go below zero.
    pub fn apply(&self, delta: &RollupDelta) -> Result<Self, RollupError> {
        if delta.farmer_id != self.id {
            return Err(RollupError::MismatchedFarmer {
                farmer_id: self.id,
                delta_farmer_id: delta.farmer_id,
            });
        }
        let total_area = self
            .total_area
            .checked_add(delta.area)
            .ok_or(RollupError::Overflow { farmer_id: self.id })?;
        let farm_count = i64::from(self.farm_count) + i64::from(delta.farm_count);
        if total_area.is_negative() || farm_count < 0 {
            return Err(RollupError::Negative { farmer_id: self.id });
        }
        let farm_count =
            u32::try_from(farm_count).map_err(|_| RollupError::Overflow { farmer_id: self.id })?;
        Ok(Self {
            id: self.id,
            total_area,
            farm_count,
        })
    }
}
