//! In-process [`FarmStore`] adapter.
//!
//! Farms live in one map behind a single mutex, and each farmer's totals sit
//! behind their own. A commit locks the affected farmers in delta order,
//! then the farm map, checks every precondition, and only then writes. The
//! farm map lock is held for the whole check-and-write, so every commit is
//! serialised on it regardless of farmer; the per-farmer locks only keep
//! `find_farmer` and `reconcile_farmer` from reading half-applied totals.
//! The commit path never awaits, so a dropped caller future cannot leave a
//! change half applied.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use async_trait::async_trait;
use tracing::debug;

use crate::domain::ports::{FarmChange, FarmStore, FarmStoreError, FarmWrite};
use crate::domain::{AcreageTotals, BoundingBox, Farm, FarmId, Farmer, FarmerId, RollupError};

fn poisoned<T>(_: PoisonError<T>) -> FarmStoreError {
    FarmStoreError::query("in-memory farm store lock poisoned")
}

fn map_rollup_error(error: RollupError) -> FarmStoreError {
    match error {
        RollupError::Negative { farmer_id } => FarmStoreError::negative_aggregate(farmer_id),
        other => FarmStoreError::query(other.to_string()),
    }
}

/// Thread-safe in-memory farm store.
#[derive(Debug, Default)]
pub struct InMemoryFarmStore {
    farms: Mutex<HashMap<FarmId, Farm>>,
    farmers: RwLock<HashMap<FarmerId, Arc<Mutex<Farmer>>>>,
}

impl InMemoryFarmStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a farmer record as-is, bypassing rollups.
    ///
    /// Lets tests and imports start from totals that no longer match the
    /// stored farms.
    pub fn seed_farmer(&self, farmer: Farmer) -> Result<(), FarmStoreError> {
        let mut farmers = self.farmers.write().map_err(poisoned)?;
        farmers.insert(farmer.id(), Arc::new(Mutex::new(farmer)));
        Ok(())
    }

    /// Every stored farm, active or not, ordered by id.
    pub fn all_farms(&self) -> Result<Vec<Farm>, FarmStoreError> {
        let farms = self.farms.lock().map_err(poisoned)?;
        let mut all: Vec<Farm> = farms.values().cloned().collect();
        all.sort_by_key(Farm::id);
        Ok(all)
    }

    /// Every farmer with their current totals, ordered by id.
    pub fn all_farmers(&self) -> Result<Vec<Farmer>, FarmStoreError> {
        let farmers = self.farmers.read().map_err(poisoned)?;
        let mut all = farmers
            .values()
            .map(|slot| slot.lock().map(|farmer| *farmer).map_err(poisoned))
            .collect::<Result<Vec<_>, _>>()?;
        all.sort_by_key(Farmer::id);
        Ok(all)
    }

    fn apply(&self, change: &FarmChange) -> Result<(), FarmStoreError> {
        let farmers = self.farmers.read().map_err(poisoned)?;

        let mut guards: Vec<MutexGuard<'_, Farmer>> = Vec::with_capacity(change.deltas.len());
        for delta in &change.deltas {
            let slot = farmers
                .get(&delta.farmer_id)
                .ok_or_else(|| FarmStoreError::farmer_not_found(delta.farmer_id))?;
            guards.push(slot.lock().map_err(poisoned)?);
        }

        let mut farms = self.farms.lock().map_err(poisoned)?;
        check_preconditions(&farms, change, |farmer_id| farmers.contains_key(&farmer_id))?;

        let updated = guards
            .iter()
            .zip(&change.deltas)
            .map(|(farmer, delta)| farmer.apply(delta).map_err(map_rollup_error))
            .collect::<Result<Vec<_>, _>>()?;

        match &change.write {
            FarmWrite::Insert(farm) | FarmWrite::Update { farm, .. } => {
                farms.insert(farm.id(), farm.clone());
            }
            FarmWrite::Remove { farm_id, .. } => {
                farms.remove(farm_id);
            }
        }
        for (guard, farmer) in guards.iter_mut().zip(updated) {
            **guard = farmer;
        }
        Ok(())
    }
}

fn check_preconditions(
    farms: &HashMap<FarmId, Farm>,
    change: &FarmChange,
    farmer_exists: impl Fn(FarmerId) -> bool,
) -> Result<(), FarmStoreError> {
    let farm_id = change.write.farm_id();
    match &change.write {
        FarmWrite::Insert(_) => {
            if farms.contains_key(&farm_id) {
                return Err(FarmStoreError::conflict(format!(
                    "farm {farm_id} already exists"
                )));
            }
        }
        FarmWrite::Update {
            expected_version, ..
        }
        | FarmWrite::Remove {
            expected_version, ..
        } => {
            let stored = farms
                .get(&farm_id)
                .ok_or_else(|| FarmStoreError::farm_not_found(farm_id))?;
            if stored.version() != *expected_version {
                return Err(FarmStoreError::conflict(format!(
                    "farm {farm_id} is at version {}, expected {expected_version}",
                    stored.version()
                )));
            }
        }
    }
    if let Some(farm) = change.write.farm() {
        if !farmer_exists(farm.farmer_id()) {
            return Err(FarmStoreError::farmer_not_found(farm.farmer_id()));
        }
    }
    Ok(())
}

#[async_trait]
impl FarmStore for InMemoryFarmStore {
    async fn find_farm(&self, farm_id: &FarmId) -> Result<Option<Farm>, FarmStoreError> {
        let farms = self.farms.lock().map_err(poisoned)?;
        Ok(farms.get(farm_id).cloned())
    }

    async fn find_farmer(&self, farmer_id: &FarmerId) -> Result<Option<Farmer>, FarmStoreError> {
        let farmers = self.farmers.read().map_err(poisoned)?;
        farmers
            .get(farmer_id)
            .map(|slot| slot.lock().map(|farmer| *farmer).map_err(poisoned))
            .transpose()
    }

    async fn register_farmer(&self, farmer_id: &FarmerId) -> Result<Farmer, FarmStoreError> {
        let mut farmers = self.farmers.write().map_err(poisoned)?;
        let slot = farmers
            .entry(*farmer_id)
            .or_insert_with(|| Arc::new(Mutex::new(Farmer::new(*farmer_id))));
        let farmer = *slot.lock().map_err(poisoned)?;
        Ok(farmer)
    }

    async fn commit(&self, change: &FarmChange) -> Result<(), FarmStoreError> {
        self.apply(change)?;
        debug!(
            farm_id = %change.write.farm_id(),
            rollups = change.deltas.len(),
            "in-memory farm change applied"
        );
        Ok(())
    }

    async fn list_active_farms(
        &self,
        within: Option<BoundingBox>,
    ) -> Result<Vec<Farm>, FarmStoreError> {
        let farms = self.farms.lock().map_err(poisoned)?;
        let mut active: Vec<Farm> = farms
            .values()
            .filter(|farm| farm.is_active())
            .filter(|farm| within.is_none_or(|bounds| farm.bounding_box().intersects(bounds)))
            .cloned()
            .collect();
        active.sort_by_key(Farm::id);
        Ok(active)
    }

    async fn reconcile_farmer(&self, farmer_id: &FarmerId) -> Result<Farmer, FarmStoreError> {
        let farmers = self.farmers.read().map_err(poisoned)?;
        let slot = farmers
            .get(farmer_id)
            .ok_or_else(|| FarmStoreError::farmer_not_found(*farmer_id))?;
        let mut farmer = slot.lock().map_err(poisoned)?;
        let farms = self.farms.lock().map_err(poisoned)?;
        let totals = AcreageTotals::from_farms(*farmer_id, farms.values());
        *farmer = Farmer::reconciled(*farmer_id, totals);
        Ok(*farmer)
    }

    async fn rebuild_spatial_index(&self) -> Result<(), FarmStoreError> {
        debug!("in-memory farm store scans farms directly; nothing to rebuild");
        Ok(())
    }
}
