//! Farm repository service.
//!
//! Implements the farm driving ports over a [`FarmStore`]. Each mutation
//! validates its input, plans the new farm state and the rollup deltas it
//! implies, and hands both to the store as one [`FarmChange`]. Lost write
//! races are retried with jittered exponential backoff; a change that would
//! drive a farmer's totals negative triggers one reconciliation of that
//! farmer before the final attempt.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockable::Clock;
use tracing::{debug, error, info, warn};

use crate::domain::ports::{
    CreateFarmRequest, FarmChange, FarmCommand, FarmMaintenance, FarmQuery, FarmStore,
    FarmStoreError, FindOverlappingRequest, ReassignFarmRequest, UpdateFarmGeometryRequest,
};
use crate::domain::{
    AttemptJitter, BackoffJitter, BoundingBox, Farm, FarmError, FarmId, FarmResult, Farmer,
    FarmerId, LngLat, OverlapResult, Polygon, RetryPolicy, RetrySleeper, TokioSleeper,
    detect_all_overlaps, find_overlapping,
};

/// What to do when a boundary shares interior area with active farms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverlapPolicy {
    /// Store the farm; overlaps are reported through the query port only.
    #[default]
    Allow,
    /// Fail with [`FarmError::OverlapConflict`].
    Reject,
}

/// Tunables for [`FarmService`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FarmServiceConfig {
    pub retry: RetryPolicy,
    pub overlap_policy: OverlapPolicy,
}

fn map_store_error(error: FarmStoreError) -> FarmError {
    match error {
        FarmStoreError::Connection { message } | FarmStoreError::Query { message } => {
            FarmError::Repository { message }
        }
        FarmStoreError::Conflict { .. } => FarmError::ConcurrencyConflict { attempts: 1 },
        FarmStoreError::FarmNotFound { farm_id } => FarmError::FarmNotFound { farm_id },
        FarmStoreError::FarmerNotFound { farmer_id } => FarmError::FarmerNotFound { farmer_id },
        FarmStoreError::NegativeAggregate { farmer_id } => {
            FarmError::AggregateConsistency { farmer_id }
        }
    }
}

enum Mutation {
    Create(Box<Farm>),
    UpdateGeometry { farm_id: FarmId, polygon: Polygon },
    SoftDelete(FarmId),
    Restore(FarmId),
    HardDelete(FarmId),
    Reassign { farm_id: FarmId, farmer_id: FarmerId },
}

impl Mutation {
    fn name(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::UpdateGeometry { .. } => "update_geometry",
            Self::SoftDelete(_) => "soft_delete",
            Self::Restore(_) => "restore",
            Self::HardDelete(_) => "hard_delete",
            Self::Reassign { .. } => "reassign",
        }
    }

    fn farm_id(&self) -> FarmId {
        match self {
            Self::Create(farm) => farm.id(),
            Self::UpdateGeometry { farm_id, .. }
            | Self::SoftDelete(farm_id)
            | Self::Restore(farm_id)
            | Self::HardDelete(farm_id)
            | Self::Reassign { farm_id, .. } => *farm_id,
        }
    }

    /// Whether the planned farm newly occupies ground other farms may
    /// already cover.
    fn claims_ground(&self) -> bool {
        matches!(
            self,
            Self::Create(_) | Self::UpdateGeometry { .. } | Self::Restore(_)
        )
    }

    /// Plan the change against the farm as currently stored.
    fn plan(&self, current: Option<Farm>, now: DateTime<Utc>) -> FarmResult<Plan> {
        let current = match (self, current) {
            (Self::Create(farm), _) => {
                return Ok(Plan::Commit {
                    change: FarmChange::insert(farm.as_ref().clone()),
                    result: Some(farm.as_ref().clone()),
                });
            }
            (_, Some(current)) => current,
            (_, None) => {
                return Err(FarmError::FarmNotFound {
                    farm_id: self.farm_id(),
                });
            }
        };

        let after = match self {
            Self::Create(_) => return Ok(Plan::Unchanged(current)),
            Self::UpdateGeometry { polygon, .. } => current.with_geometry(polygon.clone(), now),
            Self::SoftDelete(_) if !current.is_active() => return Ok(Plan::Unchanged(current)),
            Self::SoftDelete(_) => current.soft_deleted(now),
            Self::Restore(_) if current.is_active() => return Ok(Plan::Unchanged(current)),
            Self::Restore(_) => current.restored(now),
            Self::HardDelete(_) => {
                return Ok(Plan::Commit {
                    change: FarmChange::remove(&current),
                    result: None,
                });
            }
            Self::Reassign { farmer_id, .. } if current.farmer_id() == *farmer_id => {
                return Ok(Plan::Unchanged(current));
            }
            Self::Reassign { farmer_id, .. } => current.reassigned_to(*farmer_id, now),
        };

        Ok(Plan::Commit {
            change: FarmChange::update(&current, after.clone()),
            result: Some(after),
        })
    }
}

enum Plan {
    Commit {
        change: FarmChange,
        result: Option<Farm>,
    },
    Unchanged(Farm),
}

/// One attempt's failure: either final, or a store outcome the retry loop
/// decides on.
enum AttemptError {
    Final(FarmError),
    Store(FarmStoreError),
}

impl From<FarmError> for AttemptError {
    fn from(error: FarmError) -> Self {
        Self::Final(error)
    }
}

/// Farm repository implementing [`FarmCommand`], [`FarmQuery`] and
/// [`FarmMaintenance`].
#[derive(Clone)]
pub struct FarmService<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn RetrySleeper>,
    jitter: Arc<dyn BackoffJitter>,
    config: FarmServiceConfig,
}

impl<S> FarmService<S> {
    /// Create a service that sleeps on the Tokio timer between retries.
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: FarmServiceConfig) -> Self {
        Self {
            store,
            clock,
            sleeper: Arc::new(TokioSleeper),
            jitter: Arc::new(AttemptJitter),
            config,
        }
    }

    /// Replace the retry sleeper and jitter strategy.
    #[must_use]
    pub fn with_retry_runtime(
        mut self,
        sleeper: Arc<dyn RetrySleeper>,
        jitter: Arc<dyn BackoffJitter>,
    ) -> Self {
        self.sleeper = sleeper;
        self.jitter = jitter;
        self
    }

    pub fn config(&self) -> FarmServiceConfig {
        self.config
    }
}

impl<S> FarmService<S>
where
    S: FarmStore,
{
    async fn run(&self, mutation: &Mutation) -> FarmResult<Option<Farm>> {
        let max_attempts = self.config.retry.attempts();
        let mut conflicts = 0_u32;
        let mut reconciled = false;

        loop {
            match self.attempt(mutation).await {
                Ok(farm) => return Ok(farm),
                Err(AttemptError::Final(error)) => return Err(error),
                Err(AttemptError::Store(FarmStoreError::Conflict { message })) => {
                    conflicts += 1;
                    if conflicts >= max_attempts {
                        warn!(
                            operation = mutation.name(),
                            farm_id = %mutation.farm_id(),
                            attempts = conflicts,
                            detail = %message,
                            "farm change abandoned after repeated write conflicts"
                        );
                        return Err(FarmError::ConcurrencyConflict {
                            attempts: conflicts,
                        });
                    }
                    let base = self.config.retry.base_delay(conflicts);
                    let delay = self
                        .jitter
                        .jittered_delay(base, conflicts, self.clock.utc());
                    warn!(
                        operation = mutation.name(),
                        farm_id = %mutation.farm_id(),
                        attempt = conflicts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        detail = %message,
                        "farm change lost a write race; retrying"
                    );
                    self.sleeper.sleep(delay).await;
                }
                Err(AttemptError::Store(FarmStoreError::NegativeAggregate { farmer_id })) => {
                    error!(
                        operation = mutation.name(),
                        farm_id = %mutation.farm_id(),
                        %farmer_id,
                        "rollup would drive farmer totals negative"
                    );
                    if reconciled {
                        return Err(FarmError::AggregateConsistency { farmer_id });
                    }
                    reconciled = true;
                    let farmer = self
                        .store
                        .reconcile_farmer(&farmer_id)
                        .await
                        .map_err(map_store_error)?;
                    warn!(
                        %farmer_id,
                        total_acreage_ha = farmer.total_acreage_ha(),
                        farm_count = farmer.farm_count(),
                        "reconciled farmer totals; retrying farm change"
                    );
                }
                Err(AttemptError::Store(other)) => return Err(map_store_error(other)),
            }
        }
    }

    async fn attempt(&self, mutation: &Mutation) -> Result<Option<Farm>, AttemptError> {
        let current = match mutation {
            Mutation::Create(_) => None,
            _ => self
                .store
                .find_farm(&mutation.farm_id())
                .await
                .map_err(AttemptError::Store)?,
        };

        match mutation.plan(current, self.clock.utc())? {
            Plan::Unchanged(farm) => {
                debug!(
                    operation = mutation.name(),
                    farm_id = %farm.id(),
                    "farm already in requested state"
                );
                Ok(Some(farm))
            }
            Plan::Commit { change, result } => {
                if mutation.claims_ground() {
                    if let Some(farm) = result.as_ref().filter(|farm| farm.is_active()) {
                        self.ensure_no_overlap(farm).await?;
                    }
                }
                self.store
                    .commit(&change)
                    .await
                    .map_err(AttemptError::Store)?;
                info!(
                    operation = mutation.name(),
                    farm_id = %mutation.farm_id(),
                    farmer_id = ?result.as_ref().map(Farm::farmer_id),
                    area_ha = ?result.as_ref().map(|farm| farm.area().hectares()),
                    rollups = change.deltas.len(),
                    "farm change committed"
                );
                Ok(result)
            }
        }
    }

    async fn ensure_no_overlap(&self, farm: &Farm) -> FarmResult<()> {
        if self.config.overlap_policy == OverlapPolicy::Allow {
            return Ok(());
        }
        let farm_ids = self.overlapping(farm.polygon(), Some(farm.id())).await?;
        if farm_ids.is_empty() {
            Ok(())
        } else {
            Err(FarmError::OverlapConflict { farm_ids })
        }
    }

    async fn overlapping(
        &self,
        polygon: &Polygon,
        exclude: Option<FarmId>,
    ) -> FarmResult<Vec<FarmId>> {
        let candidates = self
            .store
            .list_active_farms(Some(BoundingBox::of(polygon)))
            .await
            .map_err(map_store_error)?;
        Ok(find_overlapping(polygon, exclude, &candidates))
    }

    async fn expect_farm(&self, mutation: Mutation) -> FarmResult<Farm> {
        let farm_id = mutation.farm_id();
        self.run(&mutation)
            .await?
            .ok_or(FarmError::FarmNotFound { farm_id })
    }
}

fn validate(boundary: Vec<LngLat>) -> FarmResult<Polygon> {
    Ok(Polygon::new(boundary)?)
}

#[async_trait]
impl<S> FarmCommand for FarmService<S>
where
    S: FarmStore,
{
    async fn create_farm(&self, request: CreateFarmRequest) -> FarmResult<Farm> {
        let polygon = validate(request.boundary)?;
        let farm = Farm::create(
            FarmId::random(),
            request.farmer_id,
            polygon,
            request.metadata,
            self.clock.utc(),
        );
        self.expect_farm(Mutation::Create(Box::new(farm))).await
    }

    async fn update_geometry(&self, request: UpdateFarmGeometryRequest) -> FarmResult<Farm> {
        let polygon = validate(request.boundary)?;
        self.expect_farm(Mutation::UpdateGeometry {
            farm_id: request.farm_id,
            polygon,
        })
        .await
    }

    async fn soft_delete(&self, farm_id: FarmId) -> FarmResult<Farm> {
        self.expect_farm(Mutation::SoftDelete(farm_id)).await
    }

    async fn restore(&self, farm_id: FarmId) -> FarmResult<Farm> {
        self.expect_farm(Mutation::Restore(farm_id)).await
    }

    async fn hard_delete(&self, farm_id: FarmId) -> FarmResult<()> {
        self.run(&Mutation::HardDelete(farm_id)).await.map(|_| ())
    }

    async fn reassign(&self, request: ReassignFarmRequest) -> FarmResult<Farm> {
        self.expect_farm(Mutation::Reassign {
            farm_id: request.farm_id,
            farmer_id: request.farmer_id,
        })
        .await
    }
}

#[async_trait]
impl<S> FarmQuery for FarmService<S>
where
    S: FarmStore,
{
    async fn find_overlapping(&self, request: FindOverlappingRequest) -> FarmResult<Vec<FarmId>> {
        let polygon = validate(request.boundary)?;
        self.overlapping(&polygon, request.exclude_farm_id).await
    }

    async fn detect_all_overlaps(&self) -> FarmResult<Vec<OverlapResult>> {
        let farms = self
            .store
            .list_active_farms(None)
            .await
            .map_err(map_store_error)?;
        let pairs = detect_all_overlaps(&farms);
        info!(
            active_farms = farms.len(),
            overlapping_pairs = pairs.len(),
            "overlap audit finished"
        );
        Ok(pairs)
    }

    async fn get_farm(&self, farm_id: FarmId) -> FarmResult<Farm> {
        self.store
            .find_farm(&farm_id)
            .await
            .map_err(map_store_error)?
            .ok_or(FarmError::FarmNotFound { farm_id })
    }

    async fn get_farmer(&self, farmer_id: FarmerId) -> FarmResult<Farmer> {
        self.store
            .find_farmer(&farmer_id)
            .await
            .map_err(map_store_error)?
            .ok_or(FarmError::FarmerNotFound { farmer_id })
    }
}

#[async_trait]
impl<S> FarmMaintenance for FarmService<S>
where
    S: FarmStore,
{
    async fn register_farmer(&self, farmer_id: FarmerId) -> FarmResult<Farmer> {
        self.store
            .register_farmer(&farmer_id)
            .await
            .map_err(map_store_error)
    }

    async fn reconcile_farmer(&self, farmer_id: FarmerId) -> FarmResult<Farmer> {
        let farmer = self
            .store
            .reconcile_farmer(&farmer_id)
            .await
            .map_err(map_store_error)?;
        info!(
            %farmer_id,
            total_acreage_ha = farmer.total_acreage_ha(),
            farm_count = farmer.farm_count(),
            "farmer totals reconciled"
        );
        Ok(farmer)
    }

    async fn rebuild_spatial_index(&self) -> FarmResult<()> {
        self.store
            .rebuild_spatial_index()
            .await
            .map_err(map_store_error)?;
        info!("farm spatial index rebuilt");
        Ok(())
    }
}

#[cfg(test)]
#[path = "farm_service_tests.rs"]
mod tests;
