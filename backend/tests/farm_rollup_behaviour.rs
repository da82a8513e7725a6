//! Behavioural tests for acreage rollups through the farm service.
//!
//! Runs the driving ports against the in-memory store and checks, after each
//! operation, that every farmer's totals equal the sum over their active
//! farms.

use std::sync::Arc;

use farmland::domain::ports::{
    CreateFarmRequest, FarmCommand, FarmMaintenance, FarmQuery, ReassignFarmRequest,
    UpdateFarmGeometryRequest,
};
use farmland::domain::{
    AcreageTotals, Area, Farm, FarmError, FarmId, FarmMetadata, FarmService, FarmServiceConfig,
    FarmerId, GeometryError, LngLat,
};
use farmland::outbound::memory::InMemoryFarmStore;
use farmland::test_support::{ImmediateSleeper, NoJitter, fixture_clock, square_boundary};
use proptest::prelude::*;
use rstest::{fixture, rstest};
use tokio::runtime::Builder;

struct Registry {
    store: Arc<InMemoryFarmStore>,
    service: Arc<FarmService<InMemoryFarmStore>>,
}

impl Registry {
    fn new() -> Self {
        let store = Arc::new(InMemoryFarmStore::new());
        let service = FarmService::new(
            Arc::clone(&store),
            fixture_clock(),
            FarmServiceConfig::default(),
        )
        .with_retry_runtime(Arc::new(ImmediateSleeper), Arc::new(NoJitter));
        Self {
            store,
            service: Arc::new(service),
        }
    }

    async fn farmer(&self) -> FarmerId {
        let farmer_id = FarmerId::random();
        self.service
            .register_farmer(farmer_id)
            .await
            .expect("register farmer");
        farmer_id
    }

    async fn create(&self, farmer_id: FarmerId, lng: f64, hectares: f64) -> Farm {
        self.service
            .create_farm(CreateFarmRequest {
                farmer_id,
                boundary: boundary(lng, hectares),
                metadata: FarmMetadata::default(),
            })
            .await
            .expect("create farm")
    }

    async fn total_ha(&self, farmer_id: FarmerId) -> f64 {
        self.service
            .get_farmer(farmer_id)
            .await
            .expect("farmer exists")
            .total_acreage_ha()
    }

    /// Assert stored totals match a fresh recomputation for every farmer.
    fn assert_consistent(&self) {
        let farms = self.store.all_farms().expect("list farms");
        for farmer in self.store.all_farmers().expect("list farmers") {
            let expected = AcreageTotals::from_farms(farmer.id(), &farms);
            assert!(!farmer.total_area().is_negative());
            assert_eq!(farmer.total_area(), expected.area, "farmer {}", farmer.id());
            assert_eq!(farmer.farm_count(), expected.farm_count);
        }
    }
}

fn boundary(lng: f64, hectares: f64) -> Vec<LngLat> {
    square_boundary(lng, 12.97, hectares).vertices().to_vec()
}

#[fixture]
fn registry() -> Registry {
    Registry::new()
}

#[rstest]
#[tokio::test]
async fn farmer_without_farms_has_exactly_zero(registry: Registry) {
    let farmer_id = registry.farmer().await;
    let farmer = registry.service.get_farmer(farmer_id).await.expect("farmer");

    assert_eq!(farmer.total_acreage_ha(), 0.0);
    assert_eq!(farmer.farm_count(), 0);
}

#[rstest]
#[tokio::test]
async fn first_farm_sets_total_and_count(registry: Registry) {
    let farmer_id = registry.farmer().await;
    registry.create(farmer_id, 77.59, 2.5).await;

    let farmer = registry.service.get_farmer(farmer_id).await.expect("farmer");
    assert!((farmer.total_acreage_ha() - 2.5).abs() < 0.01);
    assert_eq!(farmer.farm_count(), 1);
    registry.assert_consistent();
}

#[rstest]
#[tokio::test]
async fn clockwise_boundary_counts_the_parcel_not_the_globe(registry: Registry) {
    let farmer_id = registry.farmer().await;
    let mut clockwise = boundary(77.59, 2.5);
    clockwise.reverse();

    let farm = registry
        .service
        .create_farm(CreateFarmRequest {
            farmer_id,
            boundary: clockwise,
            metadata: FarmMetadata::default(),
        })
        .await
        .expect("create clockwise farm");

    assert!(
        (farm.area().hectares() - 2.5).abs() < 0.01,
        "got {}",
        farm.area()
    );
    assert!((registry.total_ha(farmer_id).await - 2.5).abs() < 0.01);
    registry.assert_consistent();
}

#[rstest]
#[tokio::test]
async fn totals_sum_over_several_farms(registry: Registry) {
    let farmer_id = registry.farmer().await;
    for (lng, hectares) in [(77.50, 1.5), (77.52, 2.0), (77.54, 0.5)] {
        registry.create(farmer_id, lng, hectares).await;
    }

    assert!((registry.total_ha(farmer_id).await - 4.0).abs() < 0.1);
    registry.assert_consistent();
}

#[rstest]
#[tokio::test]
async fn invalid_boundaries_leave_totals_untouched(registry: Registry) {
    let farmer_id = registry.farmer().await;
    let cases = [
        (
            vec![(0.0, 0.0), (0.001, 0.0), (0.0, 0.0)],
            GeometryError::TooFewPoints { count: 3 },
        ),
        (
            vec![(0.0, 0.0), (0.001, 0.0), (0.001, 0.001), (0.0, 0.001)],
            GeometryError::UnclosedRing,
        ),
    ];

    for (pairs, expected) in cases {
        let error = registry
            .service
            .create_farm(CreateFarmRequest {
                farmer_id,
                boundary: pairs.into_iter().map(LngLat::from).collect(),
                metadata: FarmMetadata::default(),
            })
            .await
            .expect_err("invalid ring");
        assert_eq!(error, FarmError::Geometry(expected));
    }

    let error = registry
        .service
        .create_farm(CreateFarmRequest {
            farmer_id,
            boundary: [(0.0, 95.0), (0.001, 95.0), (0.001, 95.001), (0.0, 95.0)]
                .into_iter()
                .map(LngLat::from)
                .collect(),
            metadata: FarmMetadata::default(),
        })
        .await
        .expect_err("latitude out of range");
    assert!(matches!(
        error,
        FarmError::Geometry(GeometryError::CoordinateOutOfRange { .. })
    ));

    assert!(registry.store.all_farms().expect("list farms").is_empty());
    assert_eq!(registry.total_ha(farmer_id).await, 0.0);
}

#[rstest]
#[tokio::test]
async fn soft_delete_restore_and_hard_delete_count_once(registry: Registry) {
    let farmer_id = registry.farmer().await;
    let kept = registry.create(farmer_id, 77.50, 1.0).await;
    let farm = registry.create(farmer_id, 77.52, 2.0).await;
    let with_both = registry.total_ha(farmer_id).await;

    registry.service.soft_delete(farm.id()).await.expect("soft delete");
    let after_soft = registry.total_ha(farmer_id).await;
    assert!((with_both - after_soft - farm.area().hectares()).abs() < 1e-9);

    registry.service.restore(farm.id()).await.expect("restore");
    assert_eq!(registry.total_ha(farmer_id).await, with_both);

    registry.service.soft_delete(farm.id()).await.expect("soft delete again");
    registry.service.hard_delete(farm.id()).await.expect("hard delete");
    assert_eq!(registry.total_ha(farmer_id).await, kept.area().hectares());
    registry.assert_consistent();
}

#[rstest]
#[tokio::test]
async fn reassign_moves_area_between_farmers(registry: Registry) {
    let from = registry.farmer().await;
    let to = registry.farmer().await;
    let farm = registry.create(from, 77.59, 3.0).await;

    let moved = registry
        .service
        .reassign(ReassignFarmRequest {
            farm_id: farm.id(),
            farmer_id: to,
        })
        .await
        .expect("reassign");

    assert_eq!(moved.farmer_id(), to);
    assert_eq!(registry.total_ha(from).await, 0.0);
    assert_eq!(registry.total_ha(to).await, farm.area().hectares());
    registry.assert_consistent();
}

#[rstest]
#[tokio::test]
async fn geometry_update_applies_area_difference(registry: Registry) {
    let farmer_id = registry.farmer().await;
    let farm = registry.create(farmer_id, 77.59, 1.0).await;

    let grown = registry
        .service
        .update_geometry(UpdateFarmGeometryRequest {
            farm_id: farm.id(),
            boundary: boundary(77.59, 4.0),
        })
        .await
        .expect("update geometry");

    let farmer = registry.service.get_farmer(farmer_id).await.expect("farmer");
    assert_eq!(farmer.total_area(), grown.area());
    assert_eq!(farmer.farm_count(), 1);
}

#[rstest]
#[tokio::test]
async fn overlap_queries_see_only_active_farms(registry: Registry) {
    let farmer_id = registry.farmer().await;
    let first = registry.create(farmer_id, 77.59, 2.0).await;
    let second = registry.create(farmer_id, 77.5905, 2.0).await;
    let gone = registry.create(farmer_id, 77.591, 2.0).await;
    registry.service.soft_delete(gone.id()).await.expect("soft delete");

    let overlaps = registry
        .service
        .detect_all_overlaps()
        .await
        .expect("detect overlaps");
    let pairs: Vec<(FarmId, FarmId)> = overlaps
        .iter()
        .map(|result| (result.first, result.second))
        .collect();
    let expected = if first.id() < second.id() {
        (first.id(), second.id())
    } else {
        (second.id(), first.id())
    };
    assert_eq!(pairs, vec![expected]);
}

#[rstest]
fn ten_concurrent_creations_converge_to_exact_sum() {
    let runtime = Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .expect("runtime");
    let registry = Registry::new();

    runtime.block_on(async {
        let farmer_id = registry.farmer().await;
        let handles: Vec<_> = (0..10_u32)
            .map(|index| {
                let service = Arc::clone(&registry.service);
                tokio::spawn(async move {
                    service
                        .create_farm(CreateFarmRequest {
                            farmer_id,
                            boundary: boundary(70.0 + f64::from(index) * 0.05, 1.0),
                            metadata: FarmMetadata::default(),
                        })
                        .await
                })
            })
            .collect();

        let mut created = Vec::new();
        for handle in handles {
            created.push(handle.await.expect("task joins").expect("create farm"));
        }

        let expected: Area = created.iter().map(Farm::area).sum();
        let farmer = registry.service.get_farmer(farmer_id).await.expect("farmer");
        assert_eq!(farmer.total_area(), expected);
        assert_eq!(farmer.farm_count(), 10);
    });
    registry.assert_consistent();
}

#[derive(Debug, Clone)]
enum Op {
    Create { owner: usize, hectares: f64 },
    Resize { farm: usize, hectares: f64 },
    SoftDelete { farm: usize },
    Restore { farm: usize },
    HardDelete { farm: usize },
    Reassign { farm: usize, owner: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..3_usize, 0.1..5.0_f64).prop_map(|(owner, hectares)| Op::Create { owner, hectares }),
        (0..8_usize, 0.1..5.0_f64).prop_map(|(farm, hectares)| Op::Resize { farm, hectares }),
        (0..8_usize).prop_map(|farm| Op::SoftDelete { farm }),
        (0..8_usize).prop_map(|farm| Op::Restore { farm }),
        (0..8_usize).prop_map(|farm| Op::HardDelete { farm }),
        (0..8_usize, 0..3_usize).prop_map(|(farm, owner)| Op::Reassign { farm, owner }),
    ]
}

fn pick(farms: &[FarmId], index: usize) -> Option<FarmId> {
    farms.get(index % farms.len().max(1)).copied()
}

async fn run_op(registry: &Registry, owners: &[FarmerId], farms: &mut Vec<FarmId>, op: Op) {
    let service = &registry.service;
    let outcome = match op {
        Op::Create { owner, hectares } => {
            let slot = u32::try_from(farms.len()).expect("few farms");
            let lng = 60.0 + 0.05 * f64::from(slot);
            service
                .create_farm(CreateFarmRequest {
                    farmer_id: owners[owner],
                    boundary: boundary(lng, hectares),
                    metadata: FarmMetadata::default(),
                })
                .await
                .map(|farm| farms.push(farm.id()))
        }
        Op::Resize { farm, hectares } => match pick(farms, farm) {
            Some(farm_id) => {
                let current = service.get_farm(farm_id).await;
                match current {
                    Ok(current) => {
                        let lng = current.bounding_box().min_lng();
                        service
                            .update_geometry(UpdateFarmGeometryRequest {
                                farm_id,
                                boundary: boundary(lng + 0.001, hectares),
                            })
                            .await
                            .map(drop)
                    }
                    Err(error) => Err(error),
                }
            }
            None => Ok(()),
        },
        Op::SoftDelete { farm } => match pick(farms, farm) {
            Some(farm_id) => service.soft_delete(farm_id).await.map(drop),
            None => Ok(()),
        },
        Op::Restore { farm } => match pick(farms, farm) {
            Some(farm_id) => service.restore(farm_id).await.map(drop),
            None => Ok(()),
        },
        Op::HardDelete { farm } => match pick(farms, farm) {
            Some(farm_id) => service.hard_delete(farm_id).await,
            None => Ok(()),
        },
        Op::Reassign { farm, owner } => match pick(farms, farm) {
            Some(farm_id) => service
                .reassign(ReassignFarmRequest {
                    farm_id,
                    farmer_id: owners[owner],
                })
                .await
                .map(drop),
            None => Ok(()),
        },
    };

    match outcome {
        Ok(()) | Err(FarmError::FarmNotFound { .. }) => {}
        Err(other) => panic!("unexpected failure: {other}"),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn totals_stay_exact_and_non_negative(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        let registry = Registry::new();

        runtime.block_on(async {
            let mut owners = Vec::new();
            for _ in 0..3 {
                owners.push(registry.farmer().await);
            }
            let mut farms = Vec::new();
            for op in ops {
                run_op(&registry, &owners, &mut farms, op).await;
                registry.assert_consistent();
            }
        });
    }
}
