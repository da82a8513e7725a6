//! Integration tests for `DieselFarmStore` against PostgreSQL.
//!
//! Set `FARMLAND_TEST_DATABASE_URL` to a disposable database to run them;
//! migrations are applied on first use. Each test works with fresh farmer
//! ids so suites can share one database.

use std::sync::Arc;

use diesel::pg::PgConnection;
use diesel::sql_types;
use diesel::{Connection, RunQueryDsl};
use farmland::domain::ports::{
    CreateFarmRequest, FarmChange, FarmCommand, FarmMaintenance, FarmQuery, FarmStore,
    FarmStoreError, FindOverlappingRequest, ReassignFarmRequest, UpdateFarmGeometryRequest,
};
use farmland::domain::{
    AcreageTotals, Area, Farm, FarmError, FarmId, FarmMetadata, FarmService, FarmServiceConfig,
    FarmerId, RetryPolicy,
};
use farmland::outbound::persistence::{
    DbPool, DieselFarmStore, PoolConfig, run_pending_migrations,
};
use farmland::test_support::{
    ImmediateSleeper, NoJitter, fixed_now, fixture_clock, square_boundary,
};
use rstest::{fixture, rstest};
use tokio::runtime::Runtime;

const DATABASE_URL_VAR: &str = "FARMLAND_TEST_DATABASE_URL";
const GEOMETRY_RACERS: u32 = 3;

struct TestContext {
    runtime: Runtime,
    store: Arc<DieselFarmStore>,
    service: Arc<FarmService<DieselFarmStore>>,
    database_url: String,
}

fn setup_context(database_url: String) -> Result<TestContext, String> {
    run_pending_migrations(&database_url).map_err(|err| err.to_string())?;
    let runtime = Runtime::new().map_err(|err| err.to_string())?;
    let config = PoolConfig::new(database_url.as_str())
        .with_max_size(4)
        .with_min_idle(Some(1));
    let pool = runtime
        .block_on(async { DbPool::new(config).await })
        .map_err(|err| err.to_string())?;
    let store = Arc::new(DieselFarmStore::new(pool));
    let config = FarmServiceConfig {
        retry: RetryPolicy {
            max_attempts: GEOMETRY_RACERS + 2,
            ..RetryPolicy::default()
        },
        ..FarmServiceConfig::default()
    };
    let service = FarmService::new(Arc::clone(&store), fixture_clock(), config)
        .with_retry_runtime(Arc::new(ImmediateSleeper), Arc::new(NoJitter));

    Ok(TestContext {
        runtime,
        store,
        service: Arc::new(service),
        database_url,
    })
}

#[fixture]
fn store_context() -> Option<TestContext> {
    let database_url = std::env::var(DATABASE_URL_VAR).ok()?;
    match setup_context(database_url) {
        Ok(context) => Some(context),
        Err(reason) => panic!("{DATABASE_URL_VAR} is set but unusable: {reason}"),
    }
}

fn create_request(farmer_id: FarmerId, lng: f64, hectares: f64) -> CreateFarmRequest {
    CreateFarmRequest {
        farmer_id,
        boundary: square_boundary(lng, -1.29, hectares).vertices().to_vec(),
        metadata: FarmMetadata::default(),
    }
}

/// Overwrite a farmer's totals behind the store's back.
fn force_totals(database_url: &str, farmer_id: FarmerId, area_m2: i64, farm_count: i64) {
    let mut conn = PgConnection::establish(database_url).expect("connect");
    diesel::sql_query("UPDATE farmers SET total_area_m2 = $1, farm_count = $2 WHERE id = $3")
        .bind::<sql_types::BigInt, _>(area_m2)
        .bind::<sql_types::BigInt, _>(farm_count)
        .bind::<sql_types::Uuid, _>(*farmer_id.as_uuid())
        .execute(&mut conn)
        .expect("force totals");
}

#[rstest]
fn lifecycle_keeps_totals_exact(store_context: Option<TestContext>) {
    let Some(context) = store_context else {
        eprintln!("SKIP-TEST-CLUSTER: lifecycle_keeps_totals_exact skipped");
        return;
    };
    let service = &context.service;

    context.runtime.block_on(async {
        let owner = FarmerId::random();
        let other = FarmerId::random();
        service.register_farmer(owner).await.expect("register owner");
        service.register_farmer(other).await.expect("register other");

        let first = service
            .create_farm(create_request(owner, 36.80, 2.5))
            .await
            .expect("create first");
        let second = service
            .create_farm(create_request(owner, 36.82, 1.0))
            .await
            .expect("create second");
        let both = first.area() + second.area();
        let farmer = service.get_farmer(owner).await.expect("owner");
        assert_eq!(farmer.total_area(), both);
        assert!((farmer.total_acreage_ha() - 3.5).abs() < 0.02);

        service.soft_delete(first.id()).await.expect("soft delete");
        assert_eq!(
            service.get_farmer(owner).await.expect("owner").total_area(),
            second.area()
        );

        service.restore(first.id()).await.expect("restore");
        assert_eq!(
            service.get_farmer(owner).await.expect("owner").total_area(),
            both
        );

        service
            .reassign(ReassignFarmRequest {
                farm_id: second.id(),
                farmer_id: other,
            })
            .await
            .expect("reassign");
        assert_eq!(
            service.get_farmer(other).await.expect("other").total_area(),
            second.area()
        );

        service.soft_delete(first.id()).await.expect("soft delete");
        service.hard_delete(first.id()).await.expect("hard delete");
        let farmer = service.get_farmer(owner).await.expect("owner");
        assert_eq!(farmer.total_area(), Area::ZERO);
        assert_eq!(farmer.farm_count(), 0);
        assert_eq!(
            service.get_farm(first.id()).await,
            Err(FarmError::FarmNotFound {
                farm_id: first.id()
            })
        );
    });
}

#[rstest]
fn stale_versions_and_unknown_farmers_are_rejected(store_context: Option<TestContext>) {
    let Some(context) = store_context else {
        eprintln!("SKIP-TEST-CLUSTER: stale_versions_and_unknown_farmers_are_rejected skipped");
        return;
    };
    let store = &context.store;

    context.runtime.block_on(async {
        let owner = FarmerId::random();
        store.register_farmer(&owner).await.expect("register");
        let farm = Farm::create(
            FarmId::random(),
            owner,
            square_boundary(36.90, -1.29, 1.0),
            FarmMetadata::default(),
            fixed_now(),
        );
        store
            .commit(&FarmChange::insert(farm.clone()))
            .await
            .expect("insert");
        store
            .commit(&FarmChange::update(&farm, farm.soft_deleted(fixed_now())))
            .await
            .expect("soft delete");

        let stale = store
            .commit(&FarmChange::update(&farm, farm.soft_deleted(fixed_now())))
            .await
            .expect_err("stale version");
        assert!(matches!(stale, FarmStoreError::Conflict { .. }));

        let stranger = FarmerId::random();
        let orphan = Farm::create(
            FarmId::random(),
            stranger,
            square_boundary(36.92, -1.29, 1.0),
            FarmMetadata::default(),
            fixed_now(),
        );
        let missing = store
            .commit(&FarmChange::insert(orphan.clone()))
            .await
            .expect_err("unknown farmer");
        assert_eq!(missing, FarmStoreError::farmer_not_found(stranger));
        assert_eq!(store.find_farm(&orphan.id()).await.expect("read"), None);
    });
}

#[rstest]
fn drifted_totals_are_reconciled_before_retry(store_context: Option<TestContext>) {
    let Some(context) = store_context else {
        eprintln!("SKIP-TEST-CLUSTER: drifted_totals_are_reconciled_before_retry skipped");
        return;
    };
    let service = &context.service;

    let (owner, farm) = context.runtime.block_on(async {
        let owner = FarmerId::random();
        service.register_farmer(owner).await.expect("register");
        let farm = service
            .create_farm(create_request(owner, 37.00, 2.0))
            .await
            .expect("create");
        (owner, farm)
    });

    force_totals(&context.database_url, owner, 0, 0);

    context.runtime.block_on(async {
        let direct = context
            .store
            .commit(&FarmChange::update(&farm, farm.soft_deleted(fixed_now())))
            .await
            .expect_err("negative total");
        assert_eq!(direct, FarmStoreError::negative_aggregate(owner));

        service.soft_delete(farm.id()).await.expect("reconciled soft delete");
        let farmer = service.get_farmer(owner).await.expect("owner");
        assert_eq!(farmer.total_area(), Area::ZERO);
        assert_eq!(farmer.farm_count(), 0);
    });
}

#[rstest]
fn overlaps_and_index_maintenance(store_context: Option<TestContext>) {
    let Some(context) = store_context else {
        eprintln!("SKIP-TEST-CLUSTER: overlaps_and_index_maintenance skipped");
        return;
    };
    let service = &context.service;

    context.runtime.block_on(async {
        let owner = FarmerId::random();
        service.register_farmer(owner).await.expect("register");
        let first = service
            .create_farm(create_request(owner, 37.10, 2.0))
            .await
            .expect("create first");
        let second = service
            .create_farm(create_request(owner, 37.1005, 2.0))
            .await
            .expect("create second");

        let overlapping = service
            .find_overlapping(FindOverlappingRequest {
                boundary: square_boundary(37.10, -1.29, 0.5).vertices().to_vec(),
                exclude_farm_id: Some(first.id()),
            })
            .await
            .expect("find overlapping");
        assert!(overlapping.contains(&second.id()));
        assert!(!overlapping.contains(&first.id()));

        service
            .rebuild_spatial_index()
            .await
            .expect("rebuild index");
    });
}

#[rstest]
fn concurrent_creations_converge_to_exact_sum(store_context: Option<TestContext>) {
    let Some(context) = store_context else {
        eprintln!("SKIP-TEST-CLUSTER: concurrent_creations_converge_to_exact_sum skipped");
        return;
    };

    context.runtime.block_on(async {
        let owner = FarmerId::random();
        context
            .service
            .register_farmer(owner)
            .await
            .expect("register");

        let handles: Vec<_> = (0..10_u32)
            .map(|index| {
                let service = Arc::clone(&context.service);
                let request = create_request(owner, 38.0 + f64::from(index) * 0.01, 1.0);
                tokio::spawn(async move { service.create_farm(request).await })
            })
            .collect();
        let mut farms = Vec::with_capacity(handles.len());
        for handle in handles {
            farms.push(handle.await.expect("join").expect("create"));
        }

        let expected = AcreageTotals::from_farms(owner, &farms);
        let farmer = context.service.get_farmer(owner).await.expect("owner");
        assert_eq!(farmer.total_area(), expected.area);
        assert_eq!(farmer.farm_count(), 10);
        assert!((farmer.total_acreage_ha() - 10.0).abs() < 0.1);
    });
}

#[rstest]
fn racing_geometry_updates_all_land_after_retry(store_context: Option<TestContext>) {
    let Some(context) = store_context else {
        eprintln!("SKIP-TEST-CLUSTER: racing_geometry_updates_all_land_after_retry skipped");
        return;
    };

    context.runtime.block_on(async {
        let owner = FarmerId::random();
        context
            .service
            .register_farmer(owner)
            .await
            .expect("register");
        let farm = context
            .service
            .create_farm(create_request(owner, 38.50, 1.0))
            .await
            .expect("create");

        let handles: Vec<_> = (1..=GEOMETRY_RACERS)
            .map(|step| {
                let service = Arc::clone(&context.service);
                let request = UpdateFarmGeometryRequest {
                    farm_id: farm.id(),
                    boundary: square_boundary(38.50, -1.29, 1.0 + f64::from(step))
                        .vertices()
                        .to_vec(),
                };
                tokio::spawn(async move { service.update_geometry(request).await })
            })
            .collect();
        for handle in handles {
            handle.await.expect("join").expect("update retried to success");
        }

        let stored = context.service.get_farm(farm.id()).await.expect("farm");
        assert_eq!(
            stored.version(),
            farm.version() + i64::from(GEOMETRY_RACERS)
        );
        let farmer = context.service.get_farmer(owner).await.expect("owner");
        assert_eq!(farmer.total_area(), stored.area());
        assert_eq!(farmer.farm_count(), 1);
    });
}
