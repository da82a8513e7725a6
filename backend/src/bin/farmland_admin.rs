//! Operator commands for the farm registry database.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::ffi::OsString;
use std::io;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use farmland::config::FarmlandSettings;
use farmland::domain::ports::{FarmMaintenance, FarmQuery};
use farmland::domain::{DomainError, FarmError, FarmService, FarmerId};
use farmland::outbound::persistence::{DbPool, DieselFarmStore, run_pending_migrations};
use mockable::DefaultClock;
use ortho_config::OrthoConfig;
use tokio::runtime::Builder;
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt};

/// `farmland-admin` command arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "farmland-admin",
    about = "Maintain the farm registry database",
    version
)]
struct CliArgs {
    /// Database connection URL. Falls back to `FARMLAND_DATABASE_URL`.
    #[arg(long = "database-url", value_name = "url", global = true)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: AdminCommand,
}

#[derive(Debug, Clone, Subcommand)]
enum AdminCommand {
    /// Apply pending schema migrations.
    Migrate,
    /// List every pair of active farms whose interiors overlap.
    DetectOverlaps,
    /// Rebuild the bounding-box index over active farms.
    RebuildSpatialIndex,
    /// Create a farmer with empty totals if they do not exist yet.
    RegisterFarmer {
        #[arg(long = "farmer-id", value_name = "uuid")]
        farmer_id: FarmerId,
    },
    /// Recompute a farmer's totals from their active farms.
    Reconcile {
        #[arg(long = "farmer-id", value_name = "uuid")]
        farmer_id: FarmerId,
    },
}

fn main() -> io::Result<()> {
    if let Err(error) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %error, "tracing init failed");
    }

    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|error| io::Error::other(format!("create Tokio runtime: {error}")))?;
    runtime.block_on(async_main())
}

async fn async_main() -> io::Result<()> {
    let args = CliArgs::try_parse().map_err(io::Error::other)?;
    let mut settings = FarmlandSettings::load_from_iter([OsString::from("farmland-admin")])
        .map_err(|error| io::Error::other(format!("load settings: {error}")))?;
    if args.database_url.is_some() {
        settings.database_url = args.database_url;
    }
    let pool_config = settings.pool_config().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "set --database-url or FARMLAND_DATABASE_URL",
        )
    })?;

    if matches!(args.command, AdminCommand::Migrate) {
        let url = pool_config.database_url().to_owned();
        let applied = tokio::task::spawn_blocking(move || run_pending_migrations(&url))
            .await
            .map_err(|error| io::Error::other(format!("migration task failed: {error}")))?
            .map_err(io::Error::other)?;
        println!("applied_migrations={}", applied.len());
        for version in applied {
            println!("migration={version}");
        }
        return Ok(());
    }

    let pool = DbPool::new(pool_config)
        .await
        .map_err(|error| io::Error::other(format!("create database pool: {error}")))?;
    let service = FarmService::new(
        Arc::new(DieselFarmStore::new(pool)),
        Arc::new(DefaultClock),
        settings.service_config(),
    );

    match args.command {
        AdminCommand::Migrate => {}
        AdminCommand::DetectOverlaps => {
            let overlaps = service
                .detect_all_overlaps()
                .await
                .map_err(|error| failure("detect overlaps", error))?;
            println!("overlap_count={}", overlaps.len());
            for pair in overlaps {
                println!("overlap={},{}", pair.first, pair.second);
            }
        }
        AdminCommand::RebuildSpatialIndex => {
            service
                .rebuild_spatial_index()
                .await
                .map_err(|error| failure("rebuild spatial index", error))?;
            println!("status=rebuilt");
        }
        AdminCommand::RegisterFarmer { farmer_id } => {
            let farmer = service
                .register_farmer(farmer_id)
                .await
                .map_err(|error| failure("register farmer", error))?;
            print_farmer(farmer);
        }
        AdminCommand::Reconcile { farmer_id } => {
            let farmer = service
                .reconcile_farmer(farmer_id)
                .await
                .map_err(|error| failure("reconcile farmer", error))?;
            print_farmer(farmer);
        }
    }

    Ok(())
}

/// Print the failure as a `DomainError` JSON line on stderr and convert it
/// into the process error.
fn failure(operation: &str, error: FarmError) -> io::Error {
    let envelope = DomainError::from(error);
    match error_json(&envelope) {
        Ok(line) => eprintln!("{line}"),
        Err(encode_error) => warn!(error = %encode_error, "failed to encode error envelope"),
    }
    io::Error::other(format!("{operation}: {}", envelope.message()))
}

fn error_json(envelope: &DomainError) -> serde_json::Result<String> {
    serde_json::to_string(envelope)
}

fn print_farmer(farmer: farmland::domain::Farmer) {
    println!("farmer_id={}", farmer.id());
    println!("total_acreage_ha={:.4}", farmer.total_acreage_ha());
    println!("total_area_m2={}", farmer.total_area().square_metres());
    println!("farm_count={}", farmer.farm_count());
}
