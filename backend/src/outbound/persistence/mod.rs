//! PostgreSQL persistence for farms and farmers.
//!
//! [`DieselFarmStore`] implements the farm store port over a `diesel-async`
//! connection pool. Row structs and table definitions stay private to this
//! module; everything crossing the boundary is a domain type.
//!
//! ```ignore
//! use farmland::outbound::persistence::{DbPool, DieselFarmStore, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/farmland")).await?;
//! let store = DieselFarmStore::new(pool);
//! ```

mod diesel_error_mapping;
mod diesel_farm_store;
mod migrations;
mod models;
mod pool;
mod schema;

pub use diesel_farm_store::{ACTIVE_BBOX_INDEX, DieselFarmStore};
pub use migrations::{MigrationError, run_pending_migrations};
pub use pool::{
    DEFAULT_CONNECTION_TIMEOUT, DEFAULT_MAX_SIZE, DEFAULT_MIN_IDLE, DbPool, PoolConfig, PoolError,
};
