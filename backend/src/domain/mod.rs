//! Domain primitives, aggregates and services.
//!
//! Purpose: define the farm and farmer entities, the geometry rules that
//! guard them, and the orchestration that keeps farmer acreage rollups
//! consistent with the set of active farms. Types are immutable; lifecycle
//! transitions return new values.
//!
//! Public surface:
//! - [`Farm`], [`FarmStatus`], [`Polygon`], [`Area`]: the parcel entity and
//!   its value objects.
//! - [`Farmer`]: the rollup aggregate.
//! - [`rollup`]: the acreage rollup engine.
//! - [`FarmService`]: the transactional repository implementing the driving
//!   ports in [`ports`].

pub mod error;
pub mod farm;
mod farm_service;
pub mod farmer;
mod ids;
pub mod ports;
pub mod retry;
pub mod rollup;

pub use self::error::{DomainError, DomainErrorValidationError, ErrorCode, FarmError};
pub use self::farm::{
    Area, BoundingBox, Farm, FarmMetadata, FarmRecord, FarmStatus, GeometryError, LngLat,
    OverlapResult, Polygon, detect_all_overlaps, find_overlapping, interiors_overlap,
};
pub use self::farm_service::{FarmService, FarmServiceConfig, OverlapPolicy};
pub use self::farmer::{AcreageTotals, Farmer, RollupError};
pub use self::ids::{FarmId, FarmerId, IdParseError};
pub use self::retry::{AttemptJitter, BackoffJitter, RetryPolicy, RetrySleeper, TokioSleeper};
pub use self::rollup::RollupDelta;

/// Convenient alias for results carrying a [`FarmError`].
pub type FarmResult<T> = Result<T, FarmError>;
