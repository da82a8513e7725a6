//! Internal Diesel row structs for the farm store.
//!
//! These types never cross into the domain; the repository converts them
//! through validated constructors.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use super::schema::{farmers, farms};

/// Row read from `farmers`.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = farmers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct FarmerRow {
    pub id: Uuid,
    pub total_area_m2: i64,
    pub farm_count: i64,
}

/// Insertable row for registering a farmer with empty totals.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = farmers)]
pub(crate) struct NewFarmerRow {
    pub id: Uuid,
}

/// Row read from `farms`.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = farms)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct FarmRow {
    pub id: Uuid,
    pub farmer_id: Uuid,
    pub boundary: serde_json::Value,
    pub area_m2: i64,
    pub metadata: serde_json::Value,
    pub version: i64,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Full farm state for inserts and versioned updates.
///
/// `deleted_at` is written as `NULL` when absent so restores clear it.
#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = farms)]
#[diesel(treat_none_as_null = true)]
pub(crate) struct FarmWriteRow {
    pub id: Uuid,
    pub farmer_id: Uuid,
    pub boundary: serde_json::Value,
    pub area_m2: i64,
    pub min_lng: f64,
    pub min_lat: f64,
    pub max_lng: f64,
    pub max_lat: f64,
    pub metadata: serde_json::Value,
    pub version: i64,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
