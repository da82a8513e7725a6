//! The farm (land parcel) entity and its value objects.
//!
//! A farm's area is always derived from its boundary; no constructor accepts
//! a caller-supplied area except [`Farm::from_record`], which rehydrates a
//! value previously computed and persisted by this module.

mod area;
mod overlap;
mod polygon;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use self::area::Area;
pub use self::overlap::{
    BoundingBox, OverlapResult, detect_all_overlaps, find_overlapping, interiors_overlap,
};
pub use self::polygon::{GeometryError, LngLat, MIN_RING_VERTICES, Polygon};

use super::ids::{FarmId, FarmerId};

/// Lifecycle state of a farm.
///
/// Only [`FarmStatus::Active`] farms count towards their owner's totals or
/// take part in overlap checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum FarmStatus {
    Active,
    Deleted { at: DateTime<Utc> },
}

impl FarmStatus {
    /// Map a nullable deletion timestamp onto the status tag.
    pub fn from_deleted_at(deleted_at: Option<DateTime<Utc>>) -> Self {
        deleted_at.map_or(Self::Active, |at| Self::Deleted { at })
    }

    /// Deletion timestamp, if soft-deleted.
    pub fn deleted_at(self) -> Option<DateTime<Utc>> {
        match self {
            Self::Active => None,
            Self::Deleted { at } => Some(at),
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Error returned when farm metadata is not a JSON object.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("farm metadata must be a JSON object")]
pub struct MetadataNotAnObject;

/// Free-form attributes attached to a farm (crop notes, survey refs, …).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FarmMetadata(Map<String, Value>);

impl FarmMetadata {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Render as a JSON value for storage.
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl TryFrom<Value> for FarmMetadata {
    type Error = MetadataNotAnObject;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            Value::Null => Ok(Self::default()),
            _ => Err(MetadataNotAnObject),
        }
    }
}

/// Persisted farm state, used by storage adapters to rehydrate a [`Farm`].
#[derive(Debug, Clone, PartialEq)]
pub struct FarmRecord {
    pub id: FarmId,
    pub farmer_id: FarmerId,
    pub polygon: Polygon,
    pub area: Area,
    pub status: FarmStatus,
    pub metadata: FarmMetadata,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A land parcel owned by exactly one farmer.
///
/// Values are immutable: every lifecycle transition returns a new farm with
/// `version` bumped by one, which storage adapters use for optimistic
/// concurrency control.
///
/// # Examples
/// ```
/// use chrono::Utc;
/// use farmland::domain::{Farm, FarmId, FarmMetadata, FarmerId, Polygon};
///
/// let polygon = Polygon::from_pairs(&[
///     (10.0, 50.0),
///     (10.001, 50.0),
///     (10.001, 50.001),
///     (10.0, 50.001),
///     (10.0, 50.0),
/// ])?;
/// let farm = Farm::create(FarmId::random(), FarmerId::random(), polygon, FarmMetadata::default(), Utc::now());
/// assert!(farm.is_active());
/// assert!(farm.area().square_metres() > 0);
/// assert_eq!(farm.version(), 1);
/// # Ok::<(), farmland::domain::GeometryError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Farm {
    id: FarmId,
    farmer_id: FarmerId,
    polygon: Polygon,
    area: Area,
    status: FarmStatus,
    metadata: FarmMetadata,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Farm {
    /// A new active farm with its area computed from `polygon`.
    pub fn create(
        id: FarmId,
        farmer_id: FarmerId,
        polygon: Polygon,
        metadata: FarmMetadata,
        now: DateTime<Utc>,
    ) -> Self {
        let area = Area::of(&polygon);
        Self {
            id,
            farmer_id,
            polygon,
            area,
            status: FarmStatus::Active,
            metadata,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rehydrate a farm from storage, trusting the persisted area.
    pub fn from_record(record: FarmRecord) -> Self {
        let FarmRecord {
            id,
            farmer_id,
            polygon,
            area,
            status,
            metadata,
            version,
            created_at,
            updated_at,
        } = record;
        Self {
            id,
            farmer_id,
            polygon,
            area,
            status,
            metadata,
            version,
            created_at,
            updated_at,
        }
    }

    /// Replace the boundary and re-derive the area.
    #[must_use]
    pub fn with_geometry(&self, polygon: Polygon, now: DateTime<Utc>) -> Self {
        let area = Area::of(&polygon);
        Self {
            polygon,
            area,
            ..self.next_revision(now)
        }
    }

    #[must_use]
    pub fn soft_deleted(&self, now: DateTime<Utc>) -> Self {
        Self {
            status: FarmStatus::Deleted { at: now },
            ..self.next_revision(now)
        }
    }

    #[must_use]
    pub fn restored(&self, now: DateTime<Utc>) -> Self {
        Self {
            status: FarmStatus::Active,
            ..self.next_revision(now)
        }
    }

    #[must_use]
    pub fn reassigned_to(&self, farmer_id: FarmerId, now: DateTime<Utc>) -> Self {
        Self {
            farmer_id,
            ..self.next_revision(now)
        }
    }

    fn next_revision(&self, now: DateTime<Utc>) -> Self {
        Self {
            version: self.version + 1,
            updated_at: now,
            ..self.clone()
        }
    }

    pub fn id(&self) -> FarmId {
        self.id
    }

    pub fn farmer_id(&self) -> FarmerId {
        self.farmer_id
    }

    pub fn polygon(&self) -> &Polygon {
        &self.polygon
    }

    pub fn area(&self) -> Area {
        self.area
    }

    pub fn status(&self) -> FarmStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn metadata(&self) -> &FarmMetadata {
        &self.metadata
    }

    /// Optimistic-concurrency revision, starting at 1.
    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::of(&self.polygon)
    }
}
