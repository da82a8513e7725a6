//! Overlap detection between parcel boundaries.
//!
//! Touching along an edge or at a corner is not an overlap; only shared
//! interior area counts. Candidates are pre-filtered by bounding box before
//! the exact DE-9IM relation is evaluated.

use geo::Relate;
use serde::{Deserialize, Serialize};

use super::Farm;
use super::polygon::Polygon;
use crate::domain::FarmId;

/// Axis-aligned bounds of a boundary ring in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    min_lng: f64,
    min_lat: f64,
    max_lng: f64,
    max_lat: f64,
}

impl BoundingBox {
    /// Bounds enclosing every vertex of `polygon`.
    pub fn of(polygon: &Polygon) -> Self {
        polygon.vertices().iter().fold(
            Self {
                min_lng: f64::INFINITY,
                min_lat: f64::INFINITY,
                max_lng: f64::NEG_INFINITY,
                max_lat: f64::NEG_INFINITY,
            },
            |bounds, vertex| Self {
                min_lng: bounds.min_lng.min(vertex.lng),
                min_lat: bounds.min_lat.min(vertex.lat),
                max_lng: bounds.max_lng.max(vertex.lng),
                max_lat: bounds.max_lat.max(vertex.lat),
            },
        )
    }

    /// Returns bounds as `[min_lng, min_lat, max_lng, max_lat]`.
    pub fn as_array(self) -> [f64; 4] {
        [self.min_lng, self.min_lat, self.max_lng, self.max_lat]
    }

    pub fn min_lng(self) -> f64 {
        self.min_lng
    }

    pub fn min_lat(self) -> f64 {
        self.min_lat
    }

    pub fn max_lng(self) -> f64 {
        self.max_lng
    }

    pub fn max_lat(self) -> f64 {
        self.max_lat
    }

    /// Whether the two boxes share any point, edges included.
    pub fn intersects(self, other: Self) -> bool {
        self.min_lng <= other.max_lng
            && other.min_lng <= self.max_lng
            && self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
    }
}

/// A pair of active farms found to share interior area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlapResult {
    /// The lower of the two farm ids.
    pub first: FarmId,
    /// The higher of the two farm ids.
    pub second: FarmId,
    pub intersects: bool,
}

impl OverlapResult {
    /// An intersecting pair, ordered so that `first < second`.
    pub fn between(a: FarmId, b: FarmId) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self {
            first,
            second,
            intersects: true,
        }
    }
}

/// Whether two boundaries share interior area.
///
/// # Examples
/// ```
/// use farmland::domain::{Polygon, interiors_overlap};
///
/// let west = Polygon::from_pairs(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0)])?;
/// let east = Polygon::from_pairs(&[(1.0, 0.0), (2.0, 0.0), (2.0, 1.0), (1.0, 1.0), (1.0, 0.0)])?;
/// assert!(!interiors_overlap(&west, &east));
/// # Ok::<(), farmland::domain::GeometryError>(())
/// ```
pub fn interiors_overlap(a: &Polygon, b: &Polygon) -> bool {
    if !BoundingBox::of(a).intersects(BoundingBox::of(b)) {
        return false;
    }
    let matrix = a.to_geo().relate(&b.to_geo());
    matrix.is_intersects() && !matrix.is_touches()
}

/// Ids of active farms in `farms` whose boundary shares interior area with
/// `candidate`, skipping `exclude`. Sorted and free of duplicates.
pub fn find_overlapping<'a>(
    candidate: &Polygon,
    exclude: Option<FarmId>,
    farms: impl IntoIterator<Item = &'a Farm>,
) -> Vec<FarmId> {
    let bounds = BoundingBox::of(candidate);
    let geometry = candidate.to_geo();
    let mut hits: Vec<FarmId> = farms
        .into_iter()
        .filter(|farm| farm.is_active() && Some(farm.id()) != exclude)
        .filter(|farm| farm.bounding_box().intersects(bounds))
        .filter(|farm| {
            let matrix = geometry.relate(&farm.polygon().to_geo());
            matrix.is_intersects() && !matrix.is_touches()
        })
        .map(Farm::id)
        .collect();
    hits.sort_unstable();
    hits.dedup();
    hits
}

/// Every pair of active farms sharing interior area, each pair reported once
/// with `first < second`, ordered by `(first, second)`.
///
/// Sweeps bounding boxes sorted by west edge so only horizontally
/// overlapping candidates reach the exact relation test.
pub fn detect_all_overlaps(farms: &[Farm]) -> Vec<OverlapResult> {
    let mut active: Vec<(&Farm, BoundingBox)> = farms
        .iter()
        .filter(|farm| farm.is_active())
        .map(|farm| (farm, farm.bounding_box()))
        .collect();
    active.sort_by(|(_, a), (_, b)| a.min_lng.total_cmp(&b.min_lng));

    let mut pairs = Vec::new();
    for (index, (farm, bounds)) in active.iter().enumerate() {
        let geometry = farm.polygon().to_geo();
        for (other, other_bounds) in active
            .iter()
            .skip(index + 1)
            .take_while(|(_, other_bounds)| other_bounds.min_lng <= bounds.max_lng)
        {
            if farm.id() == other.id() || !bounds.intersects(*other_bounds) {
                continue;
            }
            let matrix = geometry.relate(&other.polygon().to_geo());
            if matrix.is_intersects() && !matrix.is_touches() {
                pairs.push(OverlapResult::between(farm.id(), other.id()));
            }
        }
    }
    pairs.sort_unstable();
    pairs.dedup();
    pairs
}
