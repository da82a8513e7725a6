//! Parcel boundary value objects and the geometry validator.

use geo::algorithm::line_intersection::{LineIntersection, line_intersection};
use geo::algorithm::orient::{Direction, Orient};
use geo::{Coord, Line, LineString};
use serde::{Deserialize, Serialize};

/// Smallest closed ring describing an area: three corners plus the closing
/// vertex.
pub const MIN_RING_VERTICES: usize = 4;

/// A single boundary vertex in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LngLat {
    /// Longitude in degrees, `-180..=180`.
    pub lng: f64,
    /// Latitude in degrees, `-90..=90`.
    pub lat: f64,
}

impl LngLat {
    /// Construct a vertex without validation.
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    fn is_in_range(self) -> bool {
        self.lng.is_finite()
            && self.lat.is_finite()
            && (-180.0..=180.0).contains(&self.lng)
            && (-90.0..=90.0).contains(&self.lat)
    }

    fn coord(self) -> Coord<f64> {
        Coord {
            x: self.lng,
            y: self.lat,
        }
    }
}

impl From<(f64, f64)> for LngLat {
    fn from((lng, lat): (f64, f64)) -> Self {
        Self { lng, lat }
    }
}

/// Structural faults detected in a candidate boundary ring.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    /// The ring has fewer than [`MIN_RING_VERTICES`] usable vertices.
    #[error("polygon ring needs at least {MIN_RING_VERTICES} vertices (got {count})")]
    TooFewPoints { count: usize },
    /// The first and last vertex differ.
    #[error("polygon ring must start and end on the same vertex")]
    UnclosedRing,
    /// A vertex is non-finite or outside WGS84 bounds.
    #[error("vertex {index} ({lng}, {lat}) is outside longitude -180..180 / latitude -90..90")]
    CoordinateOutOfRange { index: usize, lng: f64, lat: f64 },
    /// Two edges of the ring cross, touch, or fold back on each other.
    #[error("polygon boundary crosses itself between edges {first_edge} and {second_edge}")]
    SelfIntersecting { first_edge: usize, second_edge: usize },
}

/// A validated, closed, simple boundary ring.
///
/// ## Invariants
/// - At least [`MIN_RING_VERTICES`] vertices, first equal to last.
/// - Every vertex lies within WGS84 bounds.
/// - No edge crosses or touches a non-adjacent edge.
///
/// # Examples
/// ```
/// use farmland::domain::{GeometryError, Polygon};
///
/// let square = Polygon::from_pairs(&[(0.0, 0.0), (0.001, 0.0), (0.001, 0.001), (0.0, 0.0)]);
/// assert!(square.is_ok());
///
/// let open = Polygon::from_pairs(&[(0.0, 0.0), (0.001, 0.0), (0.001, 0.001), (0.0, 0.001)]);
/// assert_eq!(open, Err(GeometryError::UnclosedRing));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Polygon {
    ring: Vec<LngLat>,
}

impl Polygon {
    /// Validate a ring of vertices.
    pub fn new(ring: Vec<LngLat>) -> Result<Self, GeometryError> {
        validate_ring(&ring)?;
        Ok(Self { ring })
    }

    /// Validate a ring given as `(longitude, latitude)` pairs.
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Result<Self, GeometryError> {
        Self::new(pairs.iter().copied().map(LngLat::from).collect())
    }

    /// Borrow the closed ring, including the repeated closing vertex.
    pub fn vertices(&self) -> &[LngLat] {
        &self.ring
    }

    /// Convert to a `geo` polygon with longitude on the x axis.
    ///
    /// The exterior is wound counter-clockwise whatever order the vertices
    /// were supplied in; geodesic area treats a clockwise ring as the rest
    /// of the globe.
    pub fn to_geo(&self) -> geo::Polygon<f64> {
        let exterior: LineString<f64> = self.ring.iter().map(|vertex| vertex.coord()).collect();
        geo::Polygon::new(exterior, Vec::new()).orient(Direction::Default)
    }
}

impl<'de> Deserialize<'de> for Polygon {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let ring = Vec::<LngLat>::deserialize(deserializer)?;
        Self::new(ring).map_err(serde::de::Error::custom)
    }
}

fn validate_ring(ring: &[LngLat]) -> Result<(), GeometryError> {
    if ring.len() < MIN_RING_VERTICES {
        return Err(GeometryError::TooFewPoints { count: ring.len() });
    }

    if let Some((index, vertex)) = ring
        .iter()
        .enumerate()
        .find(|(_, vertex)| !vertex.is_in_range())
    {
        return Err(GeometryError::CoordinateOutOfRange {
            index,
            lng: vertex.lng,
            lat: vertex.lat,
        });
    }

    if ring.first() != ring.last() {
        return Err(GeometryError::UnclosedRing);
    }

    let mut distinct: Vec<LngLat> = Vec::with_capacity(ring.len());
    for vertex in ring {
        if distinct.last() != Some(vertex) {
            distinct.push(*vertex);
        }
    }
    if distinct.len() < MIN_RING_VERTICES {
        return Err(GeometryError::TooFewPoints {
            count: distinct.len(),
        });
    }

    check_simple(&distinct)
}

/// Reject rings whose edges cross, touch away from shared corners, or fold
/// back along a neighbouring edge.
fn check_simple(ring: &[LngLat]) -> Result<(), GeometryError> {
    let edges: Vec<Line<f64>> = ring
        .windows(2)
        .filter_map(|pair| match pair {
            [start, end] => Some(Line::new(start.coord(), end.coord())),
            _ => None,
        })
        .collect();
    let edge_count = edges.len();

    for (first_edge, first) in edges.iter().enumerate() {
        for (offset, second) in edges.iter().skip(first_edge + 1).enumerate() {
            let second_edge = first_edge + 1 + offset;
            let adjacent =
                second_edge == first_edge + 1 || (first_edge == 0 && second_edge == edge_count - 1);

            let crossing = match line_intersection(*first, *second) {
                None => false,
                Some(LineIntersection::Collinear { .. }) => true,
                Some(LineIntersection::SinglePoint { .. }) => !adjacent,
            };
            if crossing {
                return Err(GeometryError::SelfIntersecting {
                    first_edge,
                    second_edge,
                });
            }
        }
    }
    Ok(())
}
