//! Geodesic area of a parcel boundary.

use std::fmt;
use std::ops::{Add, Sub};

use geo::GeodesicArea;
use serde::{Deserialize, Serialize};

use super::polygon::Polygon;

const SQUARE_METRES_PER_HECTARE: f64 = 10_000.0;

/// Land area held as whole square metres.
///
/// One square metre is 0.0001 ha, so hectare values are exact to four
/// decimal places and sums never accumulate floating-point drift.
///
/// # Examples
/// ```
/// use farmland::domain::Area;
///
/// let area = Area::from_square_metres(25_000);
/// assert_eq!(area.hectares(), 2.5);
/// assert_eq!(Area::ZERO.hectares(), 0.0);
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Area(i64);

impl Area {
    /// No area.
    pub const ZERO: Self = Self(0);

    /// Wrap a square-metre count.
    pub const fn from_square_metres(square_metres: i64) -> Self {
        Self(square_metres)
    }

    /// Whole square metres.
    pub const fn square_metres(self) -> i64 {
        self.0
    }

    /// Area in hectares.
    #[expect(
        clippy::cast_precision_loss,
        reason = "parcel areas stay far below 2^53 square metres"
    )]
    pub fn hectares(self) -> f64 {
        self.0 as f64 / SQUARE_METRES_PER_HECTARE
    }

    /// Karney geodesic area of `polygon` on the WGS84 ellipsoid, rounded to
    /// the nearest square metre.
    ///
    /// Deterministic for a given ring.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "a WGS84 ring encloses at most ~5.1e14 m², well inside i64"
    )]
    pub fn of(polygon: &Polygon) -> Self {
        let square_metres = polygon.to_geo().geodesic_area_unsigned().round();
        Self(square_metres as i64)
    }

    /// Checked addition.
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Checked subtraction.
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Whether the area is below zero, which only a delta may be.
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl Add for Area {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Area {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl std::iter::Sum for Area {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4} ha", self.hectares())
    }
}
