//! Farm parcel registry core: geometry validation, geodesic area, overlap
//! detection, and farmer acreage rollups kept consistent with every farm
//! mutation.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

pub mod config;
pub mod domain;
pub mod outbound;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
