//! Shared fixtures and test doubles for unit and integration tests.
//!
//! Enabled for this crate's own tests and, through the `test-support`
//! feature, for the integration tests under `backend/tests/`.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeDelta, TimeZone, Utc};
use mockable::Clock;

use crate::domain::{BackoffJitter, LngLat, Polygon, RetrySleeper};

const WGS84_SEMI_MAJOR_M: f64 = 6_378_137.0;
const WGS84_FLATTENING: f64 = 1.0 / 298.257_223_563;

/// Fixed instant used by deterministic fixtures.
///
/// # Panics
/// Never in practice; the literal timestamp is unambiguous.
pub fn fixed_now() -> DateTime<Utc> {
    match Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).single() {
        Some(now) => now,
        None => panic!("fixture timestamp must be unambiguous"),
    }
}

/// An axis-aligned square parcel of roughly `hectares` centred on the given
/// point, sized with the WGS84 meridional and prime-vertical radii so its
/// geodesic area lands within a few square metres of the target.
///
/// # Panics
/// Panics when the square would leave WGS84 bounds.
pub fn square_boundary(center_lng: f64, center_lat: f64, hectares: f64) -> Polygon {
    let half_side_m = (hectares * 10_000.0).sqrt() / 2.0;
    let e2 = WGS84_FLATTENING * (2.0 - WGS84_FLATTENING);
    let phi = center_lat.to_radians();
    let w = (1.0 - e2 * phi.sin().powi(2)).sqrt();
    let meridional = WGS84_SEMI_MAJOR_M * (1.0 - e2) / w.powi(3);
    let prime_vertical = WGS84_SEMI_MAJOR_M / w;

    let dlat = (half_side_m / meridional).to_degrees();
    let dlng = (half_side_m / (prime_vertical * phi.cos())).to_degrees();

    ring(&[
        (center_lng - dlng, center_lat - dlat),
        (center_lng + dlng, center_lat - dlat),
        (center_lng + dlng, center_lat + dlat),
        (center_lng - dlng, center_lat + dlat),
        (center_lng - dlng, center_lat - dlat),
    ])
}

/// Validate a ring that fixtures know to be well formed.
///
/// # Panics
/// Panics when the ring fails validation.
pub fn ring(pairs: &[(f64, f64)]) -> Polygon {
    match Polygon::new(pairs.iter().copied().map(LngLat::from).collect()) {
        Ok(polygon) => polygon,
        Err(error) => panic!("fixture ring must be valid: {error}"),
    }
}

/// A clock tests can move forward.
pub struct MutableClock(Mutex<DateTime<Utc>>);

impl MutableClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn advance_seconds(&self, seconds: i64) {
        *self.lock_clock() += TimeDelta::seconds(seconds);
    }

    fn lock_clock(&self) -> MutexGuard<'_, DateTime<Utc>> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("clock mutex"),
        }
    }
}

impl Clock for MutableClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.lock_clock()
    }
}

/// A [`MutableClock`] pinned at [`fixed_now`], ready for injection.
pub fn fixture_clock() -> Arc<dyn Clock> {
    Arc::new(MutableClock::new(fixed_now()))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateSleeper;

#[async_trait]
impl RetrySleeper for ImmediateSleeper {
    async fn sleep(&self, _duration: Duration) {}
}

#[derive(Default)]
pub struct RecordingSleeper(pub Mutex<Vec<Duration>>);

impl RecordingSleeper {
    pub fn recorded(&self) -> Vec<Duration> {
        self.0
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RetrySleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut entries) = self.0.lock() {
            entries.push(duration);
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl BackoffJitter for NoJitter {
    fn jittered_delay(&self, base: Duration, _attempt: u32, _now: DateTime<Utc>) -> Duration {
        base
    }
}
