//! Location resolution: device position if available, fallback city if not.
//!
//! The resolver makes exactly one attempt against the geolocation capability
//! and absorbs every failure mode (missing capability, denial, error,
//! timeout) into the fallback query. Nothing here ever surfaces an error.

use anyhow::Result;
use async_trait::async_trait;
use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

use crate::model::Query;

/// Upper bound on one position request.
pub const GEOLOCATION_TIMEOUT: Duration = Duration::from_secs(5);

/// A previously obtained reading this old or younger may be served instead
/// of asking the device again.
pub const POSITION_MAX_AGE: Duration = Duration::from_secs(60);

/// City used when no geolocation capability is available or it fails.
pub const FALLBACK_CITY: &str = "London";

/// One position reading from the device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

/// Geolocation capability of the host environment. Implementations yield a
/// single reading or an error/denial; bounding the wait is the resolver's
/// job.
#[async_trait]
pub trait Geolocator: Send + Sync {
    async fn current_position(&self) -> Result<Position>;
}

/// Wrapper that serves a cached reading up to [`POSITION_MAX_AGE`] old
/// before asking the inner capability again.
pub struct CachedPosition<G> {
    inner: G,
    last: Mutex<Option<(Instant, Position)>>,
}

impl<G> CachedPosition<G> {
    pub fn new(inner: G) -> Self {
        CachedPosition { inner, last: Mutex::new(None) }
    }

    fn cached(&self) -> Option<Position> {
        let guard = self.last.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .as_ref()
            .filter(|(at, _)| at.elapsed() <= POSITION_MAX_AGE)
            .map(|(_, pos)| *pos)
    }

    fn remember(&self, pos: Position) {
        let mut guard = self.last.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some((Instant::now(), pos));
    }
}

#[async_trait]
impl<G: Geolocator> Geolocator for CachedPosition<G> {
    async fn current_position(&self) -> Result<Position> {
        if let Some(pos) = self.cached() {
            return Ok(pos);
        }

        let pos = self.inner.current_position().await?;
        self.remember(pos);
        Ok(pos)
    }
}

/// Produce exactly one [`Query`] from the available geolocation capability.
///
/// Success yields a coordinate query; absence, denial, error, or a request
/// slower than [`GEOLOCATION_TIMEOUT`] yields the fallback city. Single
/// attempt, no retries.
pub async fn resolve(geolocator: Option<&dyn Geolocator>) -> Query {
    let Some(geolocator) = geolocator else {
        tracing::warn!("geolocation is not available, falling back to {FALLBACK_CITY}");
        return Query::city(FALLBACK_CITY);
    };

    match tokio::time::timeout(GEOLOCATION_TIMEOUT, geolocator.current_position()).await {
        Ok(Ok(pos)) => Query::coordinates(pos.lat, pos.lon),
        Ok(Err(err)) => {
            tracing::warn!(%err, "geolocation denied or unavailable, falling back to {FALLBACK_CITY}");
            Query::city(FALLBACK_CITY)
        }
        Err(_) => {
            tracing::warn!(
                timeout_secs = GEOLOCATION_TIMEOUT.as_secs(),
                "geolocation timed out, falling back to {FALLBACK_CITY}"
            );
            Query::city(FALLBACK_CITY)
        }
    }
}
