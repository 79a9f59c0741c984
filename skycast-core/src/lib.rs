//! Core library for the `skycast` weather dashboard.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - The cache-first data-acquisition pipeline (location resolution,
//!   concurrent current+forecast fetch, unit/time normalization)
//! - The loading/error/success state machine the display layer reads
//!
//! It is used by `skycast-cli`, but can also be reused by other binaries or
//! services that want the display model without the terminal front-end.

pub mod cache;
pub mod config;
pub mod error;
pub mod location;
pub mod model;
pub mod orchestrator;
pub mod provider;
pub mod units;

pub use cache::{FRESHNESS_WINDOW, FileStore, KvStore, MemoryStore, WeatherCache};
pub use config::Config;
pub use error::FetchError;
pub use location::{FALLBACK_CITY, CachedPosition, Geolocator, Position};
pub use model::{CacheEntry, DisplayModel, HourlyEntry, Query};
pub use orchestrator::{DisplayState, Orchestrator, Snapshot, Unit};
pub use provider::{WeatherFetcher, openweather::OpenWeatherClient};
