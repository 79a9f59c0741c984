use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A request for one location's weather: either a user-supplied city name or
/// device coordinates. The enum makes "both" and "neither" unrepresentable;
/// the only malformed case left is a blank city name, which yields no cache
/// key.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    City(String),
    Coordinates { lat: f64, lon: f64 },
}

impl Query {
    pub fn city(name: impl Into<String>) -> Self {
        Query::City(name.into())
    }

    pub fn coordinates(lat: f64, lon: f64) -> Self {
        Query::Coordinates { lat, lon }
    }

    /// Deterministic cache key for this query, or `None` when the query is
    /// malformed (blank city name).
    ///
    /// City names are trimmed and lower-cased first so differently-cased
    /// searches share one entry. Keys carry a `weather_` prefix to keep the
    /// store's key space from colliding with unrelated data.
    pub fn cache_key(&self) -> Option<String> {
        match self {
            Query::City(name) => {
                let normalized = name.trim().to_lowercase();
                if normalized.is_empty() {
                    None
                } else {
                    Some(format!("weather_{normalized}"))
                }
            }
            Query::Coordinates { lat, lon } => Some(format!("weather_{lat}_{lon}")),
        }
    }
}

/// One forecast point of the display model, already unit-converted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyEntry {
    pub time: String,
    pub temp_c: f64,
    pub temp_f: f64,
    pub feels_like_c: f64,
    pub feels_like_f: f64,
    pub icon_url: String,
}

/// Normalized, display-ready weather snapshot for one location.
///
/// All temperatures are pre-rounded to one decimal and carried in both
/// units; time fields are strings in the location's own clock. The display
/// layer consumes this as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayModel {
    pub city: String,
    pub country: String,
    /// Local date and time at the location, `YYYY-MM-DD HH:MM`.
    pub datetime: String,
    pub current_temp_c: f64,
    pub current_temp_f: f64,
    pub feels_like_c: f64,
    pub feels_like_f: f64,
    pub weather_main: String,
    pub weather_description: String,
    pub weather_icon_url: String,
    /// Local time strings, `H:MM AM/PM`.
    pub sunrise: String,
    pub sunset: String,
    /// `"<H> hr and <M> min"` between sunrise and sunset.
    pub day_duration: String,
    pub humidity: u8,
    pub air_pressure: f64,
    /// Kilometers.
    pub visibility: f64,
    /// Pre-rounded km/h, kept as the numeric string shown to the user.
    pub wind_speed: String,
    /// At most nine entries, ascending by forecast time, truncated (never
    /// padded) when the provider returns fewer.
    pub hourly: Vec<HourlyEntry>,
}

/// Snapshot stored in the cache: the model plus the write instant. Entries
/// are immutable; a new fetch overwrites the entry for its key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: DisplayModel,
    /// Epoch milliseconds at write time.
    pub timestamp: u64,
}

impl CacheEntry {
    pub fn new(data: DisplayModel) -> Self {
        CacheEntry { data, timestamp: now_millis() }
    }

    /// Age of this entry relative to now. An entry stamped in the future
    /// (clock rollback) counts as age zero.
    pub fn age(&self) -> Duration {
        Duration::from_millis(now_millis().saturating_sub(self.timestamp))
    }

    pub fn is_fresh(&self, window: Duration) -> bool {
        self.age() < window
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_model;

    #[test]
    fn city_keys_are_case_normalized() {
        assert_eq!(Query::city("London").cache_key().as_deref(), Some("weather_london"));
        assert_eq!(Query::city("  LONDON ").cache_key().as_deref(), Some("weather_london"));
        assert_eq!(Query::city("London").cache_key(), Query::city("lonDON").cache_key());
    }

    #[test]
    fn coordinate_keys_join_lat_and_lon() {
        let key = Query::coordinates(51.5, -0.12).cache_key();
        assert_eq!(key.as_deref(), Some("weather_51.5_-0.12"));
    }

    #[test]
    fn blank_city_has_no_cache_key() {
        assert_eq!(Query::city("").cache_key(), None);
        assert_eq!(Query::city("   ").cache_key(), None);
    }

    #[test]
    fn fresh_entry_is_fresh_inside_window() {
        let entry = CacheEntry::new(sample_model());
        assert!(entry.is_fresh(Duration::from_secs(30 * 60)));
    }

    #[test]
    fn old_entry_is_not_fresh() {
        let mut entry = CacheEntry::new(sample_model());
        entry.timestamp -= 31 * 60 * 1000;
        assert!(!entry.is_fresh(Duration::from_secs(30 * 60)));
    }

    #[test]
    fn entry_round_trips_through_json() {
        let entry = CacheEntry::new(sample_model());
        let json = serde_json::to_string(&entry).expect("serialize");
        let back: CacheEntry = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, entry);
    }
}
