use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};
use std::time::Duration;

use crate::{
    error::FetchError,
    model::{DisplayModel, HourlyEntry, Query},
    units::{
        calculate_duration, celsius_to_fahrenheit, format_datetime, format_temp, format_time,
        kelvin_to_celsius, mps_to_kmph,
    },
};

use super::WeatherFetcher;

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

/// Shared deadline for the current-weather and forecast calls, measured from
/// request start. Expiry cancels both in-flight calls as a unit.
pub const FETCH_DEADLINE: Duration = Duration::from_secs(10);

/// The display model carries at most this many forecast points.
const HOURLY_LIMIT: usize = 9;

/// Client for the OpenWeather current-weather and forecast endpoints.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    api_key: String,
    http: Client,
    base_url: String,
    deadline: Duration,
}

impl OpenWeatherClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            http: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            deadline: FETCH_DEADLINE,
        }
    }

    /// Point the client at a different API root (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the shared request deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Fetch and decode one endpoint, returning the response status along
    /// with the payload so shape errors found later can report it.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
        label: &str,
    ) -> Result<(u16, T), FetchError> {
        let url = format!("{}/{}", self.base_url, path);

        let res = self.http.get(&url).query(params).send().await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            // Prefer the provider's own message when its error body has one.
            let message = serde_json::from_str::<ProviderErrorBody>(&body)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| format!("Error fetching {label}: {}", status.as_u16()));

            return Err(FetchError::Provider { status: status.as_u16(), message });
        }

        let parsed = serde_json::from_str(&body).map_err(|err| {
            FetchError::provider(
                status.as_u16(),
                format!("Failed to parse {label} response: {err}"),
            )
        })?;

        Ok((status.as_u16(), parsed))
    }
}

#[async_trait]
impl WeatherFetcher for OpenWeatherClient {
    async fn fetch(&self, query: &Query) -> Result<DisplayModel, FetchError> {
        let params = request_params(query, &self.api_key).ok_or(FetchError::InvalidQuery)?;

        let both_calls = async {
            tokio::try_join!(
                self.get_json::<RawCurrentWeather>("weather", &params, "current weather"),
                self.get_json::<RawForecast>("forecast", &params, "forecast"),
            )
        };

        // One deadline bounds both calls; expiry drops the joined future,
        // which cancels whichever requests are still in flight.
        let ((current_status, current), (forecast_status, forecast)) =
            tokio::time::timeout(self.deadline, both_calls).await.map_err(|_| {
                FetchError::Network(format!(
                    "request timed out after {} seconds",
                    self.deadline.as_secs()
                ))
            })??;

        build_model(&current, current_status, &forecast, forecast_status)
    }
}

/// Query parameters shared by both endpoint calls, or `None` for a malformed
/// query (blank city name).
fn request_params(query: &Query, api_key: &str) -> Option<Vec<(String, String)>> {
    let mut params = match query {
        Query::City(name) => {
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            vec![("q".to_string(), name.to_string())]
        }
        Query::Coordinates { lat, lon } => {
            vec![("lat".to_string(), lat.to_string()), ("lon".to_string(), lon.to_string())]
        }
    };

    params.push(("appid".to_string(), api_key.to_string()));
    Some(params)
}

/// Map the two validated payloads into the display model. All time fields
/// use the timezone offset reported by the current-weather response.
fn build_model(
    current: &RawCurrentWeather,
    current_status: u16,
    forecast: &RawForecast,
    forecast_status: u16,
) -> Result<DisplayModel, FetchError> {
    let tz = current.timezone;
    let condition =
        current.weather.first().ok_or_else(|| shape_error("current weather", current_status))?;

    let temp_c = kelvin_to_celsius(current.main.temp);
    let feels_like_c = kelvin_to_celsius(current.main.feels_like);

    let hourly = forecast
        .list
        .iter()
        .take(HOURLY_LIMIT)
        .map(|entry| {
            let cond =
                entry.weather.first().ok_or_else(|| shape_error("forecast", forecast_status))?;
            let entry_temp_c = kelvin_to_celsius(entry.main.temp);
            let entry_feels_c = kelvin_to_celsius(entry.main.feels_like);

            Ok(HourlyEntry {
                time: format_time(entry.dt, tz),
                temp_c: format_temp(entry_temp_c),
                temp_f: format_temp(celsius_to_fahrenheit(entry_temp_c)),
                feels_like_c: format_temp(entry_feels_c),
                feels_like_f: format_temp(celsius_to_fahrenheit(entry_feels_c)),
                icon_url: icon_url(&cond.icon),
            })
        })
        .collect::<Result<Vec<_>, FetchError>>()?;

    Ok(DisplayModel {
        city: current.name.clone(),
        country: current.sys.country.clone().unwrap_or_default(),
        datetime: format_datetime(current.dt, tz),
        current_temp_c: format_temp(temp_c),
        current_temp_f: format_temp(celsius_to_fahrenheit(temp_c)),
        feels_like_c: format_temp(feels_like_c),
        feels_like_f: format_temp(celsius_to_fahrenheit(feels_like_c)),
        weather_main: condition.main.clone(),
        weather_description: condition.description.clone(),
        weather_icon_url: icon_url(&condition.icon),
        sunrise: format_time(current.sys.sunrise, tz),
        sunset: format_time(current.sys.sunset, tz),
        day_duration: calculate_duration(current.sys.sunrise, current.sys.sunset),
        humidity: current.main.humidity,
        air_pressure: current.main.pressure,
        visibility: current.visibility / 1000.0,
        wind_speed: format_temp(mps_to_kmph(current.wind.speed)).to_string(),
        hourly,
    })
}

fn shape_error(label: &str, status: u16) -> FetchError {
    FetchError::provider(status, format!("Malformed {label} response: missing condition data"))
}

fn icon_url(icon: &str) -> String {
    format!("https://openweathermap.org/img/wn/{icon}@2x.png")
}

/// Error body shape OpenWeather uses for non-2xx responses.
#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMain {
    temp: f64,
    feels_like: f64,
    humidity: u8,
    pressure: f64,
}

#[derive(Debug, Deserialize)]
struct RawCondition {
    main: String,
    description: String,
    icon: String,
}

#[derive(Debug, Deserialize)]
struct RawWind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct RawSys {
    country: Option<String>,
    sunrise: i64,
    sunset: i64,
}

#[derive(Debug, Deserialize)]
struct RawCurrentWeather {
    name: String,
    dt: i64,
    /// Shift in seconds from UTC.
    timezone: i64,
    /// Meters; occasionally absent from the payload.
    #[serde(default)]
    visibility: f64,
    main: RawMain,
    weather: Vec<RawCondition>,
    wind: RawWind,
    sys: RawSys,
}

#[derive(Debug, Deserialize)]
struct RawForecastEntry {
    dt: i64,
    main: RawMain,
    weather: Vec<RawCondition>,
}

#[derive(Debug, Deserialize)]
struct RawForecast {
    list: Vec<RawForecastEntry>,
}
