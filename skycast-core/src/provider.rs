use async_trait::async_trait;
use std::fmt::Debug;

use crate::{error::FetchError, model::{DisplayModel, Query}};

pub mod openweather;

/// The weather fetch pipeline: resolve one query into a display-ready
/// snapshot, or fail with a [`FetchError`].
///
/// This is the seam between the orchestrator and the network. Production
/// uses [`openweather::OpenWeatherClient`]; tests substitute doubles.
#[async_trait]
pub trait WeatherFetcher: Send + Sync + Debug {
    async fn fetch(&self, query: &Query) -> Result<DisplayModel, FetchError>;
}
