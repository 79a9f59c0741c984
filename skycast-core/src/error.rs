//! Error type for the weather fetch pipeline.
//!
//! Only failures that can reach the display layer live here. Malformed cache
//! entries and geolocation failures are absorbed where they happen (cache
//! miss, fallback city) and never surface.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Neither a usable city name nor coordinates were supplied.
    #[error("Invalid query for weather data.")]
    InvalidQuery,

    /// Transport-level failure or the shared request deadline expiring.
    #[error("Failed to fetch weather data: {0}. Please try again.")]
    Network(String),

    /// Non-success HTTP response from either required call, or a response
    /// body that does not match the provider's documented shape.
    #[error("{message}")]
    Provider { status: u16, message: String },
}

impl FetchError {
    pub fn provider(status: u16, message: impl Into<String>) -> Self {
        FetchError::Provider { status, message: message.into() }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network(err.to_string())
    }
}
