//! # Visual Crossing Weather
//!
//! Current conditions for one city from the Visual Crossing timeline API:
//!
//! ```text
//! GET <api_url><city>?key=<api_key>&include=current&iconSet=icons1&unitGroup=<units>
//! ```
//!
//! Only the `currentConditions` object of the response is used. The API reports
//! problems either with a non-success status or with an `error` field in the
//! body; both become a [`ServiceError`] and the panel keeps its last report.

use crate::config::WeatherConfig;
use crate::services::{Fetcher, Payload, ServiceError, WeatherReport, REQUEST_TIMEOUT};
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Timeline {
    current_conditions: Option<CurrentConditions>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CurrentConditions {
    temp: Option<f32>,
    feelslike: Option<f32>,
    humidity: Option<f32>,
    conditions: Option<String>,
    icon: Option<String>,
}

pub struct WeatherFetcher {
    client: Client,
    config: WeatherConfig,
}

impl WeatherFetcher {
    pub fn new(config: WeatherConfig) -> Result<Self, ServiceError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, config })
    }

    /// Full request URL including the query string.
    pub fn request_url(&self) -> Result<Url, ServiceError> {
        let base = format!("{}{}", self.config.api_url, self.config.city);
        Url::parse_with_params(
            &base,
            &[
                ("key", self.config.api_key.as_str()),
                ("include", "current"),
                ("iconSet", "icons1"),
                ("unitGroup", self.config.units.as_str()),
            ],
        )
        .map_err(|err| ServiceError::Malformed(format!("weather URL {}: {}", base, err)))
    }
}

impl Fetcher for WeatherFetcher {
    fn name(&self) -> &'static str {
        "weather"
    }

    async fn fetch(&mut self) -> Result<Payload, ServiceError> {
        let url = self.request_url()?;
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!("Weather response {}: {} bytes", status, body.len());

        if !status.is_success() {
            // Visual Crossing explains most failures in a plain-text body
            let message = body.trim();
            return Err(if message.is_empty() || message.starts_with('{') {
                ServiceError::Status(status)
            } else {
                ServiceError::Api(message.to_string())
            });
        }
        parse_report(&body, &self.config.units).map(Payload::Weather)
    }
}

/// Temperature unit for a Visual Crossing unit group.
pub fn unit_symbol(units: &str) -> char {
    if units.eq_ignore_ascii_case("us") {
        'F'
    } else {
        'C'
    }
}

/// Extract the current conditions from a timeline response body.
pub fn parse_report(body: &str, units: &str) -> Result<WeatherReport, ServiceError> {
    let timeline: Timeline =
        serde_json::from_str(body).map_err(|err| ServiceError::Malformed(err.to_string()))?;

    if let Some(error) = timeline.error {
        let message = match error {
            serde_json::Value::String(message) => message,
            other => other.to_string(),
        };
        return Err(ServiceError::Api(message));
    }

    let current = timeline
        .current_conditions
        .ok_or_else(|| ServiceError::Malformed("missing currentConditions".into()))?;

    Ok(WeatherReport {
        temperature: current.temp,
        feels_like: current.feelslike,
        humidity: current.humidity,
        conditions: current.conditions,
        icon: current.icon,
        unit: unit_symbol(units),
    })
}
