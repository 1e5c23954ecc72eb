//! Current conditions lookup against WeatherAPI.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::LookupError;

pub const WEATHER_BASE_URL: &str = "https://api.weatherapi.com";
const SERVICE: &str = "Weather";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherReport {
    pub location: String,
    pub country: String,
    pub temperature_c: f64,
    pub condition: String,
}

impl WeatherReport {
    pub fn summary(&self) -> String {
        format!(
            "Current weather in {}, {}: {}. Temperature {}°C.",
            self.location, self.country, self.condition, self.temperature_c
        )
    }
}

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    location: Location,
    current: Current,
}

#[derive(Debug, Deserialize)]
struct Location {
    #[serde(default)]
    name: String,
    #[serde(default)]
    country: String,
}

#[derive(Debug, Deserialize)]
struct Current {
    #[serde(default)]
    temp_c: f64,
    condition: Condition,
}

#[derive(Debug, Deserialize)]
struct Condition {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone)]
pub struct WeatherClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl WeatherClient {
    pub fn new(client: reqwest::Client, base_url: Option<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url
                .unwrap_or_else(|| WEATHER_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn current(&self, city: &str) -> Result<WeatherReport, LookupError> {
        let city = city.trim();
        if city.is_empty() {
            return Err(LookupError::InvalidRequest("City name is required".to_string()));
        }
        let key = self
            .api_key
            .as_deref()
            .ok_or(LookupError::MissingKey { service: SERVICE })?;

        let url = format!("{}/v1/current.json", self.base_url);
        debug!(city, "Fetching current weather");

        let response = self
            .client
            .get(&url)
            .query(&[("key", key), ("q", city), ("aqi", "no")])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| LookupError::from_reqwest(SERVICE, e))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(LookupError::InvalidKey { service: SERVICE });
        }
        let body = response
            .text()
            .await
            .map_err(|e| LookupError::from_reqwest(SERVICE, e))?;

        if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&body) {
            return Err(LookupError::Api {
                service: SERVICE,
                message: envelope.error.message,
            });
        }
        if !status.is_success() {
            return Err(LookupError::Http {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CurrentResponse = serde_json::from_str(&body)
            .map_err(|e| LookupError::InvalidResponse(format!("Weather response: {e}")))?;

        Ok(WeatherReport {
            location: parsed.location.name,
            country: parsed.location.country,
            temperature_c: parsed.current.temp_c,
            condition: parsed.current.condition.text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_text() {
        let report = WeatherReport {
            location: "Paris".to_string(),
            country: "France".to_string(),
            temperature_c: 18.5,
            condition: "Partly cloudy".to_string(),
        };
        assert_eq!(
            report.summary(),
            "Current weather in Paris, France: Partly cloudy. Temperature 18.5°C."
        );
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_request() {
        let client = WeatherClient::new(reqwest::Client::new(), None, Some(String::new()));
        let err = client.current("Paris").await.unwrap_err();
        assert_eq!(err.to_string(), "Weather API key not provided");
    }

    #[tokio::test]
    async fn test_blank_city_rejected() {
        let client = WeatherClient::new(reqwest::Client::new(), None, Some("k".to_string()));
        let err = client.current("  ").await.unwrap_err();
        assert_eq!(err.to_string(), "City name is required");
    }
}
