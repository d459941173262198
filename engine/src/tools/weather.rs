//! Weather tools backed by Open-Meteo
//!
//! City names are geocoded through Nominatim first; a location that already
//! parses as `lat,lon` coordinates skips geocoding. Open-Meteo needs no API
//! key. Each invocation makes exactly one forecast call (plus the geocode
//! lookup when needed) and never retries.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{validate_args, Tool, ToolError};
use crate::config::WeatherConfig;

const REQUEST_TIMEOUT_SECS: u64 = 15;
const USER_AGENT: &str = "valet/0.1";

/// Shared HTTP plumbing for the weather tools
#[derive(Debug, Clone)]
pub struct WeatherApi {
    forecast_url: String,
    geocode_url: String,
    client: Client,
}

impl WeatherApi {
    pub fn new(config: &WeatherConfig) -> Self {
        Self {
            forecast_url: config.forecast_url.clone(),
            geocode_url: config.geocode_url.clone(),
            client: Client::builder()
                .user_agent(USER_AGENT)
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    /// Resolve a city name to coordinates via Nominatim.
    async fn geocode(&self, city: &str) -> Result<(f64, f64), ToolError> {
        let response = self
            .client
            .get(&self.geocode_url)
            .query(&[("q", city), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(map_reqwest_err)?;

        if !response.status().is_success() {
            return Err(ToolError::Api(format!(
                "Geocoding failed with status {}",
                response.status()
            )));
        }

        let results: Vec<GeocodeResult> = response
            .json()
            .await
            .map_err(|e| ToolError::Parse(format!("Failed to parse geocoding response: {e}")))?;

        let hit = results
            .into_iter()
            .next()
            .ok_or_else(|| ToolError::Api(format!("Could not find location: {city}")))?;

        let lat: f64 = hit
            .lat
            .parse()
            .map_err(|_| ToolError::Parse(format!("Invalid latitude for {city}")))?;
        let lon: f64 = hit
            .lon
            .parse()
            .map_err(|_| ToolError::Parse(format!("Invalid longitude for {city}")))?;

        debug!("Geocoded {} to ({}, {})", city, lat, lon);
        Ok((lat, lon))
    }

    /// Fetch current conditions plus the 3-day daily forecast.
    async fn fetch(&self, location: &str) -> Result<Forecast, ToolError> {
        let (lat, lon, name) = match parse_coordinates(location) {
            Some((lat, lon)) => (lat, lon, format!("{lat:.2},{lon:.2}")),
            None => {
                let (lat, lon) = self.geocode(location).await?;
                (lat, lon, location.to_string())
            }
        };

        let response = self
            .client
            .get(&self.forecast_url)
            .query(&[
                ("latitude", lat.to_string()),
                ("longitude", lon.to_string()),
                ("current_weather", "true".to_string()),
                (
                    "daily",
                    "temperature_2m_max,temperature_2m_min,precipitation_sum,weathercode"
                        .to_string(),
                ),
                ("forecast_days", "3".to_string()),
                ("timezone", "auto".to_string()),
            ])
            .send()
            .await
            .map_err(map_reqwest_err)?;

        if !response.status().is_success() {
            return Err(ToolError::Api(format!(
                "Weather API error: status {}",
                response.status()
            )));
        }

        let data: OpenMeteoResponse = response
            .json()
            .await
            .map_err(|e| ToolError::Parse(format!("Failed to parse weather response: {e}")))?;

        debug!("Retrieved weather data for {}", name);
        Ok(Forecast {
            location: name,
            current: data.current_weather,
            daily: data.daily,
        })
    }
}

/// Current conditions for a location
pub struct CurrentWeatherTool {
    api: WeatherApi,
}

impl CurrentWeatherTool {
    pub fn new(api: WeatherApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Tool for CurrentWeatherTool {
    fn name(&self) -> &str {
        "current_weather"
    }

    fn description(&self) -> &str {
        "Get current weather (temperature, conditions, wind) for a city or lat,lon coordinates"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": {"type": "string", "description": "City name or \"lat,lon\""}
            },
            "required": ["location"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<String, ToolError> {
        validate_args(&self.schema(), &args)?;
        let location = args["location"].as_str().unwrap_or_default();

        let forecast = self.api.fetch(location).await?;
        let current = forecast
            .current
            .ok_or_else(|| ToolError::Parse("Response missing current weather".to_string()))?;

        Ok(format!(
            "Current weather in {}:\n\
             • Temperature: {}°C\n\
             • Conditions: {}\n\
             • Wind: {} km/h",
            forecast.location,
            current.temperature,
            describe_weather_code(current.weathercode),
            current.windspeed
        ))
    }
}

/// Multi-day forecast for a location
pub struct ForecastTool {
    api: WeatherApi,
}

impl ForecastTool {
    pub fn new(api: WeatherApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Tool for ForecastTool {
    fn name(&self) -> &str {
        "weather_forecast"
    }

    fn description(&self) -> &str {
        "Get a 1-3 day weather forecast (daily min/max, precipitation) for a city"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": {"type": "string", "description": "City name or \"lat,lon\""},
                "days": {"type": "integer", "description": "Number of days (1-3, default 3)"}
            },
            "required": ["location"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<String, ToolError> {
        validate_args(&self.schema(), &args)?;
        let location = args["location"].as_str().unwrap_or_default();
        let days = args
            .get("days")
            .and_then(Value::as_i64)
            .unwrap_or(3)
            .clamp(1, 3) as usize;

        let forecast = self.api.fetch(location).await?;
        let daily = forecast
            .daily
            .ok_or_else(|| ToolError::Parse("Response missing daily forecast".to_string()))?;

        let mut result = format!("{days}-day forecast for {}:", forecast.location);
        for i in 0..days.min(daily.time.len()) {
            result.push_str(&format!(
                "\n{}:\n  • Temp: {:.0}°C to {:.0}°C\n  • Conditions: {}\n  • Precipitation: {:.1}mm",
                daily.time[i],
                daily.temperature_2m_min[i],
                daily.temperature_2m_max[i],
                describe_weather_code(daily.weathercode[i]),
                daily.precipitation_sum[i],
            ));
        }

        Ok(result)
    }
}

struct Forecast {
    location: String,
    current: Option<CurrentConditions>,
    daily: Option<DailyForecast>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    lat: String,
    lon: String,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    #[serde(default)]
    current_weather: Option<CurrentConditions>,
    #[serde(default)]
    daily: Option<DailyForecast>,
}

#[derive(Debug, Deserialize)]
struct CurrentConditions {
    temperature: f64,
    windspeed: f64,
    weathercode: i64,
}

#[derive(Debug, Deserialize)]
struct DailyForecast {
    time: Vec<String>,
    temperature_2m_max: Vec<f64>,
    temperature_2m_min: Vec<f64>,
    precipitation_sum: Vec<f64>,
    weathercode: Vec<i64>,
}

/// WMO weather interpretation codes, as reported by Open-Meteo.
fn describe_weather_code(code: i64) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 => "Fog",
        51 => "Light drizzle",
        53 => "Moderate drizzle",
        55 => "Dense drizzle",
        61 => "Slight rain",
        63 => "Moderate rain",
        65 => "Heavy rain",
        71 => "Slight snow",
        73 => "Moderate snow",
        75 => "Heavy snow",
        80 => "Light rain showers",
        81 => "Moderate rain showers",
        82 => "Heavy rain showers",
        95 => "Thunderstorm",
        96 => "Thunderstorm with hail",
        _ => "Unknown",
    }
}

/// Parse a `lat,lon` pair; returns None for anything that is not two floats.
fn parse_coordinates(location: &str) -> Option<(f64, f64)> {
    let (lat, lon) = location.split_once(',')?;
    Some((lat.trim().parse().ok()?, lon.trim().parse().ok()?))
}

fn map_reqwest_err(e: reqwest::Error) -> ToolError {
    if e.is_timeout() {
        ToolError::Network("Request timed out".to_string())
    } else {
        ToolError::Network(e.to_string())
    }
}
