//! Weather handler — deterministic mock conditions for a location.
//!
//! In production this would call a weather API. The mock derives stable
//! conditions from the location name so routing can be tested end to end.

use async_trait::async_trait;
use switchyard_core::error::HandlerError;
use switchyard_core::{Envelope, Handler, HandlerContext, HandlerOutcome, HandlerReply};

pub struct WeatherHandler;

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct WeatherReport {
    pub location: String,
    pub temperature: f64,
    pub units: &'static str,
    pub conditions: &'static str,
    pub humidity: u32,
    pub wind_speed: f64,
}

/// Location named after "in"/"for"/"at", else the persona timezone's city, else "your area".
pub fn extract_location(envelope: &Envelope) -> String {
    let query = envelope.query.trim().trim_end_matches(['?', '!', '.']);
    let words: Vec<&str> = query.split_whitespace().collect();
    if let Some(pos) = words
        .iter()
        .rposition(|w| matches!(w.to_lowercase().as_str(), "in" | "for" | "at"))
    {
        let rest: Vec<&str> = words[pos + 1..]
            .iter()
            .take_while(|w| !matches!(w.to_lowercase().as_str(), "today" | "tomorrow" | "tonight"))
            .copied()
            .collect();
        if !rest.is_empty() {
            return rest.join(" ").trim_matches(',').to_string();
        }
    }
    envelope
        .persona
        .as_ref()
        .and_then(|p| p.timezone.as_deref())
        .and_then(|tz| tz.rsplit('/').next())
        .map(|city| city.replace('_', " "))
        .unwrap_or_else(|| "your area".to_string())
}

/// Deterministic mock weather based on a hash of the location name.
pub fn mock_weather(location: &str, imperial: bool) -> WeatherReport {
    let hash: u32 = location
        .to_lowercase()
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));

    let conditions = [
        "Clear skies",
        "Partly cloudy",
        "Overcast",
        "Light rain",
        "Heavy rain",
        "Thunderstorms",
        "Snow",
        "Foggy",
    ];
    let celsius = ((hash % 40) as f64) - 5.0;
    let (temperature, units) = if imperial {
        (celsius * 9.0 / 5.0 + 32.0, "°F")
    } else {
        (celsius, "°C")
    };

    WeatherReport {
        location: location.to_string(),
        temperature: (temperature * 10.0).round() / 10.0,
        units,
        conditions: conditions[(hash as usize / 7) % conditions.len()],
        humidity: 30 + (hash % 60),
        wind_speed: ((hash % 30) as f64) + 5.0,
    }
}

#[async_trait]
impl Handler for WeatherHandler {
    fn name(&self) -> &str {
        "weather_agent"
    }

    fn description(&self) -> &str {
        "Current weather conditions and forecasts for a location."
    }

    async fn invoke(
        &self,
        envelope: &Envelope,
        ctx: &HandlerContext,
    ) -> Result<HandlerOutcome, HandlerError> {
        let location = extract_location(envelope);
        let imperial = envelope.query.to_lowercase().contains("fahrenheit");
        let report = mock_weather(&location, imperial);

        let content = format!(
            "Weather in {}: {}, {}{}. Humidity {}%, wind {} km/h.",
            report.location,
            report.conditions,
            report.temperature,
            report.units,
            report.humidity,
            report.wind_speed
        );
        ctx.emit(self.name(), content.clone()).await;
        Ok(HandlerOutcome::Completed(HandlerReply::text(content)))
    }
}
