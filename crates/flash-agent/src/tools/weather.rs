use std::sync::Arc;

use flash_agent_core::tool::{Error as ToolError, Tool, ToolResult};
use reqwest::{Client, Url};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use super::schema_of;

/// The public endpoint of weatherapi.com.
pub const WEATHER_API_BASE_URL: &str = "http://api.weatherapi.com";

/// Input of [`WeatherTool`].
#[derive(Debug, Deserialize, JsonSchema)]
pub struct WeatherInput {
    /// Name of the city, e.g. `Karachi`.
    pub city: String,
}

#[derive(Deserialize)]
struct CurrentWeather {
    current: Current,
}

#[derive(Deserialize)]
struct Current {
    temp_c: f64,
    condition: Condition,
}

#[derive(Deserialize)]
struct Condition {
    text: String,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Looks up the current weather of a city on weatherapi.com.
///
/// Failed lookups are reported to the model, which is told to retry.
pub struct WeatherTool {
    client: Client,
    api_key: Arc<str>,
    base_url: Arc<str>,
    parameter_schema: Value,
}

impl WeatherTool {
    /// Creates a tool using the given weatherapi.com key.
    pub fn new<S: AsRef<str>>(api_key: S) -> Self {
        Self {
            client: Client::new(),
            api_key: Arc::from(api_key.as_ref()),
            base_url: Arc::from(WEATHER_API_BASE_URL),
            parameter_schema: schema_of::<WeatherInput>(),
        }
    }

    /// Points the tool at another server.
    #[inline]
    pub fn with_base_url<S: AsRef<str>>(mut self, base_url: S) -> Self {
        self.base_url = Arc::from(base_url.as_ref().trim_end_matches('/'));
        self
    }

    fn request_url(&self, city: &str) -> Result<Url, ToolError> {
        let endpoint = format!("{}/v1/current.json", self.base_url);
        Url::parse_with_params(
            &endpoint,
            [("key", &*self.api_key), ("q", city)],
        )
        .map_err(|err| {
            ToolError::execution_error().with_reason(err.to_string())
        })
    }
}

impl Tool for WeatherTool {
    type Input = WeatherInput;

    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get weather for the given city"
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let url = self.request_url(&input.city);
        let client = self.client.clone();
        async move {
            info!("fetching weather for {}", input.city);
            let resp = client.get(url?).send().await.map_err(|err| {
                ToolError::execution_error().with_reason(err.to_string())
            })?;
            let status = resp.status();
            let body = resp.bytes().await.map_err(|err| {
                ToolError::execution_error().with_reason(err.to_string())
            })?;
            if !status.is_success() {
                let detail = serde_json::from_slice::<ApiError>(&body)
                    .map(|body| body.error.message)
                    .unwrap_or_else(|_| status.to_string());
                warn!("weather lookup failed: {detail}");
                return Err(ToolError::execution_error()
                    .with_reason(format!("Weather API error: {detail}")));
            }
            describe_weather(&body)
        }
    }
}

/// Renders a `current.json` payload as `<temp>°C with <condition>`.
fn describe_weather(body: &[u8]) -> ToolResult {
    let weather: CurrentWeather =
        serde_json::from_slice(body).map_err(|err| {
            ToolError::execution_error()
                .with_reason(format!("Malformed weather payload: {err}"))
        })?;
    let current = weather.current;
    // Whole degrees keep their decimal point, e.g. `31.0°C`.
    Ok(format!("{:?}°C with {}", current.temp_c, current.condition.text))
}

#[cfg(test)]
mod tests {
    use flash_agent_core::tool::ErrorKind;

    use super::*;

    #[test]
    fn test_describe_weather() {
        let body = br#"{
            "location": { "name": "Karachi" },
            "current": {
                "temp_c": 31.5,
                "condition": { "text": "Sunny", "code": 1000 }
            }
        }"#;
        assert_eq!(describe_weather(body).unwrap(), "31.5°C with Sunny");
    }

    #[test]
    fn test_describe_whole_degrees() {
        let body = br#"{
            "current": {
                "temp_c": 31,
                "condition": { "text": "Partly cloudy" }
            }
        }"#;
        assert_eq!(
            describe_weather(body).unwrap(),
            "31.0°C with Partly cloudy"
        );
    }

    #[test]
    fn test_malformed_payload() {
        let err = describe_weather(br#"{"current": {}}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExecutionError);
        assert!(err.reason().starts_with("Malformed weather payload"));
    }

    #[test]
    fn test_request_url() {
        let tool = WeatherTool::new("secret")
            .with_base_url("http://localhost:8080/");
        let url = tool.request_url("New York").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/v1/current.json?key=secret&q=New+York"
        );
    }
}
