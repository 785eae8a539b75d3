//! Settings read from the environment.
//!
//! The CLI loads a `.env` file from the working directory first, so every
//! variable can live there as well.

use std::fmt::{self, Debug};

use flash_agent_openai_model::{OpenAIConfig, OpenAIConfigBuilder};

/// The Gemini API key. Required.
pub const API_KEY_VAR: &str = "GEMINI_API_KEY";
/// Overrides the model name.
pub const MODEL_VAR: &str = "FLASH_AGENT_MODEL";
/// Overrides the OpenAI-compatible endpoint.
pub const BASE_URL_VAR: &str = "FLASH_AGENT_BASE_URL";
/// The weatherapi.com key, used by the weather demo only.
pub const WEATHER_API_KEY_VAR: &str = "WEATHER_API_KEY";

/// Errors raised while reading the settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The model API key is missing or empty.
    #[error(
        "Gemini API Key is not valid. Set `{}` in the environment or in a .env file.",
        API_KEY_VAR
    )]
    MissingApiKey,
    /// A variable needed by the selected demo is missing or empty.
    #[error("`{0}` must be set to run this demo")]
    MissingVar(&'static str),
}

/// Sampling parameters of a demo.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ModelSettings {
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Nucleus sampling mass.
    pub top_p: Option<f32>,
}

/// Settings shared by every demo.
#[derive(Clone)]
pub struct Settings {
    api_key: String,
    model: Option<String>,
    base_url: Option<String>,
    weather_api_key: Option<String>,
}

impl Settings {
    /// Reads the settings from the process environment.
    ///
    /// Fails if the API key is missing, before any request is made.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the settings through `lookup`. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        let api_key =
            non_empty(API_KEY_VAR).ok_or(ConfigError::MissingApiKey)?;
        Ok(Self {
            api_key,
            model: non_empty(MODEL_VAR),
            base_url: non_empty(BASE_URL_VAR),
            weather_api_key: non_empty(WEATHER_API_KEY_VAR),
        })
    }

    /// Returns the weatherapi.com key, if set.
    #[inline]
    pub fn weather_api_key(&self) -> Option<&str> {
        self.weather_api_key.as_deref()
    }

    /// Builds the provider configuration for a demo.
    pub fn openai_config(&self, model_settings: ModelSettings) -> OpenAIConfig {
        let mut builder = OpenAIConfigBuilder::with_api_key(&self.api_key);
        if let Some(model) = &self.model {
            builder = builder.with_model(model);
        }
        if let Some(base_url) = &self.base_url {
            builder = builder.with_base_url(base_url);
        }
        if let Some(temperature) = model_settings.temperature {
            builder = builder.with_temperature(temperature);
        }
        if let Some(top_p) = model_settings.top_p {
            builder = builder.with_top_p(top_p);
        }
        builder.build()
    }
}

impl Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field(
                "weather_api_key",
                &self.weather_api_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use flash_agent_openai_model::{DEFAULT_BASE_URL, DEFAULT_MODEL};

    use super::*;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<&str, &str> = vars.iter().copied().collect();
        Settings::from_lookup(|name| vars.get(name).map(|v| v.to_string()))
    }

    #[test]
    fn test_missing_api_key() {
        let err = settings(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey));
        assert!(err.to_string().starts_with("Gemini API Key is not valid."));

        let err = settings(&[(API_KEY_VAR, "  ")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey));
    }

    #[test]
    fn test_defaults() {
        let settings = settings(&[(API_KEY_VAR, "secret")]).unwrap();
        assert!(settings.weather_api_key().is_none());

        let config = settings.openai_config(ModelSettings::default());
        assert_eq!(config.model(), DEFAULT_MODEL);
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
        assert!(!format!("{settings:?}").contains("secret"));
    }

    #[test]
    fn test_overrides() {
        let settings = settings(&[
            (API_KEY_VAR, "key"),
            (MODEL_VAR, "gemini-2.5-flash"),
            (BASE_URL_VAR, "http://localhost:8080/v1/"),
            (WEATHER_API_KEY_VAR, "weather"),
        ])
        .unwrap();
        assert_eq!(settings.weather_api_key(), Some("weather"));

        let config = settings.openai_config(ModelSettings {
            temperature: Some(0.7),
            top_p: Some(0.7),
        });
        assert_eq!(config.model(), "gemini-2.5-flash");
        assert_eq!(config.base_url(), "http://localhost:8080/v1");
    }
}
