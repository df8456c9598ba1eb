//! Telegram transport settings.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Telegram transport settings loaded from environment variables.
///
/// Exactly two parameters are required; the process refuses to start
/// without either of them.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct TelegramSettings {
    /// Telegram Bot API token.
    pub telegram_token: String,
    /// Numeric user id of the single privileged operator.
    pub operator_id: i64,
}

impl TelegramSettings {
    /// Create new settings by loading from environment and files.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or a required parameter is
    /// missing.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let settings: Self = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Environment::default() auto-converts UPPER_SNAKE_CASE to
            // snake_case; ignore_empty treats empty env vars as unset.
            .add_source(Environment::default().ignore_empty(true))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Check that both required parameters carry usable values.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` naming the offending parameter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram_token.trim().is_empty() {
            return Err(ConfigError::Message(
                "TELEGRAM_TOKEN must be set to the bot's access token".to_string(),
            ));
        }
        if self.operator_id == 0 {
            return Err(ConfigError::Message(
                "OPERATOR_ID must be set to the operator's numeric user id".to_string(),
            ));
        }
        Ok(())
    }
}
