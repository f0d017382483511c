use std::fmt;

use serde::Deserialize;

use evreg_config::shared::{CacheConfig, PgConnectionConfig, SlotsConfig, ValidationError};

/// Complete configuration for the evreg API service.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Connection configuration for the events database.
    pub database: PgConnectionConfig,
    /// Connection configuration for the slot cache.
    pub cache: CacheConfig,
    /// Application server settings.
    pub application: ApplicationSettings,
    /// Slot cache subsystem tuning.
    #[serde(default)]
    pub slots: SlotsConfig,
}

impl ApiConfig {
    /// Validates the loaded configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.cache.validate()?;
        self.slots.validate()?;

        Ok(())
    }
}

/// HTTP server configuration settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    /// Host address the API listens on.
    pub host: String,
    /// Port number the API listens on.
    pub port: u16,
}

impl fmt::Display for ApplicationSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "    host: {}", self.host)?;
        writeln!(f, "    port: {}", self.port)
    }
}
