//! DAM server configuration.
//!
//! [`ServerConfig`] describes where the server lives and which catalogs are
//! used; the login is kept apart in [`Credentials`] so the configuration can
//! be logged and serialized freely.

use crate::{Result, error::DamError, security::Credentials};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for a DAM server connection.
///
/// # Security
/// This struct intentionally does NOT store passwords or credentials.
///
/// # Example
/// ```rust
/// use damkit_core::config::ServerConfig;
///
/// let config = ServerConfig::new("file:///srv/dam/photos.json".to_string())
///     .with_catalog("Photos".to_string())
///     .with_write_access(true);
///
/// assert!(config.validate().is_ok());
/// assert!(config.has_catalog("Photos"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Location of the DAM server
    pub server_url: String,
    /// Catalogs this client works with
    #[serde(default)]
    pub catalogs: Vec<String>,
    /// Whether the session may modify records
    #[serde(default)]
    pub write_access: bool,
}

impl std::fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ServerConfig({}, catalogs: [{}], {})",
            crate::error::redact_server_url(&self.server_url),
            self.catalogs.join(", "),
            if self.write_access {
                "read-write"
            } else {
                "read-only"
            }
        )
    }
}

/// On-disk layout of a configuration file.
#[derive(Deserialize)]
struct ConfigFile {
    server_url: String,
    login: String,
    #[serde(default)]
    password: Option<String>,
    #[serde(default, alias = "catalog")]
    catalogs: Vec<String>,
    #[serde(default)]
    write_access: bool,
}

impl ServerConfig {
    /// Creates a read-only configuration without catalogs.
    pub fn new(server_url: String) -> Self {
        Self {
            server_url,
            ..Default::default()
        }
    }

    /// Builder method to add a catalog.
    pub fn with_catalog(mut self, catalog: String) -> Self {
        if !self.catalogs.contains(&catalog) {
            self.catalogs.push(catalog);
        }
        self
    }

    /// Builder method to set write access.
    pub fn with_write_access(mut self, write_access: bool) -> Self {
        self.write_access = write_access;
        self
    }

    /// Whether the catalog is listed
    pub fn has_catalog(&self, name: &str) -> bool {
        self.catalogs.iter().any(|catalog| catalog == name)
    }

    /// Validates configuration parameters.
    ///
    /// # Errors
    /// Returns error if the server URL or a catalog name is empty
    pub fn validate(&self) -> Result<()> {
        if self.server_url.trim().is_empty() {
            return Err(DamError::configuration("server_url cannot be empty"));
        }

        if self.catalogs.iter().any(|catalog| catalog.trim().is_empty()) {
            return Err(DamError::configuration("catalog names cannot be empty"));
        }

        Ok(())
    }

    /// Reads a JSON configuration file holding the server location, the
    /// login and the catalogs.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, is not valid JSON, or fails
    /// validation
    pub fn from_file(path: &Path) -> Result<(Self, Credentials)> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DamError::io(
                format!("Failed to read configuration file: {}", path.display()),
                e,
            )
        })?;

        let file: ConfigFile = serde_json::from_str(&content).map_err(|e| {
            DamError::serialization(
                format!("Invalid configuration file: {}", path.display()),
                e,
            )
        })?;

        let config = Self {
            server_url: file.server_url,
            catalogs: file.catalogs,
            write_access: file.write_access,
        };
        config.validate()?;

        tracing::debug!("Loaded configuration {}", config);
        Ok((config, Credentials::new(file.login, file.password)))
    }
}
