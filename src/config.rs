//! Setup configuration.
//!
//! [`SetupOptions`] tunes the orchestrator; [`DatabaseSettings`] describes
//! the database container and can be read from the environment or a `.env`
//! file.

use crate::provision::{ContainerSpec, ReadinessPolicy};
use crate::{CommandSpec, Elevator};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Port the database listens on inside the container.
pub const DATABASE_CONTAINER_PORT: u16 = 3306;

/// Data directory of the database image.
pub const DATABASE_DATA_DIR: &str = "/var/lib/mysql";

/// Configuration could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A variable is set to an unusable value.
    #[error("invalid value {value:?} for {key}: {message}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Value found.
        value: String,
        /// Why it was rejected.
        message: String,
    },

    /// The `.env` file exists but could not be read.
    #[error("failed to read .env file: {message}")]
    Dotenv {
        /// Underlying error.
        message: String,
    },
}

impl ConfigError {
    /// Get an actionable suggestion for fixing this error.
    pub fn fix_suggestion(&self) -> &str {
        match self {
            Self::InvalidValue { .. } => "Correct the variable in the environment or .env file",
            Self::Dotenv { .. } => "Check the .env file syntax (KEY=value per line)",
        }
    }
}

/// The database container to provision.
///
/// # Example
///
/// ```rust
/// use runtime_bootstrap::DatabaseSettings;
///
/// let settings = DatabaseSettings::from_lookup(|key| match key {
///     "MYSQL_PORT" => Some("3310".to_string()),
///     _ => None,
/// })
/// .unwrap();
/// assert_eq!(settings.host_port, 3310);
/// assert_eq!(settings.image, "mysql:8.0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    /// Container image. `MYSQL_IMAGE`, default `mysql:8.0`.
    pub image: String,
    /// Container name. `MYSQL_CONTAINER`, default `notes-mysql`.
    pub container_name: String,
    /// Named data volume. `MYSQL_VOLUME`, default `mysql_data`.
    pub volume: String,
    /// Host port mapped to the database port. `MYSQL_PORT`, default 3307.
    pub host_port: u16,
    /// Application database. `MYSQL_DATABASE`, default `app_db`.
    pub database: String,
    /// Application user. `MYSQL_USER`, default `app`.
    pub user: String,
    /// Application user password. `MYSQL_PASSWORD`.
    pub password: String,
    /// Root password. `MYSQL_ROOT_PASSWORD`.
    pub root_password: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            image: "mysql:8.0".to_string(),
            container_name: "notes-mysql".to_string(),
            volume: "mysql_data".to_string(),
            host_port: 3307,
            database: "app_db".to_string(),
            user: "app".to_string(),
            password: "app_password".to_string(),
            root_password: "rootpass".to_string(),
        }
    }
}

impl DatabaseSettings {
    /// Read settings from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings from the environment, falling back to a `.env` file in
    /// the current directory or one of its parents.
    ///
    /// Process variables win over the file. A missing file is not an error.
    pub fn from_dotenv() -> Result<Self, ConfigError> {
        match dotenvy::dotenv_iter() {
            Ok(iter) => Self::from_dotenv_entries(iter),
            Err(e) if e.not_found() => Self::from_env(),
            Err(e) => Err(ConfigError::Dotenv {
                message: e.to_string(),
            }),
        }
    }

    /// Like [`from_dotenv`](Self::from_dotenv) with an explicit file.
    pub fn from_dotenv_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let iter = dotenvy::from_path_iter(path.as_ref()).map_err(|e| ConfigError::Dotenv {
            message: format!("{}: {}", path.as_ref().display(), e),
        })?;
        Self::from_dotenv_entries(iter)
    }

    fn from_dotenv_entries<I>(entries: I) -> Result<Self, ConfigError>
    where
        I: Iterator<Item = dotenvy::Result<(String, String)>>,
    {
        let file = entries
            .collect::<Result<HashMap<_, _>, _>>()
            .map_err(|e| ConfigError::Dotenv {
                message: e.to_string(),
            })?;
        Self::from_lookup(|key| std::env::var(key).ok().or_else(|| file.get(key).cloned()))
    }

    /// Build settings from any variable source. Unset variables keep their
    /// defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();
        let string = |key: &str, target: &mut String| {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *target = value;
            }
        };

        string("MYSQL_IMAGE", &mut settings.image);
        string("MYSQL_CONTAINER", &mut settings.container_name);
        string("MYSQL_VOLUME", &mut settings.volume);
        string("MYSQL_DATABASE", &mut settings.database);
        string("MYSQL_USER", &mut settings.user);
        string("MYSQL_PASSWORD", &mut settings.password);
        string("MYSQL_ROOT_PASSWORD", &mut settings.root_password);

        if let Some(value) = lookup("MYSQL_PORT") {
            settings.host_port = match value.trim().parse::<u16>() {
                Ok(port) if port != 0 => port,
                Ok(_) => {
                    return Err(ConfigError::InvalidValue {
                        key: "MYSQL_PORT".to_string(),
                        value,
                        message: "port must be non-zero".to_string(),
                    })
                }
                Err(e) => {
                    return Err(ConfigError::InvalidValue {
                        key: "MYSQL_PORT".to_string(),
                        value,
                        message: e.to_string(),
                    })
                }
            };
        }

        Ok(settings)
    }

    /// The container these settings describe.
    ///
    /// Passwords travel as environment variables of the runtime CLI, never
    /// as command-line arguments.
    pub fn container_spec(&self) -> ContainerSpec {
        ContainerSpec {
            name: self.container_name.clone(),
            image: self.image.clone(),
            env: vec![
                ("MYSQL_ROOT_PASSWORD".to_string(), self.root_password.clone()),
                ("MYSQL_DATABASE".to_string(), self.database.clone()),
                ("MYSQL_USER".to_string(), self.user.clone()),
                ("MYSQL_PASSWORD".to_string(), self.password.clone()),
            ],
            host_port: self.host_port,
            container_port: DATABASE_CONTAINER_PORT,
            volume: self.volume.clone(),
            mount_path: DATABASE_DATA_DIR.to_string(),
        }
    }
}

/// Options for a setup session.
///
/// # Example
///
/// ```rust
/// use runtime_bootstrap::SetupOptions;
/// use std::time::Duration;
///
/// let options = SetupOptions {
///     credential_timeout: Duration::from_secs(30),
///     ..Default::default()
/// };
/// assert_eq!(options.readiness.max_attempts, 10);
/// ```
#[derive(Debug, Clone)]
pub struct SetupOptions {
    /// How long to wait for the operator to answer a credential request.
    ///
    /// Default: 120 seconds
    pub credential_timeout: Duration,

    /// Maximum run time of the runtime installer.
    ///
    /// Default: 30 minutes
    pub install_timeout: Duration,

    /// Maximum run time of a single container runtime command. Covers
    /// image pulls.
    ///
    /// Default: 10 minutes
    pub command_timeout: Duration,

    /// Readiness polling schedule.
    pub readiness: ReadinessPolicy,

    /// Per-subscriber event queue capacity.
    ///
    /// Default: 1024
    pub event_buffer: usize,

    /// The database container.
    pub database: DatabaseSettings,

    /// Replaces the platform install plan. `None` uses
    /// [`install_plan`](crate::install_plan).
    pub install_command: Option<CommandSpec>,

    /// Accepted OS releases. Empty accepts every release.
    pub supported_os_versions: Vec<String>,

    /// Wrapper for privileged commands on platforms that take a credential.
    pub elevator: Elevator,
}

impl Default for SetupOptions {
    fn default() -> Self {
        Self {
            credential_timeout: Duration::from_secs(120),
            install_timeout: Duration::from_secs(30 * 60),
            command_timeout: Duration::from_secs(10 * 60),
            readiness: ReadinessPolicy::default(),
            event_buffer: crate::events::DEFAULT_EVENT_BUFFER,
            database: DatabaseSettings::default(),
            install_command: None,
            supported_os_versions: Vec::new(),
            elevator: Elevator::default(),
        }
    }
}
