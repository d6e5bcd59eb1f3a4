//! Database configuration consumed by the persistence engine bootstrap.

use std::env;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::{PersistenceEngine, PersistenceError, PersistenceErrorKind};

const ENV_DRIVER: &str = "AUTOREPO_DB_DRIVER";
const ENV_URL: &str = "AUTOREPO_DB_URL";
const ENV_USERNAME: &str = "AUTOREPO_DB_USERNAME";
const ENV_PASSWORD: &str = "AUTOREPO_DB_PASSWORD";
const ENV_DIALECT: &str = "AUTOREPO_DB_DIALECT";
const ENV_SHOW_SQL: &str = "AUTOREPO_DB_SHOW_SQL";
const ENV_FORMAT_SQL: &str = "AUTOREPO_DB_FORMAT_SQL";
const ENV_SCHEMA_MODE: &str = "AUTOREPO_DB_SCHEMA_MODE";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Cannot detect the SQL dialect for URL '{url}'; set it explicitly")]
    UnknownDialect { url: String },

    #[error("Missing required configuration value: {field}")]
    Missing { field: &'static str },

    #[error("Invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },
}

/// SQL dialect the engine generates for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    PostgreSql,
    MySql,
    Oracle,
    SqlServer,
    H2,
}

impl Dialect {
    /// Detect the dialect from a connection URL scheme.
    ///
    /// Accepts both `jdbc:postgresql://..` and `postgres://..` forms.
    pub fn detect(url: &str) -> Result<Self, ConfigError> {
        let lowered = url.trim().to_ascii_lowercase();
        let stripped = lowered.strip_prefix("jdbc:").unwrap_or(&lowered);
        let scheme = stripped
            .split(|c: char| c == ':' || c == '/')
            .next()
            .unwrap_or_default();

        match scheme {
            "postgresql" | "postgres" => Ok(Dialect::PostgreSql),
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "oracle" => Ok(Dialect::Oracle),
            "sqlserver" => Ok(Dialect::SqlServer),
            "h2" => Ok(Dialect::H2),
            _ => Err(ConfigError::UnknownDialect {
                url: url.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::PostgreSql => "postgresql",
            Dialect::MySql => "mysql",
            Dialect::Oracle => "oracle",
            Dialect::SqlServer => "sqlserver",
            Dialect::H2 => "h2",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(Dialect::PostgreSql),
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "oracle" => Ok(Dialect::Oracle),
            "sqlserver" => Ok(Dialect::SqlServer),
            "h2" => Ok(Dialect::H2),
            _ => Err(ConfigError::InvalidValue {
                key: ENV_DIALECT,
                value: s.to_string(),
            }),
        }
    }
}

/// Schema management the engine applies at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaMode {
    None,
    Validate,
    #[default]
    Update,
    Create,
    CreateDrop,
}

impl FromStr for SchemaMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(SchemaMode::None),
            "validate" => Ok(SchemaMode::Validate),
            "update" => Ok(SchemaMode::Update),
            "create" => Ok(SchemaMode::Create),
            "create-drop" | "create_drop" => Ok(SchemaMode::CreateDrop),
            _ => Err(ConfigError::InvalidValue {
                key: ENV_SCHEMA_MODE,
                value: s.to_string(),
            }),
        }
    }
}

fn default_show_sql() -> bool {
    true
}

/// Connection and engine settings.
///
/// `dialect` may be left unset, in which case it is detected from the URL.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfiguration {
    pub driver: String,
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub dialect: Option<Dialect>,
    #[serde(default)]
    pub schema_mode: SchemaMode,
    #[serde(default = "default_show_sql")]
    pub show_sql: bool,
    #[serde(default)]
    pub format_sql: bool,
}

impl DatabaseConfiguration {
    pub fn new(
        driver: impl Into<String>,
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            driver: driver.into(),
            url: url.into(),
            username: username.into(),
            password: password.into(),
            dialect: None,
            schema_mode: SchemaMode::default(),
            show_sql: default_show_sql(),
            format_sql: false,
        }
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    pub fn with_show_sql(mut self, show_sql: bool) -> Self {
        self.show_sql = show_sql;
        self
    }

    pub fn with_format_sql(mut self, format_sql: bool) -> Self {
        self.format_sql = format_sql;
        self
    }

    pub fn with_schema_mode(mut self, schema_mode: SchemaMode) -> Self {
        self.schema_mode = schema_mode;
        self
    }

    /// The explicit dialect, or the one detected from the URL.
    pub fn resolved_dialect(&self) -> Result<Dialect, ConfigError> {
        match self.dialect {
            Some(dialect) => Ok(dialect),
            None => Dialect::detect(&self.url),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.driver.trim().is_empty() {
            return Err(ConfigError::Missing { field: "driver" });
        }
        if self.url.trim().is_empty() {
            return Err(ConfigError::Missing { field: "url" });
        }
        Ok(())
    }

    /// Read the configuration from `AUTOREPO_DB_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let required = |key: &'static str, field: &'static str| {
            env::var(key)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing { field })
        };

        let mut config = Self::new(
            required(ENV_DRIVER, "driver")?,
            required(ENV_URL, "url")?,
            env::var(ENV_USERNAME).unwrap_or_default(),
            env::var(ENV_PASSWORD).unwrap_or_default(),
        );

        if let Ok(dialect) = env::var(ENV_DIALECT) {
            config.dialect = Some(dialect.parse()?);
        }
        if let Ok(show_sql) = env::var(ENV_SHOW_SQL) {
            config.show_sql = parse_flag(ENV_SHOW_SQL, &show_sql)?;
        }
        if let Ok(format_sql) = env::var(ENV_FORMAT_SQL) {
            config.format_sql = parse_flag(ENV_FORMAT_SQL, &format_sql)?;
        }
        if let Ok(schema_mode) = env::var(ENV_SCHEMA_MODE) {
            config.schema_mode = schema_mode.parse()?;
        }

        Ok(config)
    }
}

impl fmt::Debug for DatabaseConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfiguration")
            .field("driver", &self.driver)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("dialect", &self.dialect)
            .field("schema_mode", &self.schema_mode)
            .field("show_sql", &self.show_sql)
            .field("format_sql", &self.format_sql)
            .finish()
    }
}

/// A discovery configuration: driver and dialect both come from the URL.
impl From<&str> for DatabaseConfiguration {
    fn from(url: &str) -> Self {
        let driver = Dialect::detect(url)
            .map(|d| d.as_str().to_string())
            .unwrap_or_default();
        Self::new(driver, url, "", "")
    }
}

impl From<String> for DatabaseConfiguration {
    fn from(url: String) -> Self {
        Self::from(url.as_str())
    }
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}

/// Validate `config` and build an engine with `connect`.
///
/// Failures are logged with their root-cause classification before being
/// returned.
pub fn initialize_engine<P, F>(
    config: DatabaseConfiguration,
    connect: F,
) -> Result<P, crate::RepositoryError>
where
    P: PersistenceEngine,
    F: FnOnce(DatabaseConfiguration) -> Result<P, PersistenceError>,
{
    config.validate()?;
    let dialect = config.resolved_dialect()?;
    let driver = config.driver.clone();
    let url = config.url.clone();

    match connect(config) {
        Ok(engine) => {
            info!(%driver, %dialect, "persistence engine initialized");
            Ok(engine)
        }
        Err(e) => {
            match e.kind {
                PersistenceErrorKind::MissingDriver => error!(
                    %driver,
                    detail = %e.message,
                    "database driver not found; add it to the build"
                ),
                PersistenceErrorKind::Connection => error!(
                    %url,
                    detail = %e.message,
                    "driver loaded but the database could not be reached"
                ),
                PersistenceErrorKind::Configuration => error!(
                    %dialect,
                    detail = %e.message,
                    "persistence engine rejected its configuration"
                ),
                _ => error!(detail = %e.message, "unexpected failure initializing persistence engine"),
            }
            Err(e.into())
        }
    }
}
