//! Configuration types and parsing for es.ini
//!
//! An `es.ini` file holds one section per environment (connection target)
//! plus a `[default]` section naming the active environment:
//!
//! ```ini
//! [default]
//! env = dev
//! threads = 50
//!
//! [dev]
//! platform = postgres
//! host = localhost
//! database = analytics
//! user = tester
//! password = secret
//! ```

use crate::error::{CoreError, CoreResult};
use ini::{Ini, ParseOption, Properties};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default configuration file name, resolved relative to the working directory
pub const CONFIG_FILE_NAME: &str = "es.ini";

/// Section holding the active environment name and shared run settings
pub const DEFAULT_SECTION: &str = "default";

/// Default worker pool width
pub const DEFAULT_THREADS: usize = 50;

/// Default bound on a single query, including time spent polling
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 3600;

/// Default interval between job status polls
pub const DEFAULT_POLL_INTERVAL_SECS: f64 = 2.0;

const DEFAULT_POSTGRES_PORT: u16 = 5432;
const DEFAULT_SNOWFLAKE_TOKEN_TYPE: &str = "PROGRAMMATIC_ACCESS_TOKEN";

/// Supported warehouse platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Snowflake (SQL API v2, asynchronous)
    Snowflake,
    /// PostgreSQL (synchronous)
    Postgres,
    /// Databricks SQL warehouses (Statement Execution API, asynchronous)
    Databricks,
}

impl Platform {
    /// All supported platforms, in display order
    pub const ALL: [Platform; 3] = [Platform::Snowflake, Platform::Postgres, Platform::Databricks];

    /// Lower-case platform name as written in es.ini
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Snowflake => "snowflake",
            Platform::Postgres => "postgres",
            Platform::Databricks => "databricks",
        }
    }

    fn supported_names() -> String {
        Self::ALL
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| CoreError::UnsupportedPlatform {
                name: s.trim().to_string(),
                supported: Self::supported_names(),
            })
    }
}

/// Snowflake connection parameters
///
/// Statements are submitted through the SQL API, which authenticates with a
/// ready-made bearer token (programmatic access token, OAuth token, or a
/// key-pair JWT). Session context travels with every statement.
#[derive(Clone, PartialEq, Eq)]
pub struct SnowflakeProfile {
    pub account: String,
    pub token: String,
    pub token_type: String,
    pub user: Option<String>,
    pub warehouse: Option<String>,
    pub role: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub host: Option<String>,
}

impl SnowflakeProfile {
    /// Base URL of the account's SQL API endpoint
    pub fn base_url(&self) -> String {
        match &self.host {
            Some(host) => with_scheme(host),
            None => format!("https://{}.snowflakecomputing.com", self.account),
        }
    }
}

impl fmt::Debug for SnowflakeProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnowflakeProfile")
            .field("account", &self.account)
            .field("token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("user", &self.user)
            .field("warehouse", &self.warehouse)
            .field("role", &self.role)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("host", &self.host)
            .finish()
    }
}

/// PostgreSQL connection parameters
#[derive(Clone, PartialEq, Eq)]
pub struct PostgresProfile {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    /// Applied as `SET search_path TO <schema>` before each test
    pub schema: Option<String>,
    pub sslmode: Option<String>,
}

impl fmt::Debug for PostgresProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresProfile")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("schema", &self.schema)
            .field("sslmode", &self.sslmode)
            .finish()
    }
}

/// Databricks SQL warehouse connection parameters
#[derive(Clone, PartialEq, Eq)]
pub struct DatabricksProfile {
    pub server_hostname: String,
    pub http_path: String,
    pub access_token: String,
    pub warehouse_id: String,
    pub catalog: Option<String>,
    pub schema: Option<String>,
}

impl DatabricksProfile {
    /// Base URL of the workspace REST API
    pub fn base_url(&self) -> String {
        with_scheme(&self.server_hostname)
    }
}

impl fmt::Debug for DatabricksProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabricksProfile")
            .field("server_hostname", &self.server_hostname)
            .field("http_path", &self.http_path)
            .field("access_token", &"<redacted>")
            .field("warehouse_id", &self.warehouse_id)
            .field("catalog", &self.catalog)
            .field("schema", &self.schema)
            .finish()
    }
}

/// Fully resolved connection profile for one environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionProfile {
    Snowflake(SnowflakeProfile),
    Postgres(PostgresProfile),
    Databricks(DatabricksProfile),
}

impl ConnectionProfile {
    /// Platform this profile connects to
    pub fn platform(&self) -> Platform {
        match self {
            ConnectionProfile::Snowflake(_) => Platform::Snowflake,
            ConnectionProfile::Postgres(_) => Platform::Postgres,
            ConnectionProfile::Databricks(_) => Platform::Databricks,
        }
    }
}

/// Execution knobs shared by all environments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    /// Worker pool width
    pub threads: usize,
    /// Upper bound for one query including polling; `None` waits forever
    pub query_timeout: Option<Duration>,
    /// Interval between job status polls on asynchronous backends
    pub poll_interval: Duration,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            query_timeout: Some(Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS)),
            poll_interval: Duration::from_secs_f64(DEFAULT_POLL_INTERVAL_SECS),
        }
    }
}

/// A resolved environment: its section name, profile and run settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    pub name: String,
    pub profile: ConnectionProfile,
    pub settings: RunSettings,
}

impl EnvConfig {
    /// Platform of the resolved profile
    pub fn platform(&self) -> Platform {
        self.profile.platform()
    }
}

/// Parsed es.ini file
#[derive(Debug)]
pub struct EsConfig {
    ini: Ini,
    path: PathBuf,
}

impl EsConfig {
    /// Load configuration from a file path
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, path)
    }

    /// Parse configuration text; `path` is only used in messages
    pub fn parse(content: &str, path: &Path) -> CoreResult<Self> {
        let options = ParseOption {
            enabled_escape: false,
            ..ParseOption::default()
        };
        let ini =
            Ini::load_from_str_opt(content, options).map_err(|e| CoreError::ConfigParseError {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            ini,
            path: path.to_path_buf(),
        })
    }

    /// Path the configuration was read from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Environment named by `[default].env`, falling back to the legacy `agent` key
    pub fn default_env(&self) -> Option<&str> {
        let section = self.ini.section(Some(DEFAULT_SECTION))?;
        section
            .get("env")
            .or_else(|| section.get("agent"))
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Names of all environment sections
    pub fn environments(&self) -> Vec<&str> {
        self.ini
            .sections()
            .flatten()
            .filter(|name| *name != DEFAULT_SECTION)
            .collect()
    }

    /// Pick the environment to use: explicit name first, then the default
    pub fn resolve_env_name(&self, explicit: Option<&str>) -> CoreResult<String> {
        explicit
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or_else(|| self.default_env())
            .map(String::from)
            .ok_or(CoreError::NoEnvironment)
    }

    /// Platform of the selected environment
    pub fn platform(&self, explicit: Option<&str>) -> CoreResult<Platform> {
        let name = self.resolve_env_name(explicit)?;
        let section = self.section(&name)?;
        section.required("platform")?.parse()
    }

    /// Resolve the selected environment into a profile and run settings
    pub fn resolve(&self, explicit: Option<&str>) -> CoreResult<EnvConfig> {
        let name = self.resolve_env_name(explicit)?;
        let section = self.section(&name)?;
        let platform: Platform = section.required("platform")?.parse()?;

        let profile = match platform {
            Platform::Snowflake => ConnectionProfile::Snowflake(snowflake_profile(&section)?),
            Platform::Postgres => ConnectionProfile::Postgres(postgres_profile(&section)?),
            Platform::Databricks => ConnectionProfile::Databricks(databricks_profile(&section)?),
        };
        let settings = self.run_settings(&section)?;

        log::debug!("Resolved environment '{}' ({})", name, platform);

        Ok(EnvConfig {
            name,
            profile,
            settings,
        })
    }

    fn section<'a>(&'a self, name: &'a str) -> CoreResult<Section<'a>> {
        self.ini
            .section(Some(name))
            .map(|props| Section { name, props })
            .ok_or_else(|| CoreError::SectionNotFound {
                section: name.to_string(),
            })
    }

    /// Settings from `[default]`, overridden by the environment section
    fn run_settings(&self, env: &Section<'_>) -> CoreResult<RunSettings> {
        let mut settings = RunSettings::default();
        let default = self.ini.section(Some(DEFAULT_SECTION)).map(|props| Section {
            name: DEFAULT_SECTION,
            props,
        });

        for section in default.iter().chain(std::iter::once(env)) {
            if let Some(threads) = section.parse::<usize>("threads")? {
                if threads == 0 {
                    return Err(CoreError::ConfigInvalid {
                        message: format!("'threads' in [{}] must be at least 1", section.name),
                    });
                }
                settings.threads = threads;
            }
            if let Some(secs) = section.parse::<u64>("query_timeout")? {
                settings.query_timeout = (secs > 0).then(|| Duration::from_secs(secs));
            }
            if let Some(secs) = section.parse::<f64>("poll_interval")? {
                if !secs.is_finite() || secs <= 0.0 {
                    return Err(CoreError::ConfigInvalid {
                        message: format!(
                            "'poll_interval' in [{}] must be a positive number of seconds",
                            section.name
                        ),
                    });
                }
                settings.poll_interval = Duration::from_secs_f64(secs);
            }
        }

        Ok(settings)
    }
}

/// Borrowed view of one ini section with typed accessors
struct Section<'a> {
    name: &'a str,
    props: &'a Properties,
}

impl Section<'_> {
    fn optional(&self, key: &str) -> Option<String> {
        self.props
            .get(key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
    }

    fn required(&self, key: &str) -> CoreResult<String> {
        self.optional(key).ok_or_else(|| CoreError::MissingKey {
            section: self.name.to_string(),
            key: key.to_string(),
        })
    }

    fn parse<T: FromStr>(&self, key: &str) -> CoreResult<Option<T>> {
        match self.optional(key) {
            None => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| CoreError::ConfigInvalid {
                    message: format!(
                        "Invalid value '{}' for '{}' in section [{}]",
                        raw, key, self.name
                    ),
                }),
        }
    }
}

fn snowflake_profile(section: &Section<'_>) -> CoreResult<SnowflakeProfile> {
    Ok(SnowflakeProfile {
        account: section.required("account")?,
        token: section.required("token")?,
        token_type: section
            .optional("token_type")
            .map(|t| t.to_uppercase())
            .unwrap_or_else(|| DEFAULT_SNOWFLAKE_TOKEN_TYPE.to_string()),
        user: section.optional("user"),
        warehouse: section.optional("warehouse"),
        role: section.optional("role"),
        database: section.optional("database"),
        schema: section.optional("schema"),
        host: section.optional("host"),
    })
}

fn postgres_profile(section: &Section<'_>) -> CoreResult<PostgresProfile> {
    Ok(PostgresProfile {
        host: section.required("host")?,
        port: section.parse("port")?.unwrap_or(DEFAULT_POSTGRES_PORT),
        database: section.required("database")?,
        user: section.required("user")?,
        password: section.required("password")?,
        schema: section.optional("schema"),
        sslmode: section.optional("sslmode"),
    })
}

fn databricks_profile(section: &Section<'_>) -> CoreResult<DatabricksProfile> {
    let http_path = section.required("http_path")?;
    let warehouse_id = match section.optional("warehouse_id") {
        Some(id) => id,
        None => warehouse_id_from_http_path(&http_path).ok_or_else(|| {
            CoreError::ConfigInvalid {
                message: format!(
                    "Cannot derive a SQL warehouse id from http_path '{}' in section [{}]; \
                     expected '/sql/1.0/warehouses/<id>' or set 'warehouse_id'",
                    http_path, section.name
                ),
            }
        })?,
    };

    Ok(DatabricksProfile {
        server_hostname: section.required("server_hostname")?,
        http_path,
        access_token: section.required("access_token")?,
        warehouse_id,
        catalog: section.optional("catalog"),
        schema: section.optional("schema"),
    })
}

/// Extract `<id>` from `.../warehouses/<id>`
pub fn warehouse_id_from_http_path(http_path: &str) -> Option<String> {
    let mut segments = http_path.trim_end_matches('/').split('/');
    segments.find(|s| *s == "warehouses" || *s == "endpoints")?;
    segments
        .next()
        .filter(|id| !id.is_empty())
        .map(String::from)
}

fn with_scheme(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
