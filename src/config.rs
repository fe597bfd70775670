//! Configuration manager for Weekday.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AppState;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_ADDRESS: &str = "0.0.0.0:8080";
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Reasons a present `config.yaml` is rejected.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot parse `{}`: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("invalid `url` on `{}`: {source}", path.display())]
    Url {
        path: PathBuf,
        source: url::ParseError,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Instance name.
    pub name: String,
    /// Domain name of current instance.
    pub url: String,
    /// Socket address the HTTP server listens on.
    #[serde(skip_serializing)]
    pub address: String,
    #[serde(skip_deserializing)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Related to PostgreSQL configuration.
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
    /// Related to Argon2 configuration.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
    /// Rules every new password must satisfy.
    #[serde(skip_serializing)]
    pub password: PasswordPolicy,
    /// Failed sign-in bookkeeping.
    #[serde(skip_serializing)]
    pub lockout: Lockout,
    /// Related to JsonWebToken configuration.
    #[serde(skip_serializing)]
    pub token: Token,
    /// Accounts created on first start.
    #[serde(skip_serializing)]
    pub seed: Seed,
    /// Related to logs and metrics export.
    #[serde(skip_serializing)]
    pub telemetry: Telemetry,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            name: "weekday".into(),
            url: String::default(),
            address: DEFAULT_ADDRESS.into(),
            version: VERSION.to_owned(),
            path: PathBuf::default(),
            postgres: None,
            argon2: None,
            password: PasswordPolicy::default(),
            lockout: Lockout::default(),
            token: Token::default(),
            seed: Seed::default(),
            telemetry: Telemetry::default(),
        }
    }
}

/// PostgreSQL configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// Hostname:(?port) for PostgreSQL instance.
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

/// Password strength rules.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordPolicy {
    pub required_length: usize,
    pub require_digit: bool,
    pub require_lowercase: bool,
    pub require_uppercase: bool,
    pub require_non_alphanumeric: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            required_length: 6,
            require_digit: true,
            require_lowercase: true,
            require_uppercase: true,
            require_non_alphanumeric: true,
        }
    }
}

/// Lockout configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Lockout {
    /// Whether the store locks accounts itself after failed attempts.
    pub enabled: bool,
    /// Failed attempts before the account is locked.
    pub max_failed_access_attempts: i32,
    /// Lock duration.
    pub minutes: i64,
}

impl Default for Lockout {
    fn default() -> Self {
        Self {
            enabled: true,
            max_failed_access_attempts: 5,
            minutes: 5,
        }
    }
}

/// Json Web Token configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Token {
    /// HMAC secret used to sign tokens.
    pub secret: String,
    /// Update token audience.
    /// Default is `weekday`.
    pub audience: String,
    /// Token lifetime in seconds.
    pub expires_in: u64,
}

impl Default for Token {
    fn default() -> Self {
        Self {
            secret: String::default(),
            audience: "weekday".into(),
            expires_in: 60 * 60, // 1 hour.
        }
    }
}

/// Default account created by the first start.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct SeedAccount {
    pub user_name: String,
    pub password: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub job_title: Option<String>,
    pub roles: Vec<String>,
}

/// First start configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Seed {
    pub roles: Vec<String>,
    pub accounts: Vec<SeedAccount>,
}

impl Default for Seed {
    fn default() -> Self {
        use crate::account::{ADMINISTRATOR, EMPLOYEE};

        Self {
            roles: vec![ADMINISTRATOR.into(), EMPLOYEE.into()],
            accounts: vec![
                SeedAccount {
                    user_name: "admin".into(),
                    password: "Admin1_".into(),
                    email: "admin@company.com".into(),
                    phone_number: Some("+375 (29) 000-0000".into()),
                    job_title: Some("Inbuilt Administrator".into()),
                    roles: vec![ADMINISTRATOR.into()],
                },
                SeedAccount {
                    user_name: "employee".into(),
                    password: "Employee1_".into(),
                    email: "employee@company.com".into(),
                    phone_number: Some("+375 (29) 000-0000".into()),
                    job_title: Some("Inbuilt Employee".into()),
                    roles: vec![EMPLOYEE.into()],
                },
            ],
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Telemetry {
    /// `tracing-subscriber` filter directive.
    pub filter: Option<String>,
    /// OTLP endpoint receiving logs.
    pub otlp_endpoint: Option<String>,
    /// Install the Prometheus recorder and serve `/metrics`.
    pub prometheus: bool,
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Application version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Normalizes a URL string by ensuring it starts with a valid scheme
    /// (`http` or `https`).
    fn normalize_url(&self, url: &str) -> Result<String, url::ParseError> {
        let url_with_scheme =
            if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("https://{url}")
            };

        let parsed_url = Url::parse(&url_with_scheme)?;
        Ok(parsed_url.to_string())
    }

    /// File the configuration was read from. `None` means defaults.
    pub fn loaded_from(&self) -> Option<&Path> {
        (!self.path.as_os_str().is_empty()).then_some(self.path.as_path())
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    ///
    /// A missing file falls back to defaults, see [`Configuration::loaded_from`].
    /// A malformed one is an error.
    pub fn read(self) -> Result<Arc<Self>, ConfigError> {
        let file_path = if self.path.is_file() {
            self.path.clone()
        } else {
            PathBuf::from(DEFAULT_CONFIG_PATH)
        };

        let Ok(file) = File::open(&file_path) else {
            return Ok(Arc::new(Self::default()));
        };

        let mut config: Configuration = serde_yaml::from_reader(file)
            .map_err(|source| ConfigError::Parse {
                path: file_path.clone(),
                source,
            })?;

        config.version = VERSION.to_owned();
        if !config.url.is_empty() {
            config.url = self.normalize_url(&config.url).map_err(|source| {
                ConfigError::Url {
                    path: file_path.clone(),
                    source,
                }
            })?;
        }
        config.path = file_path;

        Ok(Arc::new(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
name: intranet
url: intranet.company.com
lockout:
  enabled: false
password:
  required_length: 8
"#;
        let config: Configuration = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.name, "intranet");
        assert_eq!(config.address, DEFAULT_ADDRESS);
        assert!(!config.lockout.enabled);
        assert_eq!(config.lockout.max_failed_access_attempts, 5);
        assert_eq!(config.password.required_length, 8);
        assert!(config.password.require_digit);
        assert_eq!(config.seed.accounts.len(), 2);
    }

    #[test]
    fn test_normalize_url() {
        let config = Configuration::default();

        assert_eq!(
            config.normalize_url("intranet.company.com").unwrap(),
            "https://intranet.company.com/"
        );
        assert_eq!(
            config.normalize_url("http://localhost:8080").unwrap(),
            "http://localhost:8080/"
        );
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = Configuration::default()
            .path(PathBuf::from("/definitely/not/here.yaml"))
            .read()
            .unwrap();

        assert_eq!(config.version(), VERSION);
        assert!(!config.name.is_empty());
    }

    fn write_temp(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir()
            .join(format!("weekday-{}-{name}.yaml", std::process::id()));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let path = write_temp("malformed", "name: [not, a, string]\n");

        let err = Configuration::default().path(path.clone()).read().unwrap_err();
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("cannot parse"));
    }

    #[test]
    fn test_read_file_records_path() {
        let path = write_temp("valid", "name: intranet\n");

        let config = Configuration::default().path(path.clone()).read().unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.name, "intranet");
        assert_eq!(config.loaded_from(), Some(path.as_path()));
    }

    #[test]
    fn test_seed_accounts_use_snake_case() {
        let yaml = r#"
seed:
  roles: [Administrator]
  accounts:
    - user_name: boss
      password: Boss1_
      email: boss@company.com
      job_title: Director
      roles: [Administrator]
"#;
        let config: Configuration = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.seed.accounts[0].user_name, "boss");
        assert_eq!(config.seed.accounts[0].job_title.as_deref(), Some("Director"));
        assert!(config.seed.accounts[0].phone_number.is_none());
    }
}
