use secrecy::SecretString;
use serde_aux::field_attributes::{deserialize_bool_from_anything, deserialize_number_from_string};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::credentials::Credentials;

// gradescope mounts everything under this directory
const AUTOGRADER_ROOT: &str = "/autograder";
const AUTOGRADER_RESULTS: &str = "/autograder/results/results.json";
const LOCAL_RESULTS: &str = "results.json";

pub enum Environment {
    Local,
    Autograder,
}

impl Environment {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Autograder => "autograder",
        }
    }

    /// Pick the environment when `APP_ENVIRONMENT` isn't set.
    #[must_use]
    pub fn detect() -> Self {
        if Path::new(AUTOGRADER_ROOT).exists() {
            Self::Autograder
        } else {
            Self::Local
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "autograder" => Ok(Self::Autograder),
            other => Err(format!(
                "{other} is not a supported environment. \
                Use either `local` or `autograder`."
            )),
        }
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    // absent means "attach to an application that is already running"
    #[serde(default)]
    pub server: Option<ServerSettings>,
    pub credentials: CredentialSettings,
    pub results: ResultsSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    pub base_url: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub request_timeout_secs: u64,
}

impl ApplicationSettings {
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct ServerSettings {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub working_directory: PathBuf,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub grace_period_millis: u64,
    #[serde(default)]
    pub readiness: Option<ReadinessSettings>,
}

impl ServerSettings {
    #[must_use]
    pub const fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_millis)
    }
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct ReadinessSettings {
    pub path: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_secs: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub interval_millis: u64,
}

impl ReadinessSettings {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_millis)
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct CredentialSettings {
    pub admin: CredentialRecord,
    pub user: CredentialRecord,
}

#[derive(serde::Deserialize, Clone)]
pub struct CredentialRecord {
    pub email: String,
    pub user_name: String,
    pub password: SecretString,
    #[serde(deserialize_with = "deserialize_bool_from_anything")]
    pub is_admin: bool,
}

impl From<CredentialRecord> for Credentials {
    fn from(record: CredentialRecord) -> Self {
        Self {
            email: record.email,
            user_name: record.user_name,
            password: record.password,
            is_admin: record.is_admin,
        }
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct ResultsSettings {
    pub path: PathBuf,
}

/// Where results go when the configuration itself can't be loaded.
#[must_use]
pub fn default_results_path() -> PathBuf {
    match Environment::detect() {
        Environment::Autograder => PathBuf::from(AUTOGRADER_RESULTS),
        Environment::Local => PathBuf::from(LOCAL_RESULTS),
    }
}

#[allow(clippy::missing_errors_doc)]
/// # Panics
/// if the working directory can't be read or `APP_ENVIRONMENT` is unparseable
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir().expect("Failed to determine the current directory");
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT").map_or_else(
        |_| Environment::detect(),
        |e| e.try_into().expect("Failed to parse APP_ENVIRONMENT"),
    );

    let environment_filename = format!("{}.yaml", environment.as_str());
    let settings = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(
            config::File::from(configuration_directory.join(environment_filename)).required(false),
        )
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}
