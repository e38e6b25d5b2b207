//! Resolved run inputs.
//!
//! The reconciler never reads configuration files itself. The CLI resolves
//! environment, dotenv files and flags into one immutable [`Settings`] value
//! before the run starts.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::Error;

/// Default per-call timeout for admin API requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Container network inspected for trusted-host discovery.
pub const DEFAULT_NETWORK: &str = "kairos-network";

/// Prefix stripped from realm names to derive their environment.
pub const DEFAULT_REALM_PREFIX: &str = "kairos-";

/// Deployment environment a realm belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Environment {
    Dev,
    Qa,
    Prod,
}

impl Environment {
    /// Derives the environment from a realm name such as `kairos-qa`.
    pub fn from_realm(realm: &str, prefix: &str) -> Option<Self> {
        realm.strip_prefix(prefix).unwrap_or(realm).parse().ok()
    }

    /// Whether the environment runs next to the operator (no peer container).
    pub fn is_local(self) -> bool {
        matches!(self, Self::Dev)
    }

    /// Service name of the application container trusted by non-local
    /// environments.
    pub fn peer_service(self) -> Option<&'static str> {
        match self {
            Self::Dev => None,
            Self::Qa => Some("app-qa"),
            Self::Prod => Some("app-prod"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Qa => "qa",
            Self::Prod => "prod",
        }
    }
}

impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Self::Dev),
            "qa" => Ok(Self::Qa),
            "prod" | "production" => Ok(Self::Prod),
            other => Err(Error::config(format!("unknown environment \"{other}\""))),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A realm under management, in declared order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedRealm {
    pub name: String,
    /// Document file name, relative to the import directory.
    pub file: String,
    pub environment: Environment,
    /// Whether the fixture user is provisioned in this realm.
    pub fixtures: bool,
}

impl ManagedRealm {
    /// Builds a realm entry using the `<name>-realm.json` file convention.
    pub fn new(name: &str, prefix: &str) -> crate::Result<Self> {
        let environment = Environment::from_realm(name, prefix).ok_or_else(|| {
            Error::config(format!(
                "cannot derive environment from realm \"{name}\" (expected {prefix}dev, {prefix}qa or {prefix}prod)"
            ))
        })?;
        Ok(Self {
            name: name.to_string(),
            file: format!("{name}-realm.json"),
            environment,
            fixtures: !matches!(environment, Environment::Prod),
        })
    }

    /// The default `kairos-dev`, `kairos-qa`, `kairos-prod` set.
    pub fn defaults() -> Vec<Self> {
        ["dev", "qa", "prod"]
            .iter()
            .filter_map(|env| Self::new(&format!("{DEFAULT_REALM_PREFIX}{env}"), DEFAULT_REALM_PREFIX).ok())
            .collect()
    }
}

/// How to reach and authenticate against the admin API.
#[derive(Clone)]
pub struct ConnectionSettings {
    pub base_url: String,
    pub admin_user: String,
    pub admin_password: String,
    pub timeout: Duration,
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("base_url", &self.base_url)
            .field("admin_user", &self.admin_user)
            .field("admin_password", &"***")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Test user forced into fixture realms on every run.
#[derive(Clone, PartialEq, Eq)]
pub struct FixtureCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for FixtureCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Everything a run needs, resolved up front.
#[derive(Debug, Clone)]
pub struct Settings {
    pub connection: ConnectionSettings,
    pub fixture: FixtureCredentials,
    pub realms: Vec<ManagedRealm>,
    pub import_dir: PathBuf,
    pub network: String,
}

impl Settings {
    pub fn realm(&self, name: &str) -> Option<&ManagedRealm> {
        self.realms.iter().find(|realm| realm.name == name)
    }
}
