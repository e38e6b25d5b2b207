use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use realmsync_core::settings::{DEFAULT_NETWORK, DEFAULT_REALM_PREFIX, DEFAULT_TIMEOUT};
use realmsync_core::{ConnectionSettings, FixtureCredentials, ManagedRealm, Settings};

use crate::cli::Cli;

pub const DEFAULT_CONFIG_FILE: &str = "realmsync.toml";
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_ADMIN_USER: &str = "admin";
pub const DEFAULT_TEST_USERNAME: &str = "kairos-tester";
pub const DEFAULT_TEST_PASSWORD: &str = "kairos-tester-secret";
pub const DEFAULT_IMPORT_DIR: &str = "scripts/keycloak/import";

/// Dotenv files in precedence order. Variables already set (by the process
/// environment or an earlier file) are never overwritten.
pub const DOTENV_FILES: [&str; 3] = [".env.prod", ".env", ".env.dev"];

/// Loads the dotenv files that exist and returns their paths.
pub fn load_dotenv() -> Vec<PathBuf> {
    let mut loaded = Vec::new();
    for name in DOTENV_FILES {
        match dotenvy::from_filename(name) {
            Ok(path) => loaded.push(path),
            Err(e) if e.not_found() => {}
            // Tracing is not up yet
            Err(e) => eprintln!("Warning: Failed to load {name}: {e}"),
        }
    }
    loaded
}

/// Optional settings from `realmsync.toml` and `REALMSYNC__*` variables.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub url: Option<String>,
    /// Managed realms in processing order; empty means dev, qa, prod.
    pub realms: Vec<String>,
    pub realm_prefix: Option<String>,
    pub import_dir: Option<PathBuf>,
    pub network: Option<String>,
    pub timeout_secs: Option<u64>,
}

pub fn load_file_config(path: Option<&Path>) -> Result<FileConfig> {
    build_file_config(path, "REALMSYNC")
}

fn build_file_config(path: Option<&Path>, env_prefix: &str) -> Result<FileConfig> {
    let mut builder = Config::builder();
    match path {
        Some(p) => {
            // An explicitly named file must exist
            builder = builder.add_source(File::from(p.to_path_buf()).required(true));
        }
        None => {
            let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                builder = builder.add_source(File::from(default_path));
            }
        }
    }
    // e.g. REALMSYNC__NETWORK=kairos-network, REALMSYNC__REALMS=kairos-dev,kairos-qa
    builder = builder.add_source(
        Environment::with_prefix(env_prefix)
            .try_parsing(true)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("realms"),
    );
    let cfg = builder.build().context("Failed to read configuration")?;
    cfg.try_deserialize().context("Invalid configuration")
}

/// Resolves flags, environment and file settings into the run settings.
/// Flags and environment win over the file; the file wins over defaults.
pub fn resolve_settings(cli: &Cli, file: FileConfig) -> Result<Settings> {
    let admin_password = cli
        .admin_password
        .clone()
        .filter(|p| !p.is_empty())
        .context("KEYCLOAK_ADMIN_PASSWORD is not set. Export it, put it in .env, or pass --admin-password")?;

    let prefix = file
        .realm_prefix
        .unwrap_or_else(|| DEFAULT_REALM_PREFIX.to_string());
    let names = if file.realms.is_empty() {
        ["dev", "qa", "prod"]
            .iter()
            .map(|env| format!("{prefix}{env}"))
            .collect()
    } else {
        file.realms
    };
    let realms = names
        .iter()
        .map(|name| ManagedRealm::new(name, &prefix))
        .collect::<realmsync_core::Result<Vec<_>>>()?;

    Ok(Settings {
        connection: ConnectionSettings {
            base_url: cli
                .url
                .clone()
                .or(file.url)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            admin_user: cli
                .admin_user
                .clone()
                .unwrap_or_else(|| DEFAULT_ADMIN_USER.to_string()),
            admin_password,
            timeout: file
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TIMEOUT),
        },
        fixture: FixtureCredentials {
            username: cli
                .test_username
                .clone()
                .unwrap_or_else(|| DEFAULT_TEST_USERNAME.to_string()),
            password: cli
                .test_password
                .clone()
                .unwrap_or_else(|| DEFAULT_TEST_PASSWORD.to_string()),
        },
        realms,
        import_dir: cli
            .import_dir
            .clone()
            .or(file.import_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_IMPORT_DIR)),
        network: file.network.unwrap_or_else(|| DEFAULT_NETWORK.to_string()),
    })
}
