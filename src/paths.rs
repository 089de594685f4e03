//! Well-known names and home-based paths shared by the manager and clients.
//!
//! - `~/com.system.configurationManager/` - default configuration directory
//! - `~/com.system.configurationManager/confManagerApplication1.json` - default client file
//! - `~/.confbus/` - bus directory holding service address and lock files
//!   (override with `CONFBUS_DIR`)

use crate::error::{ConfigError, ConfigResult};
use std::path::{Path, PathBuf};

/// Well-known bus service name owned by the manager.
pub const SERVICE_NAME: &str = "com.system.configurationManager";

/// Interface carrying the configuration methods and signal.
pub const INTERFACE_NAME: &str = "com.system.configurationManager.Application.Configuration";

/// Name of the change broadcast.
pub const CONFIG_CHANGED_SIGNAL: &str = "configurationChanged";

/// Default manager configuration directory.
pub const DEFAULT_CONFIG_DIR: &str = "~/com.system.configurationManager/";

/// Application identifier used by the client when no config path is given.
pub const DEFAULT_APP_NAME: &str = "confManagerApplication1";

/// Extension of configuration documents picked up by the manager.
pub const CONFIG_EXTENSION: &str = "json";

/// Environment variable overriding the bus directory.
pub const BUS_DIR_ENV: &str = "CONFBUS_DIR";

const BUS_DIR: &str = ".confbus";

/// Returns the user's home directory.
///
/// # Errors
///
/// Returns `HomeNotSet` if `HOME` is unset or empty, or the home directory
/// cannot be determined.
pub fn home_dir() -> ConfigResult<PathBuf> {
    match std::env::var_os("HOME") {
        Some(home) if !home.is_empty() => dirs::home_dir().ok_or(ConfigError::HomeNotSet),
        _ => Err(ConfigError::HomeNotSet),
    }
}

/// Expands a leading `~/` to the home directory. Other paths are returned as-is.
pub fn expand_home(path: &Path) -> ConfigResult<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => Ok(home_dir()?.join(rest)),
        Err(_) => Ok(path.to_path_buf()),
    }
}

/// Builds the bus object path of an application:
/// `/com/system/configurationManager/Application/<name>`
pub fn object_path(app_name: &str) -> String {
    format!("/{}/Application/{}", SERVICE_NAME.replace('.', "/"), app_name)
}

/// Default location of the client's local configuration file.
pub fn default_client_config_path() -> ConfigResult<PathBuf> {
    Ok(expand_home(Path::new(DEFAULT_CONFIG_DIR))?
        .join(format!("{}.{}", DEFAULT_APP_NAME, CONFIG_EXTENSION)))
}

/// Application name of a configuration file: its stem.
pub fn app_name_from_path(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
}

/// Returns the bus directory: `$CONFBUS_DIR`, or `~/.confbus/`.
pub fn bus_dir() -> ConfigResult<PathBuf> {
    match std::env::var_os(BUS_DIR_ENV) {
        Some(dir) if !dir.is_empty() => Ok(PathBuf::from(dir)),
        _ => Ok(home_dir()?.join(BUS_DIR)),
    }
}

/// Address file published by the owner of `service`: `<bus-dir>/<service>.addr`
pub fn service_address_path(bus_dir: &Path, service: &str) -> PathBuf {
    bus_dir.join(format!("{}.addr", service))
}

/// Lock file held by the owner of `service`: `<bus-dir>/<service>.lock`
pub fn service_lock_path(bus_dir: &Path, service: &str) -> PathBuf {
    bus_dir.join(format!("{}.lock", service))
}

#[cfg(test)]
#[path = "tests/paths_tests.rs"]
mod tests;
