//! One application's configuration document.
//!
//! A [`ConfigDocument`] owns the in-memory mapping of an application together
//! with its backing file. Writes go through a single pipeline per document:
//! update the mapping, persist the full mapping, then broadcast it. The
//! pipeline is serialized by a commit lock, while the mapping itself sits
//! behind a separate lock that is only held for the in-memory update or copy,
//! so readers never wait on disk I/O.

use crate::codec;
use crate::error::{ConfigError, ConfigResult};
use crate::paths;
use crate::value::{ConfigMap, ValueCell};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Bootstrap key holding the polling interval in milliseconds.
pub const TIMEOUT_KEY: &str = "Timeout";

/// Bootstrap key holding the phrase printed after each interval.
pub const TIMEOUT_PHRASE_KEY: &str = "TimeoutPhrase";

/// Sink for `configurationChanged` broadcasts.
#[async_trait]
pub trait SignalEmitter: Send + Sync {
    /// Broadcasts the full mapping of the document published at `object_path`.
    async fn emit_configuration_changed(&self, object_path: &str, config: ConfigMap);
}

/// Builds the initial document written when a file is missing or regenerated.
pub fn bootstrap_config(timeout_ms: i64, phrase: &str) -> ConfigMap {
    let mut config = ConfigMap::new();
    config.insert(TIMEOUT_KEY.to_string(), ValueCell::Int(timeout_ms));
    config.insert(TIMEOUT_PHRASE_KEY.to_string(), ValueCell::from(phrase));
    config
}

/// Loads the document at `path`, writing `defaults` there first when the file
/// is missing or `force` is set.
///
/// Returns the mapping and whether it was freshly created.
pub fn load_or_create(
    path: &Path,
    defaults: &ConfigMap,
    force: bool,
) -> ConfigResult<(ConfigMap, bool)> {
    if !force {
        match codec::read_document(path) {
            Ok(config) => return Ok((config, false)),
            Err(ConfigError::NotFound { .. }) => {
                debug!("No configuration at {}, creating it", path.display());
            }
            Err(e) => return Err(e),
        }
    }
    codec::write_document(path, defaults)?;
    Ok((defaults.clone(), true))
}

/// In-memory configuration of one application, backed by one file.
pub struct ConfigDocument {
    name: String,
    object_path: String,
    path: PathBuf,
    config: Mutex<ConfigMap>,
    commit: Mutex<()>,
    emitter: Arc<dyn SignalEmitter>,
}

impl ConfigDocument {
    /// Loads an existing document from `path`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the file is absent
    /// - `MalformedDocument` if it is not a flat key → primitive JSON object
    pub fn load(
        name: &str,
        path: impl Into<PathBuf>,
        emitter: Arc<dyn SignalEmitter>,
    ) -> ConfigResult<Self> {
        let path = path.into();
        debug!("Parsing config file: {}", path.display());
        let config = codec::read_document(&path)?;
        info!("Successfully parsed config file: {}", path.display());
        Ok(Self::with_config(name, path, config, emitter))
    }

    /// Loads the document at `path`, materializing `defaults` when the file is
    /// missing or `force` is set. A forced write silently replaces existing content.
    pub fn open_or_create(
        name: &str,
        path: impl Into<PathBuf>,
        defaults: &ConfigMap,
        force: bool,
        emitter: Arc<dyn SignalEmitter>,
    ) -> ConfigResult<Self> {
        let path = path.into();
        let (config, created) = load_or_create(&path, defaults, force)?;
        if created {
            info!("Created default configuration: {}", path.display());
        }
        Ok(Self::with_config(name, path, config, emitter))
    }

    fn with_config(
        name: &str,
        path: PathBuf,
        config: ConfigMap,
        emitter: Arc<dyn SignalEmitter>,
    ) -> Self {
        Self {
            name: name.to_string(),
            object_path: paths::object_path(name),
            path,
            config: Mutex::new(config),
            commit: Mutex::new(()),
            emitter,
        }
    }

    /// Application name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bus object path the document is published under.
    pub fn object_path(&self) -> &str {
        &self.object_path
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a copy of the full mapping.
    pub async fn get_all(&self) -> ConfigMap {
        self.config.lock().await.clone()
    }

    /// Replaces or inserts one entry, persists the document and broadcasts it.
    ///
    /// A persistence failure is logged and does not undo the in-memory change
    /// or suppress the broadcast.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `key` is empty, `value` is unset, or the value is a
    /// non-finite float. The document is left unchanged in that case.
    pub async fn change_one(&self, key: &str, value: Option<ValueCell>) -> ConfigResult<()> {
        debug!("Changing configuration key '{}' of {}", key, self.name);
        if key.is_empty() {
            return Err(ConfigError::invalid_argument("Key cannot be empty"));
        }
        let value = value.ok_or_else(|| ConfigError::invalid_argument("Value cannot be empty"))?;
        if let ValueCell::Float(f) = &value {
            if !f.is_finite() {
                return Err(ConfigError::invalid_argument("Float value must be finite"));
            }
        }

        let _commit = self.commit.lock().await;

        let snapshot = {
            let mut config = self.config.lock().await;
            config.insert(key.to_string(), value);
            config.clone()
        };

        if let Err(e) = codec::write_document(&self.path, &snapshot) {
            error!("Failed to save configuration of {}: {}", self.name, e);
        } else {
            debug!("Configuration saved to file: {}", self.path.display());
        }

        self.emitter
            .emit_configuration_changed(&self.object_path, snapshot)
            .await;

        info!("Configuration changed for key '{}' of {}", key, self.name);
        Ok(())
    }

    /// Writes the current mapping to the backing file.
    pub async fn persist(&self) -> ConfigResult<()> {
        let _commit = self.commit.lock().await;
        let snapshot = self.get_all().await;
        codec::write_document(&self.path, &snapshot)
    }

    /// Broadcasts the current mapping.
    pub async fn emit_changed(&self) {
        let _commit = self.commit.lock().await;
        let snapshot = self.get_all().await;
        self.emitter
            .emit_configuration_changed(&self.object_path, snapshot)
            .await;
    }
}

#[cfg(test)]
#[path = "tests/document_tests.rs"]
mod tests;
