//! Registry of the configuration documents served by the manager.
//!
//! The registry scans one directory for `*.json` files and loads one
//! [`ConfigDocument`] per file, keyed by file stem. Documents are loaded once
//! and the set is read-only afterwards.

use crate::document::{ConfigDocument, SignalEmitter};
use crate::error::{ConfigError, ConfigResult};
use crate::paths;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, info};

type Documents = BTreeMap<String, Arc<ConfigDocument>>;

/// Owner of all application documents for one configuration directory.
pub struct DocumentRegistry {
    config_dir: PathBuf,
    documents: OnceLock<Documents>,
}

impl DocumentRegistry {
    /// Creates an empty registry for `config_dir`. Call [`initialize`](Self::initialize)
    /// to load the documents.
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            documents: OnceLock::new(),
        }
    }

    /// Process-wide registry. The first caller's directory (or the default
    /// directory) wins; later arguments are ignored.
    pub fn get_instance(config_dir: Option<&Path>) -> &'static DocumentRegistry {
        static INSTANCE: OnceLock<DocumentRegistry> = OnceLock::new();
        INSTANCE.get_or_init(|| {
            let dir = config_dir
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(paths::DEFAULT_CONFIG_DIR));
            DocumentRegistry::new(dir)
        })
    }

    /// Configuration directory as configured (before `~/` expansion).
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Scans the configuration directory and loads every document.
    ///
    /// A document that fails to load is logged and skipped. Returns the number
    /// of documents loaded.
    ///
    /// # Errors
    ///
    /// - `HomeNotSet` if the directory starts with `~/` and there is no home
    /// - `DirectoryAccess` if the directory cannot be enumerated
    /// - `DuplicateApplication` if two files map to the same application name
    /// - `NoConfigurationsFound` if no document could be loaded
    /// - `AlreadyInitialized` on a second call
    pub fn initialize(&self, emitter: Arc<dyn SignalEmitter>) -> ConfigResult<usize> {
        if self.documents.get().is_some() {
            return Err(ConfigError::AlreadyInitialized);
        }

        let dir = paths::expand_home(&self.config_dir)?;
        let files = scan_config_dir(&dir)?;
        info!("Found {} application configs", files.len());

        let mut documents = Documents::new();
        for (name, path) in files {
            match ConfigDocument::load(&name, &path, emitter.clone()) {
                Ok(document) => {
                    info!(
                        "Publishing application '{}' at {}",
                        name,
                        document.object_path()
                    );
                    documents.insert(name, Arc::new(document));
                }
                Err(e) => {
                    error!("Skipping application '{}': {}", name, e);
                }
            }
        }

        if documents.is_empty() {
            return Err(ConfigError::NoConfigurationsFound { path: dir });
        }

        let count = documents.len();
        self.documents
            .set(documents)
            .map_err(|_| ConfigError::AlreadyInitialized)?;
        Ok(count)
    }

    /// Whether documents have been loaded.
    pub fn is_initialized(&self) -> bool {
        self.documents.get().is_some()
    }

    /// Names of all loaded applications, sorted.
    pub fn application_names(&self) -> Vec<String> {
        self.documents
            .get()
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Document of application `name`.
    pub fn get(&self, name: &str) -> Option<Arc<ConfigDocument>> {
        self.documents.get()?.get(name).cloned()
    }

    /// Document published at bus object path `object_path`.
    pub fn by_object_path(&self, object_path: &str) -> Option<Arc<ConfigDocument>> {
        let prefix = paths::object_path("");
        let name = object_path.strip_prefix(prefix.as_str())?;
        self.get(name)
    }
}

/// Lists `(application name, path)` of every configuration file directly in `dir`.
fn scan_config_dir(dir: &Path) -> ConfigResult<Vec<(String, PathBuf)>> {
    debug!("Scanning config directory: {}", dir.display());
    let access_error = |source: std::io::Error| ConfigError::DirectoryAccess {
        path: dir.to_path_buf(),
        source,
    };

    let mut seen: BTreeMap<String, PathBuf> = BTreeMap::new();
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(access_error)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()
        .map_err(access_error)?;
    entries.sort();

    for path in entries {
        if !path.is_file() || !has_config_extension(&path) {
            continue;
        }
        let Some(name) = paths::app_name_from_path(&path) else {
            continue;
        };
        if let Some(first) = seen.get(&name) {
            return Err(ConfigError::DuplicateApplication {
                name,
                first: first.clone(),
                second: path,
            });
        }
        seen.insert(name, path);
    }

    if seen.is_empty() {
        return Err(ConfigError::NoConfigurationsFound {
            path: dir.to_path_buf(),
        });
    }
    debug!("Found {} valid config files", seen.len());
    Ok(seen.into_iter().collect())
}

fn has_config_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(paths::CONFIG_EXTENSION))
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
