//! Error taxonomy shared by the manager and the client.

use std::path::PathBuf;

/// Errors raised while loading, mutating or distributing configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Backing file does not exist and no default was requested
    NotFound { path: PathBuf },
    /// File content is not a flat key → primitive JSON object
    MalformedDocument { path: PathBuf, reason: String },
    /// Configuration directory could not be enumerated
    DirectoryAccess {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Configuration directory holds no usable documents
    NoConfigurationsFound { path: PathBuf },
    /// Two files in the configuration directory produce the same application name
    DuplicateApplication {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },
    /// Empty key or unset value on write
    InvalidArgument { message: String },
    /// Bus unavailable or service name already owned
    Connection { message: String },
    /// A value did not have the type the reader expected
    Coercion {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
    /// `~/` path used but the home directory is unknown
    HomeNotSet,
    /// Registry documents were already loaded
    AlreadyInitialized,
    /// Any other filesystem failure
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound { path } => {
                write!(f, "Configuration file not found: {}", path.display())
            }
            ConfigError::MalformedDocument { path, reason } => {
                write!(
                    f,
                    "Malformed configuration document {}: {}",
                    path.display(),
                    reason
                )
            }
            ConfigError::DirectoryAccess { path, source } => {
                write!(
                    f,
                    "Error accessing config directory {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::NoConfigurationsFound { path } => {
                write!(
                    f,
                    "No valid configuration files found in {}",
                    path.display()
                )
            }
            ConfigError::DuplicateApplication {
                name,
                first,
                second,
            } => {
                write!(
                    f,
                    "Application '{}' is defined twice: {} and {}",
                    name,
                    first.display(),
                    second.display()
                )
            }
            ConfigError::InvalidArgument { message } => write!(f, "Invalid argument: {}", message),
            ConfigError::Connection { message } => write!(f, "Connection error: {}", message),
            ConfigError::Coercion {
                key,
                expected,
                found,
            } => {
                write!(
                    f,
                    "Cannot read '{}' as {}: value is a {}",
                    key, expected, found
                )
            }
            ConfigError::HomeNotSet => write!(f, "HOME environment variable not set"),
            ConfigError::AlreadyInitialized => write!(f, "Registry is already initialized"),
            ConfigError::Io { path, source } => {
                write!(f, "I/O error on {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::DirectoryAccess { source, .. } | ConfigError::Io { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}

impl ConfigError {
    pub(crate) fn invalid_argument(message: &str) -> Self {
        ConfigError::InvalidArgument {
            message: message.to_string(),
        }
    }

    pub(crate) fn connection(message: impl Into<String>) -> Self {
        ConfigError::Connection {
            message: message.into(),
        }
    }

    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
