//! Ownership of the well-known bus service name.
//!
//! The owner holds an exclusive lock on `<bus-dir>/<service>.lock` and
//! publishes its ports in `<bus-dir>/<service>.addr`. Only one process can own
//! a name at a time; releasing it lets a future instance re-acquire it.

use crate::error::{ConfigError, ConfigResult};
use crate::paths;
use crate::rpc::AddressFileContent;
use fs2::FileExt;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// An acquired service name. Released on [`release`](Self::release) or drop.
pub struct ServiceName {
    service: String,
    lock_file: Option<File>,
    lock_path: PathBuf,
    address_path: PathBuf,
}

impl ServiceName {
    /// Acquires `service` in `bus_dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// `Connection` if another process owns the name, `Io` if the lock file
    /// cannot be opened.
    pub fn acquire(bus_dir: &Path, service: &str) -> ConfigResult<Self> {
        std::fs::create_dir_all(bus_dir).map_err(|e| ConfigError::io(bus_dir, e))?;

        let lock_path = paths::service_lock_path(bus_dir, service);
        let lock_file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| ConfigError::io(&lock_path, e))?;

        match lock_file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                return Err(ConfigError::connection(format!(
                    "Service name {} is already owned by another process",
                    service
                )));
            }
            Err(e) => return Err(ConfigError::io(&lock_path, e)),
        }

        debug!("Acquired service name {}", service);
        Ok(Self {
            service: service.to_string(),
            lock_file: Some(lock_file),
            address_path: paths::service_address_path(bus_dir, service),
            lock_path,
        })
    }

    /// Publishes the address callers use to reach the owner.
    pub fn publish(&self, address: &AddressFileContent) -> ConfigResult<()> {
        let content = serde_json::to_string(address)
            .map_err(|e| ConfigError::io(&self.address_path, std::io::Error::other(e)))?;
        std::fs::write(&self.address_path, content)
            .map_err(|e| ConfigError::io(&self.address_path, e))?;
        info!(
            "Service {} listening on ports {} (main) and {} (subscriber)",
            self.service, address.port, address.subscriber_port
        );
        Ok(())
    }

    /// Service name.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Removes the address file and unlocks the name. Idempotent.
    pub fn release(&mut self) {
        let Some(lock_file) = self.lock_file.take() else {
            return;
        };
        if let Err(e) = std::fs::remove_file(&self.address_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove {}: {}", self.address_path.display(), e);
            }
        }
        if let Err(e) = FileExt::unlock(&lock_file) {
            warn!("Failed to unlock {}: {}", self.lock_path.display(), e);
        }
        info!("Released service name {}", self.service);
    }
}

impl Drop for ServiceName {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
#[path = "tests/service_name_tests.rs"]
mod tests;
