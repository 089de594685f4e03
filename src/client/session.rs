//! Client session: a local mirror of one application's `Timeout` and
//! `TimeoutPhrase`, kept current by `configurationChanged` signals and
//! driving a periodic output worker.

use crate::client::rpc_client::BusConnection;
use crate::client::rpc_subscription::{SignalSubscription, SubscriptionEvent};
use crate::document::{self, TIMEOUT_KEY, TIMEOUT_PHRASE_KEY};
use crate::error::{ConfigError, ConfigResult};
use crate::paths;
use crate::value::ConfigMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Startup parameters of a client session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Default interval written to a newly created local file
    pub timeout_ms: u64,
    /// Default phrase written to a newly created local file
    pub phrase: String,
    /// Local file override; defaults to the fixed application file
    pub config_path: Option<PathBuf>,
    /// Rewrite the local file from the defaults even if it exists
    pub force_create: bool,
    /// Bus directory override; defaults to `paths::bus_dir()`
    pub bus_dir: Option<PathBuf>,
}

/// The pair of values the worker acts on.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub timeout_ms: u64,
    pub phrase: String,
}

/// Why the session's event loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The manager announced shutdown
    ManagerStopping,
    /// The subscription connection closed
    Disconnected,
}

fn lock_snapshot(snapshot: &Mutex<SessionSnapshot>) -> MutexGuard<'_, SessionSnapshot> {
    snapshot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn positive_timeout(value: i64) -> Option<u64> {
    u64::try_from(value).ok().filter(|ms| *ms > 0)
}

/// Loads the local file at `path`, creating it from `defaults` when missing
/// or when `force` is set.
///
/// # Errors
///
/// `MalformedDocument` if either bootstrap key is missing, has the wrong type,
/// or the timeout is not positive.
pub fn load_local_config(
    path: &Path,
    defaults: &SessionSnapshot,
    force: bool,
) -> ConfigResult<SessionSnapshot> {
    let default_timeout = i64::try_from(defaults.timeout_ms)
        .map_err(|_| ConfigError::invalid_argument("Timeout is out of range"))?;
    let bootstrap = document::bootstrap_config(default_timeout, &defaults.phrase);
    let (config, created) = document::load_or_create(path, &bootstrap, force)?;
    if created {
        info!("Created local configuration {}", path.display());
    }

    let malformed = |reason: String| ConfigError::MalformedDocument {
        path: path.to_path_buf(),
        reason,
    };
    let field = |key: &str| {
        config
            .get(key)
            .ok_or_else(|| malformed(format!("missing key '{}'", key)))
    };

    let timeout = field(TIMEOUT_KEY)?
        .as_i64(TIMEOUT_KEY)
        .map_err(|e| malformed(e.to_string()))?;
    let timeout_ms = positive_timeout(timeout)
        .ok_or_else(|| malformed(format!("'{}' must be positive, got {}", TIMEOUT_KEY, timeout)))?;
    let phrase = field(TIMEOUT_PHRASE_KEY)?
        .as_str(TIMEOUT_PHRASE_KEY)
        .map_err(|e| malformed(e.to_string()))?
        .to_string();

    Ok(SessionSnapshot { timeout_ms, phrase })
}

/// Applies a `configurationChanged` payload to the snapshot.
///
/// Each recognized key is coerced on its own; a failure is logged and that key
/// is skipped. Unrecognized keys are ignored. Returns the keys that were applied.
pub fn apply_signal(snapshot: &Mutex<SessionSnapshot>, config: &ConfigMap) -> Vec<String> {
    let timeout = config.get(TIMEOUT_KEY).and_then(|value| {
        match value.as_i64(TIMEOUT_KEY) {
            Ok(ms) => {
                let valid = positive_timeout(ms);
                if valid.is_none() {
                    warn!("Ignoring non-positive {}: {}", TIMEOUT_KEY, ms);
                }
                valid
            }
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    });
    let phrase = config
        .get(TIMEOUT_PHRASE_KEY)
        .and_then(|value| match value.as_str(TIMEOUT_PHRASE_KEY) {
            Ok(phrase) => Some(phrase.to_string()),
            Err(e) => {
                warn!("{}", e);
                None
            }
        });

    let mut applied = Vec::new();
    let mut current = lock_snapshot(snapshot);
    if let Some(ms) = timeout {
        current.timeout_ms = ms;
        applied.push(TIMEOUT_KEY.to_string());
    }
    if let Some(phrase) = phrase {
        current.phrase = phrase;
        applied.push(TIMEOUT_PHRASE_KEY.to_string());
    }
    applied
}

fn run_worker(
    snapshot: Arc<Mutex<SessionSnapshot>>,
    running: Arc<AtomicBool>,
    mut output: Box<dyn Write + Send>,
) {
    while running.load(Ordering::SeqCst) {
        let current = lock_snapshot(&snapshot).clone();
        std::thread::sleep(Duration::from_millis(current.timeout_ms));
        if !running.load(Ordering::SeqCst) {
            break;
        }
        if let Err(e) = writeln!(output, "{}", current.phrase).and_then(|_| output.flush()) {
            error!("Failed to write phrase: {}", e);
        }
    }
    debug!("Worker stopped");
}

/// A connected client: local snapshot, subscription and periodic worker.
pub struct ClientSession {
    app_name: String,
    object_path: String,
    config_path: PathBuf,
    snapshot: Arc<Mutex<SessionSnapshot>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    connection: BusConnection,
    subscription: SignalSubscription,
}

impl ClientSession {
    /// Loads or creates the local file, connects and subscribes, then starts
    /// the worker writing the phrase to `output` after each interval.
    ///
    /// # Errors
    ///
    /// `Connection` if the manager is unreachable; file errors from loading
    /// the local configuration.
    pub async fn start(
        options: SessionOptions,
        output: Box<dyn Write + Send>,
    ) -> ConfigResult<Self> {
        let config_path = match &options.config_path {
            Some(path) => paths::expand_home(path)?,
            None => paths::default_client_config_path()?,
        };
        let app_name = paths::app_name_from_path(&config_path).ok_or_else(|| {
            ConfigError::invalid_argument("Configuration path has no file name")
        })?;
        let object_path = paths::object_path(&app_name);

        let defaults = SessionSnapshot {
            timeout_ms: options.timeout_ms,
            phrase: options.phrase.clone(),
        };
        let initial = load_local_config(&config_path, &defaults, options.force_create)?;
        debug!(
            "Local configuration: {} = {}, {} = {:?}",
            TIMEOUT_KEY, initial.timeout_ms, TIMEOUT_PHRASE_KEY, initial.phrase
        );

        let bus_dir = match options.bus_dir {
            Some(dir) => dir,
            None => paths::bus_dir()?,
        };
        let connection = BusConnection::connect(&bus_dir).await?;
        let subscription =
            SignalSubscription::connect(connection.address(), vec![object_path.clone()]).await?;
        if !connection.is_connected().await {
            return Err(ConfigError::connection("Manager does not answer"));
        }
        info!("Subscribed to {} on {}", paths::CONFIG_CHANGED_SIGNAL, object_path);

        let snapshot = Arc::new(Mutex::new(initial));
        let running = Arc::new(AtomicBool::new(true));
        let worker = {
            let snapshot = snapshot.clone();
            let running = running.clone();
            std::thread::Builder::new()
                .name("phrase-worker".to_string())
                .spawn(move || run_worker(snapshot, running, output))
                .map_err(|e| ConfigError::io(&config_path, e))?
        };

        Ok(Self {
            app_name,
            object_path,
            config_path,
            snapshot,
            running,
            worker: Some(worker),
            connection,
            subscription,
        })
    }

    /// Processes signals until the manager stops or the subscription drops.
    pub async fn run(&mut self) -> SessionEnd {
        loop {
            match self.subscription.recv().await {
                Some(SubscriptionEvent::ConfigurationChanged {
                    object_path,
                    config,
                }) => {
                    if object_path != self.object_path {
                        debug!("Ignoring signal for {}", object_path);
                        continue;
                    }
                    let applied = apply_signal(&self.snapshot, &config);
                    debug!("Applied {:?} from {}", applied, object_path);
                }
                Some(SubscriptionEvent::ManagerStopping) => {
                    info!("Manager is stopping");
                    return SessionEnd::ManagerStopping;
                }
                None => {
                    warn!("Subscription connection closed");
                    return SessionEnd::Disconnected;
                }
            }
        }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Current (timeout, phrase) pair.
    pub fn snapshot(&self) -> SessionSnapshot {
        lock_snapshot(&self.snapshot).clone()
    }

    /// Connection used for method calls on the manager.
    pub fn connection(&self) -> &BusConnection {
        &self.connection
    }

    /// Like [`shutdown`](Self::shutdown), but joins the worker on the blocking
    /// pool so the calling runtime thread stays free while the worker finishes
    /// its current sleep.
    pub async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            match tokio::task::spawn_blocking(move || worker.join()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => error!("Worker thread panicked"),
                Err(e) => error!("Failed to join worker: {}", e),
            }
        }
    }

    /// Clears the running flag and joins the worker. Idempotent.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Worker thread panicked");
            }
        }
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
