//! Shared helpers for unit and integration tests.

use crate::document::SignalEmitter;
use crate::value::ConfigMap;
use async_trait::async_trait;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Emitter that records every broadcast instead of sending it.
#[derive(Default)]
pub struct RecordingEmitter {
    signals: Mutex<Vec<(String, ConfigMap)>>,
}

impl RecordingEmitter {
    pub fn signals(&self) -> Vec<(String, ConfigMap)> {
        self.signals.lock().unwrap().clone()
    }
}

#[async_trait]
impl SignalEmitter for RecordingEmitter {
    async fn emit_configuration_changed(&self, object_path: &str, config: ConfigMap) {
        self.signals
            .lock()
            .unwrap()
            .push((object_path.to_string(), config));
    }
}

/// Writes a raw JSON document into `dir`.
pub fn write_json(dir: &Path, file_name: &str, content: &str) {
    std::fs::write(dir.join(file_name), content).unwrap();
}

/// `Write` sink whose contents can be inspected from another thread.
#[derive(Clone, Default)]
pub struct SharedOutput {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl SharedOutput {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().unwrap()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
