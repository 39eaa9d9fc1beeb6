/*!
 * Logging capability passed down to pipeline components.
 *
 * Components never log pipeline events through module-level state. They
 * receive a `SharedLog` at construction time:
 * - `FacadeLog` forwards every message to the `log` facade, which the binary
 *   wires to its terminal logger
 * - `CapturingLog` keeps the messages in memory so callers can inspect them
 */

use log::Level;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::Arc;

/// Logging capability injected into each pipeline component
pub trait RunLog: Send + Sync + Debug {
    /// Log a failure of a unit of work
    fn error(&self, message: &str);

    /// Log a recoverable problem
    fn warn(&self, message: &str);

    /// Log progress worth showing to the user
    fn info(&self, message: &str);

    /// Log details useful when diagnosing a run
    fn debug(&self, message: &str);
}

/// Shared handle to a logging capability
pub type SharedLog = Arc<dyn RunLog>;

/// Forwards messages to the `log` facade under a fixed target
#[derive(Debug, Clone)]
pub struct FacadeLog {
    target: &'static str,
}

impl FacadeLog {
    /// Create a facade logger writing under `target`
    pub fn new(target: &'static str) -> Self {
        Self { target }
    }

    /// Create a shared facade logger
    pub fn shared(target: &'static str) -> SharedLog {
        Arc::new(Self::new(target))
    }
}

impl Default for FacadeLog {
    fn default() -> Self {
        Self::new("yomiage")
    }
}

impl RunLog for FacadeLog {
    fn error(&self, message: &str) {
        log::error!(target: self.target, "{}", message);
    }

    fn warn(&self, message: &str) {
        log::warn!(target: self.target, "{}", message);
    }

    fn info(&self, message: &str) {
        log::info!(target: self.target, "{}", message);
    }

    fn debug(&self, message: &str) {
        log::debug!(target: self.target, "{}", message);
    }
}

/// A captured log message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: Level,
    pub message: String,
}

/// Keeps every message in memory, optionally forwarding to the facade as well
#[derive(Debug, Clone, Default)]
pub struct CapturingLog {
    entries: Arc<Mutex<Vec<LogEntry>>>,
    forward: Option<FacadeLog>,
}

impl CapturingLog {
    /// Create an empty capturing logger
    pub fn new() -> Self {
        Self::default()
    }

    /// Also forward captured messages to the `log` facade
    pub fn forwarding(mut self, target: &'static str) -> Self {
        self.forward = Some(FacadeLog::new(target));
        self
    }

    /// Snapshot of the captured entries, oldest first
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    /// Entries logged at `level`
    pub fn entries_at(&self, level: Level) -> Vec<LogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.level == level)
            .cloned()
            .collect()
    }

    /// Whether a message at `level` contains `needle`
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|entry| entry.level == level && entry.message.contains(needle))
    }

    fn push(&self, level: Level, message: &str) {
        self.entries.lock().push(LogEntry {
            level,
            message: message.to_string(),
        });
    }
}

impl RunLog for CapturingLog {
    fn error(&self, message: &str) {
        self.push(Level::Error, message);
        if let Some(forward) = &self.forward {
            forward.error(message);
        }
    }

    fn warn(&self, message: &str) {
        self.push(Level::Warn, message);
        if let Some(forward) = &self.forward {
            forward.warn(message);
        }
    }

    fn info(&self, message: &str) {
        self.push(Level::Info, message);
        if let Some(forward) = &self.forward {
            forward.info(message);
        }
    }

    fn debug(&self, message: &str) {
        self.push(Level::Debug, message);
        if let Some(forward) = &self.forward {
            forward.debug(message);
        }
    }
}
