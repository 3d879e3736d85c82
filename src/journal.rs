//! Structured log sinks.
//!
//! vigil never writes log lines itself on a request path. Everything the
//! middleware report goes through a [`Journaler`]: a sink that accepts a
//! [`Level`] and a map of [`Fields`]. Where the entries end up (stdout, a
//! file, a remote collector) is the journaler's business.
//!
//! Two journalers ship with the crate:
//!
//! - [`TracingJournaler`] forwards entries to `tracing` and is the process
//!   default.
//! - [`MemoryJournaler`] keeps entries in memory so tests can assert on them.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::Error;

/// The key a journaler treats as the human-readable message of an entry.
pub const MESSAGE_KEY: &str = "message";

/// The payload of one structured entry.
pub type Fields = serde_json::Map<String, Value>;

/// Entry severity.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, Hash)]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

/// A structured log sink.
///
/// Implementations must tolerate concurrent calls from many requests.
/// Ordering between requests is not guaranteed; ordering of one request's
/// entries is, because a request only ever logs from its own task.
pub trait Journaler: Send + Sync + 'static {
    fn send(&self, level: Level, fields: Fields);

    fn debug(&self, fields: Fields) { self.send(Level::Debug, fields) }
    fn info(&self, fields: Fields) { self.send(Level::Info, fields) }
    fn warning(&self, fields: Fields) { self.send(Level::Warning, fields) }
    fn error(&self, fields: Fields) { self.send(Level::Error, fields) }
}

// ── Process default ───────────────────────────────────────────────────────────

static DEFAULT: OnceLock<Arc<dyn Journaler>> = OnceLock::new();

/// The process-wide journaler used when a request carries none.
///
/// Initialised to a [`TracingJournaler`] on first use.
pub fn default_journaler() -> Arc<dyn Journaler> {
    Arc::clone(DEFAULT.get_or_init(|| Arc::new(TracingJournaler) as Arc<dyn Journaler>))
}

/// Replaces the process-wide journaler.
///
/// Only possible before anything has read the default; call it once during
/// start-up, before serving.
pub fn set_default_journaler(journaler: Arc<dyn Journaler>) -> Result<(), Error> {
    DEFAULT.set(journaler).map_err(|_| Error::DefaultJournalerAlreadySet)
}

// ── TracingJournaler ──────────────────────────────────────────────────────────

/// Forwards entries to the `tracing` ecosystem.
///
/// The `message` field becomes the event message; the remaining fields are
/// rendered as one JSON object under `fields`. Install a subscriber
/// (`tracing_subscriber::fmt::init()`) to see them.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingJournaler;

impl Journaler for TracingJournaler {
    fn send(&self, level: Level, mut fields: Fields) {
        let message = match fields.remove(MESSAGE_KEY) {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let fields = Value::Object(fields);

        match level {
            Level::Debug => tracing::debug!(target: "vigil", fields = %fields, "{message}"),
            Level::Info => tracing::info!(target: "vigil", fields = %fields, "{message}"),
            Level::Warning => tracing::warn!(target: "vigil", fields = %fields, "{message}"),
            Level::Error => tracing::error!(target: "vigil", fields = %fields, "{message}"),
        }
    }
}

// ── MemoryJournaler ───────────────────────────────────────────────────────────

/// One captured entry.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    pub level: Level,
    pub fields: Fields,
}

impl Entry {
    /// The entry's `message` field, if it is a string.
    pub fn message(&self) -> Option<&str> {
        self.fields.get(MESSAGE_KEY).and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// Keeps every entry in memory, oldest first.
///
/// Meant for tests:
///
/// ```rust
/// use std::sync::Arc;
/// use vigil::journal::{Journaler, Level, MemoryJournaler};
///
/// let sink = Arc::new(MemoryJournaler::default());
/// sink.info(serde_json::Map::new());
/// assert_eq!(sink.len(), 1);
/// assert_eq!(sink.pop_front().unwrap().level, Level::Info);
/// ```
#[derive(Debug, Default)]
pub struct MemoryJournaler {
    entries: Mutex<VecDeque<Entry>>,
}

impl MemoryJournaler {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.entries.lock().len() }
    pub fn is_empty(&self) -> bool { self.entries.lock().is_empty() }

    /// Removes and returns the oldest entry.
    pub fn pop_front(&self) -> Option<Entry> { self.entries.lock().pop_front() }

    /// Snapshot of every entry still held.
    pub fn entries(&self) -> Vec<Entry> { self.entries.lock().iter().cloned().collect() }
}

impl Journaler for MemoryJournaler {
    fn send(&self, level: Level, fields: Fields) {
        self.entries.lock().push_back(Entry { level, fields });
    }
}
