//! Bounded session message log
//!
//! Append-only ring of inbound/outbound/system entries. The log is owned
//! by the host application and written by the connection controller;
//! queries are read-only and preserve insertion order. Once capacity is
//! reached, the oldest entries are evicted first.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::codec;
use crate::config::DEFAULT_LOG_CAPACITY;

/// Direction of a logged entry relative to this session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Received from the remote peer
    In,
    /// Sent by this session
    Out,
    /// Produced by the session layer itself
    System,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => write!(f, "in"),
            Direction::Out => write!(f, "out"),
            Direction::System => write!(f, "system"),
        }
    }
}

/// Payload classification for display and filtering
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    /// Plain text
    Text,
    /// Text that parsed as JSON
    Json,
    /// Raw bytes, stored base64-encoded
    Binary,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadKind::Text => write!(f, "text"),
            PayloadKind::Json => write!(f, "json"),
            PayloadKind::Binary => write!(f, "binary"),
        }
    }
}

/// A single log entry, immutable once appended
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Monotonic entry ID, unique within this log
    pub id: u64,

    /// When the entry was appended, in microseconds since UNIX epoch
    pub timestamp: u64,

    /// Entry direction
    pub direction: Direction,

    /// Payload classification
    pub kind: PayloadKind,

    /// Text payloads verbatim; binary payloads base64-encoded
    pub payload: String,
}

impl LogEntry {
    /// Short display form of the payload: text truncated to `max_len`
    /// characters, binary rendered as a hex dump
    pub fn preview(&self, max_len: usize) -> String {
        match self.kind {
            PayloadKind::Binary => match codec::base64_to_bytes(&self.payload) {
                Ok(bytes) => codec::binary_preview(&bytes, max_len),
                Err(_) => truncate_chars(&self.payload, max_len),
            },
            _ => truncate_chars(&self.payload, max_len),
        }
    }
}

fn truncate_chars(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_len).collect();
        format!("{truncated}..")
    }
}

/// Filter predicates for [`MessageLog::query`]
///
/// All present conditions must match. An empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    /// Match entries with this direction
    pub direction: Option<Direction>,
    /// Match entries with this payload kind
    pub kind: Option<PayloadKind>,
    /// Match entries whose payload contains this substring
    pub contains: Option<String>,
}

impl LogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn kind(mut self, kind: PayloadKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn contains(mut self, needle: impl Into<String>) -> Self {
        self.contains = Some(needle.into());
        self
    }

    fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(direction) = self.direction {
            if entry.direction != direction {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if entry.kind != kind {
                return false;
            }
        }
        if let Some(needle) = &self.contains {
            if !entry.payload.contains(needle.as_str()) {
                return false;
            }
        }
        true
    }
}

struct LogInner {
    entries: VecDeque<LogEntry>,
    next_id: u64,
}

/// Bounded message log
///
/// This struct is Clone-able because it uses Arc<Mutex<>> for shared
/// state, allowing the host to read while the controller appends without
/// holding locks across awaits.
#[derive(Clone)]
pub struct MessageLog {
    inner: Arc<Mutex<LogInner>>,
    capacity: usize,
}

impl MessageLog {
    /// Create a log with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }

    /// Create a log holding at most `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(LogInner {
                entries: VecDeque::with_capacity(capacity),
                next_id: 0,
            })),
            capacity,
        }
    }

    /// Append one entry, evicting the oldest past capacity
    pub async fn append(
        &self,
        direction: Direction,
        kind: PayloadKind,
        payload: impl Into<String>,
    ) -> LogEntry {
        let mut inner = self.inner.lock().await;
        let entry = LogEntry {
            id: inner.next_id,
            timestamp: now_micros(),
            direction,
            kind,
            payload: payload.into(),
        };
        inner.next_id += 1;
        inner.entries.push_back(entry.clone());
        while inner.entries.len() > self.capacity {
            inner.entries.pop_front();
        }
        entry
    }

    /// Return entries matching the filter, preserving insertion order
    pub async fn query(&self, filter: &LogFilter) -> Vec<LogEntry> {
        let inner = self.inner.lock().await;
        inner
            .entries
            .iter()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect()
    }

    /// Return all entries in insertion order
    pub async fn snapshot(&self) -> Vec<LogEntry> {
        let inner = self.inner.lock().await;
        inner.entries.iter().cloned().collect()
    }

    /// Remove all entries; entry IDs keep counting up
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.entries.clear();
    }

    /// Current number of entries
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    /// True when the log holds no entries
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }

    /// Maximum number of retained entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new()
    }
}

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}
