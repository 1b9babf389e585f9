//! Session view-models and per-session log lines.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use wadash_protocol::{Session, SessionUpdate};

/// Lines kept per session before the oldest ones are evicted.
pub const DEFAULT_LOG_CAPACITY: usize = 500;

/// Bounded, append-only log for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogBuffer {
    lines: VecDeque<String>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    /// Append a line, returning `true` if an old line had to be dropped.
    pub fn push(&mut self, line: String) -> bool {
        let evicted = if self.lines.len() == self.capacity {
            self.lines.pop_front();
            true
        } else {
            false
        };
        self.lines.push_back(line);
        evicted
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn latest(&self) -> Option<&str> {
        self.lines.back().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Every session the backend has told us about, keyed by id.
#[derive(Debug, Clone)]
pub struct SessionBook {
    sessions: BTreeMap<String, Session>,
    /// Shared with snapshots; copied on the next append.
    logs: HashMap<String, Arc<LogBuffer>>,
    log_capacity: usize,
}

impl Default for SessionBook {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl SessionBook {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            sessions: BTreeMap::new(),
            logs: HashMap::new(),
            log_capacity,
        }
    }

    /// Replace the whole map with a backend snapshot. Logs are kept.
    pub fn seed(&mut self, sessions: Vec<Session>) {
        self.sessions = sessions
            .into_iter()
            .map(|session| (session.id.clone(), session))
            .collect();
    }

    /// Shallow-merge a partial update, creating the record if needed.
    pub fn merge(&mut self, update: SessionUpdate) -> &Session {
        let id = update.id.clone();
        let session = match self.sessions.entry(id) {
            std::collections::btree_map::Entry::Occupied(entry) => {
                let session = entry.into_mut();
                session.apply(update);
                session
            }
            std::collections::btree_map::Entry::Vacant(entry) => {
                entry.insert(Session::from_update(update))
            }
        };
        session
    }

    pub fn remove(&mut self, id: &str) -> Option<Session> {
        self.sessions.remove(id)
    }

    pub fn append_log(&mut self, id: &str, line: String) {
        let capacity = self.log_capacity;
        let buffer = self
            .logs
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(LogBuffer::new(capacity)));
        Arc::make_mut(buffer).push(line);
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Sessions in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn logs(&self, id: &str) -> Option<&LogBuffer> {
        self.logs.get(id).map(Arc::as_ref)
    }
}
