//! The per-window request log.

use parking_lot::Mutex;

/// Append-only log of client identifiers observed during the current
/// window.
///
/// Entries carry no timestamps of their own; the limiter's periodic reset
/// task clears the whole log at each window boundary. A single mutex
/// guards the sequence, so appends, counts, and the wholesale clear never
/// observe each other mid-operation.
#[derive(Debug, Default)]
pub struct WindowLog {
    /// Identifiers recorded since the last reset, in arrival order.
    entries: Mutex<Vec<String>>,
}

impl WindowLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Append an identifier to the current window.
    ///
    /// No deduplication, no growth bound between resets.
    pub fn record(&self, identifier: String) {
        self.entries.lock().push(identifier);
    }

    /// Number of entries in the current window exactly equal to
    /// `identifier`.
    pub fn count_matches(&self, identifier: &str) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.as_str() == identifier)
            .count()
    }

    /// Count existing matches for `identifier`, then append it, under one
    /// lock acquisition.
    ///
    /// Returns the count as it stood before the append.
    pub fn count_and_record(&self, identifier: String) -> usize {
        let mut entries = self.entries.lock();
        let count = entries
            .iter()
            .filter(|entry| entry.as_str() == identifier)
            .count();
        entries.push(identifier);
        count
    }

    /// Replace the sequence with an empty one, starting a fresh window.
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        *entries = Vec::new();
    }

    /// Total number of entries in the current window, across all clients.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the current window holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
