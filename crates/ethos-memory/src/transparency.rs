//! Transparency Log.
//!
//! Bounded FIFO audit trail holding one [`TransparencyEntry`] per decision,
//! allowed or denied.  Entries are stored behind [`Arc`] so that a
//! [`TransparencySnapshot`] is a cheap copy-on-read view: appends made after
//! the snapshot was taken never show up in it.
//!
//! # Example
//!
//! ```rust
//! use ethos_memory::transparency::TransparencyLog;
//! # use ethos_types::{Scores, TransparencyEntry};
//! # fn entry(seq: u64) -> TransparencyEntry {
//! #     TransparencyEntry {
//! #         seq,
//! #         id: uuid::Uuid::new_v4(),
//! #         timestamp: chrono::Utc::now(),
//! #         proposed_action: vec![],
//! #         final_action: vec![],
//! #         allowed: true,
//! #         denied_by: vec![],
//! #         scores: Scores::new(),
//! #         coherence: 0.0,
//! #         intrinsic_state: 0.0,
//! #     }
//! # }
//!
//! let mut log = TransparencyLog::new(2);
//! log.append(entry(1));
//! let snapshot = log.snapshot();
//! log.append(entry(2));
//! log.append(entry(3));
//!
//! let live: Vec<u64> = log.entries().map(|e| e.seq).collect();
//! assert_eq!(live, vec![2, 3]);
//! assert_eq!(snapshot.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![1]);
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use ethos_types::TransparencyEntry;

/// Default number of audit entries retained.
pub const DEFAULT_TRANSPARENCY_CAPACITY: usize = 1000;

/// Bounded FIFO of [`TransparencyEntry`] values.
#[derive(Debug, Clone)]
pub struct TransparencyLog {
    capacity: usize,
    entries: VecDeque<Arc<TransparencyEntry>>,
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSPARENCY_CAPACITY)
    }
}

impl TransparencyLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_TRANSPARENCY_CAPACITY)),
        }
    }

    /// Append `entry`, evicting the oldest entry when over capacity.
    pub fn append(&mut self, entry: TransparencyEntry) {
        self.entries.push_back(Arc::new(entry));
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Restartable iterator over the current contents, oldest first.
    ///
    /// Clone the iterator to walk the same sequence again.
    pub fn entries(&self) -> impl Iterator<Item = &TransparencyEntry> + Clone {
        self.entries.iter().map(|e| &**e)
    }

    /// Owned point-in-time copy of the log.
    pub fn snapshot(&self) -> TransparencySnapshot {
        TransparencySnapshot {
            entries: self.entries.iter().cloned().collect(),
        }
    }

    /// The most recent entry, if any.
    pub fn last(&self) -> Option<&TransparencyEntry> {
        self.entries.back().map(|e| &**e)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Immutable view returned by [`TransparencyLog::snapshot`].
#[derive(Debug, Clone, Default)]
pub struct TransparencySnapshot {
    entries: Vec<Arc<TransparencyEntry>>,
}

impl TransparencySnapshot {
    pub fn iter(&self) -> impl Iterator<Item = &TransparencyEntry> + Clone {
        self.entries.iter().map(|e| &**e)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a TransparencySnapshot {
    type Item = &'a TransparencyEntry;
    type IntoIter = std::iter::Map<
        std::slice::Iter<'a, Arc<TransparencyEntry>>,
        fn(&'a Arc<TransparencyEntry>) -> &'a TransparencyEntry,
    >;

    fn into_iter(self) -> Self::IntoIter {
        self.entries
            .iter()
            .map(unwrap_entry as fn(&'a Arc<TransparencyEntry>) -> &'a TransparencyEntry)
    }
}

fn unwrap_entry(entry: &Arc<TransparencyEntry>) -> &TransparencyEntry {
    entry
}
