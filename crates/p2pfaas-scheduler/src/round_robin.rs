//! Round-robin cursor over a peer list.
//!
//! The cursor is held under a mutex so that concurrent callers observe a
//! strictly cyclic sequence even when the list length changes between
//! calls: a cursor past the end restarts at zero.

use std::sync::Mutex;

/// A persistent round-robin cursor.
#[derive(Debug, Default)]
pub struct RoundRobinCursor {
    cursor: Mutex<usize>,
}

impl RoundRobinCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the next index into a list of `count` entries.
    ///
    /// Returns `None` if count is zero.
    pub fn next(&self, count: usize) -> Option<usize> {
        if count == 0 {
            return None;
        }
        let mut cursor = self.cursor.lock().unwrap_or_else(|e| e.into_inner());
        if *cursor >= count {
            *cursor = 0;
        }
        let picked = *cursor;
        *cursor = (picked + 1) % count;
        Some(picked)
    }
}
