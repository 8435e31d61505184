//! In-memory load table.
//!
//! Counts running jobs per function and per task type, and queued jobs per
//! task type. Only the admission queue mutates it; policies read copies.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
struct Counts {
    running_by_function: HashMap<String, u32>,
    running_by_type: HashMap<i64, u32>,
    queued_by_type: HashMap<i64, u32>,
    total_running: u32,
}

/// Per-node job counters.
#[derive(Debug, Default)]
pub struct LoadTable {
    counts: Mutex<Counts>,
    next_request: AtomicU64,
    next_peer_request: AtomicU64,
}

fn decrement<K: std::hash::Hash + Eq>(map: &mut HashMap<K, u32>, key: &K) {
    if let Some(v) = map.get_mut(key) {
        *v = v.saturating_sub(1);
        if *v == 0 {
            map.remove(key);
        }
    }
}

impl LoadTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn counts(&self) -> std::sync::MutexGuard<'_, Counts> {
        self.counts.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_queued(&self, task_type: i64) {
        *self.counts().queued_by_type.entry(task_type).or_default() += 1;
    }

    pub fn set_dequeued(&self, task_type: i64) {
        decrement(&mut self.counts().queued_by_type, &task_type);
    }

    pub fn set_function_running(&self, function: &str, task_type: i64) {
        let mut counts = self.counts();
        *counts
            .running_by_function
            .entry(function.to_string())
            .or_default() += 1;
        *counts.running_by_type.entry(task_type).or_default() += 1;
        counts.total_running += 1;
    }

    pub fn set_function_stopped(&self, function: &str, task_type: i64) {
        let mut counts = self.counts();
        decrement(&mut counts.running_by_function, &function.to_string());
        decrement(&mut counts.running_by_type, &task_type);
        counts.total_running = counts.total_running.saturating_sub(1);
    }

    pub fn total_running(&self) -> u32 {
        self.counts().total_running
    }

    pub fn running_instances(&self, function: &str) -> u32 {
        self.counts()
            .running_by_function
            .get(function)
            .copied()
            .unwrap_or(0)
    }

    /// Running counts for task types `0..types`.
    pub fn running_by_type(&self, types: usize) -> Vec<u32> {
        let counts = self.counts();
        (0..types as i64)
            .map(|t| counts.running_by_type.get(&t).copied().unwrap_or(0))
            .collect()
    }

    /// Queued counts for task types `0..types`.
    pub fn queued_by_type(&self, types: usize) -> Vec<u32> {
        let counts = self.counts();
        (0..types as i64)
            .map(|t| counts.queued_by_type.get(&t).copied().unwrap_or(0))
            .collect()
    }

    /// Next id for a request received from a client.
    pub fn next_request_id(&self) -> u64 {
        self.next_request.fetch_add(1, Ordering::Relaxed)
    }

    /// Next id for a request received from a peer.
    pub fn next_peer_request_id(&self) -> u64 {
        self.next_peer_request.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_counts_track_start_and_stop() {
        let table = LoadTable::new();
        table.set_function_running("figlet", 0);
        table.set_function_running("figlet", 1);
        table.set_function_running("resize", 1);

        assert_eq!(table.total_running(), 3);
        assert_eq!(table.running_instances("figlet"), 2);
        assert_eq!(table.running_by_type(3), vec![1, 2, 0]);

        table.set_function_stopped("figlet", 1);
        assert_eq!(table.total_running(), 2);
        assert_eq!(table.running_instances("figlet"), 1);
        assert_eq!(table.running_by_type(2), vec![1, 1]);
    }

    #[test]
    fn stop_never_underflows() {
        let table = LoadTable::new();
        table.set_function_stopped("ghost", 0);
        table.set_dequeued(0);
        assert_eq!(table.total_running(), 0);
        assert_eq!(table.queued_by_type(1), vec![0]);
    }

    #[test]
    fn queued_counts_per_type() {
        let table = LoadTable::new();
        table.set_queued(2);
        table.set_queued(2);
        table.set_queued(0);
        assert_eq!(table.queued_by_type(3), vec![1, 0, 2]);

        table.set_dequeued(2);
        assert_eq!(table.queued_by_type(3), vec![1, 0, 1]);
    }

    #[test]
    fn request_ids_are_monotonic_and_independent() {
        let table = LoadTable::new();
        assert_eq!(table.next_request_id(), 0);
        assert_eq!(table.next_request_id(), 1);
        assert_eq!(table.next_peer_request_id(), 0);
        assert_eq!(table.next_request_id(), 2);
    }
}
