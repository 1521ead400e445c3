//! Process-wide priority table for fork-join episodes.
//!
//! Every running [`Flow`](crate::threading::flow::Flow) registers here for the
//! duration of its episode. Exactly one registered episode is active at a
//! time: the one with the highest priority, ties going to the most recently
//! registered. All other episodes have their [`PauseGate`] closed, which parks
//! their workers at the next barrier (or at entry) until they become active
//! again. Nothing is cancelled; parked work resumes where it stopped.
//!
//! The registry is an ordinary value so tests and embedders can inject their
//! own; [`PriorityRegistry::global`] is the process default.

use crate::core::error::EpisodeId;
use log::debug;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Scheduling priority of an episode. Higher values preempt lower ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub u8);

impl Priority {
    /// Background work such as cache warming.
    pub const BACKGROUND: Priority = Priority(0);
    /// Full-resolution export.
    pub const EXPORT: Priority = Priority(10);
    /// Interactive preview tiles.
    pub const PREVIEW: Priority = Priority(20);
    /// Work the user is actively waiting on (e.g. a zoomed-in crop).
    pub const INTERACTIVE: Priority = Priority(30);
}

impl Default for Priority {
    fn default() -> Self {
        Priority::EXPORT
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Pause flag of one episode with its own condition variable, separate from
/// the episode's barrier lock.
#[derive(Debug, Default)]
pub struct PauseGate {
    paused: AtomicBool,
    lock: Mutex<()>,
    cond: Condvar,
}

impl PauseGate {
    /// Create an open gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the gate is closed.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Open or close the gate.
    pub fn set_paused(&self, paused: bool) {
        let _guard = self.lock.lock();
        self.paused.store(paused, Ordering::Release);
        if !paused {
            self.cond.notify_all();
        }
    }

    /// Block while the gate is closed, unless `cancelled` becomes set.
    /// Returns `true` if the caller had to wait.
    pub fn wait_while_paused(&self, cancelled: &AtomicBool) -> bool {
        if !self.is_paused() {
            return false;
        }
        let mut guard = self.lock.lock();
        let mut waited = false;
        while self.is_paused() && !cancelled.load(Ordering::Acquire) {
            waited = true;
            self.cond.wait(&mut guard);
        }
        waited
    }

    /// Wake every waiter so it can re-check its cancellation flag.
    pub fn wake_all(&self) {
        let _guard = self.lock.lock();
        self.cond.notify_all();
    }
}

#[derive(Debug)]
struct Entry {
    episode: EpisodeId,
    gate: Arc<PauseGate>,
}

/// Table of registered episodes keyed by `(priority, registration order)`.
#[derive(Debug, Default)]
pub struct PriorityRegistry {
    table: Mutex<BTreeMap<(Priority, u64), Entry>>,
    next_seq: AtomicU64,
}

impl PriorityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or initialize the process-wide registry.
    pub fn global() -> Arc<Self> {
        static REGISTRY: OnceLock<Arc<PriorityRegistry>> = OnceLock::new();
        REGISTRY.get_or_init(|| Arc::new(PriorityRegistry::new())).clone()
    }

    /// Register an episode. It stays registered until the returned guard drops.
    pub fn register(&self, priority: Priority, episode: EpisodeId) -> Registration<'_> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let gate = Arc::new(PauseGate::new());
        let key = (priority, seq);
        {
            let mut table = self.table.lock();
            table.insert(
                key,
                Entry {
                    episode,
                    gate: gate.clone(),
                },
            );
            Self::rebalance(&table);
        }
        debug!("Episode {} registered at {}", episode, priority);
        Registration {
            registry: self,
            key,
            episode,
            gate,
        }
    }

    fn unregister(&self, key: (Priority, u64), episode: EpisodeId) {
        let mut table = self.table.lock();
        table.remove(&key);
        Self::rebalance(&table);
        debug!("Episode {} unregistered", episode);
    }

    /// Close every gate except the active episode's.
    fn rebalance(table: &BTreeMap<(Priority, u64), Entry>) {
        let active = table.keys().next_back().copied();
        for (key, entry) in table.iter() {
            let paused = Some(*key) != active;
            if entry.gate.is_paused() != paused {
                debug!(
                    "Episode {} {}",
                    entry.episode,
                    if paused { "paused" } else { "resumed" }
                );
                entry.gate.set_paused(paused);
            }
        }
    }

    /// The episode currently allowed to run, if any.
    pub fn active(&self) -> Option<(Priority, EpisodeId)> {
        let table = self.table.lock();
        table
            .iter()
            .next_back()
            .map(|((priority, _), entry)| (*priority, entry.episode))
    }

    /// Number of registered episodes.
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    /// Check if no episode is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Registration of one episode; unregisters on drop.
#[derive(Debug)]
pub struct Registration<'r> {
    registry: &'r PriorityRegistry,
    key: (Priority, u64),
    episode: EpisodeId,
    gate: Arc<PauseGate>,
}

impl Registration<'_> {
    /// Pause gate of this episode.
    pub fn gate(&self) -> &Arc<PauseGate> {
        &self.gate
    }

    /// Priority this episode registered with.
    pub fn priority(&self) -> Priority {
        self.key.0
    }

    /// Episode identifier.
    pub fn episode(&self) -> EpisodeId {
        self.episode
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.unregister(self.key, self.episode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_single_registration_is_active() {
        let registry = PriorityRegistry::new();
        let reg = registry.register(Priority::EXPORT, EpisodeId::new());
        assert!(!reg.gate().is_paused());
        assert_eq!(registry.active(), Some((Priority::EXPORT, reg.episode())));
        drop(reg);
        assert!(registry.is_empty());
        assert_eq!(registry.active(), None);
    }

    #[test]
    fn test_higher_priority_pauses_lower() {
        let registry = PriorityRegistry::new();
        let low = registry.register(Priority::EXPORT, EpisodeId::new());
        let high = registry.register(Priority::PREVIEW, EpisodeId::new());
        assert!(low.gate().is_paused());
        assert!(!high.gate().is_paused());

        drop(high);
        assert!(!low.gate().is_paused());
    }

    #[test]
    fn test_lower_priority_registers_paused() {
        let registry = PriorityRegistry::new();
        let high = registry.register(Priority::INTERACTIVE, EpisodeId::new());
        let low = registry.register(Priority::BACKGROUND, EpisodeId::new());
        assert!(low.gate().is_paused());
        assert!(!high.gate().is_paused());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_equal_priority_newest_wins() {
        let registry = PriorityRegistry::new();
        let first = registry.register(Priority::PREVIEW, EpisodeId::new());
        let second = registry.register(Priority::PREVIEW, EpisodeId::new());
        assert!(first.gate().is_paused());
        assert!(!second.gate().is_paused());
        drop(second);
        assert!(!first.gate().is_paused());
    }

    #[test]
    fn test_three_levels_resume_in_order() {
        let registry = PriorityRegistry::new();
        let a = registry.register(Priority::BACKGROUND, EpisodeId::new());
        let b = registry.register(Priority::EXPORT, EpisodeId::new());
        let c = registry.register(Priority::PREVIEW, EpisodeId::new());
        assert!(a.gate().is_paused() && b.gate().is_paused() && !c.gate().is_paused());
        drop(c);
        assert!(a.gate().is_paused() && !b.gate().is_paused());
        drop(b);
        assert!(!a.gate().is_paused());
    }

    #[test]
    fn test_gate_blocks_until_reopened() {
        let gate = Arc::new(PauseGate::new());
        let cancelled = Arc::new(AtomicBool::new(false));
        gate.set_paused(true);

        let waiter = {
            let gate = gate.clone();
            let cancelled = cancelled.clone();
            thread::spawn(move || gate.wait_while_paused(&cancelled))
        };
        thread::sleep(Duration::from_millis(30));
        assert!(!waiter.is_finished());
        gate.set_paused(false);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_gate_released_by_cancellation() {
        let gate = Arc::new(PauseGate::new());
        let cancelled = Arc::new(AtomicBool::new(false));
        gate.set_paused(true);

        let waiter = {
            let gate = gate.clone();
            let cancelled = cancelled.clone();
            thread::spawn(move || gate.wait_while_paused(&cancelled))
        };
        thread::sleep(Duration::from_millis(20));
        cancelled.store(true, Ordering::Release);
        gate.wake_all();
        assert!(waiter.join().unwrap());
        assert!(gate.is_paused());
    }
}
