//! Fork-join episodes with priority preemption.
//!
//! A [`Flow`] runs one body closure on N workers. Each call to
//! [`Flow::flow`] is one episode: register in the priority table, spawn the
//! workers on scoped OS threads (or run inline when N is 1), join them, and
//! unregister. While a higher or equal priority episode is registered, this
//! episode's workers are parked at their next barrier.
//!
//! ```rust,ignore
//! let sum = AtomicUsize::new(0);
//! let flow = Flow::new(Priority::PREVIEW, 4, |sf: &SubFlow<'_>| {
//!     if sf.sync_point_pre()? {
//!         sf.cursor().reset(rows);
//!     }
//!     sf.sync_point_post()?;
//!     while let Some(row) = sf.next_index() {
//!         sum.fetch_add(row, Ordering::Relaxed);
//!     }
//!     sf.sync_point()
//! });
//! flow.flow()?;
//! ```

use crate::core::config::resolve_threads;
use crate::core::error::{EpisodeId, FlowError, FlowResult};
use crate::threading::priority::{Priority, PriorityRegistry};
use crate::threading::subflow::{EpisodeShared, SubFlow};
use log::{debug, trace};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Statistics of a completed episode.
#[derive(Debug, Clone)]
pub struct FlowStats {
    /// Episode identifier.
    pub episode: EpisodeId,
    /// Priority the episode ran at.
    pub priority: Priority,
    /// Number of workers.
    pub threads: usize,
    /// Wall time from registration to unregistration.
    pub duration: Duration,
}

/// Aborts the episode if the worker unwinds from a panic, so peers blocked in
/// a barrier are released instead of waiting forever.
struct AbortOnPanic<'e> {
    shared: &'e EpisodeShared,
}

impl Drop for AbortOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.shared.abort();
        }
    }
}

/// A fork-join episode runner.
pub struct Flow<F> {
    priority: Priority,
    threads: usize,
    registry: Arc<PriorityRegistry>,
    body: F,
}

impl<F> std::fmt::Debug for Flow<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flow")
            .field("priority", &self.priority)
            .field("threads", &self.threads)
            .field("body", &"<closure>")
            .finish()
    }
}

impl<F> Flow<F>
where
    F: Fn(&SubFlow<'_>) -> FlowResult<()> + Sync,
{
    /// Create a flow with `threads` workers (0 = detected core count),
    /// registered in the process-wide priority table.
    pub fn new(priority: Priority, threads: usize, body: F) -> Self {
        Self {
            priority,
            threads: resolve_threads(threads),
            registry: PriorityRegistry::global(),
            body,
        }
    }

    /// Use an injected priority table instead of the process-wide one.
    pub fn with_registry(mut self, registry: Arc<PriorityRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Number of workers per episode.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Priority of this flow.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Run one episode and wait for every worker to finish.
    ///
    /// Returns the first failure recorded by a worker, [`FlowError::Aborted`]
    /// if the main worker cancelled the episode, or the episode statistics.
    pub fn flow(&self) -> FlowResult<FlowStats> {
        let start = Instant::now();
        let episode = EpisodeId::new();
        let registration = self.registry.register(self.priority, episode);
        let shared = EpisodeShared::new(episode, self.threads, registration.gate().clone());
        debug!(
            "Episode {} starting on {} worker(s) at {}",
            episode, self.threads, self.priority
        );

        if self.threads == 1 {
            self.run_worker(&shared, 0);
        } else {
            thread::scope(|scope| {
                let mut handles = Vec::with_capacity(self.threads);
                for id in 0..self.threads {
                    let shared = &shared;
                    let spawned = thread::Builder::new()
                        .name(format!("flow-{}-{}", episode, id))
                        .spawn_scoped(scope, move || self.run_worker(shared, id));
                    match spawned {
                        Ok(handle) => handles.push((id, handle)),
                        Err(error) => {
                            shared.fail(FlowError::Spawn {
                                thread: id,
                                error: error.to_string(),
                            });
                            break;
                        }
                    }
                }
                for (id, handle) in handles {
                    if handle.join().is_err() {
                        shared.fail(FlowError::WorkerPanicked { thread: id });
                    }
                }
            });
        }

        drop(registration);
        let duration = start.elapsed();
        if let Some(failure) = shared.take_failure() {
            debug!("Episode {} failed after {:?}: {}", episode, duration, failure);
            return Err(failure);
        }
        if shared.is_aborted() {
            debug!("Episode {} aborted after {:?}", episode, duration);
            return Err(FlowError::Aborted);
        }
        debug!("Episode {} finished in {:?}", episode, duration);
        Ok(FlowStats {
            episode,
            priority: self.priority,
            threads: self.threads,
            duration,
        })
    }

    /// Per-thread trampoline: wait at entry while paused, run the body, and
    /// turn its outcome into episode state.
    fn run_worker(&self, shared: &EpisodeShared, id: usize) {
        let _guard = AbortOnPanic { shared };
        let sf = SubFlow::new(id, shared);
        let result = shared.pause_point().and_then(|()| (self.body)(&sf));
        match result {
            Ok(()) => trace!("Worker {} of episode {} done", id, shared.episode()),
            Err(FlowError::Aborted) => {
                trace!("Worker {} of episode {} unwound", id, shared.episode())
            }
            Err(error) => shared.fail(error),
        }
    }
}

/// Run `body` as a single episode.
pub fn run_flow<F>(priority: Priority, threads: usize, body: F) -> FlowResult<FlowStats>
where
    F: Fn(&SubFlow<'_>) -> FlowResult<()> + Sync,
{
    Flow::new(priority, threads, body).flow()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc;

    fn isolated() -> Arc<PriorityRegistry> {
        Arc::new(PriorityRegistry::new())
    }

    /// Sum of squares over `rows` indices, accumulated per worker in private
    /// slots and folded by main after a barrier.
    fn sum_of_squares(threads: usize, rows: usize) -> usize {
        let total = AtomicUsize::new(0);
        let flow = Flow::new(Priority::EXPORT, threads, |sf: &SubFlow<'_>| {
            if sf.sync_point_pre()? {
                sf.cursor().reset(rows);
            }
            sf.sync_point_post()?;
            let mut local = 0;
            while let Some(i) = sf.next_index() {
                local += i * i;
            }
            sf.set_private(sf.id(), local)?;
            sf.sync_point()?;
            if sf.is_main() {
                for slot in 0..sf.threads_count() {
                    let part = sf.get_private_of::<usize>(slot)?.map(|v| *v).unwrap_or(0);
                    total.fetch_add(part, Ordering::Relaxed);
                }
            }
            Ok(())
        })
        .with_registry(isolated());
        flow.flow().unwrap();
        total.load(Ordering::Relaxed)
    }

    #[test]
    fn test_serial_and_parallel_agree() {
        let expected: usize = (0..1000).map(|i| i * i).sum();
        assert_eq!(sum_of_squares(1, 1000), expected);
        for threads in [2, 3, 8] {
            assert_eq!(sum_of_squares(threads, 1000), expected);
        }
    }

    #[test]
    fn test_writes_visible_after_barrier() {
        for threads in 1..=6 {
            let counter = AtomicUsize::new(0);
            let flow = Flow::new(Priority::EXPORT, threads, |sf: &SubFlow<'_>| {
                for round in 1..=20 {
                    counter.fetch_add(1, Ordering::Relaxed);
                    sf.sync_point()?;
                    assert_eq!(counter.load(Ordering::Relaxed), round * sf.threads_count());
                    sf.sync_point()?;
                }
                Ok(())
            })
            .with_registry(isolated());
            let stats = flow.flow().unwrap();
            assert_eq!(stats.threads, threads);
            assert_eq!(counter.load(Ordering::Relaxed), 20 * threads);
        }
    }

    #[test]
    fn test_registry_empty_after_episode() {
        let registry = isolated();
        let flow = Flow::new(Priority::PREVIEW, 2, |sf: &SubFlow<'_>| sf.sync_point())
            .with_registry(registry.clone());
        flow.flow().unwrap();
        flow.flow().unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_abort_from_main_releases_workers() {
        let finished = AtomicUsize::new(0);
        let flow = Flow::new(Priority::EXPORT, 4, |sf: &SubFlow<'_>| {
            if sf.is_main() {
                // let the peers block in the barrier first
                std::thread::sleep(Duration::from_millis(20));
                sf.abort();
                return Ok(());
            }
            sf.sync_point()?;
            finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .with_registry(isolated());
        assert!(matches!(flow.flow(), Err(FlowError::Aborted)));
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_worker_error_is_reported_and_cancels_peers() {
        let flow = Flow::new(Priority::EXPORT, 3, |sf: &SubFlow<'_>| {
            if sf.id() == 2 {
                return Err(FlowError::Worker {
                    thread: 2,
                    message: "bad row".to_string(),
                });
            }
            sf.sync_point()
        })
        .with_registry(isolated());
        match flow.flow() {
            Err(FlowError::Worker { thread, .. }) => assert_eq!(thread, 2),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_out_of_memory_in_setup_window() {
        let reached_work = AtomicBool::new(false);
        let flow = Flow::new(Priority::EXPORT, 3, |sf: &SubFlow<'_>| {
            if sf.sync_point_pre()? {
                sf.fail(FlowError::OutOfMemory { bytes: usize::MAX });
            }
            sf.sync_point_post()?;
            reached_work.store(true, Ordering::SeqCst);
            Ok(())
        })
        .with_registry(isolated());
        assert!(matches!(flow.flow(), Err(FlowError::OutOfMemory { .. })));
        assert!(!reached_work.load(Ordering::SeqCst));
    }

    #[test]
    fn test_panicking_worker_does_not_deadlock() {
        let flow = Flow::new(Priority::EXPORT, 3, |sf: &SubFlow<'_>| {
            if sf.id() == 1 {
                panic!("worker bug");
            }
            sf.sync_point()
        })
        .with_registry(isolated());
        assert!(matches!(
            flow.flow(),
            Err(FlowError::WorkerPanicked { thread: 1 })
        ));
    }

    #[test]
    fn test_higher_priority_blocks_lower_until_done() {
        let registry = isolated();
        let release_high = AtomicBool::new(false);
        let low_progress = AtomicUsize::new(0);
        let (started_tx, started_rx) = mpsc::channel();
        let started_tx = Mutex::new(started_tx);

        let high = Flow::new(Priority::INTERACTIVE, 2, |sf: &SubFlow<'_>| {
            if sf.is_main() {
                let _ = started_tx.lock().send(());
                while !release_high.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
            sf.sync_point()
        })
        .with_registry(registry.clone());

        let low = Flow::new(Priority::BACKGROUND, 2, |sf: &SubFlow<'_>| {
            for _ in 0..10 {
                sf.sync_point()?;
                if sf.is_main() {
                    low_progress.fetch_add(1, Ordering::SeqCst);
                }
            }
            Ok(())
        })
        .with_registry(registry.clone());

        std::thread::scope(|s| {
            let high_handle = s.spawn(|| high.flow());
            started_rx.recv().unwrap();
            let low_handle = s.spawn(|| low.flow());

            std::thread::sleep(Duration::from_millis(50));
            assert_eq!(low_progress.load(Ordering::SeqCst), 0);
            assert_eq!(registry.active().map(|(p, _)| p), Some(Priority::INTERACTIVE));

            release_high.store(true, Ordering::SeqCst);
            high_handle.join().unwrap().unwrap();
            low_handle.join().unwrap().unwrap();
        });
        assert_eq!(low_progress.load(Ordering::SeqCst), 10);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_running_episode_is_parked_at_next_barrier() {
        let registry = isolated();
        let stop_low = AtomicBool::new(false);
        let low_rounds = AtomicUsize::new(0);
        let release_high = AtomicBool::new(false);
        let (high_tx, high_rx) = mpsc::channel();
        let high_tx = Mutex::new(high_tx);

        let low = Flow::new(Priority::EXPORT, 3, |sf: &SubFlow<'_>| {
            loop {
                if sf.sync_point_pre()? {
                    low_rounds.fetch_add(1, Ordering::SeqCst);
                    let stop = stop_low.load(Ordering::SeqCst);
                    sf.set_private_all(vec![stop; sf.threads_count()])?;
                }
                sf.sync_point_post()?;
                if sf.get_private::<bool>().map(|v| *v).unwrap_or(false) {
                    return Ok(());
                }
            }
        })
        .with_registry(registry.clone());

        let high = Flow::new(Priority::INTERACTIVE, 2, |sf: &SubFlow<'_>| {
            if sf.is_main() {
                let _ = high_tx.lock().send(());
                while !release_high.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
            sf.sync_point()
        })
        .with_registry(registry.clone());

        std::thread::scope(|s| {
            let low_handle = s.spawn(|| low.flow());
            while low_rounds.load(Ordering::SeqCst) < 5 {
                std::thread::sleep(Duration::from_millis(1));
            }
            let high_handle = s.spawn(|| high.flow());
            high_rx.recv().unwrap();

            // at most one round already past its pause check may complete
            std::thread::sleep(Duration::from_millis(20));
            let parked_at = low_rounds.load(Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            assert!(low_rounds.load(Ordering::SeqCst) <= parked_at + 1);

            release_high.store(true, Ordering::SeqCst);
            high_handle.join().unwrap().unwrap();

            let resumed_from = low_rounds.load(Ordering::SeqCst);
            while low_rounds.load(Ordering::SeqCst) < resumed_from + 5 {
                std::thread::sleep(Duration::from_millis(1));
            }
            stop_low.store(true, Ordering::SeqCst);
            low_handle.join().unwrap().unwrap();
        });
        assert!(registry.is_empty());
    }
}
