//! Double-counter barrier shared by the workers of one episode.
//!
//! Two protocols run over the same state:
//!
//! - [`BarrierState::sync_point`]: every worker blocks until all have arrived,
//!   then all are released together.
//! - [`BarrierState::sync_point_pre`] / [`BarrierState::sync_point_post`]: the
//!   main worker (id 0) waits for all peers, gets an exclusive window while the
//!   peers stay blocked, and releases them with `post`.
//!
//! `counter_in` counts arrivals. Once a barrier opens, `flag_out` is raised and
//! `counter_out` counts the workers that still have to leave; a worker entering
//! the next barrier waits until the previous one has fully drained, so a fast
//! thread can never be counted twice. `flag_in` marks main's exclusive window.

use crate::core::error::{FlowError, FlowResult};
use log::warn;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
struct Counters {
    counter_in: usize,
    counter_out: usize,
    flag_in: bool,
    flag_out: bool,
}

/// Barrier state for a fixed number of workers.
#[derive(Debug)]
pub struct BarrierState {
    threads: usize,
    counters: Mutex<Counters>,
    /// Peers waiting for the barrier to open.
    cv_in: Condvar,
    /// Workers waiting for the previous barrier to drain.
    cv_out: Condvar,
    /// Main waiting for every peer to arrive in `sync_point_pre`.
    cv_main: Condvar,
    aborted: AtomicBool,
}

impl BarrierState {
    /// Create a barrier for `threads` workers.
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
            counters: Mutex::new(Counters::default()),
            cv_in: Condvar::new(),
            cv_out: Condvar::new(),
            cv_main: Condvar::new(),
            aborted: AtomicBool::new(false),
        }
    }

    /// Number of participating workers.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// The abort flag, shared with the pause gate wait.
    pub fn abort_flag(&self) -> &AtomicBool {
        &self.aborted
    }

    /// Check if the episode has been aborted.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    fn check_abort(&self) -> FlowResult<()> {
        if self.is_aborted() {
            Err(FlowError::Aborted)
        } else {
            Ok(())
        }
    }

    /// Raise the abort flag and wake every waiter.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
        let _guard = self.counters.lock();
        self.cv_in.notify_all();
        self.cv_out.notify_all();
        self.cv_main.notify_all();
    }

    fn wait_drained(&self, c: &mut MutexGuard<'_, Counters>) -> FlowResult<()> {
        while c.flag_out {
            self.check_abort()?;
            self.cv_out.wait(c);
        }
        self.check_abort()
    }

    fn leave(&self, c: &mut MutexGuard<'_, Counters>) {
        c.counter_out -= 1;
        if c.counter_out == 0 {
            c.flag_out = false;
            self.cv_out.notify_all();
        }
    }

    /// Symmetric full barrier.
    pub fn sync_point(&self) -> FlowResult<()> {
        if self.threads == 1 {
            return self.check_abort();
        }
        let mut c = self.counters.lock();
        self.wait_drained(&mut c)?;
        c.counter_in += 1;
        if c.counter_in == self.threads {
            c.counter_in = 0;
            c.counter_out = self.threads;
            c.flag_out = true;
            self.cv_in.notify_all();
        } else {
            while !c.flag_out {
                if self.is_aborted() {
                    c.counter_in -= 1;
                    return Err(FlowError::Aborted);
                }
                self.cv_in.wait(&mut c);
            }
        }
        self.leave(&mut c);
        Ok(())
    }

    /// First half of the split barrier. Returns `Ok(true)` to main once every
    /// peer has arrived; peers return `Ok(false)` after main's `post`.
    pub fn sync_point_pre(&self, id: usize) -> FlowResult<bool> {
        if self.threads == 1 {
            self.check_abort()?;
            return Ok(true);
        }
        let mut c = self.counters.lock();
        self.wait_drained(&mut c)?;
        c.counter_in += 1;
        if id == 0 {
            while c.counter_in < self.threads {
                if self.is_aborted() {
                    c.counter_in -= 1;
                    return Err(FlowError::Aborted);
                }
                self.cv_main.wait(&mut c);
            }
            c.counter_in = 0;
            c.flag_in = true;
            return Ok(true);
        }
        if c.counter_in == self.threads {
            self.cv_main.notify_one();
        }
        while !c.flag_out {
            if self.is_aborted() {
                if !c.flag_in {
                    c.counter_in -= 1;
                }
                return Err(FlowError::Aborted);
            }
            self.cv_in.wait(&mut c);
        }
        self.leave(&mut c);
        Ok(false)
    }

    /// Second half of the split barrier: main releases the blocked peers.
    /// Peers only observe the abort flag here.
    pub fn sync_point_post(&self, id: usize) -> FlowResult<()> {
        if self.threads == 1 || id != 0 {
            return self.check_abort();
        }
        let mut c = self.counters.lock();
        if !c.flag_in {
            warn!("sync_point_post called without a matching sync_point_pre");
            return self.check_abort();
        }
        c.flag_in = false;
        c.counter_out = self.threads - 1;
        c.flag_out = true;
        self.cv_in.notify_all();
        self.check_abort()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn run_workers<F>(threads: usize, f: F)
    where
        F: Fn(usize, &BarrierState) + Sync,
    {
        let barrier = BarrierState::new(threads);
        thread::scope(|s| {
            for id in 0..threads {
                let barrier = &barrier;
                let f = &f;
                s.spawn(move || f(id, barrier));
            }
        });
    }

    #[test]
    fn test_sync_point_orders_phases() {
        let threads = 4;
        let rounds = 200;
        let counter = AtomicUsize::new(0);
        run_workers(threads, |_, barrier| {
            for round in 0..rounds {
                counter.fetch_add(1, Ordering::Relaxed);
                barrier.sync_point().unwrap();
                assert_eq!(counter.load(Ordering::Relaxed), (round + 1) * threads);
                barrier.sync_point().unwrap();
            }
        });
        assert_eq!(counter.load(Ordering::Relaxed), rounds * threads);
    }

    #[test]
    fn test_split_barrier_gives_main_exclusive_window() {
        let threads = 5;
        let rounds = 100;
        let arrived = AtomicUsize::new(0);
        let setup = AtomicUsize::new(0);
        run_workers(threads, |id, barrier| {
            for round in 0..rounds {
                arrived.fetch_add(1, Ordering::SeqCst);
                if barrier.sync_point_pre(id).unwrap() {
                    assert_eq!(id, 0);
                    // every peer has arrived and none has been released yet
                    assert_eq!(arrived.load(Ordering::SeqCst), (round + 1) * threads);
                    setup.store(round + 1, Ordering::SeqCst);
                }
                barrier.sync_point_post(id).unwrap();
                assert_eq!(setup.load(Ordering::SeqCst), round + 1);
                barrier.sync_point().unwrap();
            }
        });
    }

    #[test]
    fn test_back_to_back_split_barriers() {
        let threads = 3;
        let seen = AtomicUsize::new(0);
        run_workers(threads, |id, barrier| {
            for _ in 0..300 {
                if barrier.sync_point_pre(id).unwrap() {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
                barrier.sync_point_post(id).unwrap();
            }
        });
        assert_eq!(seen.load(Ordering::SeqCst), 300);
    }

    #[test]
    fn test_single_thread_is_noop() {
        let barrier = BarrierState::new(1);
        barrier.sync_point().unwrap();
        assert!(barrier.sync_point_pre(0).unwrap());
        barrier.sync_point_post(0).unwrap();
        barrier.abort();
        assert!(matches!(barrier.sync_point(), Err(FlowError::Aborted)));
    }

    #[test]
    fn test_abort_releases_waiters() {
        let barrier = Arc::new(BarrierState::new(3));
        let waiters: Vec<_> = (1..3)
            .map(|id| {
                let barrier = barrier.clone();
                thread::spawn(move || barrier.sync_point_pre(id))
            })
            .collect();
        thread::sleep(Duration::from_millis(20));
        barrier.abort();
        for waiter in waiters {
            assert!(matches!(waiter.join().unwrap(), Err(FlowError::Aborted)));
        }
        assert!(barrier.is_aborted());
    }

    #[test]
    fn test_abort_during_exclusive_window() {
        let released = AtomicUsize::new(0);
        run_workers(3, |id, barrier| {
            match barrier.sync_point_pre(id) {
                Ok(true) => barrier.abort(),
                Ok(false) => {
                    released.fetch_add(1, Ordering::SeqCst);
                }
                Err(FlowError::Aborted) => {}
                Err(other) => panic!("unexpected {other}"),
            }
        });
        assert_eq!(released.load(Ordering::SeqCst), 0);
    }
}
