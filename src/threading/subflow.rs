//! A worker's handle into one fork-join episode.
//!
//! Every worker of a [`Flow`](crate::threading::flow::Flow) receives a
//! [`SubFlow`] borrowing the episode's shared state. The handle exposes the
//! barrier protocols, the shared work cursor and per-thread private slots.
//! It cannot outlive the episode.
//!
//! Barrier calls return [`FlowError::Aborted`] once the episode is cancelled;
//! bodies propagate it with `?` and the per-thread trampoline swallows it.

use crate::core::error::{EpisodeId, FlowError, FlowResult};
use crate::threading::barrier::BarrierState;
use crate::threading::cursor::WorkCursor;
use crate::threading::priority::PauseGate;
use log::{trace, warn};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::sync::Arc;

type Slot = Option<Arc<dyn Any + Send + Sync>>;

/// State shared by all workers of one episode.
#[derive(Debug)]
pub struct EpisodeShared {
    episode: EpisodeId,
    barrier: BarrierState,
    gate: Arc<PauseGate>,
    cursor: WorkCursor,
    slots: RwLock<Vec<Slot>>,
    failure: Mutex<Option<FlowError>>,
}

impl EpisodeShared {
    /// Create the shared state for `threads` workers paused through `gate`.
    pub fn new(episode: EpisodeId, threads: usize, gate: Arc<PauseGate>) -> Self {
        let threads = threads.max(1);
        Self {
            episode,
            barrier: BarrierState::new(threads),
            gate,
            cursor: WorkCursor::new(0),
            slots: RwLock::new(vec![None; threads]),
            failure: Mutex::new(None),
        }
    }

    /// Episode identifier.
    pub fn episode(&self) -> EpisodeId {
        self.episode
    }

    /// Number of workers.
    pub fn threads(&self) -> usize {
        self.barrier.threads()
    }

    /// Cancel the episode and wake every blocked worker.
    pub fn abort(&self) {
        self.barrier.abort();
        self.gate.wake_all();
    }

    /// Check if the episode has been cancelled.
    pub fn is_aborted(&self) -> bool {
        self.barrier.is_aborted()
    }

    /// Record a failure (the first one wins) and cancel the episode.
    pub fn fail(&self, error: FlowError) {
        {
            let mut failure = self.failure.lock();
            if failure.is_none() {
                *failure = Some(error);
            }
        }
        self.abort();
    }

    /// Take the recorded failure, if any.
    pub fn take_failure(&self) -> Option<FlowError> {
        self.failure.lock().take()
    }

    /// Block while a higher-priority episode is active.
    pub fn pause_point(&self) -> FlowResult<()> {
        if self.gate.wait_while_paused(self.barrier.abort_flag()) {
            trace!("Episode {} resumed", self.episode);
        }
        if self.is_aborted() {
            return Err(FlowError::Aborted);
        }
        Ok(())
    }
}

/// One worker's view of an episode.
#[derive(Debug, Clone, Copy)]
pub struct SubFlow<'e> {
    id: usize,
    shared: &'e EpisodeShared,
}

impl<'e> SubFlow<'e> {
    /// Create the handle of worker `id`.
    pub fn new(id: usize, shared: &'e EpisodeShared) -> Self {
        Self { id, shared }
    }

    /// Worker index, `0..threads_count()`.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Number of workers in the episode.
    pub fn threads_count(&self) -> usize {
        self.shared.threads()
    }

    /// Check if this is the main worker (id 0).
    pub fn is_main(&self) -> bool {
        self.id == 0
    }

    /// Episode identifier.
    pub fn episode(&self) -> EpisodeId {
        self.shared.episode()
    }

    // ========================================================================
    // Barriers
    // ========================================================================

    /// Full barrier: returns once every worker has called it.
    pub fn sync_point(&self) -> FlowResult<()> {
        self.shared.pause_point()?;
        self.shared.barrier.sync_point()
    }

    /// Split barrier entry. Returns `Ok(true)` on the main worker, which then
    /// owns an exclusive window until it calls [`SubFlow::sync_point_post`];
    /// other workers return `Ok(false)` once released.
    pub fn sync_point_pre(&self) -> FlowResult<bool> {
        self.shared.pause_point()?;
        self.shared.barrier.sync_point_pre(self.id)
    }

    /// Split barrier exit: releases the peers when called by main.
    pub fn sync_point_post(&self) -> FlowResult<()> {
        self.shared.barrier.sync_point_post(self.id)
    }

    /// Cancel the episode. Only the main worker may abort; calls from other
    /// workers are ignored.
    pub fn abort(&self) {
        if !self.is_main() {
            warn!("Worker {} tried to abort episode {}", self.id, self.episode());
            return;
        }
        trace!("Episode {} aborted by main", self.episode());
        self.shared.abort();
    }

    /// Record a failure observed after `flow()` returns, and cancel the episode.
    pub fn fail(&self, error: FlowError) {
        trace!("Worker {} failed: {}", self.id, error);
        self.shared.fail(error);
    }

    /// Check if the episode has been cancelled.
    pub fn is_aborted(&self) -> bool {
        self.shared.is_aborted()
    }

    // ========================================================================
    // Work distribution
    // ========================================================================

    /// The shared work cursor. Reset it inside main's exclusive window.
    pub fn cursor(&self) -> &'e WorkCursor {
        &self.shared.cursor
    }

    /// Claim the next index from the shared cursor.
    pub fn next_index(&self) -> Option<usize> {
        self.shared.cursor.next_index()
    }

    // ========================================================================
    // Private slots
    // ========================================================================

    fn check_slot(&self, slot: usize) -> FlowResult<()> {
        let threads = self.threads_count();
        if slot >= threads {
            return Err(FlowError::PrivateSlotOutOfRange { slot, threads });
        }
        if !self.is_main() && slot != self.id {
            return Err(FlowError::PrivateSlotDenied {
                thread: self.id,
                slot,
            });
        }
        Ok(())
    }

    /// Publish a value into `slot`. Main may write any slot, other workers
    /// only their own.
    pub fn set_private<T: Any + Send + Sync>(&self, slot: usize, value: T) -> FlowResult<()> {
        self.check_slot(slot)?;
        self.shared.slots.write()[slot] = Some(Arc::new(value));
        Ok(())
    }

    /// Publish one value per worker. Main only.
    pub fn set_private_all<T: Any + Send + Sync>(&self, values: Vec<T>) -> FlowResult<()> {
        if !self.is_main() {
            return Err(FlowError::PrivateSlotDenied {
                thread: self.id,
                slot: 0,
            });
        }
        let threads = self.threads_count();
        if values.len() != threads {
            return Err(FlowError::PrivateCountMismatch {
                expected: threads,
                got: values.len(),
            });
        }
        let mut slots = self.shared.slots.write();
        for (slot, value) in slots.iter_mut().zip(values) {
            *slot = Some(Arc::new(value));
        }
        Ok(())
    }

    /// This worker's own private value, if one of type `T` was published.
    pub fn get_private<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.read_slot(self.id)
    }

    /// Another worker's private value. Main may read any slot, other workers
    /// only their own.
    pub fn get_private_of<T: Any + Send + Sync>(&self, slot: usize) -> FlowResult<Option<Arc<T>>> {
        self.check_slot(slot)?;
        Ok(self.read_slot(slot))
    }

    fn read_slot<T: Any + Send + Sync>(&self, slot: usize) -> Option<Arc<T>> {
        let value = self.shared.slots.read().get(slot)?.clone()?;
        value.downcast::<T>().ok()
    }
}
