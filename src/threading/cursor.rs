//! Shared work cursor for dynamic row/column distribution.
//!
//! Instead of partitioning rows statically at fork time, workers pull the next
//! index from one atomic counter until it runs past the end. Each index is
//! handed out exactly once, which balances rows of uneven cost across threads.

use crossbeam::utils::CachePadded;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Atomic `fetch_add` cursor over `0..end`.
#[derive(Debug, Default)]
pub struct WorkCursor {
    next: CachePadded<AtomicUsize>,
    end: AtomicUsize,
}

impl WorkCursor {
    /// Create a cursor over `0..end`.
    pub fn new(end: usize) -> Self {
        Self {
            next: CachePadded::new(AtomicUsize::new(0)),
            end: AtomicUsize::new(end),
        }
    }

    /// Rewind to `0..end`. Only call this while no worker is pulling from the
    /// cursor, i.e. inside main's exclusive window.
    pub fn reset(&self, end: usize) {
        self.end.store(end, Ordering::Relaxed);
        self.next.store(0, Ordering::Relaxed);
    }

    /// Claim the next index.
    pub fn next_index(&self) -> Option<usize> {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        (index < self.end.load(Ordering::Relaxed)).then_some(index)
    }

    /// Claim up to `chunk` consecutive indices.
    pub fn next_chunk(&self, chunk: usize) -> Option<Range<usize>> {
        let chunk = chunk.max(1);
        let end = self.end.load(Ordering::Relaxed);
        let start = self.next.fetch_add(chunk, Ordering::Relaxed);
        (start < end).then(|| start..(start + chunk).min(end))
    }

    /// Upper bound of the current range.
    pub fn end(&self) -> usize {
        self.end.load(Ordering::Relaxed)
    }
}

impl Iterator for &WorkCursor {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        self.next_index()
    }
}
