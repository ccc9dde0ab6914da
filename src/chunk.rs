//! Bounded in-memory chunks.

use rayon::prelude::*;
use std::cmp::Ordering;

/// In-memory buffer of up to a fixed number of elements. Chunks are filled
/// by the producer, sorted in place by a worker and then drained into a
/// run file; ownership moves along the pipeline with the chunk.
pub struct Chunk<T> {
    limit: usize,
    items: Vec<T>,
}

impl<T> Chunk<T> {
    /// Creates an empty chunk holding at most `limit` elements.
    pub fn new(limit: usize) -> Self {
        Chunk {
            limit,
            items: Vec::with_capacity(limit),
        }
    }

    /// Adds an element. The caller rotates to a fresh chunk once
    /// [`is_full`](Chunk::is_full) reports the limit is reached.
    pub fn push(&mut self, item: T) {
        debug_assert!(self.items.len() < self.limit, "chunk over capacity");
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Checks if the chunk reached its element limit.
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.limit
    }
}

impl<T: Send> Chunk<T> {
    /// Sorts the chunk in place. The sort is unstable; elements equal
    /// under `less` keep no particular order.
    pub fn sort<F>(&mut self, less: F)
    where
        F: Fn(&T, &T) -> bool + Sync,
    {
        self.items.par_sort_unstable_by(|a, b| {
            if less(a, b) {
                Ordering::Less
            } else if less(b, a) {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        });
    }
}

impl<T> IntoIterator for Chunk<T> {
    type Item = T;
    type IntoIter = <Vec<T> as IntoIterator>::IntoIter;

    /// Drains the chunk in storage order; call after [`sort`](Chunk::sort)
    /// to obtain the elements in sorted order.
    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
