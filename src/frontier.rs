//! FIFO frontier of choice paths awaiting a visit.

use crate::path::ChoicePath;
use std::collections::VecDeque;
use thiserror::Error;

/// Errors that can emerge while queueing paths into the frontier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrontierError {
    /// The path lies below the configured depth ceiling; the caller keeps the path.
    #[error("path {path} exceeds depth ceiling {max_depth}")]
    BeyondDepth {
        /// Rejected path.
        path: ChoicePath,
        /// Deepest depth the frontier accepts.
        max_depth: usize,
    },
}

/// Breadth-first work queue owned by a single crawl.
///
/// Paths leave in the order they were pushed, so every path of depth `k` is handed out
/// before any path of depth `k + 1` as long as children are pushed after their parent
/// was popped.
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<ChoicePath>,
    max_depth: Option<usize>,
    enqueued: usize,
    deepest: usize,
}

impl Frontier {
    /// Constructs a frontier seeded with the root path.
    pub fn new(max_depth: Option<usize>) -> Self {
        let mut frontier = Self {
            queue: VecDeque::new(),
            max_depth,
            enqueued: 0,
            deepest: 0,
        };
        frontier.queue.push_back(ChoicePath::root());
        frontier.enqueued = 1;
        frontier
    }

    /// Number of paths waiting to be visited.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// True once every queued path has been handed out.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Total number of paths ever accepted, root included.
    pub fn enqueued(&self) -> usize {
        self.enqueued
    }

    /// Deepest path accepted so far.
    pub fn deepest(&self) -> usize {
        self.deepest
    }

    /// Appends a path to the back of the queue.
    pub fn push(&mut self, path: ChoicePath) -> Result<(), FrontierError> {
        if let Some(max_depth) = self.max_depth {
            if path.depth() > max_depth {
                return Err(FrontierError::BeyondDepth { path, max_depth });
            }
        }
        self.deepest = self.deepest.max(path.depth());
        self.queue.push_back(path);
        self.enqueued += 1;
        Ok(())
    }

    /// Removes the oldest queued path.
    pub fn next_path(&mut self) -> Option<ChoicePath> {
        self.queue.pop_front()
    }
}
