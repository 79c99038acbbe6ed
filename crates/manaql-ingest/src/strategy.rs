// Batch execution strategies
//
// Both strategies run the same per-chunk unit of work; they differ only in
// how many chunks are in flight. Sequential awaits each chunk in input order.
// Parallel keeps up to `workers` chunks in flight with buffer_unordered and
// yields outcomes in completion order.

use std::future::Future;

use futures::stream::{self, StreamExt};
use serde::{Serialize, Serializer};

/// How a pass's chunks are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    Sequential,
    Parallel { workers: usize },
}

impl ExecutionStrategy {
    /// Parse `sequential` or `parallel`; `workers` only applies to the latter
    pub fn from_name(name: &str, workers: usize) -> Result<Self, String> {
        match name.to_ascii_lowercase().as_str() {
            "sequential" => Ok(ExecutionStrategy::Sequential),
            "parallel" => Ok(ExecutionStrategy::Parallel { workers }),
            other => Err(format!(
                "unknown strategy '{}' (expected sequential or parallel)",
                other
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStrategy::Sequential => "sequential",
            ExecutionStrategy::Parallel { .. } => "parallel",
        }
    }

    /// Chunks that may be in flight at once
    pub fn concurrency(&self) -> usize {
        match self {
            ExecutionStrategy::Sequential => 1,
            ExecutionStrategy::Parallel { workers } => (*workers).max(1),
        }
    }

    /// Run `work` over every chunk and collect the outcomes.
    ///
    /// Chunks are pulled from `chunks` lazily, so at most `concurrency()`
    /// chunks are materialised at a time. A chunk's outcome never stops its
    /// siblings; failures must be carried in `R`.
    pub async fn execute<I, T, F, Fut, R>(&self, chunks: I, work: F) -> Vec<R>
    where
        I: IntoIterator<Item = Vec<T>>,
        F: Fn(usize, Vec<T>) -> Fut,
        Fut: Future<Output = R>,
    {
        match self {
            ExecutionStrategy::Sequential => {
                let mut outcomes = Vec::new();
                for (index, chunk) in chunks.into_iter().enumerate() {
                    outcomes.push(work(index, chunk).await);
                }
                outcomes
            }
            ExecutionStrategy::Parallel { .. } => {
                stream::iter(chunks.into_iter().enumerate())
                    .map(|(index, chunk)| work(index, chunk))
                    .buffer_unordered(self.concurrency())
                    .collect()
                    .await
            }
        }
    }
}

impl std::fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStrategy::Sequential => f.write_str("sequential"),
            ExecutionStrategy::Parallel { workers } => write!(f, "parallel ({} workers)", workers),
        }
    }
}

impl Serialize for ExecutionStrategy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
