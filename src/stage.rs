//! Staged construction of conversion jobs.
//!
//! A job is built in steps, each returning the next stage:
//!
//! ```text
//! RemoteConverter::convert(source) -> SourceSpecified
//! SourceSpecified::to(consumer)    -> PriorityUnspecified
//! PriorityUnspecified::prioritize_with(priority) -> Schedulable
//! ```
//!
//! Only `PriorityUnspecified` and `Schedulable` expose `schedule()`, so a job
//! without a source or a result consumer cannot be scheduled. Stages are
//! immutable: `prioritize_with` returns a new value, and `schedule()` borrows
//! the stage, so the same job may be scheduled repeatedly at any priority.

use crate::engine::{Engine, JobHandle};
use crate::error::Result;
use crate::job::Priority;
use crate::source::{DocumentSource, FileTarget, ResultConsumer};
use std::path::PathBuf;
use std::sync::Arc;

/// A job whose document source is known.
#[derive(Clone)]
pub struct SourceSpecified {
    engine: Engine,
    source: Arc<dyn DocumentSource>,
}

impl SourceSpecified {
    pub(crate) fn new(engine: Engine, source: Arc<dyn DocumentSource>) -> Self {
        Self { engine, source }
    }

    /// Binds the consumer receiving the converted document.
    pub fn to(self, consumer: impl ResultConsumer + 'static) -> PriorityUnspecified {
        self.to_shared(Arc::new(consumer))
    }

    /// Binds an already shared consumer.
    pub fn to_shared(self, consumer: Arc<dyn ResultConsumer>) -> PriorityUnspecified {
        PriorityUnspecified {
            job: Schedulable {
                engine: self.engine,
                source: self.source,
                consumer,
                priority: Priority::NORMAL,
            },
        }
    }

    /// Writes the converted document to `path`.
    pub fn to_file(self, path: impl Into<PathBuf>) -> PriorityUnspecified {
        self.to(FileTarget::new(path))
    }
}

/// A fully specified job at the default priority.
#[derive(Clone)]
pub struct PriorityUnspecified {
    job: Schedulable,
}

impl PriorityUnspecified {
    /// Returns an otherwise identical job carrying `priority`.
    pub fn prioritize_with(&self, priority: impl Into<Priority>) -> Schedulable {
        Schedulable {
            priority: priority.into(),
            ..self.job.clone()
        }
    }

    /// Schedules the job at [`Priority::NORMAL`].
    pub fn schedule(&self) -> Result<JobHandle> {
        self.job.schedule()
    }

    /// Schedules the job and waits for its result.
    pub async fn execute(&self) -> Result<bool> {
        self.job.execute().await
    }
}

/// A fully specified job with an explicit priority.
#[derive(Clone)]
pub struct Schedulable {
    engine: Engine,
    source: Arc<dyn DocumentSource>,
    consumer: Arc<dyn ResultConsumer>,
    priority: Priority,
}

impl Schedulable {
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Hands the job to the worker pool.
    ///
    /// Fails with [`ConverterError::IllegalState`](crate::error::ConverterError::IllegalState)
    /// once the converter was shut down.
    pub fn schedule(&self) -> Result<JobHandle> {
        self.engine.schedule(
            Arc::clone(&self.source),
            Arc::clone(&self.consumer),
            self.priority,
        )
    }

    /// Schedules the job and waits for its result.
    pub async fn execute(&self) -> Result<bool> {
        self.schedule()?.wait().await
    }
}
