//! # Handler Group Module
//!
//! A [`HandlerGroup`] is a set of handlers sharing one partitioned worker
//! pool. The partition count is fixed at construction; a group with a single
//! queue runs everything it owns strictly in order.
//!
//! Groups are filled before registration, normalized by the component, and
//! read-only once their workers run.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::error::{EnqueueError, PoolError, RegistrationError};
use crate::executor::{default_queue_hash, Executor, Outcome, QueueHash};
use crate::handler::Handler;
use crate::session::Application;
use crate::worker_pool::{
    GroupConfig, JobStatus, PartitionStats, PartitionedPool, ShutdownPolicy, ShutdownReport,
};

const DEFAULT_GROUP_NAME: &str = "handler-group";

pub struct HandlerGroup {
    name: String,
    handlers: Vec<Handler>,
    index: HashMap<String, usize>,
    queue_hash: QueueHash,
    pool: PartitionedPool<Executor>,
}

impl fmt::Debug for HandlerGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerGroup")
            .field("name", &self.name)
            .field("handlers", &self.handlers)
            .field("queue_num", &self.queue_num())
            .finish_non_exhaustive()
    }
}

impl HandlerGroup {
    /// Unbounded group with `queue_num` partitions (at least one).
    #[must_use]
    pub fn new(queue_num: usize) -> Self {
        Self::with_config(DEFAULT_GROUP_NAME, GroupConfig::with_queues(queue_num))
    }

    /// Named group with explicit pool settings.
    #[must_use]
    pub fn with_config(name: impl Into<String>, config: GroupConfig) -> Self {
        let name = name.into();
        Self {
            pool: PartitionedPool::new(name.clone(), config),
            name,
            handlers: Vec::new(),
            index: HashMap::new(),
            queue_hash: Arc::new(default_queue_hash),
        }
    }

    #[must_use]
    pub fn with_handlers(mut self, handlers: impl IntoIterator<Item = Handler>) -> Self {
        for handler in handlers {
            self.add_handler(handler);
        }
        self
    }

    /// Add a handler. Name clashes surface when the component registers the group.
    pub fn add_handler(&mut self, handler: Handler) -> &mut Self {
        self.index
            .entry(handler.name().to_string())
            .or_insert(self.handlers.len());
        self.handlers.push(handler);
        self
    }

    /// Replace the partition function. Results are reduced modulo the queue count.
    pub fn set_queue_hash<F>(&mut self, hash: F) -> &mut Self
    where
        F: Fn(&Executor, usize) -> usize + Send + Sync + 'static,
    {
        self.queue_hash = Arc::new(hash);
        self
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn queue_num(&self) -> usize {
        self.pool.queue_num()
    }

    #[must_use]
    pub fn config(&self) -> &GroupConfig {
        self.pool.config()
    }

    /// Partition index in `[0, queue_num)` for `executor`.
    #[must_use]
    pub fn queue_hash(&self, executor: &Executor) -> usize {
        let queue_num = self.queue_num();
        (self.queue_hash)(executor, queue_num) % queue_num
    }

    /// Place `executor` on partition `index`.
    ///
    /// # Errors
    ///
    /// See [`PartitionedPool::enqueue`].
    pub fn in_queue(&self, index: usize, executor: Executor) -> Result<(), EnqueueError> {
        self.pool.enqueue(index, executor)
    }

    /// Hash and enqueue in one step; returns the partition used.
    ///
    /// # Errors
    ///
    /// See [`PartitionedPool::enqueue`].
    pub fn dispatch(&self, executor: Executor) -> Result<usize, EnqueueError> {
        let index = self.queue_hash(&executor);
        self.in_queue(index, executor)?;
        Ok(index)
    }

    #[must_use]
    pub fn handler(&self, name: &str) -> Option<&Handler> {
        self.index.get(name).and_then(|i| self.handlers.get(*i))
    }

    pub fn handlers(&self) -> impl Iterator<Item = &Handler> {
        self.handlers.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Re-key every handler under `normalize(name)`.
    ///
    /// All new names are computed and checked first; the group is only
    /// changed when every name is valid and unique.
    ///
    /// # Errors
    ///
    /// * [`RegistrationError::EmptyHandlerName`] - a name normalizes to `""`
    /// * [`RegistrationError::DuplicateHandler`] - two handlers normalize to the same name
    pub fn normalize_names(
        &mut self,
        normalize: &dyn Fn(&str) -> String,
    ) -> Result<(), RegistrationError> {
        let mut names = Vec::with_capacity(self.handlers.len());
        let mut index = HashMap::with_capacity(self.handlers.len());

        for (i, handler) in self.handlers.iter().enumerate() {
            let name = normalize(handler.name());
            if name.is_empty() {
                return Err(RegistrationError::EmptyHandlerName {
                    group: self.name.clone(),
                });
            }
            if index.insert(name.clone(), i).is_some() {
                return Err(RegistrationError::DuplicateHandler {
                    group: self.name.clone(),
                    name,
                });
            }
            names.push(name);
        }

        for (handler, name) in self.handlers.iter_mut().zip(names) {
            if handler.name() != name {
                debug!(group = %self.name, from = %handler.name(), to = %name, "Handler renamed");
                handler.set_name(name);
            }
        }
        self.index = index;
        Ok(())
    }

    /// Start one worker per partition.
    ///
    /// # Errors
    ///
    /// See [`PartitionedPool::run`].
    pub fn run(&self, app: &Arc<dyn Application>) -> Result<(), PoolError> {
        let group = self.name.clone();
        let node_id = app.node_id().to_string();

        self.pool.run(move |partition, executor: Executor| {
            let outcome = executor.execute();
            match &outcome {
                Outcome::Completed => {}
                Outcome::Filtered { index } => {
                    debug!(
                        group = %group,
                        partition,
                        route = %executor.label(),
                        filter_index = index,
                        "Message rejected by before filter"
                    );
                }
                Outcome::Failed(err) => {
                    error!(
                        node_id = %node_id,
                        group = %group,
                        partition,
                        kind = %executor.kind(),
                        route = %executor.label(),
                        error = %err,
                        "Handler invocation failed"
                    );
                }
                Outcome::EventFailures { total, failures } => {
                    for err in failures {
                        error!(
                            node_id = %node_id,
                            group = %group,
                            partition,
                            event = %executor.label(),
                            subscribers = total,
                            error = %err,
                            "Event subscriber failed"
                        );
                    }
                }
            }

            if outcome.is_success() {
                JobStatus::Completed
            } else {
                JobStatus::Failed
            }
        })
    }

    /// Stop the workers per `policy`.
    pub fn shutdown(&self, policy: ShutdownPolicy) -> ShutdownReport {
        let report = self.pool.shutdown(policy);
        if report.abandoned > 0 {
            warn!(group = %self.name, abandoned = report.abandoned, "Queued executors abandoned");
        }
        report
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.pool.is_running()
    }

    #[must_use]
    pub fn metrics(&self) -> Vec<PartitionStats> {
        self.pool.metrics()
    }

    pub(crate) fn notify_init(&self) {
        for handler in &self.handlers {
            handler.on_init();
        }
    }

    pub(crate) fn notify_stop(&self) {
        for handler in &self.handlers {
            handler.on_stop();
        }
    }
}
