//! # Worker Pool Module
//!
//! Partitioned worker pool backing every [`HandlerGroup`](crate::group::HandlerGroup).
//!
//! A pool owns N independent FIFO queues and, once running, exactly one
//! worker coroutine per queue. Jobs placed on a queue are processed strictly in
//! enqueue order by that queue's worker; different queues run concurrently.
//!
//! ## Features
//!
//! - **Partitioned Queues**: one `may` MPSC channel per partition, one consumer each
//! - **Bounded Queues**: optional per-partition bound with [`BackpressureMode`]
//! - **Failure Barrier**: every job runs under `catch_unwind`; a panicking job is
//!   counted as failed and the worker moves on
//! - **Shutdown Policy**: [`ShutdownPolicy::Drain`] finishes queued work,
//!   [`ShutdownPolicy::Halt`] abandons it; both join the workers
//! - **Metrics**: per-partition dispatched / completed / failed / rejected /
//!   abandoned counters and queue depth
//!
//! ## Configuration
//!
//! - `BRRTMESH_QUEUE_NUM`: partitions per group (default: 4, minimum 1)
//! - `BRRTMESH_QUEUE_BOUND`: per-partition queue bound, `0` for unbounded (default: 0)
//! - `BRRTMESH_BACKPRESSURE_MODE`: `block` or `shed` (default: block)
//! - `BRRTMESH_BACKPRESSURE_TIMEOUT_MS`: how long `block` waits for room (default: 50)
//! - `BRRTMESH_STACK_SIZE`: worker coroutine stack size, decimal or `0x` hex (default: 0x10000)

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use may::coroutine::JoinHandle;
use may::sync::mpsc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{EnqueueError, PoolError};

/// What a bounded queue does when it is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackpressureMode {
    /// Wait up to the configured timeout for room, then fail with `QueueFull`
    #[default]
    Block,
    /// Fail with `QueueFull` immediately
    Shed,
}

impl BackpressureMode {
    /// Parse backpressure mode from string
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "block" => Some(Self::Block),
            "shed" => Some(Self::Shed),
            _ => None,
        }
    }
}

/// What happens to queued jobs when a pool shuts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownPolicy {
    /// Process everything already queued, then stop
    #[default]
    Drain,
    /// Stop after the job in flight; queued jobs are abandoned
    Halt,
}

impl ShutdownPolicy {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "drain" => Some(Self::Drain),
            "halt" => Some(Self::Halt),
            _ => None,
        }
    }
}

/// Parse a size given either in decimal or as `0x`-prefixed hex.
pub(crate) fn parse_size(s: &str) -> Option<usize> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        usize::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

const DEFAULT_QUEUE_NUM: usize = 4;
const DEFAULT_TIMEOUT_MS: u64 = 50;
const DEFAULT_STACK_SIZE: usize = 0x10000; // 64KB

/// Configuration for one group's partitioned pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    /// Number of partitions (queues and workers)
    pub queue_num: usize,
    /// Per-partition queue bound, `0` for unbounded
    pub queue_bound: usize,
    pub backpressure_mode: BackpressureMode,
    /// Timeout for block mode in milliseconds
    pub backpressure_timeout_ms: u64,
    /// Stack size for worker coroutines
    pub stack_size: usize,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            queue_num: DEFAULT_QUEUE_NUM,
            queue_bound: 0,
            backpressure_mode: BackpressureMode::Block,
            backpressure_timeout_ms: DEFAULT_TIMEOUT_MS,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl GroupConfig {
    /// Unbounded configuration with `queue_num` partitions.
    #[must_use]
    pub fn with_queues(queue_num: usize) -> Self {
        Self {
            queue_num,
            ..Self::default()
        }
    }

    /// Load configuration from environment variables, falling back to defaults
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let queue_num = std::env::var("BRRTMESH_QUEUE_NUM")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.queue_num);

        let queue_bound = std::env::var("BRRTMESH_QUEUE_BOUND")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.queue_bound);

        let backpressure_mode = std::env::var("BRRTMESH_BACKPRESSURE_MODE")
            .ok()
            .and_then(|s| BackpressureMode::parse(&s))
            .unwrap_or_default();

        let backpressure_timeout_ms = std::env::var("BRRTMESH_BACKPRESSURE_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.backpressure_timeout_ms);

        let stack_size = std::env::var("BRRTMESH_STACK_SIZE")
            .ok()
            .and_then(|s| parse_size(&s))
            .unwrap_or(defaults.stack_size);

        Self {
            queue_num,
            queue_bound,
            backpressure_mode,
            backpressure_timeout_ms,
            stack_size,
        }
    }

    #[must_use]
    pub fn with_queue_bound(mut self, bound: usize, mode: BackpressureMode) -> Self {
        self.queue_bound = bound;
        self.backpressure_mode = mode;
        self
    }

    #[must_use]
    pub fn with_backpressure_timeout(mut self, timeout: Duration) -> Self {
        self.backpressure_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Partition count actually used: never below one.
    #[inline]
    #[must_use]
    pub fn effective_queue_num(&self) -> usize {
        self.queue_num.max(1)
    }
}

/// Live counters for one partition.
#[derive(Debug, Default)]
pub struct PartitionMetrics {
    /// Jobs accepted onto the queue
    pub dispatched: AtomicU64,
    /// Jobs that ran and reported success
    pub completed: AtomicU64,
    /// Jobs that ran and reported failure or panicked
    pub failed: AtomicU64,
    /// Jobs refused because the queue was full
    pub rejected: AtomicU64,
    /// Jobs dropped by a halting shutdown
    pub abandoned: AtomicU64,
    /// Jobs queued and not yet picked up (approximate)
    pub queue_depth: AtomicUsize,
}

impl PartitionMetrics {
    fn record_completion(&self, status: JobStatus) {
        match status {
            JobStatus::Completed => self.completed.fetch_add(1, Ordering::Relaxed),
            JobStatus::Failed => self.failed.fetch_add(1, Ordering::Relaxed),
        };
    }

    #[must_use]
    pub fn snapshot(&self, partition: usize) -> PartitionStats {
        PartitionStats {
            partition,
            dispatched: self.dispatched.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PartitionMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PartitionStats {
    pub partition: usize,
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
    pub rejected: u64,
    pub abandoned: u64,
    pub queue_depth: usize,
}

/// Result reported by the work function for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Completed,
    Failed,
}

/// Summary returned by [`PartitionedPool::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    pub policy: ShutdownPolicy,
    /// Workers joined
    pub workers: usize,
    /// Jobs that ran over the pool's lifetime (completed + failed)
    pub processed: u64,
    /// Jobs dropped without running
    pub abandoned: u64,
}

enum Job<T> {
    Run(T),
    Stop,
}

const STATE_IDLE: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// N independent FIFO queues with one worker coroutine each.
pub struct PartitionedPool<T: Send + 'static> {
    name: String,
    config: GroupConfig,
    senders: Vec<mpsc::Sender<Job<T>>>,
    receivers: Mutex<Vec<mpsc::Receiver<Job<T>>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    metrics: Arc<Vec<PartitionMetrics>>,
    state: AtomicU8,
    halted: Arc<AtomicBool>,
    /// Senders hold it shared across the closed check and the send; shutdown
    /// holds it exclusively while closing, so no job lands behind a stop sentinel.
    gate: RwLock<()>,
}

impl<T: Send + 'static> PartitionedPool<T> {
    /// Create the queues. No worker runs until [`run`](Self::run).
    #[must_use]
    pub fn new(name: impl Into<String>, config: GroupConfig) -> Self {
        let queue_num = config.effective_queue_num();
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..queue_num).map(|_| mpsc::channel::<Job<T>>()).unzip();
        let metrics = (0..queue_num).map(|_| PartitionMetrics::default()).collect();

        Self {
            name: name.into(),
            config,
            senders,
            receivers: Mutex::new(receivers),
            handles: Mutex::new(Vec::new()),
            metrics: Arc::new(metrics),
            state: AtomicU8::new(STATE_IDLE),
            halted: Arc::new(AtomicBool::new(false)),
            gate: RwLock::new(()),
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn queue_num(&self) -> usize {
        self.senders.len()
    }

    #[must_use]
    pub fn config(&self) -> &GroupConfig {
        &self.config
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_RUNNING
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_CLOSED
    }

    #[must_use]
    pub fn partition_metrics(&self, partition: usize) -> Option<&PartitionMetrics> {
        self.metrics.get(partition)
    }

    /// Snapshot of every partition's counters.
    #[must_use]
    pub fn metrics(&self) -> Vec<PartitionStats> {
        self.metrics
            .iter()
            .enumerate()
            .map(|(partition, m)| m.snapshot(partition))
            .collect()
    }

    /// Place a job on a partition queue.
    ///
    /// Jobs enqueued before [`run`](Self::run) wait for the workers.
    ///
    /// # Errors
    ///
    /// * [`EnqueueError::OutOfRange`] - `partition >= queue_num()`
    /// * [`EnqueueError::Closed`] - the pool has been shut down
    /// * [`EnqueueError::QueueFull`] - bounded queue had no room within the backpressure policy
    pub fn enqueue(&self, partition: usize, job: T) -> Result<(), EnqueueError> {
        let (Some(sender), Some(metrics)) =
            (self.senders.get(partition), self.metrics.get(partition))
        else {
            return Err(EnqueueError::OutOfRange {
                partition,
                queues: self.queue_num(),
            });
        };
        if self.is_closed() {
            return Err(EnqueueError::Closed { partition });
        }

        if self.config.queue_bound > 0 {
            self.reserve_slot(partition, metrics)?;
        } else {
            metrics.queue_depth.fetch_add(1, Ordering::AcqRel);
        }

        // Not held across the backpressure wait above: that may yield the coroutine.
        let _open = self.gate.read().unwrap_or_else(PoisonError::into_inner);
        if self.is_closed() || sender.send(Job::Run(job)).is_err() {
            metrics.queue_depth.fetch_sub(1, Ordering::AcqRel);
            return Err(EnqueueError::Closed { partition });
        }
        metrics.dispatched.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn reserve_slot(
        &self,
        partition: usize,
        metrics: &PartitionMetrics,
    ) -> Result<(), EnqueueError> {
        let bound = self.config.queue_bound;
        let deadline = match self.config.backpressure_mode {
            BackpressureMode::Shed => None,
            BackpressureMode::Block => Some(
                Instant::now() + Duration::from_millis(self.config.backpressure_timeout_ms),
            ),
        };

        loop {
            let previous = metrics.queue_depth.fetch_add(1, Ordering::AcqRel);
            if previous < bound {
                return Ok(());
            }
            metrics.queue_depth.fetch_sub(1, Ordering::AcqRel);

            match deadline {
                Some(deadline) if Instant::now() < deadline && !self.is_closed() => {
                    pause(Duration::from_millis(1));
                }
                _ => {
                    metrics.rejected.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        pool = %self.name,
                        partition,
                        bound,
                        mode = ?self.config.backpressure_mode,
                        "Partition queue full"
                    );
                    return Err(EnqueueError::QueueFull { partition, bound });
                }
            }
        }
    }

    /// Spawn one worker coroutine per partition.
    ///
    /// `work` is called with the partition index and the job, on that
    /// partition's worker, in enqueue order.
    ///
    /// # Errors
    ///
    /// * [`PoolError::AlreadyRunning`] - `run` was already called
    /// * [`PoolError::ShutDown`] - the pool was shut down
    /// * [`PoolError::Spawn`] - a worker coroutine could not be spawned
    pub fn run<F>(&self, work: F) -> Result<(), PoolError>
    where
        F: Fn(usize, T) -> JobStatus + Send + Sync + 'static,
    {
        match self.state.compare_exchange(
            STATE_IDLE,
            STATE_RUNNING,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {}
            Err(STATE_RUNNING) => {
                return Err(PoolError::AlreadyRunning {
                    group: self.name.clone(),
                })
            }
            Err(_) => {
                return Err(PoolError::ShutDown {
                    group: self.name.clone(),
                })
            }
        }

        let receivers = std::mem::take(
            &mut *self
                .receivers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let work = Arc::new(work);

        info!(
            pool = %self.name,
            queue_num = receivers.len(),
            queue_bound = self.config.queue_bound,
            backpressure_mode = ?self.config.backpressure_mode,
            stack_size = self.config.stack_size,
            "Starting partition workers"
        );

        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        for (partition, rx) in receivers.into_iter().enumerate() {
            let worker = Worker {
                pool: self.name.clone(),
                partition,
                rx,
                work: Arc::clone(&work),
                metrics: Arc::clone(&self.metrics),
                halted: Arc::clone(&self.halted),
            };

            // SAFETY: may requires the scheduler to be configured before the
            // first spawn; the worker only owns Send data moved into it.
            let spawned = unsafe {
                may::coroutine::Builder::new()
                    .name(format!("{}-worker-{partition}", self.name))
                    .stack_size(self.config.stack_size)
                    .spawn(move || worker.run())
            };

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    error!(
                        pool = %self.name,
                        partition,
                        error = %source,
                        "Failed to spawn worker coroutine"
                    );
                    return Err(PoolError::Spawn {
                        group: self.name.clone(),
                        partition,
                        source,
                    });
                }
            }
        }
        Ok(())
    }

    /// Stop accepting work, stop the workers and wait for them.
    ///
    /// Calling this on a pool that never ran abandons whatever was queued.
    /// A second call returns a report with no workers joined.
    pub fn shutdown(&self, policy: ShutdownPolicy) -> ShutdownReport {
        let closing = self.gate.write().unwrap_or_else(PoisonError::into_inner);
        let previous = self.state.swap(STATE_CLOSED, Ordering::AcqRel);
        if policy == ShutdownPolicy::Halt {
            self.halted.store(true, Ordering::Release);
        }

        if previous == STATE_IDLE {
            let receivers = std::mem::take(
                &mut *self
                    .receivers
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner),
            );
            for (partition, rx) in receivers.iter().enumerate() {
                let dropped = discard_pending(rx);
                if let Some(m) = self.metrics.get(partition) {
                    m.abandoned.fetch_add(dropped, Ordering::Relaxed);
                    m.queue_depth.store(0, Ordering::Relaxed);
                }
            }
        } else if previous == STATE_RUNNING {
            for (partition, sender) in self.senders.iter().enumerate() {
                if sender.send(Job::Stop).is_err() {
                    debug!(pool = %self.name, partition, "Worker already exited");
                }
            }
        }
        drop(closing);

        let handles =
            std::mem::take(&mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner));
        let workers = handles.len();
        for handle in handles {
            if handle.join().is_err() {
                error!(pool = %self.name, "Worker coroutine terminated abnormally");
            }
        }

        let stats = self.metrics();
        let report = ShutdownReport {
            policy,
            workers,
            processed: stats.iter().map(|s| s.completed + s.failed).sum(),
            abandoned: stats.iter().map(|s| s.abandoned).sum(),
        };
        info!(
            pool = %self.name,
            policy = ?policy,
            workers = report.workers,
            processed = report.processed,
            abandoned = report.abandoned,
            "Partition workers stopped"
        );
        report
    }
}

impl<T: Send + 'static> Drop for PartitionedPool<T> {
    fn drop(&mut self) {
        if self.is_running() {
            self.shutdown(ShutdownPolicy::Halt);
        }
    }
}

struct Worker<T, F> {
    pool: String,
    partition: usize,
    rx: mpsc::Receiver<Job<T>>,
    work: Arc<F>,
    metrics: Arc<Vec<PartitionMetrics>>,
    halted: Arc<AtomicBool>,
}

impl<T, F> Worker<T, F>
where
    T: Send + 'static,
    F: Fn(usize, T) -> JobStatus + Send + Sync + 'static,
{
    fn run(self) {
        debug!(pool = %self.pool, partition = self.partition, "Worker coroutine started");
        let Some(metrics) = self.metrics.get(self.partition) else {
            return;
        };

        // Stops on the sentinel or when every sender is gone.
        while let Ok(Job::Run(job)) = self.rx.recv() {
            metrics.queue_depth.fetch_sub(1, Ordering::AcqRel);

            if self.halted.load(Ordering::Acquire) {
                metrics.abandoned.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            let status = match catch_unwind(AssertUnwindSafe(|| (self.work)(self.partition, job))) {
                Ok(status) => status,
                Err(panic) => {
                    error!(
                        pool = %self.pool,
                        partition = self.partition,
                        panic_message = %panic_message(panic.as_ref()),
                        "Job panicked outside the invocation barrier"
                    );
                    JobStatus::Failed
                }
            };
            metrics.record_completion(status);
        }

        let leftover = discard_pending(&self.rx);
        if leftover > 0 {
            metrics.abandoned.fetch_add(leftover, Ordering::Relaxed);
            metrics.queue_depth.fetch_sub(leftover as usize, Ordering::AcqRel);
        }
        debug!(pool = %self.pool, partition = self.partition, "Worker coroutine exiting");
    }
}

/// Drain a receiver without running anything; returns the number of real jobs dropped.
fn discard_pending<T>(rx: &mpsc::Receiver<Job<T>>) -> u64 {
    let mut dropped = 0;
    while let Ok(job) = rx.try_recv() {
        if matches!(job, Job::Run(_)) {
            dropped += 1;
        }
    }
    dropped
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Sleep without blocking the scheduler thread when called from a coroutine.
fn pause(duration: Duration) {
    if may::coroutine::is_coroutine() {
        may::coroutine::sleep(duration);
    } else {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn pool(queues: usize) -> PartitionedPool<u32> {
        may::config().set_workers(2);
        PartitionedPool::new("test", GroupConfig::with_queues(queues))
    }

    #[test]
    fn test_zero_queues_becomes_one() {
        let pool = pool(0);
        assert_eq!(pool.queue_num(), 1);
    }

    #[test]
    fn test_out_of_range_partition() {
        let pool = pool(2);
        assert_eq!(
            pool.enqueue(2, 1),
            Err(EnqueueError::OutOfRange {
                partition: 2,
                queues: 2
            })
        );
    }

    #[test]
    fn test_fifo_per_partition_with_drain() {
        let pool = pool(2);
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let seen_in = Arc::clone(&seen);
        pool.run(move |partition, n| {
            seen_in.lock().unwrap().push((partition, n));
            JobStatus::Completed
        })
        .unwrap();

        for n in 0..100 {
            pool.enqueue((n % 2) as usize, n).unwrap();
        }
        let report = pool.shutdown(ShutdownPolicy::Drain);
        assert_eq!(report.workers, 2);
        assert_eq!(report.processed, 100);
        assert_eq!(report.abandoned, 0);

        let seen = seen.lock().unwrap();
        for partition in 0..2 {
            let order: Vec<u32> = seen
                .iter()
                .filter(|(p, _)| *p == partition)
                .map(|(_, n)| *n)
                .collect();
            let expected: Vec<u32> = (0..100).filter(|n| (n % 2) as usize == partition).collect();
            assert_eq!(order, expected);
        }
    }

    #[test]
    fn test_run_twice_fails() {
        let pool = pool(1);
        pool.run(|_, _| JobStatus::Completed).unwrap();
        assert!(matches!(
            pool.run(|_, _| JobStatus::Completed),
            Err(PoolError::AlreadyRunning { .. })
        ));
        pool.shutdown(ShutdownPolicy::Drain);
        assert!(matches!(
            pool.run(|_, _| JobStatus::Completed),
            Err(PoolError::ShutDown { .. })
        ));
    }

    #[test]
    fn test_enqueue_after_shutdown_is_closed() {
        let pool = pool(1);
        pool.run(|_, _| JobStatus::Completed).unwrap();
        pool.shutdown(ShutdownPolicy::Drain);
        assert_eq!(pool.enqueue(0, 1), Err(EnqueueError::Closed { partition: 0 }));
    }

    #[test]
    fn test_shed_rejects_when_full() {
        may::config().set_workers(2);
        let config = GroupConfig::with_queues(1).with_queue_bound(2, BackpressureMode::Shed);
        let pool: PartitionedPool<u32> = PartitionedPool::new("shed", config);

        // Not running yet, so nothing is consumed.
        pool.enqueue(0, 1).unwrap();
        pool.enqueue(0, 2).unwrap();
        assert_eq!(
            pool.enqueue(0, 3),
            Err(EnqueueError::QueueFull {
                partition: 0,
                bound: 2
            })
        );
        let stats = pool.metrics()[0];
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.queue_depth, 2);
        assert_eq!(stats.dispatched, 2);
    }

    #[test]
    fn test_block_times_out_when_full() {
        may::config().set_workers(2);
        let config = GroupConfig::with_queues(1)
            .with_queue_bound(1, BackpressureMode::Block)
            .with_backpressure_timeout(Duration::from_millis(20));
        let pool: PartitionedPool<u32> = PartitionedPool::new("block", config);

        pool.enqueue(0, 1).unwrap();
        let started = Instant::now();
        assert!(matches!(pool.enqueue(0, 2), Err(EnqueueError::QueueFull { .. })));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_shutdown_before_run_abandons_queue() {
        let pool = pool(2);
        pool.enqueue(0, 1).unwrap();
        pool.enqueue(1, 2).unwrap();
        let report = pool.shutdown(ShutdownPolicy::Drain);
        assert_eq!(report.workers, 0);
        assert_eq!(report.abandoned, 2);
        assert_eq!(report.processed, 0);
    }

    #[test]
    fn test_failed_status_is_counted() {
        let pool = pool(1);
        pool.run(|_, n| {
            if n % 2 == 0 {
                JobStatus::Completed
            } else {
                JobStatus::Failed
            }
        })
        .unwrap();
        for n in 0..10 {
            pool.enqueue(0, n).unwrap();
        }
        pool.shutdown(ShutdownPolicy::Drain);
        let stats = pool.metrics()[0];
        assert_eq!(stats.completed, 5);
        assert_eq!(stats.failed, 5);
        assert_eq!(stats.queue_depth, 0);
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_size("0x10000"), Some(0x10000));
        assert_eq!(parse_size("4096"), Some(4096));
        assert_eq!(parse_size("zz"), None);
        assert_eq!(BackpressureMode::parse("SHED"), Some(BackpressureMode::Shed));
        assert_eq!(ShutdownPolicy::parse("halt"), Some(ShutdownPolicy::Halt));
        assert_eq!(ShutdownPolicy::parse("later"), None);
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_message(boxed.as_ref()), "static");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(boxed.as_ref()), "non-string panic payload");
    }
}
