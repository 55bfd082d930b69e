//! # Executor Module
//!
//! An [`Executor`] is one queued unit of work: everything a worker needs to
//! run a local message, a remote call or an event fan-out without looking
//! anything up again.
//!
//! Executors are built by the [`Component`](crate::dispatcher::Component) (or
//! by the RPC layer for remote calls), assigned to a partition with
//! [`default_queue_hash`] or a group's custom hash, and consumed by exactly one
//! worker.
//!
//! ## Partition keys
//!
//! | Variant  | Key                                         |
//! |----------|---------------------------------------------|
//! | Local    | session id                                  |
//! | Remote   | packet `partition_key`, else its route      |
//! | Event    | event `unique_id()`                         |
//!
//! Every message of one session, every call sharing a partition key and every
//! event about one entity are therefore processed in arrival order.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::context::Context;
use crate::error::InvocationError;
use crate::filter::FilterChain;
use crate::invoke::{HandlerFn, Invocation, MethodKind};
use crate::message::{Message, RemotePacket};
use crate::session::{Application, Event, Session};
use crate::worker_pool::panic_message;

/// Maps an executor to a partition in `[0, queue_num)`.
///
/// Results outside the range are reduced modulo `queue_num` by the group.
pub type QueueHash = Arc<dyn Fn(&Executor, usize) -> usize + Send + Sync>;

/// A client message bound to its resolved local method.
pub struct ExecutorLocal {
    pub app: Arc<dyn Application>,
    pub session: Arc<dyn Session>,
    pub message: Arc<Message>,
    pub handler_fn: Arc<HandlerFn>,
    pub context: Context,
    pub before_filters: FilterChain,
    pub after_filters: FilterChain,
}

/// A server-to-server call bound to its resolved remote method.
pub struct ExecutorRemote {
    pub app: Arc<dyn Application>,
    pub packet: RemotePacket,
    pub handler_fn: Arc<HandlerFn>,
    pub context: Context,
}

/// An event bound to one handler's subscribers for its name.
pub struct ExecutorEvent {
    pub event: Arc<dyn Event>,
    pub handler_name: String,
    pub subscribers: Vec<Arc<HandlerFn>>,
}

/// Queued unit of work.
pub enum Executor {
    Local(ExecutorLocal),
    Remote(ExecutorRemote),
    Event(ExecutorEvent),
}

/// Stable key an executor is partitioned by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionKey<'a> {
    Session(&'a str),
    Route(&'a str),
    Unique(i64),
}

/// Result of running an executor on a worker.
#[derive(Debug)]
pub enum Outcome {
    /// The method (or every subscriber) ran and succeeded
    Completed,
    /// Before-filter `index` rejected the message; nothing else ran
    Filtered { index: usize },
    /// The method failed, panicked, or a filter panicked
    Failed(InvocationError),
    /// Some event subscribers failed; the rest still ran
    EventFailures {
        total: usize,
        failures: Vec<InvocationError>,
    },
}

impl Outcome {
    /// `true` unless something failed. A filtered message is not a failure.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Completed | Outcome::Filtered { .. })
    }
}

impl Executor {
    #[must_use]
    pub fn kind(&self) -> MethodKind {
        match self {
            Executor::Local(_) => MethodKind::Local,
            Executor::Remote(_) => MethodKind::Remote,
            Executor::Event(_) => MethodKind::Event,
        }
    }

    #[must_use]
    pub fn partition_key(&self) -> PartitionKey<'_> {
        match self {
            Executor::Local(local) => PartitionKey::Session(local.session.sid()),
            Executor::Remote(remote) => PartitionKey::Route(remote.packet.routing_key()),
            Executor::Event(event) => PartitionKey::Unique(event.event.unique_id()),
        }
    }

    /// Route, or event name, for diagnostics.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Executor::Local(local) => &local.message.route,
            Executor::Remote(remote) => &remote.packet.route,
            Executor::Event(event) => event.event.name(),
        }
    }

    /// Run the executor on the current thread or coroutine.
    ///
    /// Never panics: method bodies and filters run behind a per-call barrier.
    pub fn execute(&self) -> Outcome {
        match self {
            Executor::Local(local) => local.execute(),
            Executor::Remote(remote) => remote.execute(),
            Executor::Event(event) => event.execute(),
        }
    }
}

impl ExecutorLocal {
    fn execute(&self) -> Outcome {
        let ctx = &self.context;
        let session = &self.session;
        let message = self.message.as_ref();

        match isolate("before filters", || {
            self.before_filters.run(ctx, session, message)
        }) {
            Ok(None) => {}
            Ok(Some(index)) => return Outcome::Filtered { index },
            Err(err) => return Outcome::Failed(err),
        }

        let result = invoke_isolated(
            &self.handler_fn,
            Invocation::Local {
                ctx,
                session,
                message,
            },
        );

        if let Err(err) = isolate("after filters", || {
            self.after_filters.run(ctx, session, message)
        }) {
            return Outcome::Failed(result.err().unwrap_or(err));
        }

        match result {
            Ok(()) => Outcome::Completed,
            Err(err) => Outcome::Failed(err),
        }
    }
}

impl ExecutorRemote {
    fn execute(&self) -> Outcome {
        match invoke_isolated(
            &self.handler_fn,
            Invocation::Remote {
                ctx: &self.context,
                packet: &self.packet,
            },
        ) {
            Ok(()) => Outcome::Completed,
            Err(err) => Outcome::Failed(err),
        }
    }
}

impl ExecutorEvent {
    fn execute(&self) -> Outcome {
        let event = self.event.as_ref();
        let failures: Vec<InvocationError> = self
            .subscribers
            .iter()
            .filter_map(|subscriber| {
                invoke_isolated(subscriber, Invocation::Event { event }).err()
            })
            .collect();

        if failures.is_empty() {
            Outcome::Completed
        } else {
            Outcome::EventFailures {
                total: self.subscribers.len(),
                failures,
            }
        }
    }
}

/// Run `f`, turning a panic into [`InvocationError::Panicked`].
pub(crate) fn isolate<T>(method: &str, f: impl FnOnce() -> T) -> Result<T, InvocationError> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|panic| InvocationError::Panicked {
        method: method.to_string(),
        message: panic_message(panic.as_ref()),
    })
}

/// Invoke a descriptor behind the per-call failure barrier.
///
/// # Errors
///
/// The method's own error, or [`InvocationError::Panicked`].
pub fn invoke_isolated(
    handler_fn: &HandlerFn,
    invocation: Invocation<'_>,
) -> Result<(), InvocationError> {
    isolate(handler_fn.name(), || handler_fn.invoke(invocation))?
}

/// Partition for `executor` among `queue_num` queues.
///
/// Pure function of the executor's [`PartitionKey`] and `queue_num`. Uses
/// SipHash with fixed keys, so the result is also stable across processes
/// built from the same toolchain.
#[must_use]
pub fn default_queue_hash(executor: &Executor, queue_num: usize) -> usize {
    partition_for(&executor.partition_key(), queue_num)
}

/// Partition for an arbitrary key among `queue_num` queues.
#[must_use]
pub fn partition_for<K: Hash + ?Sized>(key: &K, queue_num: usize) -> usize {
    let queue_num = queue_num.max(1);
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % queue_num as u64) as usize
}
