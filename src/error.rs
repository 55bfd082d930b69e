//! Error types for routing, registration, invocation and queueing.
//!
//! Everything detectable before a message is enqueued is reported as a value
//! ([`DropReason`], [`NotFoundError`]) so the dispatch hot path never unwinds.
//! Failures inside handler bodies surface as [`InvocationError`] at the worker
//! boundary. [`BuildError`] and [`RegistrationError`] are startup defects and
//! callers are expected to fail fast on them.

use std::io;

use crate::invoke::MethodKind;

/// Route string could not be split into `node.handler.method`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("route `{route}` has {found} segments, expected 3")]
    SegmentCount { route: String, found: usize },
    #[error("route `{route}` has an empty segment at position {index}")]
    EmptySegment { route: String, index: usize },
}

/// Invocation descriptor construction failed at registration time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("func name is empty")]
    EmptyName,
    #[error("func is missing. name = {name}")]
    MissingCallable { name: String },
    #[error("{kind} method `{name}` is already registered")]
    DuplicateMethod { kind: MethodKind, name: String },
}

/// A route could not be resolved to a handler or method.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotFoundError {
    #[error(transparent)]
    Decode(#[from] RouteError),
    #[error("route `{route}` has no handler name after normalization")]
    EmptyHandlerName { route: String },
    #[error("route `{route}` matches no registered handler `{handler}`")]
    NoHandler { route: String, handler: String },
    #[error("handler `{handler}` has no {kind} method `{method}`")]
    NoMethod {
        handler: String,
        method: String,
        kind: MethodKind,
    },
}

/// Group registration was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("registration is closed once the component is activated")]
    Closed,
    #[error("handler name `{name}` is registered twice in group `{group}`")]
    DuplicateHandler { group: String, name: String },
    #[error("handler name is empty in group `{group}`")]
    EmptyHandlerName { group: String },
}

/// A handler invocation failed inside a worker.
#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    #[error("handler `{method}` returned an error: {source:#}")]
    Handler {
        method: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("handler `{method}` panicked: {message}")]
    Panicked { method: String, message: String },
    #[error("handler `{method}` could not decode its payload: {source}")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("handler `{method}` expects {expected} arguments, got {found}")]
    ArgumentMismatch {
        method: String,
        expected: MethodKind,
        found: MethodKind,
    },
    #[error("subscriber `{method}` expects event type {expected}")]
    EventType {
        method: String,
        expected: &'static str,
    },
}

/// An executor could not be placed on a partition queue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    #[error("partition {partition} is full (bound = {bound})")]
    QueueFull { partition: usize, bound: usize },
    #[error("partition {partition} is closed")]
    Closed { partition: usize },
    #[error("partition {partition} is out of range (queues = {queues})")]
    OutOfRange { partition: usize, queues: usize },
}

/// Worker pool activation failed.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("group `{group}` is already running")]
    AlreadyRunning { group: String },
    #[error("group `{group}` has been shut down")]
    ShutDown { group: String },
    #[error("failed to spawn worker {partition} for group `{group}`: {source}")]
    Spawn {
        group: String,
        partition: usize,
        #[source]
        source: io::Error,
    },
}

/// Component lifecycle transition was not allowed.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("cannot move component from {from:?} to {to:?}")]
    InvalidTransition {
        from: crate::lifecycle::LifecycleState,
        to: crate::lifecycle::LifecycleState,
    },
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Configuration file or environment could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Why an inbound message or call was dropped instead of enqueued.
///
/// Drops are reported to the caller and logged; they never disconnect the
/// client or reach the worker pool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DropReason {
    #[error("application is not running")]
    NotRunning,
    #[error("session is missing")]
    MissingSession,
    #[error("message is missing")]
    MissingMessage,
    #[error("route decode error: {0}")]
    Route(RouteError),
    #[error("message node type `{actual}` does not match server node type `{expected}`")]
    NodeTypeMismatch { expected: String, actual: String },
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    Enqueue(#[from] EnqueueError),
}
