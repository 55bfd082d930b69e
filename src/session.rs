//! Boundaries to the collaborators the dispatcher talks to but does not own:
//! the network session, the hosting application and in-process events.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;

/// Status code returned by a failed [`Session::rpc`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RpcStatus(pub i32);

impl fmt::Display for RpcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rpc status {}", self.0)
    }
}

/// A client connection as seen by handler code.
///
/// Sessions are created and torn down by the network layer; the dispatcher
/// only reads [`sid`](Session::sid) for partitioning and logging, and passes
/// the session through to local handlers and filters.
pub trait Session: Send + Sync {
    /// Unique session id. Local messages from one session share a partition.
    fn sid(&self) -> &str;

    /// Bound user id, `0` when unauthenticated.
    fn uid(&self) -> i64 {
        0
    }

    /// Write raw bytes to the client.
    fn send_raw(&self, bytes: &[u8]);

    /// Call a remote node.
    ///
    /// # Errors
    ///
    /// Returns the remote status code when the call did not succeed.
    fn rpc(&self, node_id: &str, route: &str, request: &Value) -> Result<Value, RpcStatus>;

    /// Reply to the client message `mid`.
    fn response(&self, mid: u64, value: Value, is_error: bool);

    /// Push an unsolicited message to the client.
    fn push(&self, route: &str, value: Value);

    /// Disconnect the client with a reason.
    fn kick(&self, reason: Value);

    fn remote_addr(&self) -> String;

    fn close(&self);
}

/// The hosting application, read-only from the dispatcher's perspective.
pub trait Application: Send + Sync {
    fn node_id(&self) -> &str;

    /// Node type this server serves; local routes must carry the same value.
    fn node_type(&self) -> &str;

    /// Coarse circuit breaker checked at every dispatch entry point.
    fn running(&self) -> bool;
}

/// Ready-made [`Application`] with a togglable running flag.
#[derive(Debug)]
pub struct AppHandle {
    node_id: String,
    node_type: String,
    running: AtomicBool,
}

impl AppHandle {
    /// Create a handle in the running state.
    #[must_use]
    pub fn new(node_id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            node_type: node_type.into(),
            running: AtomicBool::new(true),
        }
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }
}

impl Application for AppHandle {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn node_type(&self) -> &str {
        &self.node_type
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// An in-process event delivered to every handler subscribed to its name.
pub trait Event: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Partition key: events sharing an id are processed in posting order
    /// within each group.
    fn unique_id(&self) -> i64 {
        0
    }

    /// Used by typed subscribers to downcast to the concrete event.
    fn as_any(&self) -> &dyn Any;
}

/// Generic event carrying a JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleEvent {
    pub name: String,
    pub unique_id: i64,
    pub payload: Value,
}

impl SimpleEvent {
    #[must_use]
    pub fn new(name: impl Into<String>, unique_id: i64, payload: Value) -> Self {
        Self {
            name: name.into(),
            unique_id,
            payload,
        }
    }
}

impl Event for SimpleEvent {
    fn name(&self) -> &str {
        &self.name
    }

    fn unique_id(&self) -> i64 {
        self.unique_id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Session that ignores all output.
    pub(crate) struct NullSession {
        pub sid: String,
        pub uid: i64,
    }

    impl NullSession {
        pub(crate) fn shared(sid: &str) -> std::sync::Arc<dyn Session> {
            std::sync::Arc::new(Self {
                sid: sid.to_string(),
                uid: 0,
            })
        }
    }

    impl Session for NullSession {
        fn sid(&self) -> &str {
            &self.sid
        }
        fn uid(&self) -> i64 {
            self.uid
        }
        fn send_raw(&self, _bytes: &[u8]) {}
        fn rpc(&self, _node_id: &str, _route: &str, _request: &Value) -> Result<Value, RpcStatus> {
            Err(RpcStatus(-1))
        }
        fn response(&self, _mid: u64, _value: Value, _is_error: bool) {}
        fn push(&self, _route: &str, _value: Value) {}
        fn kick(&self, _reason: Value) {}
        fn remote_addr(&self) -> String {
            "127.0.0.1:0".to_string()
        }
        fn close(&self) {}
    }
}
