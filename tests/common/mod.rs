#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use brrtmesh::session::{AppHandle, Application, RpcStatus, Session};
use parking_lot::Mutex;
use serde_json::Value;

/// Session that records everything handlers send to the client.
#[derive(Default)]
pub struct RecordingSession {
    pub sid: String,
    pub uid: i64,
    pub pushes: Mutex<Vec<(String, Value)>>,
    pub responses: Mutex<Vec<(u64, Value, bool)>>,
    pub kicked: Mutex<Option<Value>>,
}

impl RecordingSession {
    pub fn new(sid: &str) -> Arc<Self> {
        Arc::new(Self {
            sid: sid.to_string(),
            ..Self::default()
        })
    }

    pub fn shared(sid: &str) -> Arc<dyn Session> {
        Self::new(sid)
    }
}

impl Session for RecordingSession {
    fn sid(&self) -> &str {
        &self.sid
    }

    fn uid(&self) -> i64 {
        self.uid
    }

    fn send_raw(&self, _bytes: &[u8]) {}

    fn rpc(&self, _node_id: &str, _route: &str, _request: &Value) -> Result<Value, RpcStatus> {
        Err(RpcStatus(404))
    }

    fn response(&self, mid: u64, value: Value, is_error: bool) {
        self.responses.lock().push((mid, value, is_error));
    }

    fn push(&self, route: &str, value: Value) {
        self.pushes.lock().push((route.to_string(), value));
    }

    fn kick(&self, reason: Value) {
        *self.kicked.lock() = Some(reason);
    }

    fn remote_addr(&self) -> String {
        "127.0.0.1:3250".to_string()
    }

    fn close(&self) {}
}

pub fn app(node_type: &str) -> (Arc<AppHandle>, Arc<dyn Application>) {
    let handle = Arc::new(AppHandle::new(format!("{node_type}-1"), node_type));
    let app: Arc<dyn Application> = Arc::clone(&handle) as Arc<dyn Application>;
    (handle, app)
}

/// Ordered log shared between handlers and the test body.
#[derive(Clone, Default)]
pub struct Recorder<T>(pub Arc<Mutex<Vec<T>>>);

impl<T: Clone> Recorder<T> {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn push(&self, item: T) {
        self.0.lock().push(item);
    }

    pub fn items(&self) -> Vec<T> {
        self.0.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }
}

pub fn init_runtime() {
    may::config().set_workers(2);
}
