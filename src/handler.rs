//! # Handler Module
//!
//! A [`Handler`] is a named unit with three method tables:
//!
//! - **local** methods invoked by clients (`node.handler.method` routes)
//! - **remote** methods invoked by other nodes
//! - **event** subscriptions: event name to an ordered list of callbacks
//!
//! Every `add_*` call funnels through the invocation-descriptor builder in
//! [`crate::invoke`], so a bad registration fails at startup rather than on
//! the first message.
//!
//! ## Example
//!
//! ```rust
//! use brrtmesh::handler::Handler;
//! use brrtmesh::session::SimpleEvent;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), brrtmesh::error::BuildError> {
//! let mut room = Handler::new("Room");
//! room.add_local("join", |ctx, session, message| {
//!     let len = message.data.len();
//!     tracing::info!(sid = %session.sid(), mid = ?ctx.message_id(), len, "join");
//! })?
//! .add_remote_raw("sync", |_ctx, _packet| {})?
//! .add_event_typed("player.offline", |event: &SimpleEvent| {
//!     tracing::info!(uid = event.unique_id, "leave room");
//! })?;
//!
//! assert!(room.local_handler("join").is_some());
//! assert_eq!(room.event("player.offline").map(|s| s.len()), Some(1));
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::context::Context;
use crate::error::BuildError;
use crate::invoke::{HandlerFn, IntoHandlerResult, MethodKind};
use crate::message::{Message, RemotePacket};
use crate::session::{Event, Session};

/// Lifecycle notifications delivered by the component.
pub trait HandlerHooks: Send + Sync {
    /// Called once from `Component::init`, before any worker runs.
    fn on_init(&self) {}

    /// Called from `Component::on_stop`, before queues are drained or halted.
    fn on_stop(&self) {}
}

/// Named collection of local, remote and event methods.
#[derive(Default)]
pub struct Handler {
    name: String,
    locals: HashMap<String, Arc<HandlerFn>>,
    remotes: HashMap<String, Arc<HandlerFn>>,
    events: HashMap<String, Vec<Arc<HandlerFn>>>,
    hooks: Option<Arc<dyn HandlerHooks>>,
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name)
            .field("locals", &self.locals.keys().collect::<Vec<_>>())
            .field("remotes", &self.remotes.keys().collect::<Vec<_>>())
            .field("events", &self.events.keys().collect::<Vec<_>>())
            .field("hooks", &self.hooks.is_some())
            .finish()
    }
}

impl Handler {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Attach lifecycle hooks (usually the handler's own state object).
    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn HandlerHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    /// Register a prebuilt local or remote descriptor under its own name.
    ///
    /// Event descriptors are appended to the subscription list of their name.
    ///
    /// # Errors
    ///
    /// [`BuildError::DuplicateMethod`] when a local or remote name is taken.
    pub fn add_handler_fn(&mut self, handler_fn: HandlerFn) -> Result<&mut Self, BuildError> {
        let name = handler_fn.name().to_string();
        let kind = handler_fn.kind();
        let table = match kind {
            MethodKind::Local => &mut self.locals,
            MethodKind::Remote => &mut self.remotes,
            MethodKind::Event => {
                self.events
                    .entry(name)
                    .or_default()
                    .push(Arc::new(handler_fn));
                return Ok(self);
            }
        };

        if table.contains_key(&name) {
            return Err(BuildError::DuplicateMethod { kind, name });
        }
        table.insert(name, Arc::new(handler_fn));
        Ok(self)
    }

    /// Add a local method receiving `(context, session, message)`.
    ///
    /// # Errors
    ///
    /// Empty name or duplicate local method.
    pub fn add_local<F, R>(&mut self, name: &str, f: F) -> Result<&mut Self, BuildError>
    where
        F: Fn(&Context, &Arc<dyn Session>, &Message) -> R + Send + Sync + 'static,
        R: IntoHandlerResult,
    {
        self.add_handler_fn(HandlerFn::local(name, f)?)
    }

    /// Add a local method whose message payload is decoded from JSON.
    ///
    /// # Errors
    ///
    /// Empty name or duplicate local method.
    pub fn add_local_typed<T, F, R>(&mut self, name: &str, f: F) -> Result<&mut Self, BuildError>
    where
        T: DeserializeOwned + 'static,
        F: Fn(&Context, &Arc<dyn Session>, T) -> R + Send + Sync + 'static,
        R: IntoHandlerResult,
    {
        self.add_handler_fn(HandlerFn::local_typed(name, f)?)
    }

    /// Add a remote method whose packet payload is decoded from JSON.
    ///
    /// # Errors
    ///
    /// Empty name or duplicate remote method.
    pub fn add_remote<T, F, R>(&mut self, name: &str, f: F) -> Result<&mut Self, BuildError>
    where
        T: DeserializeOwned + 'static,
        F: Fn(&Context, T) -> R + Send + Sync + 'static,
        R: IntoHandlerResult,
    {
        self.add_handler_fn(HandlerFn::remote(name, f)?)
    }

    /// Add a remote method receiving the raw packet.
    ///
    /// # Errors
    ///
    /// Empty name or duplicate remote method.
    pub fn add_remote_raw<F, R>(&mut self, name: &str, f: F) -> Result<&mut Self, BuildError>
    where
        F: Fn(&Context, &RemotePacket) -> R + Send + Sync + 'static,
        R: IntoHandlerResult,
    {
        self.add_handler_fn(HandlerFn::remote_raw(name, f)?)
    }

    /// Subscribe to an event name. Subscribers run in registration order.
    ///
    /// # Errors
    ///
    /// Empty event name.
    pub fn add_event<F, R>(&mut self, name: &str, f: F) -> Result<&mut Self, BuildError>
    where
        F: Fn(&dyn Event) -> R + Send + Sync + 'static,
        R: IntoHandlerResult,
    {
        self.add_handler_fn(HandlerFn::event(name, f)?)
    }

    /// Subscribe to an event name for a concrete event type.
    ///
    /// # Errors
    ///
    /// Empty event name.
    pub fn add_event_typed<E, F, R>(&mut self, name: &str, f: F) -> Result<&mut Self, BuildError>
    where
        E: Event,
        F: Fn(&E) -> R + Send + Sync + 'static,
        R: IntoHandlerResult,
    {
        self.add_handler_fn(HandlerFn::event_typed(name, f)?)
    }

    #[must_use]
    pub fn local_handler(&self, method: &str) -> Option<&Arc<HandlerFn>> {
        self.locals.get(method)
    }

    #[must_use]
    pub fn remote_handler(&self, method: &str) -> Option<&Arc<HandlerFn>> {
        self.remotes.get(method)
    }

    /// Subscribers for an event name, in registration order.
    #[must_use]
    pub fn event(&self, name: &str) -> Option<&[Arc<HandlerFn>]> {
        self.events.get(name).map(Vec::as_slice)
    }

    pub fn local_names(&self) -> impl Iterator<Item = &str> {
        self.locals.keys().map(String::as_str)
    }

    pub fn remote_names(&self) -> impl Iterator<Item = &str> {
        self.remotes.keys().map(String::as_str)
    }

    pub fn event_names(&self) -> impl Iterator<Item = &str> {
        self.events.keys().map(String::as_str)
    }

    pub fn on_init(&self) {
        if let Some(hooks) = &self.hooks {
            hooks.on_init();
        }
    }

    pub fn on_stop(&self) {
        if let Some(hooks) = &self.hooks {
            hooks.on_stop();
        }
    }
}
