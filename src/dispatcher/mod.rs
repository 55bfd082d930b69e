//! # Dispatcher Module
//!
//! The [`Component`] is the entry point of the routing core. It owns every
//! [`HandlerGroup`](crate::group::HandlerGroup), resolves routes to handler
//! methods and places executors on the right partition.
//!
//! ## Request Flow
//!
//! 1. The network layer calls [`Component::process_local`] with a session and message
//! 2. The route is parsed (and cached on the message) and checked against this node's type
//! 3. The handler name is normalized and looked up group by group, first match wins
//! 4. An executor with a fresh [`Context`](crate::context::Context) and the current
//!    filter snapshots goes onto the partition chosen by the group's hash
//! 5. That partition's worker runs before-filters, the method and after-filters
//!
//! Remote calls take the same path through [`Component::remote_executor`] and
//! [`Component::process_remote`]; events fan out through [`Component::post_event`].
//!
//! ## Error Handling
//!
//! Nothing on the dispatch path panics. Every reason a message is not
//! enqueued is returned as [`Dispatch::Dropped`] and logged; handler failures
//! are logged by the worker that ran them.
//!
//! ## Example
//!
//! ```rust
//! use brrtmesh::dispatcher::Component;
//! use brrtmesh::handler::Handler;
//! use brrtmesh::session::{AppHandle, Application};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let app: Arc<dyn Application> = Arc::new(AppHandle::new("game-1", "game"));
//! let mut component = Component::builder(Arc::clone(&app))
//!     .print_route_log(true)
//!     .build();
//!
//! let mut room = Handler::new("Room");
//! room.add_local("join", |_ctx, session, _msg| {
//!     session.push("onJoin", serde_json::json!({"ok": true}));
//! })?;
//! component.register_to_group([room])?;
//!
//! component.init()?;
//! component.on_after_init()?;
//! assert!(component.resolve("game.room.join").is_ok());
//! component.on_stop()?;
//! # Ok(())
//! # }
//! ```

mod core;

pub use self::core::{
    Component, ComponentBuilder, Dispatch, NameNormalizer, Resolved, HANDLER_COMPONENT,
};
