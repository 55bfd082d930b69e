//! # brrtmesh
//!
//! **brrtmesh** is the message-routing and partitioned-dispatch core of a
//! networked application server, running on the `may` coroutine runtime.
//!
//! Client messages ("local"), server-to-server calls ("remote") and
//! in-process events are resolved to registered handler methods and executed
//! on partitioned worker queues. Everything sharing a partition key (a
//! session, an actor, an entity id) is processed strictly in arrival order;
//! different keys run concurrently.
//!
//! ## Architecture
//!
//! - **[`route`]** - `node.handler.method` route decoding
//! - **[`invoke`]** - invocation descriptors built once at registration time
//! - **[`handler`]** - named handlers with local, remote and event method tables
//! - **[`group`]** - handler groups owning a fixed number of partitions
//! - **[`worker_pool`]** - per-partition FIFO queues, one worker coroutine each
//! - **[`executor`]** - queued units of work and the partition-key function
//! - **[`filter`]** - before/after predicates around local invocations
//! - **[`dispatcher`]** - the [`Component`](dispatcher::Component): registry, resolution,
//!   dispatch entry points and lifecycle
//! - **[`session`]** - boundaries to the network session, the application and events
//! - **[`runtime_config`]** / **[`logging`]** - startup configuration and log output
//!
//! ### Local Message Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Net as Network layer
//!     participant C as Component
//!     participant G as HandlerGroup
//!     participant W as Partition worker
//!     participant H as Handler method
//!
//!     Net->>C: process_local(session, message)
//!     C->>C: running? session? message?
//!     C->>C: parse route (cached), check node type
//!     C->>C: normalize handler name, scan groups
//!     C->>G: queue_hash(executor) -> partition
//!     C->>G: in_queue(partition, executor)
//!     C-->>Net: Dispatch::Enqueued { partition }
//!     G->>W: FIFO
//!     W->>W: before filters
//!     W->>H: (context, session, message)
//!     W->>W: after filters
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use brrtmesh::dispatcher::Component;
//! use brrtmesh::group::HandlerGroup;
//! use brrtmesh::handler::Handler;
//! use brrtmesh::message::Message;
//! use brrtmesh::session::{AppHandle, Application};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let app: Arc<dyn Application> = Arc::new(AppHandle::new("game-1", "game"));
//!
//! let mut room = Handler::new("Room");
//! room.add_local("join", |ctx, session, msg| {
//!     let bytes = msg.data.len();
//!     tracing::info!(sid = %session.sid(), mid = ?ctx.message_id(), bytes, "join");
//! })?;
//!
//! let mut component = Component::new(Arc::clone(&app));
//! component.register(HandlerGroup::new(4).with_handlers([room]))?;
//! component.init()?;
//! component.on_after_init()?;
//!
//! // The network layer hands every inbound message to the component.
//! let message = Arc::new(Message::new(1, "game.Room.join", b"{}".to_vec()));
//! # let session: Option<Arc<dyn brrtmesh::session::Session>> = None;
//! let dispatch = component.process_local(session, Some(message));
//! # assert!(!dispatch.is_enqueued());
//!
//! component.on_stop()?;
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod filter;
pub mod group;
pub mod handler;
pub mod ids;
pub mod invoke;
pub mod lifecycle;
pub mod logging;
pub mod message;
pub mod route;
pub mod runtime_config;
pub mod session;
pub mod worker_pool;

pub use dispatcher::{Component, ComponentBuilder, Dispatch, HANDLER_COMPONENT};
pub use error::{
    BuildError, DropReason, EnqueueError, InvocationError, LifecycleError, NotFoundError,
    RegistrationError, RouteError,
};
pub use group::HandlerGroup;
pub use handler::{Handler, HandlerHooks};
pub use route::Route;
