//! # Invoke Module
//!
//! Invocation descriptors let generic dispatch code call arbitrary handler
//! methods through one uniform interface.
//!
//! ## Overview
//!
//! A [`HandlerFn`] is built once, when a handler method is registered. It
//! captures:
//!
//! - the method name and [`MethodKind`] (local, remote or event)
//! - the ordered parameter and return [`TypeTag`]s of the registered closure
//! - a type-erased [`Callable`] that takes an [`Invocation`]
//!
//! All argument-shape checking happens in the typed constructors
//! ([`HandlerFn::local`], [`HandlerFn::remote`], [`HandlerFn::event_typed`], ...)
//! at compile time, so workers never inspect types on the hot path. The only
//! per-call work is JSON payload decoding for typed methods, which reports
//! [`InvocationError::Decode`](crate::error::InvocationError::Decode) instead
//! of panicking.
//!
//! ## Usage
//!
//! ```rust
//! use brrtmesh::invoke::{HandlerFn, MethodKind};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct SyncState {
//!     tick: u64,
//! }
//!
//! let sync = HandlerFn::remote("sync", |_ctx, state: SyncState| {
//!     anyhow::ensure!(state.tick > 0, "tick must be positive");
//!     Ok::<(), anyhow::Error>(())
//! })
//! .unwrap();
//!
//! assert_eq!(sync.kind(), MethodKind::Remote);
//! assert_eq!(sync.params().len(), 2);
//! ```

mod core;

pub use self::core::{
    Callable, HandlerFn, Invocation, IntoHandlerResult, MethodKind, TypeList, TypeTag,
};
