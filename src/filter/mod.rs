//! # Filter Module
//!
//! Before/after predicates run around every local handler invocation.
//!
//! A filter has the shape `(context, session, message) -> bool`. Any closure
//! with that signature is a [`Filter`]. The component snapshots its filter
//! lists into [`FilterChain`]s when it builds an executor.
//!
//! ## Built-in filters
//!
//! - [`TracingFilter`]: logs each message with its request id
//! - [`MetricsFilter`]: per-route received/handled counters in [`RouteMetrics`]
//!
//! ## Example
//!
//! ```rust
//! use brrtmesh::filter::{Filter, FilterChain, TracingFilter};
//! use std::sync::Arc;
//!
//! let only_bound_users = |_ctx: &brrtmesh::context::Context,
//!                         session: &Arc<dyn brrtmesh::session::Session>,
//!                         _msg: &brrtmesh::message::Message| session.uid() > 0;
//! let chain = FilterChain::new(vec![
//!     Arc::new(TracingFilter) as Arc<dyn Filter>,
//!     Arc::new(only_bound_users) as Arc<dyn Filter>,
//! ]);
//! assert_eq!(chain.len(), 2);
//! ```

mod core;
mod metrics;
mod tracing;

pub use self::core::{Filter, FilterChain};
pub use self::metrics::{MetricsFilter, RouteMetrics, RouteStats};
pub use self::tracing::TracingFilter;
