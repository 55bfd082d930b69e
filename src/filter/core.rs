use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::message::Message;
use crate::session::Session;

/// Predicate run around local handler invocation.
///
/// Returning `false` short-circuits the rest of the chain. For a before-filter
/// it also skips the handler and every after-filter.
pub trait Filter: Send + Sync {
    fn call(&self, ctx: &Context, session: &Arc<dyn Session>, message: &Message) -> bool;

    /// Label used in diagnostics.
    fn name(&self) -> &str {
        "filter"
    }
}

impl<F> Filter for F
where
    F: Fn(&Context, &Arc<dyn Session>, &Message) -> bool + Send + Sync,
{
    fn call(&self, ctx: &Context, session: &Arc<dyn Session>, message: &Message) -> bool {
        self(ctx, session, message)
    }
}

/// Immutable, shared snapshot of an ordered filter list.
///
/// Executors hold the snapshot taken when they were built; filters added to
/// the component later never apply to them.
#[derive(Clone, Default)]
pub struct FilterChain(Arc<Vec<Arc<dyn Filter>>>);

impl FilterChain {
    #[must_use]
    pub fn new(filters: Vec<Arc<dyn Filter>>) -> Self {
        Self(Arc::new(filters))
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Filter>> {
        self.0.iter()
    }

    /// Run filters in order; returns the index of the first one that said no.
    #[must_use]
    pub fn run(
        &self,
        ctx: &Context,
        session: &Arc<dyn Session>,
        message: &Message,
    ) -> Option<usize> {
        self.0
            .iter()
            .position(|filter| !filter.call(ctx, session, message))
    }

    /// `true` when both snapshots are the same allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<Arc<Vec<Arc<dyn Filter>>>> for FilterChain {
    fn from(filters: Arc<Vec<Arc<dyn Filter>>>) -> Self {
        Self(filters)
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.0.iter().map(|filter| filter.name()))
            .finish()
    }
}
