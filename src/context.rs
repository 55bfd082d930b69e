//! Request-scoped context handed to filters and handler methods.

use smallvec::SmallVec;

use crate::ids::RequestId;

/// Context key holding the inbound message id.
pub const MESSAGE_ID_KEY: &str = "mid";
/// Context key holding the inbound route string.
pub const ROUTE_KEY: &str = "route";

/// Maximum inline annotations before heap allocation
pub const MAX_INLINE_VALUES: usize = 4;

/// Correlation data for one dispatched invocation.
///
/// Keys are `&'static str` constants; values are per-message strings. Local
/// dispatch annotates [`MESSAGE_ID_KEY`] and [`ROUTE_KEY`].
#[derive(Debug, Clone, Default)]
pub struct Context {
    request_id: RequestId,
    values: SmallVec<[(&'static str, String); MAX_INLINE_VALUES]>,
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an annotation. A later value for the same key shadows earlier ones.
    #[must_use]
    pub fn with_value(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.values.push((key, value.into()));
        self
    }

    /// Get an annotation by key ("last write wins").
    #[inline]
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .rfind(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    #[inline]
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    #[must_use]
    pub fn message_id(&self) -> Option<u64> {
        self.value(MESSAGE_ID_KEY).and_then(|v| v.parse().ok())
    }

    #[must_use]
    pub fn route(&self) -> Option<&str> {
        self.value(ROUTE_KEY)
    }
}
