//! # Route Module
//!
//! Parses the dot-delimited route strings that address handler methods:
//!
//! ```text
//! <nodeType>.<handlerName>.<methodName>
//!   game   .   Room      .   join
//! ```
//!
//! Segment content is opaque at this layer. Only the shape is checked:
//! exactly three segments, none of them empty. Name normalization of the
//! handler segment happens later, at resolution time.

use std::fmt;
use std::str::FromStr;

use crate::error::RouteError;

/// Delimiter between route segments.
pub const ROUTE_DELIMITER: char = '.';

/// A decoded `node.handler.method` route.
///
/// # Example
///
/// ```rust
/// use brrtmesh::route::Route;
///
/// let route = Route::decode("game.Room.join").unwrap();
/// assert_eq!(route.node_type(), "game");
/// assert_eq!(route.handler_name(), "Room");
/// assert_eq!(route.method(), "join");
/// assert_eq!(route.to_string(), "game.Room.join");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    node_type: String,
    handler_name: String,
    method: String,
}

impl Route {
    /// Decode a route string. Never panics.
    ///
    /// # Errors
    ///
    /// * [`RouteError::SegmentCount`] - the string does not have exactly three segments
    /// * [`RouteError::EmptySegment`] - one of the segments is empty
    pub fn decode(route: &str) -> Result<Self, RouteError> {
        let mut segments: [&str; 3] = [""; 3];
        let mut found = 0usize;
        for segment in route.split(ROUTE_DELIMITER) {
            if found < segments.len() {
                segments[found] = segment;
            }
            found += 1;
        }

        if found != segments.len() {
            return Err(RouteError::SegmentCount {
                route: route.to_string(),
                found,
            });
        }

        if let Some(index) = segments.iter().position(|s| s.is_empty()) {
            return Err(RouteError::EmptySegment {
                route: route.to_string(),
                index,
            });
        }

        let [node_type, handler_name, method] = segments;
        Ok(Self {
            node_type: node_type.to_string(),
            handler_name: handler_name.to_string(),
            method: method.to_string(),
        })
    }

    #[inline]
    #[must_use]
    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    #[inline]
    #[must_use]
    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    #[inline]
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }
}

impl FromStr for Route {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{ROUTE_DELIMITER}{}{ROUTE_DELIMITER}{}",
            self.node_type, self.handler_name, self.method
        )
    }
}
