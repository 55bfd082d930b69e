//! Inbound message shapes inspected by the dispatcher.
//!
//! Only the fields routing needs are defined here: id, route and an opaque
//! payload. Payload encoding beyond the JSON helpers is the transport's concern.

use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;

use crate::error::RouteError;
use crate::route::Route;

/// A client-originated message addressed by route.
///
/// The route string is fixed at construction; its parsed form is computed on
/// first access and cached.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: u64,
    pub route: String,
    pub data: Vec<u8>,
    parsed: OnceCell<Route>,
}

impl Message {
    #[must_use]
    pub fn new(id: u64, route: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            route: route.into(),
            data: data.into(),
            parsed: OnceCell::new(),
        }
    }

    /// Parse the route, caching the result on success.
    ///
    /// # Errors
    ///
    /// Returns the [`RouteError`] from [`Route::decode`]. Failures are not
    /// cached; a later call re-parses.
    pub fn parse_route(&self) -> Result<&Route, RouteError> {
        self.parsed.get_or_try_init(|| Route::decode(&self.route))
    }

    /// The cached parsed route, if [`parse_route`](Self::parse_route) succeeded before.
    #[inline]
    #[must_use]
    pub fn route_info(&self) -> Option<&Route> {
        self.parsed.get()
    }

    /// Decode the payload as JSON.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when the payload does not match `T`.
    pub fn decode_data<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.data)
    }
}

/// Route and payload of a server-to-server call.
///
/// `partition_key` selects the worker queue (for example the originating
/// session id) so calls about the same entity stay ordered. Without it the
/// route is used as the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePacket {
    pub route: String,
    pub data: Vec<u8>,
    pub partition_key: Option<String>,
}

impl RemotePacket {
    #[must_use]
    pub fn new(route: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            route: route.into(),
            data: data.into(),
            partition_key: None,
        }
    }

    #[must_use]
    pub fn with_partition_key(mut self, key: impl Into<String>) -> Self {
        self.partition_key = Some(key.into());
        self
    }

    /// Key used for partition assignment.
    #[inline]
    #[must_use]
    pub fn routing_key(&self) -> &str {
        self.partition_key.as_deref().unwrap_or(&self.route)
    }

    /// Decode the payload as JSON.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when the payload does not match `T`.
    pub fn decode_data<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_route_is_parsed_lazily_and_cached() {
        let msg = Message::new(7, "game.Room.join", b"{}".to_vec());
        assert!(msg.route_info().is_none());

        let first = msg.parse_route().unwrap() as *const Route;
        let second = msg.parse_route().unwrap() as *const Route;
        assert_eq!(first, second);
        assert_eq!(msg.route_info().map(Route::method), Some("join"));
        assert_eq!(msg.route, "game.Room.join");
    }

    #[test]
    fn test_bad_route_is_not_cached() {
        let msg = Message::new(1, "game.join", Vec::new());
        assert!(msg.parse_route().is_err());
        assert!(msg.route_info().is_none());
    }

    #[test]
    fn test_decode_data() {
        #[derive(Deserialize)]
        struct Join {
            room: u32,
        }
        let msg = Message::new(1, "game.Room.join", br#"{"room":12}"#.to_vec());
        assert_eq!(msg.decode_data::<Join>().unwrap().room, 12);
        assert!(Message::new(1, "a.b.c", b"nope".to_vec())
            .decode_data::<Join>()
            .is_err());
    }

    #[test]
    fn test_remote_routing_key_falls_back_to_route() {
        let packet = RemotePacket::new("game.Room.sync", Vec::new());
        assert_eq!(packet.routing_key(), "game.Room.sync");
        let packet = packet.with_partition_key("sid-9");
        assert_eq!(packet.routing_key(), "sid-9");
    }
}
