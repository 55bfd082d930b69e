use std::sync::Arc;

use tracing::debug;

use super::Filter;
use crate::context::Context;
use crate::message::Message;
use crate::session::Session;

/// Logs every local message passing through the chain at `debug` level.
///
/// Never rejects. Install it first in the before chain to see messages that a
/// later filter drops.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingFilter;

impl Filter for TracingFilter {
    fn call(&self, ctx: &Context, session: &Arc<dyn Session>, message: &Message) -> bool {
        debug!(
            request_id = %ctx.request_id(),
            sid = %session.sid(),
            uid = session.uid(),
            mid = message.id,
            route = %message.route,
            data_len = message.data.len(),
            "Local message"
        );
        true
    }

    fn name(&self) -> &str {
        "tracing"
    }
}
