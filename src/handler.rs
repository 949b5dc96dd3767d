//! Handlers for messages that arrive outside any exchange.

use crate::state::action::AsyncMessage;

/// Receives notices, notifications and parameter changes.
///
/// Called from the connection driver task, so it must not block.
pub trait AsyncMessageHandler: Send {
    fn handle(&mut self, message: &AsyncMessage);
}

impl<F> AsyncMessageHandler for F
where
    F: FnMut(&AsyncMessage) + Send,
{
    fn handle(&mut self, message: &AsyncMessage) {
        self(message)
    }
}
