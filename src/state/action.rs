//! Action types for state machine I/O requests.

use crate::error::ServerError;

/// Action requested by a state machine.
///
/// The caller should perform the requested I/O and then call the
/// appropriate method to continue the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Read the next backend message and pass it to `step()`.
    ReadMessage,

    /// Write the machine's pending bytes to the server, then read a message.
    WriteAndReadMessage,

    /// The state machine has finished successfully.
    Finished,
}

/// Asynchronous message from the server.
///
/// These can arrive at any time, including while the connection is idle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsyncMessage {
    /// Notification from LISTEN/NOTIFY.
    Notification {
        /// PID of the notifying backend process
        pid: u32,
        /// Channel name
        channel: String,
        /// Notification payload
        payload: String,
    },

    /// Non-fatal notice/warning from server.
    Notice(ServerError),

    /// Server parameter value changed.
    ParameterChanged {
        /// Parameter name
        name: String,
        /// New value
        value: String,
    },
}
