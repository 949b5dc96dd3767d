//! Connection startup and authentication state machine.

use crate::auth::AuthenticationHandler;
use crate::error::{Error, Result};
use crate::protocol::backend::{AuthenticationMessage, BackendMessage};
use crate::protocol::frontend::FrontendMessage;

use super::action::Action;

/// Startup progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupState {
    Initial,
    /// Authentication exchange in progress
    AwaitingNegotiation,
    /// Authenticated; waiting for BackendKeyData/ParameterStatus/ReadyForQuery
    AwaitingReady,
    Ready,
    Failed,
}

/// Sans-I/O startup handshake.
///
/// Asynchronous messages and BackendKeyData are applied to the connection
/// state by the caller before `step()`; the machine only tracks sequencing.
pub struct StartupStateMachine {
    state: StartupState,
    params: Vec<(String, String)>,
    handler: Box<dyn AuthenticationHandler>,
    write_buffer: Vec<u8>,
}

impl StartupStateMachine {
    pub fn new(params: Vec<(String, String)>, handler: Box<dyn AuthenticationHandler>) -> Self {
        Self {
            state: StartupState::Initial,
            params,
            handler,
            write_buffer: Vec::new(),
        }
    }

    pub fn state(&self) -> StartupState {
        self.state
    }

    /// Bytes to write for the last `WriteAndReadMessage` action.
    pub fn write_buffer(&self) -> &[u8] {
        &self.write_buffer
    }

    /// Start the handshake by writing the StartupMessage.
    pub fn start(&mut self) -> Action {
        self.write_buffer.clear();
        FrontendMessage::Startup {
            params: self.params.clone(),
        }
        .encode(&mut self.write_buffer);
        self.state = StartupState::AwaitingNegotiation;
        Action::WriteAndReadMessage
    }

    /// Process one message from the server.
    pub fn step(&mut self, msg: &BackendMessage) -> Result<Action> {
        let result = self.step_inner(msg);
        if result.is_err() {
            self.state = StartupState::Failed;
        }
        result
    }

    fn step_inner(&mut self, msg: &BackendMessage) -> Result<Action> {
        match (self.state, msg) {
            (_, BackendMessage::ErrorResponse(err)) => Err(Error::Server(err.clone())),
            (_, msg) if msg.is_async() => Ok(Action::ReadMessage),
            (_, BackendMessage::NegotiateProtocolVersion(negotiate)) => {
                tracing::warn!(
                    newest_minor_version = negotiate.newest_minor_version,
                    unrecognized = ?negotiate.unrecognized_options,
                    "server negotiated protocol version"
                );
                Ok(Action::ReadMessage)
            }
            (StartupState::AwaitingNegotiation, BackendMessage::Authentication(auth)) => {
                self.handle_auth(auth)
            }
            (StartupState::AwaitingReady, BackendMessage::BackendKeyData(_)) => {
                Ok(Action::ReadMessage)
            }
            (StartupState::AwaitingReady, BackendMessage::ReadyForQuery(_)) => {
                self.state = StartupState::Ready;
                Ok(Action::Finished)
            }
            (state, msg) => Err(Error::Protocol(format!(
                "Unexpected message '{}' during startup in state {:?}",
                msg.type_byte().escape_ascii(),
                state
            ))),
        }
    }

    fn handle_auth(&mut self, auth: &AuthenticationMessage) -> Result<Action> {
        if let AuthenticationMessage::Ok = auth {
            tracing::debug!("authentication succeeded");
            self.state = StartupState::AwaitingReady;
            return Ok(Action::ReadMessage);
        }

        tracing::debug!(code = auth.code(), "authentication challenge");
        match self.handler.respond(auth)? {
            Some(reply) => {
                self.write_buffer.clear();
                reply.encode(&mut self.write_buffer);
                Ok(Action::WriteAndReadMessage)
            }
            None => Ok(Action::ReadMessage),
        }
    }
}
