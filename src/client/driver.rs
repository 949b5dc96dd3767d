//! Connection driver task.
//!
//! The driver exclusively owns the socket and the connection state. Requests
//! arrive on an unbounded queue and are served strictly one at a time: a
//! submission is written only after the previous one's window was fully read.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, watch};

use crate::error::{Error, Result};
use crate::handler::AsyncMessageHandler;
use crate::protocol::backend::BackendMessage;
use crate::protocol::decoder::MessageDecoder;
use crate::protocol::frontend::FrontendMessage;
use crate::state::action::Action;
use crate::state::connection::ConnectionState;
use crate::state::startup::StartupStateMachine;
use crate::window::{Window, Windower};

/// How an exchange's window is handed back to the caller.
#[derive(Debug, Clone, Copy)]
pub enum Delivery {
    /// Reply once every expected ReadyForQuery arrived.
    Full,
    /// Reply as soon as a message matches; the rest of the window is still
    /// drained before the next request is served.
    Until(fn(&BackendMessage) -> bool),
}

pub(crate) type Reply<T> = oneshot::Sender<Result<T>>;

pub(crate) enum Request {
    Exchange {
        messages: Vec<FrontendMessage>,
        delivery: Delivery,
        reply: Reply<Window>,
    },
    SetHandler(Option<Box<dyn AsyncMessageHandler>>),
    Terminate {
        reply: Reply<()>,
    },
}

impl Request {
    fn fail(self, err: impl FnOnce() -> Error) {
        match self {
            Request::Exchange { reply, .. } => {
                let _ = reply.send(Err(err()));
            }
            Request::Terminate { reply } => {
                let _ = reply.send(Ok(()));
            }
            Request::SetHandler(_) => {}
        }
    }
}

/// CopyFail reason sent when the server asks for COPY FROM STDIN data.
pub(crate) const COPY_IN_REFUSED: &str = "COPY FROM STDIN is not supported";

fn is_ready(msg: &BackendMessage) -> bool {
    matches!(msg, BackendMessage::ReadyForQuery(_))
}

pub(crate) struct Driver<S> {
    stream: S,
    decoder: MessageDecoder,
    write_buffer: Vec<u8>,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    requests: mpsc::UnboundedReceiver<Request>,
    handler: Option<Box<dyn AsyncMessageHandler>>,
}

impl<S> Driver<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub(crate) fn new(
        stream: S,
        requests: mpsc::UnboundedReceiver<Request>,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        Self {
            stream,
            decoder: MessageDecoder::new(),
            write_buffer: Vec::with_capacity(8192),
            state: ConnectionState::default(),
            state_tx,
            requests,
            handler: None,
        }
    }

    /// Drive the startup handshake to ReadyForQuery.
    pub(crate) async fn startup(&mut self, mut state_machine: StartupStateMachine) -> Result<()> {
        let mut action = state_machine.start();
        loop {
            match action {
                Action::WriteAndReadMessage => {
                    self.write_all(state_machine.write_buffer()).await?;
                }
                Action::ReadMessage => {}
                Action::Finished => break,
            }

            let msg = self.read_message().await?;
            action = match self.tap(msg)? {
                Some(msg) => state_machine.step(&msg)?,
                None => Action::ReadMessage,
            };
        }

        tracing::debug!(
            process_id = ?self.state.process_id,
            status = ?self.state.transaction_status,
            "connection ready"
        );
        Ok(())
    }

    /// Serve requests until terminated, failed, or every client handle is dropped.
    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(Request::Exchange { messages, delivery, reply }) => {
                        let mut reply = Some(reply);
                        if let Err(err) = self.exchange(messages, delivery, &mut reply).await {
                            self.fail(err, reply);
                            return;
                        }
                    }
                    Some(Request::SetHandler(handler)) => self.handler = handler,
                    Some(Request::Terminate { reply }) => {
                        let result = self.terminate().await;
                        self.mark_closed();
                        let _ = reply.send(result);
                        return;
                    }
                    None => {
                        tracing::debug!("all client handles dropped, terminating");
                        let _ = self.terminate().await;
                        self.mark_closed();
                        return;
                    }
                },
                read = self.stream.read_buf(self.decoder.read_buffer()) => {
                    let result = match read {
                        Ok(0) => Err(eof()),
                        Ok(_) => self.drain_idle(),
                        Err(err) => Err(err.into()),
                    };
                    if let Err(err) = result {
                        self.fail(err, None);
                        return;
                    }
                }
            }
        }
    }

    /// Handle messages that arrived while no exchange is in flight.
    fn drain_idle(&mut self) -> Result<()> {
        while let Some(msg) = self.decoder.decode()? {
            match self.tap(msg)? {
                None => {}
                Some(BackendMessage::ErrorResponse(err)) => return Err(Error::Server(err)),
                Some(msg) => {
                    return Err(Error::Protocol(format!(
                        "Unexpected message '{}' while idle",
                        msg.type_byte().escape_ascii()
                    )));
                }
            }
        }
        Ok(())
    }

    async fn exchange(
        &mut self,
        messages: Vec<FrontendMessage>,
        delivery: Delivery,
        reply: &mut Option<Reply<Window>>,
    ) -> Result<()> {
        let mut remaining = messages.iter().filter(|m| m.expects_ready()).count();
        tracing::debug!(
            messages = messages.len(),
            expected_ready = remaining,
            "submitting"
        );
        self.send(&messages).await?;

        let mut windower = Windower::new(is_ready);
        let mut window = Vec::new();

        while remaining > 0 {
            let msg = self.read_message().await?;
            let Some(msg) = self.tap(msg)? else {
                continue;
            };

            if let BackendMessage::ErrorResponse(err) = &msg
                && err.is_fatal()
            {
                return Err(Error::Server(err.clone()));
            }

            if matches!(
                msg,
                BackendMessage::CopyInResponse(_) | BackendMessage::CopyBothResponse(_)
            ) {
                tracing::warn!("refusing to stream COPY data from the client");
                self.send(&[FrontendMessage::CopyFail(COPY_IN_REFUSED.into())])
                    .await?;
            }

            if windower.push(&msg).closed {
                remaining -= 1;
            }

            let matched = match delivery {
                Delivery::Until(predicate) => predicate(&msg),
                Delivery::Full => false,
            };

            if reply.is_some() {
                window.push(msg);
                if matched && let Some(tx) = reply.take() {
                    let _ = tx.send(Ok(Window::new(std::mem::take(&mut window))));
                }
            } else {
                tracing::trace!(type_byte = %msg.type_byte().escape_ascii(), "draining after early delivery");
            }
        }

        if let Some(tx) = reply.take() {
            let _ = tx.send(Ok(Window::new(window)));
        }
        Ok(())
    }

    async fn terminate(&mut self) -> Result<()> {
        self.send(&[FrontendMessage::Terminate]).await?;
        self.stream.shutdown().await?;
        tracing::debug!("connection terminated");
        Ok(())
    }

    /// Apply a message to the connection state.
    ///
    /// Asynchronous messages are routed to the handler and consumed.
    fn tap(&mut self, msg: BackendMessage) -> Result<Option<BackendMessage>> {
        let async_message = self.state.observe(&msg)?;

        if matches!(
            msg,
            BackendMessage::ParameterStatus(_)
                | BackendMessage::BackendKeyData(_)
                | BackendMessage::ReadyForQuery(_)
        ) {
            self.state_tx.send_replace(self.state.clone());
        }

        match async_message {
            Some(async_message) => {
                if let Some(handler) = self.handler.as_mut() {
                    handler.handle(&async_message);
                }
                Ok(None)
            }
            None => Ok(Some(msg)),
        }
    }

    async fn read_message(&mut self) -> Result<BackendMessage> {
        loop {
            if let Some(msg) = self.decoder.decode()? {
                return Ok(msg);
            }
            let n = self.stream.read_buf(self.decoder.read_buffer()).await?;
            if n == 0 {
                return Err(eof());
            }
        }
    }

    /// Encode and write `messages` in one flush.
    async fn send(&mut self, messages: &[FrontendMessage]) -> Result<()> {
        self.write_buffer.clear();
        for msg in messages {
            msg.encode(&mut self.write_buffer);
        }
        let buffer = std::mem::take(&mut self.write_buffer);
        let written = self.write_all(&buffer).await;
        self.write_buffer = buffer;
        written
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    fn mark_closed(&mut self) {
        self.state.closed = true;
        self.state_tx.send_replace(self.state.clone());
    }

    /// Fail the in-flight exchange with `err` and everything queued behind it.
    fn fail(&mut self, err: Error, reply: Option<Reply<Window>>) {
        tracing::warn!("connection failed: {}", err);
        self.mark_closed();

        match reply {
            Some(tx) => {
                let _ = tx.send(Err(err));
            }
            None => tracing::debug!("no exchange in flight to receive the failure"),
        }

        self.requests.close();
        while let Ok(request) = self.requests.try_recv() {
            request.fail(|| Error::ConnectionBroken);
        }
    }
}

fn eof() -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "server closed the connection",
    ))
}
