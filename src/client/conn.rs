//! Asynchronous PostgreSQL client handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch};

use crate::auth::{AuthenticationHandler, PasswordAuthenticator};
use crate::binding::Binding;
use crate::error::{Error, Result};
use crate::handler::AsyncMessageHandler;
use crate::opts::Opts;
use crate::protocol::backend::BackendKeyData;
use crate::protocol::frontend::FrontendMessage;
use crate::protocol::types::{Oid, TransactionStatus};
use crate::result::QueryResult;
use crate::state::connection::ConnectionState;
use crate::state::startup::StartupStateMachine;
use crate::state::{extended, simple_query};
use crate::statement::{PortalNameSupplier, PreparedStatement};
use crate::window::Window;

use super::cancel::CancelToken;
use super::driver::{Delivery, Driver, Request};
use super::stream::Endpoint;
use super::transaction::Transaction;

struct Inner {
    requests: mpsc::UnboundedSender<Request>,
    state: watch::Receiver<ConnectionState>,
    closed: AtomicBool,
    endpoint: Option<Endpoint>,
}

/// Handle to a PostgreSQL connection.
///
/// Cheap to clone; all clones share one connection. Requests from any clone
/// are served in the order they were submitted.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Connect to a PostgreSQL server.
    pub async fn connect<O: TryInto<Opts>>(opts: O) -> Result<Self>
    where
        Error: From<O::Error>,
    {
        let opts = opts.try_into()?;
        let endpoint = Endpoint::from_opts(&opts)?;
        let stream = endpoint.connect().await?;
        let handler = PasswordAuthenticator::new(opts.user.clone(), opts.password.clone());
        Self::start(stream, opts.startup_params(), Box::new(handler), Some(endpoint)).await
    }

    /// Connect over an already established stream.
    ///
    /// Cancellation is unavailable because the endpoint is unknown.
    pub async fn connect_with_stream<S>(stream: S, opts: Opts) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let handler = PasswordAuthenticator::new(opts.user.clone(), opts.password.clone());
        Self::start(stream, opts.startup_params(), Box::new(handler), None).await
    }

    /// Connect over an established stream with a custom authentication handler.
    pub async fn connect_with_authenticator<S>(
        stream: S,
        startup_params: Vec<(String, String)>,
        authenticator: Box<dyn AuthenticationHandler>,
    ) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        Self::start(stream, startup_params, authenticator, None).await
    }

    async fn start<S>(
        stream: S,
        startup_params: Vec<(String, String)>,
        authenticator: Box<dyn AuthenticationHandler>,
        endpoint: Option<Endpoint>,
    ) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::default());

        let mut driver = Driver::new(stream, request_rx, state_tx);
        driver
            .startup(StartupStateMachine::new(startup_params, authenticator))
            .await?;
        tokio::spawn(driver.run());

        Ok(Self {
            inner: Arc::new(Inner {
                requests: request_tx,
                state: state_rx,
                closed: AtomicBool::new(false),
                endpoint,
            }),
        })
    }

    /// Submit frontend messages and wait for their response window.
    ///
    /// The submission must end with Query or Sync; the window spans one
    /// ReadyForQuery per Query/Sync message.
    pub async fn exchange(
        &self,
        messages: Vec<FrontendMessage>,
        delivery: Delivery,
    ) -> Result<Window> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(Error::ConnectionClosed);
        }
        validate_submission(&messages)?;

        let (reply, response) = oneshot::channel();
        self.inner
            .requests
            .send(Request::Exchange {
                messages,
                delivery,
                reply,
            })
            .map_err(|_| self.gone())?;
        response.await.map_err(|_| self.gone())?
    }

    fn gone(&self) -> Error {
        if self.inner.closed.load(Ordering::Acquire) {
            Error::ConnectionClosed
        } else {
            Error::ConnectionBroken
        }
    }

    // === Connection state ===

    /// Snapshot of the connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    /// Receiver notified whenever the connection state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.clone()
    }

    /// Status reported by the latest ReadyForQuery.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.inner.state.borrow().transaction_status
    }

    /// Check if currently in a transaction.
    pub fn in_transaction(&self) -> bool {
        self.transaction_status().in_transaction()
    }

    /// Current value of a server parameter.
    pub fn parameter(&self, name: &str) -> Option<String> {
        self.inner.state.borrow().parameter(name).map(str::to_string)
    }

    pub fn backend_key(&self) -> Option<BackendKeyData> {
        self.inner.state.borrow().backend_key()
    }

    /// Backend process id, or 0 if the server did not send one.
    pub fn connection_id(&self) -> u32 {
        self.inner.state.borrow().process_id.unwrap_or(0)
    }

    /// Returns true after `close()` or a fatal failure.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire) || self.inner.state.borrow().closed
    }

    /// Set the async message handler.
    ///
    /// The handler is called when the server sends asynchronous messages:
    /// - `Notification` - from LISTEN/NOTIFY
    /// - `Notice` - warnings and informational messages
    /// - `ParameterChanged` - server parameter updates
    pub fn set_async_message_handler<H: AsyncMessageHandler + 'static>(
        &self,
        handler: H,
    ) -> Result<()> {
        self.send_handler(Some(Box::new(handler)))
    }

    /// Remove the async message handler.
    pub fn clear_async_message_handler(&self) -> Result<()> {
        self.send_handler(None)
    }

    fn send_handler(&self, handler: Option<Box<dyn AsyncMessageHandler>>) -> Result<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(Error::ConnectionClosed);
        }
        self.inner
            .requests
            .send(Request::SetHandler(handler))
            .map_err(|_| self.gone())
    }

    // === Simple Query Protocol ===

    /// Run SQL text and return its raw response window.
    pub async fn simple_query_window(&self, sql: &str) -> Result<Window> {
        self.exchange(simple_query::submission(sql)?, Delivery::Full)
            .await
    }

    /// Run SQL text, which may hold several statements, and return one result per statement.
    pub async fn simple_query(&self, sql: &str) -> Result<Vec<QueryResult>> {
        let window = self.simple_query_window(sql).await?;
        simple_query::collect_results(window)
    }

    /// Run SQL text and return the row count of its last statement.
    pub async fn simple_execute(&self, sql: &str) -> Result<Option<u64>> {
        let results = self.simple_query(sql).await?;
        Ok(results.last().and_then(QueryResult::rows_affected))
    }

    /// Ping the server with an empty query to check connection aliveness.
    pub async fn ping(&self) -> Result<()> {
        self.simple_query("").await?;
        Ok(())
    }

    // === Extended Query Protocol ===

    /// Parse and describe a statement.
    ///
    /// The window is returned once Describe is answered (RowDescription or
    /// NoData), or at its end if the server reported an error.
    pub async fn parse(&self, name: &str, query: &str, param_oids: &[Oid]) -> Result<Window> {
        self.exchange(
            extended::parse_submission(name, query, param_oids)?,
            Delivery::Until(extended::is_describe_answer),
        )
        .await
    }

    /// Prepare a named statement.
    pub async fn prepare(
        &self,
        name: &str,
        query: &str,
        param_oids: &[Oid],
    ) -> Result<PreparedStatement> {
        let window = self.parse(name, query, param_oids).await?;
        PreparedStatement::from_describe(name, window)
    }

    /// Execute `statement` once per binding, pipelined under a single Sync.
    pub async fn execute<I, P>(
        &self,
        bindings: I,
        portal_names: &mut P,
        statement: &str,
    ) -> Result<Window>
    where
        I: IntoIterator<Item = Binding>,
        P: PortalNameSupplier + ?Sized,
    {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(Error::ConnectionClosed);
        }
        let messages = extended::execute_submission(bindings, portal_names, statement)?;
        self.exchange(messages, Delivery::Full).await
    }

    /// Execute `statement` once per binding and return one result per binding.
    pub async fn execute_results<I, P>(
        &self,
        bindings: I,
        portal_names: &mut P,
        statement: &str,
    ) -> Result<Vec<QueryResult>>
    where
        I: IntoIterator<Item = Binding>,
        P: PortalNameSupplier + ?Sized,
    {
        let window = self.execute(bindings, portal_names, statement).await?;
        extended::collect_results(window)
    }

    /// Close a prepared statement.
    pub async fn close_statement(&self, name: &str) -> Result<()> {
        self.exchange(extended::close_statement_submission(name)?, Delivery::Full)
            .await?
            .into_result()?;
        Ok(())
    }

    // === Transactions ===

    /// Start a transaction with `BEGIN`.
    pub async fn begin(&self) -> Result<Transaction> {
        if self.in_transaction() {
            return Err(Error::InvalidUsage(
                "nested transactions are not supported, use savepoints".into(),
            ));
        }
        self.simple_query("BEGIN").await?;
        Ok(Transaction::new(self.connection_id()))
    }

    // === Cancellation and termination ===

    /// Token for cancelling the running query from elsewhere.
    pub fn cancel_token(&self) -> CancelToken {
        CancelToken::new(self.backend_key(), self.inner.endpoint.clone())
    }

    /// Ask the server to cancel the query currently running on this connection.
    pub async fn cancel(&self) -> Result<()> {
        self.cancel_token().cancel().await
    }

    /// Gracefully close the connection.
    ///
    /// Terminate is queued behind requests already submitted. Closing a
    /// connection that was already closed or has failed returns
    /// `Error::ConnectionClosed` immediately.
    pub async fn close(&self) -> Result<()> {
        let already_closed = self.inner.closed.swap(true, Ordering::AcqRel);
        if already_closed || self.inner.state.borrow().closed {
            return Err(Error::ConnectionClosed);
        }

        let (reply, response) = oneshot::channel();
        self.inner
            .requests
            .send(Request::Terminate { reply })
            .map_err(|_| Error::ConnectionClosed)?;
        response.await.unwrap_or(Ok(()))
    }
}

fn validate_submission(messages: &[FrontendMessage]) -> Result<()> {
    if let Some(msg) = messages.iter().find(|m| {
        matches!(
            m,
            FrontendMessage::Startup { .. }
                | FrontendMessage::CancelRequest { .. }
                | FrontendMessage::Terminate
        )
    }) {
        return Err(Error::InvalidUsage(format!(
            "{} cannot be part of an exchange",
            msg.name()
        )));
    }

    match messages.last() {
        Some(last) if last.expects_ready() => Ok(()),
        _ => Err(Error::InvalidUsage(
            "submission must end with Query or Sync".into(),
        )),
    }
}
