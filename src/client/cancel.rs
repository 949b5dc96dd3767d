//! Out-of-band query cancellation.

use tokio::io::AsyncWriteExt;

use super::stream::Endpoint;
use crate::error::{Error, Result};
use crate::protocol::backend::BackendKeyData;
use crate::protocol::frontend::FrontendMessage;

/// Cancels the query running on a connection from a separate connection.
///
/// The server gives no reply; whether anything was cancelled shows up on the
/// original connection as an ErrorResponse (SQLSTATE 57014).
#[derive(Debug, Clone)]
pub struct CancelToken {
    key: Option<BackendKeyData>,
    endpoint: Option<Endpoint>,
}

impl CancelToken {
    pub(crate) fn new(key: Option<BackendKeyData>, endpoint: Option<Endpoint>) -> Self {
        Self { key, endpoint }
    }

    /// Send a CancelRequest.
    ///
    /// Fails with `Error::InvalidState` without any network I/O if the server
    /// never sent BackendKeyData.
    pub async fn cancel(&self) -> Result<()> {
        let key = self.key.ok_or_else(|| {
            Error::InvalidState("cancellation requires BackendKeyData from the server".into())
        })?;
        let endpoint = self.endpoint.as_ref().ok_or_else(|| {
            Error::InvalidUsage("connection was opened without a known endpoint".into())
        })?;

        let mut buf = Vec::with_capacity(16);
        FrontendMessage::CancelRequest {
            process_id: key.process_id,
            secret_key: key.secret_key,
        }
        .encode(&mut buf);

        let mut stream = endpoint.connect().await?;
        stream.write_all(&buf).await?;
        stream.flush().await?;
        stream.shutdown().await?;

        tracing::debug!(process_id = key.process_id, "cancel request sent");
        Ok(())
    }
}
