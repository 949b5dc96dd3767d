//! Connection-scoped server state.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::protocol::backend::{BackendKeyData, BackendMessage};
use crate::protocol::types::TransactionStatus;

use super::action::AsyncMessage;

/// Snapshot of what the server has told this connection so far.
///
/// Owned by the connection driver; callers receive clones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionState {
    /// Server parameters reported through ParameterStatus
    pub parameters: HashMap<String, String>,
    /// Backend process id, once BackendKeyData arrived
    pub process_id: Option<u32>,
    /// Cancellation secret, once BackendKeyData arrived
    pub secret_key: Option<u32>,
    /// Status from the latest ReadyForQuery
    pub transaction_status: TransactionStatus,
    /// Set by `close()` or after a fatal failure
    pub closed: bool,
}

impl ConnectionState {
    /// Backend key for cancellation, if the server sent one.
    pub fn backend_key(&self) -> Option<BackendKeyData> {
        match (self.process_id, self.secret_key) {
            (Some(process_id), Some(secret_key)) => Some(BackendKeyData {
                process_id,
                secret_key,
            }),
            _ => None,
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// Apply a backend message to the state.
    ///
    /// Returns the async message to route to the handler when `msg` can
    /// arrive outside any exchange (notice, notification, parameter change).
    pub fn observe(&mut self, msg: &BackendMessage) -> Result<Option<AsyncMessage>> {
        match msg {
            BackendMessage::ParameterStatus(param) => {
                tracing::debug!(name = %param.name, value = %param.value, "parameter status");
                self.parameters
                    .insert(param.name.clone(), param.value.clone());
                Ok(Some(AsyncMessage::ParameterChanged {
                    name: param.name.clone(),
                    value: param.value.clone(),
                }))
            }
            BackendMessage::BackendKeyData(key) => {
                if self.process_id.is_some() {
                    return Err(Error::Protocol(
                        "BackendKeyData received more than once".into(),
                    ));
                }
                self.process_id = Some(key.process_id);
                self.secret_key = Some(key.secret_key);
                Ok(None)
            }
            BackendMessage::ReadyForQuery(ready) => {
                self.transaction_status = ready.status;
                Ok(None)
            }
            BackendMessage::NoticeResponse(notice) => {
                tracing::warn!("{}", notice);
                Ok(Some(AsyncMessage::Notice(notice.clone())))
            }
            BackendMessage::NotificationResponse(notification) => {
                tracing::debug!(channel = %notification.channel, pid = notification.pid, "notification");
                Ok(Some(AsyncMessage::Notification {
                    pid: notification.pid,
                    channel: notification.channel.clone(),
                    payload: notification.payload.clone(),
                }))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::backend::{ParameterStatus, ReadyForQuery};

    #[test]
    fn tap_updates_state() {
        let mut state = ConnectionState::default();

        let changed = state
            .observe(&BackendMessage::ParameterStatus(ParameterStatus {
                name: "TimeZone".into(),
                value: "UTC".into(),
            }))
            .unwrap();
        assert!(matches!(changed, Some(AsyncMessage::ParameterChanged { .. })));
        assert_eq!(state.parameter("TimeZone"), Some("UTC"));

        state
            .observe(&ReadyForQuery::message(TransactionStatus::InTransaction))
            .unwrap();
        assert_eq!(state.transaction_status, TransactionStatus::InTransaction);
    }

    #[test]
    fn second_backend_key_is_protocol_error() {
        let mut state = ConnectionState::default();
        let key = BackendMessage::BackendKeyData(BackendKeyData {
            process_id: 1,
            secret_key: 2,
        });
        assert_eq!(state.observe(&key).unwrap(), None);
        assert_eq!(
            state.backend_key(),
            Some(BackendKeyData {
                process_id: 1,
                secret_key: 2
            })
        );
        assert!(matches!(state.observe(&key), Err(Error::Protocol(_))));
    }
}
