//! Per-statement results assembled from a response window.

use crate::protocol::backend::{BackendMessage, CommandComplete, DataRow, RowDescription};

/// Result of one statement: column metadata, rows and completion tag.
///
/// An empty query string yields a result with none of the three.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    columns: Option<RowDescription>,
    rows: Vec<DataRow>,
    complete: Option<CommandComplete>,
}

impl QueryResult {
    /// Build a result from one statement's messages.
    ///
    /// Messages that carry no result data (BindComplete, CloseComplete, NoData,
    /// ReadyForQuery, ...) are skipped.
    pub fn from_messages(messages: impl IntoIterator<Item = BackendMessage>) -> Self {
        let mut result = Self::default();
        for msg in messages {
            match msg {
                BackendMessage::RowDescription(desc) => result.columns = Some(desc),
                BackendMessage::DataRow(row) => result.rows.push(row),
                BackendMessage::CommandComplete(complete) => result.complete = Some(complete),
                _ => {}
            }
        }
        result
    }

    /// Column metadata, `None` for statements that return no rows.
    pub fn columns(&self) -> Option<&RowDescription> {
        self.columns.as_ref()
    }

    pub fn rows(&self) -> &[DataRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<DataRow> {
        self.rows
    }

    /// Completion tag, `None` for an empty query.
    pub fn command_complete(&self) -> Option<&CommandComplete> {
        self.complete.as_ref()
    }

    /// Rows affected or returned, as reported by the command tag.
    pub fn rows_affected(&self) -> Option<u64> {
        self.complete.as_ref().and_then(CommandComplete::rows)
    }

    /// Returns true if the statement was an empty query string.
    pub fn is_empty_query(&self) -> bool {
        self.columns.is_none() && self.rows.is_empty() && self.complete.is_none()
    }
}
