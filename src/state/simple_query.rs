//! Simple query protocol flow.

use crate::error::Result;
use crate::protocol::codec::check_cstr;
use crate::protocol::backend::BackendMessage;
use crate::protocol::frontend::FrontendMessage;
use crate::result::QueryResult;
use crate::window::{Window, split_windows};

/// Messages submitted for a simple query.
pub fn submission(sql: &str) -> Result<Vec<FrontendMessage>> {
    check_cstr("query", sql)?;
    Ok(vec![FrontendMessage::Query(sql.to_string())])
}

/// Returns true for the message that ends one statement's results.
pub fn ends_statement(msg: &BackendMessage) -> bool {
    matches!(
        msg,
        BackendMessage::CommandComplete(_)
            | BackendMessage::EmptyQueryResponse
            | BackendMessage::ErrorResponse(_)
    )
}

/// Split a simple query window into one result per statement.
///
/// An ErrorResponse anywhere in the window fails the whole query.
pub fn collect_results(window: Window) -> Result<Vec<QueryResult>> {
    let window = window.into_result()?;
    let (statements, _ready) = split_windows(window, ends_statement);
    Ok(statements.into_iter().map(QueryResult::from_messages).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ServerError};
    use crate::protocol::backend::{CommandComplete, DataRow, ReadyForQuery, RowDescription};
    use crate::protocol::types::TransactionStatus;

    fn ready() -> BackendMessage {
        ReadyForQuery::message(TransactionStatus::Idle)
    }

    #[test]
    fn nul_in_query_is_rejected() {
        assert_eq!(submission("SELECT 1").unwrap().len(), 1);
        assert!(matches!(
            submission("SELECT 1;\0DROP TABLE t"),
            Err(Error::InvalidUsage(_))
        ));
    }

    #[test]
    fn multi_statement_results() {
        let window = Window::new(vec![
            BackendMessage::RowDescription(RowDescription::new(vec![])),
            BackendMessage::DataRow(DataRow::new(vec![])),
            BackendMessage::DataRow(DataRow::new(vec![])),
            BackendMessage::CommandComplete(CommandComplete::from_tag("SELECT 2")),
            BackendMessage::EmptyQueryResponse,
            BackendMessage::CommandComplete(CommandComplete::from_tag("UPDATE 3")),
            ready(),
        ]);

        let results = collect_results(window).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].rows().len(), 2);
        assert!(results[0].columns().is_some());
        assert!(results[1].is_empty_query());
        assert_eq!(results[2].rows_affected(), Some(3));
    }

    #[test]
    fn error_fails_query() {
        let window = Window::new(vec![
            BackendMessage::CommandComplete(CommandComplete::from_tag("SELECT 1")),
            BackendMessage::ErrorResponse(ServerError::default()),
            ready(),
        ]);
        assert!(matches!(collect_results(window), Err(Error::Server(_))));
    }
}
