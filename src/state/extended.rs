//! Extended query protocol flow.
//!
//! Parse phase: Parse + Describe(statement) + Sync.
//! Execute phase: per binding Bind + Describe(portal) + Execute + Close(portal),
//! then a single Sync.

use std::collections::HashSet;

use crate::binding::Binding;
use crate::error::{Error, Result};
use crate::protocol::backend::BackendMessage;
use crate::protocol::codec::check_cstr;
use crate::protocol::frontend::FrontendMessage;
use crate::protocol::types::{Oid, Target};
use crate::result::QueryResult;
use crate::statement::PortalNameSupplier;
use crate::window::{Window, split_windows};

/// Most parameter types a Parse message can declare (Int16 count).
pub const MAX_PARAMETER_TYPES: usize = i16::MAX as usize;

/// Messages submitted to prepare a statement.
///
/// Fails before any I/O if the text cannot be encoded or declares more
/// parameter types than the protocol can count.
pub fn parse_submission(
    name: &str,
    query: &str,
    param_oids: &[Oid],
) -> Result<Vec<FrontendMessage>> {
    check_cstr("statement name", name)?;
    check_cstr("query", query)?;
    if param_oids.len() > MAX_PARAMETER_TYPES {
        return Err(Error::InvalidUsage(format!(
            "{} parameter types exceed protocol limit {}",
            param_oids.len(),
            MAX_PARAMETER_TYPES
        )));
    }

    Ok(vec![
        FrontendMessage::Parse {
            name: name.to_string(),
            query: query.to_string(),
            param_oids: param_oids.to_vec(),
        },
        FrontendMessage::Describe {
            target: Target::Statement,
            name: name.to_string(),
        },
        FrontendMessage::Sync,
    ])
}

/// Returns true for the answer to Describe(statement).
pub fn is_describe_answer(msg: &BackendMessage) -> bool {
    matches!(msg, BackendMessage::RowDescription(_) | BackendMessage::NoData)
}

/// Messages submitted to execute `statement` once per binding.
///
/// Fails before any I/O if the supplier repeats a portal name.
pub fn execute_submission<I, P>(
    bindings: I,
    portal_names: &mut P,
    statement: &str,
) -> Result<Vec<FrontendMessage>>
where
    I: IntoIterator<Item = Binding>,
    P: PortalNameSupplier + ?Sized,
{
    check_cstr("statement name", statement)?;

    let mut messages = Vec::new();
    let mut seen = HashSet::new();

    for binding in bindings {
        let portal = portal_names.next_portal_name();
        check_cstr("portal name", &portal)?;
        if !seen.insert(portal.clone()) {
            return Err(Error::InvalidUsage(format!(
                "duplicate portal name in batch: {}",
                portal
            )));
        }

        messages.push(FrontendMessage::Bind {
            portal: portal.clone(),
            statement: statement.to_string(),
            binding,
            result_formats: Vec::new(),
        });
        messages.push(FrontendMessage::Describe {
            target: Target::Portal,
            name: portal.clone(),
        });
        messages.push(FrontendMessage::Execute {
            portal: portal.clone(),
            max_rows: 0,
        });
        messages.push(FrontendMessage::Close {
            target: Target::Portal,
            name: portal,
        });
    }

    messages.push(FrontendMessage::Sync);
    Ok(messages)
}

/// Split an execute window into one result per binding.
pub fn collect_results(window: Window) -> Result<Vec<QueryResult>> {
    let window = window.into_result()?;
    let (bindings, _ready) = split_windows(window, |msg: &BackendMessage| {
        matches!(msg, BackendMessage::CloseComplete)
    });
    Ok(bindings.into_iter().map(QueryResult::from_messages).collect())
}

/// Messages submitted to close a prepared statement.
pub fn close_statement_submission(name: &str) -> Result<Vec<FrontendMessage>> {
    check_cstr("statement name", name)?;
    Ok(vec![
        FrontendMessage::Close {
            target: Target::Statement,
            name: name.to_string(),
        },
        FrontendMessage::Sync,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Parameter;
    use crate::protocol::backend::{CommandComplete, ReadyForQuery};
    use crate::protocol::types::TransactionStatus;
    use crate::statement::SequentialPortalNames;

    #[test]
    fn one_sync_per_batch() {
        let bindings = vec![
            Binding::new().add(0, Parameter::text(23, "1")).unwrap(),
            Binding::new().add(0, Parameter::text(23, "2")).unwrap(),
        ];
        let mut names = SequentialPortalNames::new("p");
        let messages = execute_submission(bindings, &mut names, "s").unwrap();

        let kinds: Vec<_> = messages.iter().map(FrontendMessage::name).collect();
        assert_eq!(
            kinds,
            [
                "Bind", "Describe", "Execute", "Close", "Bind", "Describe", "Execute", "Close",
                "Sync"
            ]
        );
        assert_eq!(messages.iter().filter(|m| m.expects_ready()).count(), 1);
    }

    #[test]
    fn parse_rejects_oversized_type_list() {
        let messages = parse_submission("s", "SELECT $1", &vec![23; MAX_PARAMETER_TYPES]).unwrap();
        assert_eq!(messages.len(), 3);

        let err = parse_submission("s", "SELECT $1", &vec![23; 40000]).unwrap_err();
        assert!(matches!(err, Error::InvalidUsage(_)));
    }

    #[test]
    fn nul_in_names_is_rejected() {
        assert!(matches!(
            parse_submission("s\0", "SELECT 1", &[]),
            Err(Error::InvalidUsage(_))
        ));
        assert!(matches!(
            close_statement_submission("a\0b"),
            Err(Error::InvalidUsage(_))
        ));

        let mut names = SequentialPortalNames::new("p");
        assert!(matches!(
            execute_submission(vec![Binding::new()], &mut names, "bad\0"),
            Err(Error::InvalidUsage(_))
        ));

        let mut broken = || "p\0".to_string();
        assert!(matches!(
            execute_submission(vec![Binding::new()], &mut broken, "s"),
            Err(Error::InvalidUsage(_))
        ));
    }

    #[test]
    fn duplicate_portal_name_is_rejected() {
        let mut constant = || "same".to_string();
        let err = execute_submission(vec![Binding::new(), Binding::new()], &mut constant, "s")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidUsage(_)));
    }

    #[test]
    fn results_per_binding() {
        let group = || {
            vec![
                BackendMessage::BindComplete,
                BackendMessage::NoData,
                BackendMessage::CommandComplete(CommandComplete::from_tag("INSERT 0 1")),
                BackendMessage::CloseComplete,
            ]
        };
        let mut messages = group();
        messages.extend(group());
        messages.push(ReadyForQuery::message(TransactionStatus::Idle));

        let results = collect_results(Window::new(messages)).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.rows_affected() == Some(1)));
    }
}
