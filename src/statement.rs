//! Prepared statements and portal naming.

use crate::error::{Error, Result};
use crate::protocol::backend::{BackendMessage, RowDescription};
use crate::protocol::types::Oid;
use crate::window::Window;

/// Prepared statement information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedStatement {
    /// Statement name
    pub name: String,
    /// Parameter type OIDs
    pub param_oids: Vec<Oid>,
    /// Column descriptions (if the statement returns rows)
    pub columns: Option<RowDescription>,
}

impl PreparedStatement {
    /// Build from the window answering Parse + Describe(statement).
    pub fn from_describe(name: &str, window: Window) -> Result<Self> {
        let window = window.into_result()?;

        let mut param_oids = None;
        let mut columns = None;
        let mut described = false;

        for msg in window {
            match msg {
                BackendMessage::ParameterDescription(desc) => {
                    param_oids = Some(desc.oids().to_vec())
                }
                BackendMessage::RowDescription(desc) => {
                    columns = Some(desc);
                    described = true;
                }
                BackendMessage::NoData => described = true,
                _ => {}
            }
        }

        if !described {
            return Err(Error::Protocol(
                "Describe(statement) answered without RowDescription or NoData".into(),
            ));
        }

        Ok(Self {
            name: name.to_string(),
            param_oids: param_oids.unwrap_or_default(),
            columns,
        })
    }

    /// Returns true if executing the statement produces rows.
    pub fn returns_rows(&self) -> bool {
        self.columns.is_some()
    }
}

/// Source of unique portal names for a batch of bindings.
pub trait PortalNameSupplier {
    fn next_portal_name(&mut self) -> String;
}

impl<F> PortalNameSupplier for F
where
    F: FnMut() -> String,
{
    fn next_portal_name(&mut self) -> String {
        self()
    }
}

/// Generates `<prefix><n>` with an increasing counter.
#[derive(Debug, Clone)]
pub struct SequentialPortalNames {
    prefix: String,
    counter: u64,
}

impl SequentialPortalNames {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: 0,
        }
    }
}

impl Default for SequentialPortalNames {
    fn default() -> Self {
        Self::new("_pgc_portal_")
    }
}

impl PortalNameSupplier for SequentialPortalNames {
    fn next_portal_name(&mut self) -> String {
        self.counter += 1;
        format!("{}{}", self.prefix, self.counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::backend::{ParameterDescription, ReadyForQuery};
    use crate::protocol::types::TransactionStatus;

    #[test]
    fn sequential_names_are_unique() {
        let mut names = SequentialPortalNames::new("p");
        assert_eq!(names.next_portal_name(), "p1");
        assert_eq!(names.next_portal_name(), "p2");
    }

    #[test]
    fn closure_supplier() {
        let mut n = 0;
        let mut supplier = || {
            n += 10;
            format!("c{}", n)
        };
        assert_eq!(supplier.next_portal_name(), "c10");
    }

    #[test]
    fn prepared_from_no_data() {
        let window = Window::new(vec![
            BackendMessage::ParseComplete,
            BackendMessage::ParameterDescription(ParameterDescription::new(vec![23])),
            BackendMessage::NoData,
        ]);
        let stmt = PreparedStatement::from_describe("s1", window).unwrap();
        assert_eq!(stmt.param_oids, vec![23]);
        assert!(!stmt.returns_rows());

        let incomplete = Window::new(vec![ReadyForQuery::message(TransactionStatus::Idle)]);
        assert!(PreparedStatement::from_describe("s1", incomplete).is_err());
    }
}
