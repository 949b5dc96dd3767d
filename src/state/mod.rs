//! Sans-I/O protocol logic.
//!
//! The startup handshake is a state machine producing `Action` values; the
//! query flows build submissions and interpret response windows. None of them
//! perform I/O.

pub mod action;
pub mod connection;
pub mod extended;
pub mod simple_query;
pub mod startup;

pub use action::{Action, AsyncMessage};
pub use connection::ConnectionState;
pub use startup::{StartupState, StartupStateMachine};
