//! Tokio-based connection client.
//!
//! A [`Client`] is a handle to a driver task that owns the socket. Submissions
//! are queued, written in order, and answered with their response [`Window`](crate::window::Window).

mod cancel;
mod conn;
mod driver;
mod stream;
mod transaction;

pub use cancel::CancelToken;
pub use conn::Client;
pub use driver::Delivery;
pub use stream::{Endpoint, Stream};
pub use transaction::Transaction;
