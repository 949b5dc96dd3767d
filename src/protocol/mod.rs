//! PostgreSQL wire protocol implementation.
//!
//! This module contains the low-level protocol encoding and decoding.
//!
//! # Structure
//!
//! - `backend`: Server → Client messages (parsing)
//! - `frontend`: Client → Server messages (encoding)
//! - `decoder`: Framing of the inbound byte stream
//! - `codec`: Low-level encoding/decoding primitives
//! - `types`: Common protocol types (FormatCode, Oid, TransactionStatus)

pub mod backend;
pub mod codec;
pub mod decoder;
pub mod frontend;
pub mod types;

pub use backend::BackendMessage;
pub use decoder::MessageDecoder;
pub use frontend::FrontendMessage;
pub use types::{FormatCode, Oid, Target, TransactionStatus};
