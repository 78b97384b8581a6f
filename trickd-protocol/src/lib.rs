//! # trickd-protocol
//!
//! Wire protocol for trickd.
//!
//! This crate provides:
//! - JSON-lines framing with a bounded line decoder
//! - Request/Response envelope types and stream events
//! - Typed parameters and results for every operation
//! - Stable error codes

pub mod codec;
pub mod error;
pub mod message;

pub use codec::{encode, LineDecoder};
pub use error::{ErrorCode, ProtocolError};
pub use message::{Operation, Request, Response, ResponseError, ResponseMeta, ResponseStatus, StreamEvent};

/// Protocol version supported by this implementation.
pub const PROTOCOL_VERSION: u16 = 1;

/// Default port for the trickd server.
pub const DEFAULT_PORT: u16 = 7421;

/// Maximum accepted line length (1 MiB).
pub const MAX_LINE_SIZE: usize = 1024 * 1024;
