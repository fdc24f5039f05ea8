//! Framed JSON-RPC transport.
//!
//! One dedicated reader drives [`Transport::serve`]; every outgoing frame is
//! written whole under a single writer mutex, so replies, notifications and
//! server-to-client calls never interleave. Payload semantics live above
//! this crate; here there are only frames and routing.

mod framing;
mod transport;

pub use framing::{read_frame, write_frame};
pub use transport::{ExitStatus, LoopAction, MessageHandler, Outgoing, Transport};

/// Transport-level errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("i/o error on transport: {0}")]
	Io(#[from] std::io::Error),

	#[error("malformed frame: {0}")]
	Malformed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
