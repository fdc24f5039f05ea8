//! JSON-RPC 2.0 envelope and payload types spoken by the server.
//!
//! Standard LSP structures come from [`lsp_types`]; this crate adds the
//! message envelope (requests, notifications, responses, ids, error codes)
//! and the non-standard extension payloads the Cangjie toolchain speaks on
//! top of LSP.

pub use lsp_types;

mod ext;
mod message;
mod uri;

pub use ext::*;
pub use message::{
	AnyNotification, AnyRequest, AnyResponse, ErrorCode, Message, RequestId, ResponseError,
};
pub use uri::{path_to_uri, uri_to_path};

/// Result payload of a call: either a JSON value or a wire error.
pub type ValueOrError = Result<serde_json::Value, ResponseError>;
