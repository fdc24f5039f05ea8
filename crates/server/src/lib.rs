//! Language server core.
//!
//! Wires the transport to the feature handlers: the [`dispatch::Dispatcher`]
//! gates messages by lifecycle and binds methods, [`LanguageServer`] owns the
//! document cache, project graph, index, and worker pools, and the
//! `features` modules hold the stateless query algorithms.

mod capabilities;
mod convert;
mod dispatch;
mod reply;
mod server;

pub mod features;

#[cfg(test)]
mod tests;

pub use dispatch::Dispatcher;
pub use reply::Reply;
pub use server::{InputsAndAst, LanguageServer, PoolKind, ServerConfig};

/// Server-level errors (logged at the dispatch boundary, never panicking
/// across the transport).
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("project error: {0}")]
	Project(#[from] cjls_project::Error),

	#[error("index error: {0}")]
	Index(#[from] cjls_index::Error),

	#[error("{0}")]
	Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
