//! Front-end contract consumed by the language server core.
//!
//! The server never re-implements compilation; it consumes what this crate
//! produces for each file of a package: a token array, an arena AST with
//! semantic targets in side-tables, and diagnostics. Nodes refer to each
//! other by [`NodeId`] index only — up-links are indices, resolved targets
//! live in [`SemaTable`], and nothing in the tree is a pointer.

mod ast;
mod diag;
mod lexer;
mod parser;
mod query;
mod sema;
mod source;
mod token;

pub use ast::{Ast, DeclData, DeclKind, LitKind, Modifiers, Node, NodeId, NodeKind};
pub use diag::{DiagCode, Diagnostic, Severity};
pub use lexer::lex;
pub use parser::parse;
pub use query::FileAst;
pub use sema::{
	ExternalSymbols, FileInput, FileSema, PackageExports, SemaTable, Target, analyze, exports_of,
};
pub use source::SourceManager;
pub use token::{Token, TokenKind};

/// 1-based source position, file-relative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Position {
	pub line: u32,
	pub column: u32,
}

impl Position {
	pub fn new(line: u32, column: u32) -> Self {
		Self { line, column }
	}
}

/// Half-open source span `[begin, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
	pub begin: Position,
	pub end: Position,
}

impl Span {
	pub fn new(begin: Position, end: Position) -> Self {
		Self { begin, end }
	}

	pub fn contains(&self, pos: Position) -> bool {
		self.begin <= pos && pos < self.end
	}
}

/// Stable symbol id: hash of the declaration's exported path.
pub type SymbolId = u64;

pub const INVALID_SYMBOL_ID: SymbolId = 0;

/// Stable hash for export ids. FxHash is deterministic across runs and
/// platforms, which the persistent index relies on.
pub fn symbol_id_of(export_id: &str) -> SymbolId {
	use std::hash::{Hash, Hasher};
	let mut hasher = rustc_hash::FxHasher::default();
	export_id.hash(&mut hasher);
	let id = hasher.finish();
	// 0 is reserved for "no symbol".
	if id == INVALID_SYMBOL_ID { 1 } else { id }
}
