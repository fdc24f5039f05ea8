//! Per-file analysis snapshot and position-based queries.
//!
//! [`FileAst`] is the unit feature actions receive: the token array, the
//! arena AST, the semantic table, and the file's diagnostics, all immutable.
//! Token localization is a binary search with the whitespace fall-backs
//! editor positions need (a caret sitting just after an identifier still
//! addresses it).

use crate::ast::{Ast, NodeId, NodeKind};
use crate::sema::{SemaTable, Target};
use crate::token::Token;
use crate::{Diagnostic, Position};

/// One file's immutable analysis results.
#[derive(Debug)]
pub struct FileAst {
	pub path: String,
	pub package: String,
	pub tokens: Vec<Token>,
	pub ast: Ast,
	pub sema: SemaTable,
	pub diagnostics: Vec<Diagnostic>,
}

impl FileAst {
	/// Index of the token whose `[begin, end)` contains `pos`, treating a
	/// caret sitting exactly at `end` as still inside (the editor reports
	/// "just after" positions for word-end carets).
	pub fn token_at(&self, pos: Position) -> Option<usize> {
		if self.tokens.is_empty() {
			return None;
		}
		let mut lo = 0usize;
		let mut hi = self.tokens.len() - 1;
		while lo <= hi {
			let mid = (lo + hi) / 2;
			let tok = &self.tokens[mid];
			if pos <= tok.begin {
				if pos == tok.begin && mid > 0 {
					// Caret on a token start also addresses the previous
					// token's end; prefer the previous one when addressable
					// and the current one is not.
					let prev = &self.tokens[mid - 1];
					if prev.end == pos && prev.kind.is_addressable() && !tok.kind.is_addressable()
					{
						return Some(mid - 1);
					}
				}
				if pos == tok.begin && tok.kind.is_addressable() {
					return Some(mid);
				}
				if mid == 0 {
					return None;
				}
				hi = mid - 1;
			} else if pos <= tok.end {
				// Right edge shared with the next token: prefer the
				// addressable side.
				if pos == tok.end && !tok.kind.is_addressable() {
					if let Some(next) = self.tokens.get(mid + 1) {
						if next.begin == pos && next.kind.is_addressable() {
							return Some(mid + 1);
						}
					}
				}
				return Some(mid);
			} else {
				lo = mid + 1;
				if lo >= self.tokens.len() {
					return None;
				}
			}
		}
		None
	}

	/// Like [`token_at`](Self::token_at) but skips whitespace gaps: between
	/// two tokens, prefers the preceding token when it is addressable and the
	/// following one is not.
	pub fn token_at_skip_space(&self, pos: Position) -> Option<usize> {
		if let Some(idx) = self.token_at(pos) {
			return Some(idx);
		}
		// `pos` is in a gap. Find the nearest tokens on both sides.
		let following = self.tokens.iter().position(|t| t.begin > pos);
		let preceding = match following {
			Some(0) => None,
			Some(i) => Some(i - 1),
			None if !self.tokens.is_empty() => Some(self.tokens.len() - 1),
			None => None,
		};
		match (preceding, following) {
			(Some(p), Some(f)) => {
				// Same-line preference for the earlier addressable token.
				let prev = &self.tokens[p];
				let next = &self.tokens[f];
				if prev.end.line == pos.line
					&& prev.kind.is_addressable()
					&& !next.kind.is_addressable()
				{
					Some(p)
				} else if next.kind.is_addressable() && next.begin.line == pos.line {
					Some(f)
				} else if prev.kind.is_addressable() {
					Some(p)
				} else {
					None
				}
			}
			(Some(p), None) => self.tokens[p].kind.is_addressable().then_some(p),
			_ => None,
		}
	}

	pub fn token(&self, idx: usize) -> &Token {
		&self.tokens[idx]
	}

	/// Deepest AST node containing `pos`.
	pub fn node_at(&self, pos: Position) -> Option<NodeId> {
		self.ast.node_at(pos)
	}

	/// Resolves the declaration addressed at `pos`, the way navigation
	/// features need it: localize the token, find the covering node, then
	/// match the node kind down to a declaration target.
	pub fn target_at(&self, pos: Position) -> Option<Target> {
		let idx = self.token_at_skip_space(pos)?;
		let tok = self.token(idx);
		if !tok.kind.is_addressable() {
			return None;
		}
		// Anchor on the token midpoint so multi-char tokens resolve even
		// when `pos` sat on their trailing edge.
		let anchor = tok.begin;
		let node = self.node_at(anchor)?;
		self.target_of(node)
	}

	/// The declaration a node refers to, matching by node kind. Walks up one
	/// level where the covering node is a structural wrapper.
	pub fn target_of(&self, node: NodeId) -> Option<Target> {
		if let Some(target) = self.sema.targets.get(&node) {
			return self.filter_synthesized(target.clone());
		}
		if let Some(decl) = self.sema.decls.get(&node) {
			return self.filter_synthesized(decl.clone());
		}
		// A ref's covering node may be the call or member access around it,
		// or the name token inside a declaration.
		let mut current = Some(node);
		let mut hops = 0;
		while let Some(id) = current {
			if hops > 3 {
				break;
			}
			match &self.ast.node(id).kind {
				NodeKind::RefExpr { .. }
				| NodeKind::MemberAccess { .. }
				| NodeKind::CallExpr { .. }
				| NodeKind::RefType { .. }
				| NodeKind::QualifiedType { .. }
				| NodeKind::Import { .. }
				| NodeKind::MacroExpand { .. } => {
					if let Some(target) = self.sema.targets.get(&id) {
						return self.filter_synthesized(target.clone());
					}
				}
				NodeKind::Decl(_) => {
					if let Some(decl) = self.sema.decls.get(&id) {
						return self.filter_synthesized(decl.clone());
					}
				}
				_ => {}
			}
			current = self.ast.parent(id);
			hops += 1;
		}
		None
	}

	fn filter_synthesized(&self, target: Target) -> Option<Target> {
		if target.synthesized { None } else { Some(target) }
	}

	/// All nodes in this file resolving to the given symbol.
	pub fn references_to(&self, symbol_id: crate::SymbolId) -> Vec<NodeId> {
		let mut out: Vec<NodeId> = self
			.sema
			.targets
			.iter()
			.filter(|(node, target)| {
				if target.symbol_id != symbol_id {
					return false;
				}
				// A call inherits its callee's target; counting both would
				// double-report the same site.
				!matches!(self.ast.node(**node).kind, NodeKind::CallExpr { .. })
			})
			.map(|(&node, _)| node)
			.collect();
		out.extend(
			self.sema
				.decls
				.iter()
				.filter(|(_, d)| d.symbol_id == symbol_id)
				.map(|(&node, _)| node),
		);
		out.sort_unstable();
		out.dedup();
		out
	}

	/// The precise span to report for a reference node (the member name, not
	/// the whole access chain).
	pub fn reference_span(&self, node: NodeId) -> crate::Span {
		match &self.ast.node(node).kind {
			NodeKind::MemberAccess { field_span, .. } => *field_span,
			NodeKind::Import { item_span, .. } => *item_span,
			NodeKind::Decl(data) => data.name_span,
			NodeKind::MacroExpand { name_span, .. } => *name_span,
			NodeKind::QualifiedType { name_span, .. } => *name_span,
			_ => self.ast.node(node).span,
		}
	}
}

#[cfg(test)]
mod tests {
	use crate::sema::{ExternalSymbols, FileInput, analyze};
	use crate::{lex, parse};

	use super::*;

	fn file_ast(src: &str) -> FileAst {
		let (tokens, mut diags) = lex(src);
		let (ast, parse_diags) = parse(&tokens);
		diags.extend(parse_diags);
		let mut semas = analyze(
			"p",
			&[FileInput {
				path: "/p/a.cj",
				ast: &ast,
			}],
			&ExternalSymbols::default(),
		);
		let sema = semas.remove(0);
		diags.extend(sema.diagnostics);
		FileAst {
			path: "/p/a.cj".into(),
			package: "p".into(),
			tokens,
			ast,
			sema: sema.table,
			diagnostics: diags,
		}
	}

	#[test]
	fn token_at_hits_containing_token() {
		let file = file_ast("package p\nfunc foo() {}\n");
		// `foo` spans (2,6)..(2,9).
		let idx = file.token_at(Position::new(2, 7)).unwrap();
		assert_eq!(file.token(idx).text, "foo");
	}

	#[test]
	fn caret_just_after_identifier_still_addresses_it() {
		let file = file_ast("package p\nfunc foo() {}\n");
		let idx = file.token_at(Position::new(2, 9)).unwrap();
		assert_eq!(file.token(idx).text, "foo");
	}

	#[test]
	fn whitespace_between_tokens_prefers_addressable_left_neighbor() {
		// Position in the run of spaces after `abc`: `abc` is addressable,
		// `=` is not, so the identifier wins.
		let file = file_ast("package p\nfunc f() { let abc   = 1 }\n");
		let pos = Position::new(2, 20);
		let idx = file.token_at_skip_space(pos).unwrap();
		assert_eq!(file.token(idx).text, "abc");
	}

	#[test]
	fn target_at_resolves_a_call_site() {
		let file = file_ast("package p\nfunc g() {}\nfunc f() { g() }\n");
		let target = file.target_at(Position::new(3, 12)).unwrap();
		assert_eq!(target.export_id, "p.g");
	}

	#[test]
	fn target_at_on_whitespace_line_returns_none() {
		let file = file_ast("package p\nfunc g() {}\n\nfunc f() { g() }\n");
		assert!(file.target_at(Position::new(3, 1)).is_none());
	}

	#[test]
	fn references_skip_call_wrappers() {
		let file = file_ast("package p\nfunc g() {}\nfunc f() { g()\n g() }\n");
		let target = file.target_at(Position::new(2, 6)).unwrap();
		let refs = file.references_to(target.symbol_id);
		// Declaration + two call-site refs; the CallExpr wrappers themselves
		// are not counted.
		assert_eq!(refs.len(), 3);
	}
}
