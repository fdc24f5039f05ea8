//! Code completion.
//!
//! Candidates merge three sources: the live scope walk of the current file,
//! the package's own declarations, and the persistent index's fuzzy query
//! across dependencies. A trailing `.` switches to member-only mode. Runs on
//! its own pool so typing never queues behind slower features.

use std::sync::Arc;

use cjls_frontend::{DeclKind, Position, Target};
use cjls_protocol::{CompletionTip, TrackCompletionParams};
use lsp_types::{
	CompletionItem, CompletionItemKind, CompletionParams, InsertTextFormat,
};

use crate::convert::{file_uri, to_frontend, uri_path};
use crate::reply::Reply;
use crate::server::{InputsAndAst, LanguageServer, PoolKind};

const MAX_RESULTS: usize = 200;

const KEYWORDS: &[&str] = &[
	"class", "else", "enum", "extend", "false", "for", "func", "if", "import", "in", "init",
	"interface", "let", "macro", "main", "match", "package", "prop", "public", "return",
	"static", "struct", "super", "this", "true", "var", "while",
];

struct Candidate {
	label: String,
	insert_text: String,
	kind: CompletionItemKind,
	detail: String,
	score: f64,
	/// Package the candidate would need an import from, when not visible.
	needs_import_from: Option<String>,
}

pub fn completion(server: &Arc<LanguageServer>, params: CompletionParams, reply: Reply) {
	let Some(path) = uri_path(&params.text_document_position.text_document.uri) else {
		reply.null();
		return;
	};
	let lsp_position = params.text_document_position.position;
	let position = to_frontend(lsp_position);
	let this = server.clone();
	server.run_with_ast_cache(
		PoolKind::Completion,
		"Completion",
		&path.clone(),
		position,
		move |inputs| {
			let Some(inputs) = inputs else {
				reply.null();
				return;
			};
			let Some(contents) = this.docs.contents_of(&path) else {
				reply.null();
				return;
			};
			let (prefix, is_member, receiver) =
				cursor_context(&contents, lsp_position.line, lsp_position.character);
			let mut candidates = if is_member {
				member_candidates(&this, &inputs, receiver.as_deref(), &prefix)
			} else {
				scope_candidates(&this, &inputs, &prefix, position)
			};
			// A zero score would render as a seven-digit key and sort ahead
			// of real matches.
			candidates.retain(|c| !is_synthesized_label(&c.label) && c.score > 0.0);

			let mut items: Vec<CompletionItem> = candidates
				.iter()
				.map(|c| CompletionItem {
					label: c.label.clone(),
					kind: Some(c.kind),
					detail: (!c.detail.is_empty()).then(|| c.detail.clone()),
					sort_text: Some(sort_key(c.score)),
					insert_text: Some(c.insert_text.clone()),
					insert_text_format: Some(InsertTextFormat::PLAIN_TEXT),
					filter_text: Some(c.label.clone()),
					..CompletionItem::default()
				})
				.collect();
			items.sort_by(|a, b| {
				a.sort_text
					.cmp(&b.sort_text)
					.then_with(|| a.label.cmp(&b.label))
			});
			items.dedup_by(|a, b| a.label == b.label && a.kind == b.kind);
			items.truncate(MAX_RESULTS);

			// Nudge the client when the best candidate lives behind an
			// import the file does not have yet.
			if let Some(tip) = candidates
				.iter()
				.filter(|c| c.needs_import_from.is_some())
				.max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))
			{
				if tip.score > 0.8 {
					let pkg = tip.needs_import_from.clone().unwrap_or_default();
					let params = CompletionTip {
						uri: file_uri(&path),
						label: tip.label.clone(),
						message: format!("'{}' needs 'import {}.{}'", tip.label, pkg, tip.label),
					};
					this.outgoing.notify(
						"textDocument/publishCompletionTip",
						serde_json::to_value(params).unwrap_or_default(),
					);
				}
			}
			reply.ok(items);
		},
	);
}

/// Records completion acceptance telemetry from the client.
pub fn track_completion(server: &Arc<LanguageServer>, params: TrackCompletionParams) {
	tracing::debug!(label = %params.label, accepted = params.is_accepted, "completion tracked");
	server
		.completion_telemetry
		.lock()
		.push((params.label, params.is_accepted));
}

/// `(prefix, member_mode, receiver)` at the cursor: the identifier being
/// typed, whether the char before it is `.`, and the identifier before that
/// dot.
fn cursor_context(contents: &str, line: u32, character: u32) -> (String, bool, Option<String>) {
	let line_text = contents.lines().nth(line as usize).unwrap_or("");
	let upto: String = line_text.chars().take(character as usize).collect();
	let bytes = upto.as_bytes();
	let mut i = bytes.len();
	while i > 0 && (bytes[i - 1].is_ascii_alphanumeric() || bytes[i - 1] == b'_') {
		i -= 1;
	}
	let prefix = upto[i..].to_string();
	let is_member = i > 0 && bytes[i - 1] == b'.';
	let receiver = if is_member {
		let mut j = i - 1;
		while j > 0 && (bytes[j - 1].is_ascii_alphanumeric() || bytes[j - 1] == b'_') {
			j -= 1;
		}
		(j < i - 1).then(|| upto[j..i - 1].to_string())
	} else {
		None
	};
	(prefix, is_member, receiver)
}

/// Member-only candidates for `receiver.<prefix>`.
fn member_candidates(
	server: &Arc<LanguageServer>,
	inputs: &InputsAndAst,
	receiver: Option<&str>,
	prefix: &str,
) -> Vec<Candidate> {
	let Some(receiver) = receiver else {
		return Vec::new();
	};
	// Resolve the receiver to a type name: a variable's inferred type, or
	// the type itself for static access.
	let mut type_name = None;
	let mut type_target: Option<Target> = None;
	for decl in inputs.file.sema.decls.values() {
		if decl.name == receiver {
			if decl.kind.is_type() {
				type_name = Some(decl.name.clone());
				type_target = Some(decl.clone());
			} else if !decl.ty.is_empty() {
				type_name = Some(decl.ty.clone());
			}
			break;
		}
	}
	if type_name.is_none() {
		for target in inputs.file.sema.targets.values() {
			if target.name == receiver && target.kind.is_type() {
				type_name = Some(target.name.clone());
				type_target = Some(target.clone());
				break;
			}
		}
	}
	let Some(type_name) = type_name else {
		return Vec::new();
	};
	if type_target.is_none() {
		type_target = inputs
			.snapshot
			.exports
			.decls
			.iter()
			.find(|t| t.name == type_name)
			.cloned();
	}

	let mut out = Vec::new();
	// Members from the live package.
	if let Some(members) = inputs.snapshot.exports.members.get(&type_name) {
		for member in members {
			out.push(member_candidate(member.name.clone(), member, prefix));
		}
	}
	// Members and extend contributions from the index.
	if let Some(index) = server.index() {
		let scope_pkg = type_target
			.as_ref()
			.map(|t| t.package.clone())
			.unwrap_or_else(|| inputs.file.package.clone());
		let scope = format!("{scope_pkg}:{type_name}.");
		match index.symbols_in_scope(&scope) {
			Ok(symbols) => {
				for symbol in symbols {
					out.push(symbol_candidate(&symbol, prefix, None));
				}
			}
			Err(e) => tracing::warn!(error = %e, "member scope query failed"),
		}
		if let Some(target) = &type_target {
			match index.extends_of(target.symbol_id) {
				Ok(items) => {
					for item in items {
						if let Ok(Some(symbol)) = index.symbol_by_id(item.member_id) {
							out.push(symbol_candidate(&symbol, prefix, None));
						}
					}
				}
				Err(e) => tracing::warn!(error = %e, "extend member query failed"),
			}
		}
	}
	out
}

/// Top-level candidates: locals in scope, package declarations, imported
/// names, indexed symbols across dependencies, keywords.
fn scope_candidates(
	server: &Arc<LanguageServer>,
	inputs: &InputsAndAst,
	prefix: &str,
	position: Position,
) -> Vec<Candidate> {
	let mut out = Vec::new();
	let file = &inputs.file;

	// Locals and parameters declared before the cursor.
	for decl in file.sema.decls.values() {
		let local = decl.export_id.contains('$');
		if local && decl.name_span.begin > position {
			continue;
		}
		out.push(member_candidate(decl.name.clone(), decl, prefix));
	}
	// Resolved imports and package-level declarations from other files.
	for target in file.sema.targets.values() {
		if target.container == 0 && !target.export_id.contains('$') {
			out.push(member_candidate(target.name.clone(), target, prefix));
		}
	}
	for target in &inputs.snapshot.exports.decls {
		out.push(member_candidate(target.name.clone(), target, prefix));
	}

	// Cross-package candidates from the index's fuzzy query.
	if !prefix.is_empty() {
		if let Some(index) = server.index() {
			match index.completions_for_prefix(prefix) {
				Ok(hits) => {
					for (symbol, entry) in hits {
						let pkg = symbol.package().to_string();
						let needs_import = pkg != file.package
							&& !symbol.scope.is_empty()
							&& symbol.scope.ends_with(':')
							&& !file_imports_name(file, &entry.label);
						let mut candidate = symbol_candidate(&symbol, prefix, Some(entry));
						if needs_import && !pkg.is_empty() {
							candidate.needs_import_from = Some(pkg);
						}
						out.push(candidate);
					}
				}
				Err(e) => tracing::warn!(error = %e, "index completion query failed"),
			}
		}
	}

	for keyword in KEYWORDS {
		out.push(Candidate {
			label: (*keyword).to_string(),
			insert_text: (*keyword).to_string(),
			kind: CompletionItemKind::KEYWORD,
			detail: String::new(),
			score: score_label(keyword, prefix) * 0.5,
			needs_import_from: None,
		});
	}
	out
}

fn file_imports_name(file: &cjls_frontend::FileAst, name: &str) -> bool {
	use cjls_frontend::NodeKind;
	let NodeKind::File { imports, .. } = &file.ast.node(file.ast.root).kind else {
		return false;
	};
	imports.iter().any(|&import| {
		matches!(
			&file.ast.node(import).kind,
			NodeKind::Import { path, .. } if path.last().is_some_and(|last| last == name || last == "*")
		)
	})
}

fn member_candidate(label: String, target: &Target, prefix: &str) -> Candidate {
	let insert_text = if target.kind.is_callable() && target.kind != DeclKind::EnumCtor {
		format!("{label}()")
	} else {
		label.clone()
	};
	Candidate {
		score: score_label(&label, prefix),
		detail: target.signature.clone(),
		kind: kind_of(target.kind),
		insert_text,
		label,
		needs_import_from: None,
	}
}

fn symbol_candidate(
	symbol: &cjls_index::Symbol,
	prefix: &str,
	entry: Option<cjls_index::CompletionEntry>,
) -> Candidate {
	let kind = kind_of(cjls_index::kind_from_i32(symbol.kind));
	let (label, insert_text) = match entry {
		Some(entry) => (entry.label, entry.insert_text),
		None => {
			let label = symbol.name.clone();
			let insert = if cjls_index::kind_from_i32(symbol.kind).is_callable() {
				format!("{label}()")
			} else {
				label.clone()
			};
			(label, insert)
		}
	};
	Candidate {
		score: score_label(&label, prefix),
		detail: symbol.signature.clone(),
		kind,
		insert_text,
		label,
		needs_import_from: None,
	}
}

fn kind_of(kind: DeclKind) -> CompletionItemKind {
	match kind {
		DeclKind::Func | DeclKind::Main | DeclKind::Macro => CompletionItemKind::FUNCTION,
		DeclKind::Init => CompletionItemKind::CONSTRUCTOR,
		DeclKind::Class => CompletionItemKind::CLASS,
		DeclKind::Interface => CompletionItemKind::INTERFACE,
		DeclKind::Struct => CompletionItemKind::STRUCT,
		DeclKind::Enum => CompletionItemKind::ENUM,
		DeclKind::EnumCtor => CompletionItemKind::ENUM_MEMBER,
		DeclKind::Prop => CompletionItemKind::PROPERTY,
		DeclKind::Param => CompletionItemKind::VARIABLE,
		DeclKind::Var | DeclKind::Let => CompletionItemKind::VARIABLE,
		DeclKind::Extend | DeclKind::TypeAlias => CompletionItemKind::CLASS,
	}
}

/// Compiler-synthesized box types and internal names never surface.
fn is_synthesized_label(label: &str) -> bool {
	label.is_empty() || label.starts_with('$') || label.starts_with("Box-") || label == "<file>"
}

/// Match quality in `[0, 1]`.
fn score_label(label: &str, prefix: &str) -> f64 {
	if prefix.is_empty() {
		return 0.5;
	}
	if label == prefix {
		return 1.0;
	}
	let label_lower = label.to_lowercase();
	let prefix_lower = prefix.to_lowercase();
	if label.starts_with(prefix) {
		return 0.9 + 0.1 * (prefix.len() as f64 / label.len().max(1) as f64).min(1.0) - 0.01;
	}
	if label_lower.starts_with(&prefix_lower) {
		return 0.8;
	}
	// Subsequence match.
	let mut chars = label_lower.chars();
	let mut matched = 0usize;
	for p in prefix_lower.chars() {
		if chars.any(|c| c == p) {
			matched += 1;
		}
	}
	if matched == prefix.chars().count() {
		0.4 + 0.2 * (matched as f64 / label.chars().count().max(1) as f64)
	} else {
		0.0
	}
}

/// Six-digit ascending sort key: `padleft(floor((1-score)*1e6), 6, '0')`.
pub fn sort_key(score: f64) -> String {
	let clamped = score.clamp(0.0, 1.0);
	format!("{:06}", ((1.0 - clamped) * 1e6).floor() as u32)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sort_key_is_padded_and_ascending_in_inverse_score() {
		assert_eq!(sort_key(1.0), "000000");
		assert_eq!(sort_key(0.5), "500000");
		assert_eq!(sort_key(0.0), "1000000");
		assert_eq!(sort_key(0.25), "750000");
		assert!(sort_key(0.95) < sort_key(0.2));
	}

	#[test]
	fn cursor_context_detects_member_mode() {
		let (prefix, member, receiver) = cursor_context("    foo.ba", 0, 10);
		assert_eq!(prefix, "ba");
		assert!(member);
		assert_eq!(receiver.as_deref(), Some("foo"));

		let (prefix, member, receiver) = cursor_context("let x = pre", 0, 11);
		assert_eq!(prefix, "pre");
		assert!(!member);
		assert_eq!(receiver, None);
	}

	#[test]
	fn exact_match_outranks_prefix_match() {
		assert!(score_label("parse", "parse") > score_label("parseAll", "parse"));
		assert!(score_label("parseAll", "parse") > score_label("apexrse", "parse"));
	}
}
