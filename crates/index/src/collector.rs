//! Derives index rows from a compiled package.
//!
//! Walks each file's arena AST with the semantic table alongside and
//! produces the full row set a package contributes: symbols (top-level and
//! members), use-site references, relations (base/implement/override/call
//! edges), extend members, completion renderings, doc comments, and
//! cross-language registrations. Locals and parameters stay out of the
//! index; their lifetime is one snapshot.

use cjls_frontend::{
	DeclKind, FileAst, Modifiers, NodeId, NodeKind, Span, SymbolId, Target, TokenKind,
};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::model::*;

/// Everything one package contributes to the index.
#[derive(Debug, Default)]
pub struct CollectedPackage {
	pub symbols: Vec<Symbol>,
	pub refs: Vec<(SymbolId, Ref)>,
	pub relations: Vec<Relation>,
	pub completions: Vec<CompletionEntry>,
	pub comments: Vec<Comment>,
	pub extends: Vec<ExtendItem>,
	pub cross_symbols: Vec<CrossSymbol>,
}

const INTEROP_REGISTER_NAMES: &[(&str, i32)] = &[
	("registerModule", 0),
	("registerClass", 1),
	("registerFunc", 2),
];

/// Collects the index rows of one compiled package.
pub fn collect_package(pkg: &str, module: &str, files: &[&FileAst]) -> CollectedPackage {
	let mut out = CollectedPackage::default();
	let mut seen_symbols = FxHashSet::default();
	// symbol id -> name, for member scopes.
	let mut names: FxHashMap<SymbolId, String> = FxHashMap::default();
	for file in files {
		for target in file.sema.decls.values() {
			names.insert(target.symbol_id, target.name.clone());
		}
	}

	for file in files {
		collect_symbols(pkg, module, file, &names, &mut seen_symbols, &mut out);
		collect_refs(file, &mut out);
		collect_relations(pkg, file, &mut out);
		collect_cross_symbols(pkg, file, &mut out);
	}
	out
}

fn is_indexed_decl(target: &Target) -> bool {
	!target.synthesized
		&& !target.name.is_empty()
		&& target.kind != DeclKind::Param
		&& !target.export_id.contains('$')
}

fn collect_symbols(
	pkg: &str,
	module: &str,
	file: &FileAst,
	names: &FxHashMap<SymbolId, String>,
	seen: &mut FxHashSet<SymbolId>,
	out: &mut CollectedPackage,
) {
	let mut decls: Vec<(&NodeId, &Target)> = file.sema.decls.iter().collect();
	decls.sort_by_key(|(node, _)| **node);
	for (&node, target) in decls {
		if !is_indexed_decl(target) || !seen.insert(target.symbol_id) {
			continue;
		}
		let scope = match names.get(&target.container) {
			Some(container) if target.container != 0 => format!("{pkg}:{container}."),
			_ => format!("{pkg}:"),
		};
		let (is_deprecated, macro_call) = annotation_of(file, node);
		let symbol = Symbol {
			id: target.symbol_id,
			kind: kind_to_i32(target.kind),
			sub_kind: 0,
			lang: SymbolLang::Cangjie as i32,
			flags: 0,
			name: target.name.clone(),
			scope,
			declaration: SymLocation::new(&target.file, target.name_span),
			definition: SymLocation::new(&target.file, target.full_span),
			signature: target.signature.clone(),
			return_type: if target.kind.is_callable() {
				target.ty.clone()
			} else {
				String::new()
			},
			ty: target.ty.clone(),
			modifier: target.modifiers,
			is_deprecated,
			syscap: String::new(),
			cur_module: module.to_string(),
			macro_call,
			is_cjo: false,
			references: 0,
		};
		out.completions.push(render_completion(target));
		if let Some(comment) = doc_comment_before(file, target.full_span) {
			out.comments.push(Comment {
				symbol_id: target.symbol_id,
				style: 0,
				kind: 0,
				text: comment,
			});
		}
		// The declaration itself is a Declaration/Definition reference.
		out.refs.push((
			target.symbol_id,
			Ref {
				location: SymLocation::new(&target.file, target.name_span),
				kind: RefKind::Declaration,
				container: target.container,
				is_cjo: false,
				is_super: false,
			},
		));
		out.symbols.push(symbol);
	}
}

/// Deprecation annotation and its span, when the declaration is wrapped in
/// `@Deprecated`.
fn annotation_of(file: &FileAst, node: NodeId) -> (bool, SymLocation) {
	if let Some(parent) = file.ast.parent(node) {
		if let NodeKind::MacroExpand { name, .. } = &file.ast.node(parent).kind {
			let span = file.ast.node(parent).span;
			return (name == "Deprecated", SymLocation::new(&file.path, span));
		}
	}
	(false, SymLocation::default())
}

fn render_completion(target: &Target) -> CompletionEntry {
	let insert_text = if target.kind.is_callable() && target.kind != DeclKind::EnumCtor {
		format!("{}()", target.name)
	} else {
		target.name.clone()
	};
	CompletionEntry {
		symbol_id: target.symbol_id,
		label: target.name.clone(),
		insert_text,
	}
}

/// The run of `///` lines immediately above a declaration.
fn doc_comment_before(file: &FileAst, decl_span: Span) -> Option<String> {
	let mut lines: Vec<&str> = Vec::new();
	let mut expect_line = decl_span.begin.line.checked_sub(1)?;
	for token in file.tokens.iter().rev() {
		if token.begin.line > expect_line {
			continue;
		}
		if token.kind == TokenKind::DocComment && token.begin.line == expect_line {
			lines.push(token.text.trim_start_matches('/').trim());
			expect_line = match expect_line.checked_sub(1) {
				Some(line) => line,
				None => break,
			};
		} else if token.begin.line <= expect_line {
			break;
		}
	}
	if lines.is_empty() {
		return None;
	}
	lines.reverse();
	Some(lines.join("\n"))
}

fn collect_refs(file: &FileAst, out: &mut CollectedPackage) {
	for (&node, target) in &file.sema.targets {
		if target.symbol_id == cjls_frontend::INVALID_SYMBOL_ID || target.synthesized {
			continue;
		}
		let kind = &file.ast.node(node).kind;
		// Calls resolve to the same declaration as their callee; indexing
		// both would double count the site.
		if matches!(kind, NodeKind::CallExpr { .. }) {
			continue;
		}
		// Locals are not persisted.
		if target.export_id.contains('$') {
			continue;
		}
		let is_super = is_super_type_position(file, node);
		let ref_kind = if is_call_position(file, node) {
			RefKind::Call
		} else {
			RefKind::Reference
		};
		out.refs.push((
			target.symbol_id,
			Ref {
				location: SymLocation::new(&file.path, file.reference_span(node)),
				kind: ref_kind,
				container: enclosing_symbol(file, node),
				is_cjo: target.package != file.package,
				is_super,
			},
		));
	}
}

fn is_super_type_position(file: &FileAst, node: NodeId) -> bool {
	let Some(parent) = file.ast.parent(node) else {
		return false;
	};
	match &file.ast.node(parent).kind {
		NodeKind::Decl(data) => data.super_types.contains(&node),
		_ => false,
	}
}

fn is_call_position(file: &FileAst, node: NodeId) -> bool {
	let Some(parent) = file.ast.parent(node) else {
		return false;
	};
	matches!(
		&file.ast.node(parent).kind,
		NodeKind::CallExpr { callee, .. } if *callee == node
	)
}

/// Nearest enclosing indexed declaration of a node.
fn enclosing_symbol(file: &FileAst, node: NodeId) -> SymbolId {
	for ancestor in file.ast.ancestors(node) {
		if let Some(decl) = file.sema.decls.get(&ancestor) {
			if is_indexed_decl(decl) {
				return decl.symbol_id;
			}
		}
	}
	cjls_frontend::INVALID_SYMBOL_ID
}

fn collect_relations(pkg: &str, file: &FileAst, out: &mut CollectedPackage) {
	for id in file.ast.ids() {
		let Some(data) = file.ast.decl(id) else { continue };
		let Some(decl_target) = file.sema.decls.get(&id) else {
			continue;
		};
		if data.kind.is_type() {
			collect_type_relations(file, id, decl_target, out);
		}
		if data.kind == DeclKind::Extend {
			collect_extend(pkg, file, id, out);
		}
		if data.kind.is_callable() {
			collect_call_edges(file, id, decl_target, out);
		}
	}
}

fn collect_type_relations(
	file: &FileAst,
	id: NodeId,
	decl_target: &cjls_frontend::Target,
	out: &mut CollectedPackage,
) {
	let Some(data) = file.ast.decl(id) else { return };
	for &super_node in &data.super_types {
		let Some(super_target) = file.sema.targets.get(&super_node) else {
			continue;
		};
		let predicate = if super_target.kind == DeclKind::Interface {
			RelationKind::Implements
		} else {
			RelationKind::BaseOf
		};
		out.relations.push(Relation {
			subject: super_target.symbol_id,
			predicate,
			object: decl_target.symbol_id,
		});
		// Member overrides against this super type.
		for &member in &data.members {
			let Some(member_target) = file.sema.decls.get(&member) else {
				continue;
			};
			if !member_target.kind.is_callable() && member_target.kind != DeclKind::Prop {
				continue;
			}
			let overridden_export = format!("{}.{}", super_target.export_id, member_target.name);
			let must_check = member_target.modifiers & Modifiers::OVERRIDE != 0
				|| member_target.modifiers & Modifiers::REDEF != 0
				|| super_target.package == member_target.package;
			if must_check {
				out.relations.push(Relation {
					subject: cjls_frontend::symbol_id_of(&overridden_export),
					predicate: RelationKind::OverriddenBy,
					object: member_target.symbol_id,
				});
			}
		}
	}
}

fn collect_extend(pkg: &str, file: &FileAst, id: NodeId, out: &mut CollectedPackage) {
	let Some(data) = file.ast.decl(id) else { return };
	let Some(target_node) = data.ty_annotation else {
		return;
	};
	let Some(extended) = file.sema.targets.get(&target_node) else {
		return;
	};
	let interface_name = data
		.super_types
		.first()
		.and_then(|&s| file.sema.targets.get(&s))
		.map(|t| t.name.clone())
		.unwrap_or_default();
	out.relations.push(Relation {
		subject: extended.symbol_id,
		predicate: RelationKind::ExtendedBy,
		object: file
			.sema
			.decls
			.get(&id)
			.map(|d| d.symbol_id)
			.unwrap_or(cjls_frontend::INVALID_SYMBOL_ID),
	});
	for &member in &data.members {
		let Some(member_target) = file.sema.decls.get(&member) else {
			continue;
		};
		out.extends.push(ExtendItem {
			extend_id: extended.symbol_id,
			member_id: member_target.symbol_id,
			modifier: member_target.modifiers,
			interface_name: interface_name.clone(),
			pkg_name: pkg.to_string(),
		});
	}
}

/// One `Calls` relation per resolved call site inside a callable body.
fn collect_call_edges(
	file: &FileAst,
	id: NodeId,
	decl_target: &cjls_frontend::Target,
	out: &mut CollectedPackage,
) {
	let Some(data) = file.ast.decl(id) else { return };
	let Some(body) = data.body else { return };
	let mut edges = FxHashSet::default();
	file.ast.walk(body, &mut |node| {
		if let NodeKind::CallExpr { .. } = &file.ast.node(node).kind {
			if let Some(callee_target) = file.sema.targets.get(&node) {
				if callee_target.kind.is_callable() && !callee_target.export_id.contains('$') {
					edges.insert(callee_target.symbol_id);
				}
			}
		}
	});
	for callee in edges {
		out.relations.push(Relation {
			subject: decl_target.symbol_id,
			predicate: RelationKind::Calls,
			object: callee,
		});
	}
}

/// Interop registrations: `registerModule/registerClass/registerFunc` calls
/// publishing a Cangjie declaration under a foreign name.
fn collect_cross_symbols(pkg: &str, file: &FileAst, out: &mut CollectedPackage) {
	file.ast.walk(file.ast.root, &mut |node| {
		let NodeKind::CallExpr { callee, args } = &file.ast.node(node).kind else {
			return;
		};
		let callee_name = match &file.ast.node(*callee).kind {
			NodeKind::RefExpr { name } => name.clone(),
			NodeKind::MemberAccess { field, .. } => field.clone(),
			_ => return,
		};
		let Some((_, cross_type)) = INTEROP_REGISTER_NAMES
			.iter()
			.find(|(name, _)| *name == callee_name)
		else {
			return;
		};
		// First string-literal argument is the registered name; the first
		// resolvable argument is the registered declaration.
		let mut registered_name = None;
		let mut registered_target = None;
		for &arg in args {
			match &file.ast.node(arg).kind {
				NodeKind::LitExpr { text, .. } if registered_name.is_none() => {
					registered_name = Some(text.trim_matches('"').to_string());
				}
				_ => {
					if registered_target.is_none() {
						registered_target = file.sema.targets.get(&arg).cloned();
					}
				}
			}
		}
		let Some(target) = registered_target else {
			return;
		};
		let name = registered_name.unwrap_or_else(|| target.name.clone());
		out.cross_symbols.push(CrossSymbol {
			pkg: pkg.to_string(),
			id: target.symbol_id,
			name,
			container: target.container,
			container_name: String::new(),
			cross_type: *cross_type,
			location: SymLocation::new(&target.file, target.name_span),
			declaration: target.full_span,
		});
	});
}

#[cfg(test)]
mod tests {
	use cjls_frontend::{ExternalSymbols, FileInput, analyze, lex, parse};

	use super::*;

	fn compile(pkg: &str, path: &str, src: &str) -> FileAst {
		let (tokens, _) = lex(src);
		let (ast, _) = parse(&tokens);
		let mut semas = analyze(pkg, &[FileInput { path, ast: &ast }], &ExternalSymbols::default());
		let sema = semas.remove(0);
		FileAst {
			path: path.into(),
			package: pkg.into(),
			tokens,
			ast,
			sema: sema.table,
			diagnostics: sema.diagnostics,
		}
	}

	#[test]
	fn collects_top_level_and_member_symbols() {
		let file = compile(
			"p",
			"/p/a.cj",
			"package p\n/// Greets.\npublic func hello() {}\nclass K { public func m() {} }\n",
		);
		let collected = collect_package("p", "mod", &[&file]);
		let names: Vec<&str> = collected.symbols.iter().map(|s| s.name.as_str()).collect();
		assert!(names.contains(&"hello"));
		assert!(names.contains(&"K"));
		assert!(names.contains(&"m"));
		let m = collected.symbols.iter().find(|s| s.name == "m").unwrap();
		assert_eq!(m.scope, "p:K.");
		let hello = collected.symbols.iter().find(|s| s.name == "hello").unwrap();
		assert_eq!(hello.scope, "p:");
		assert!(
			collected
				.comments
				.iter()
				.any(|c| c.symbol_id == hello.id && c.text.contains("Greets"))
		);
	}

	#[test]
	fn locals_stay_out_of_the_index() {
		let file = compile("p", "/p/a.cj", "package p\nfunc f() { let local = 1\n local }\n");
		let collected = collect_package("p", "mod", &[&file]);
		assert!(!collected.symbols.iter().any(|s| s.name == "local"));
	}

	#[test]
	fn override_members_store_the_reverse_relation() {
		let file = compile(
			"p",
			"/p/a.cj",
			"package p\nopen class Base { public open func m() {} }\n\
			 class Derived <: Base { public override func m() {} }\n",
		);
		let collected = collect_package("p", "mod", &[&file]);
		let base_m = cjls_frontend::symbol_id_of("p.Base.m");
		let derived_m = cjls_frontend::symbol_id_of("p.Derived.m");
		assert!(collected.relations.iter().any(|r| {
			r.predicate == RelationKind::OverriddenBy
				&& r.subject == base_m
				&& r.object == derived_m
		}));
	}

	#[test]
	fn call_edges_are_recorded_once_per_callee() {
		let file = compile(
			"p",
			"/p/a.cj",
			"package p\nfunc g() {}\nfunc f() { g()\n g() }\n",
		);
		let collected = collect_package("p", "mod", &[&file]);
		let f = cjls_frontend::symbol_id_of("p.f");
		let g = cjls_frontend::symbol_id_of("p.g");
		let calls: Vec<_> = collected
			.relations
			.iter()
			.filter(|r| r.predicate == RelationKind::Calls && r.subject == f && r.object == g)
			.collect();
		assert_eq!(calls.len(), 1);
	}

	#[test]
	fn extend_members_land_in_the_extends_table() {
		let file = compile(
			"p",
			"/p/a.cj",
			"package p\nclass K {}\nextend K { public func extra() {} }\n",
		);
		let collected = collect_package("p", "mod", &[&file]);
		let k = cjls_frontend::symbol_id_of("p.K");
		assert!(collected.extends.iter().any(|e| e.extend_id == k));
	}

	#[test]
	fn callable_completions_render_with_parens() {
		let file = compile("p", "/p/a.cj", "package p\npublic func run() {}\nvar data = 1\n");
		let collected = collect_package("p", "mod", &[&file]);
		let run = collected
			.completions
			.iter()
			.find(|c| c.label == "run")
			.unwrap();
		assert_eq!(run.insert_text, "run()");
		let data = collected
			.completions
			.iter()
			.find(|c| c.label == "data")
			.unwrap();
		assert_eq!(data.insert_text, "data");
	}

	#[test]
	fn interop_register_calls_become_cross_symbols() {
		let file = compile(
			"p",
			"/p/a.cj",
			"package p\nclass Widget {}\nfunc setup(ctx: Context) { ctx.registerClass(\"JsWidget\", Widget) }\n",
		);
		let collected = collect_package("p", "mod", &[&file]);
		let cross = collected
			.cross_symbols
			.iter()
			.find(|c| c.name == "JsWidget")
			.expect("cross symbol registered");
		assert_eq!(cross.cross_type, 1);
		assert_eq!(cross.id, cjls_frontend::symbol_id_of("p.Widget"));
	}
}
