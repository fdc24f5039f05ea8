//! Find references, plus the file-references extension.

use std::sync::Arc;

use cjls_frontend::NodeKind;
use cjls_index::RefKind;
use cjls_protocol::FileReferencesParams;
use lsp_types::{Location, ReferenceParams};

use crate::convert::{location, to_frontend, uri_path};
use crate::reply::Reply;
use crate::server::{InputsAndAst, LanguageServer};

pub fn references(server: &Arc<LanguageServer>, params: ReferenceParams, reply: Reply) {
	let Some(path) = uri_path(&params.text_document_position.text_document.uri) else {
		reply.null();
		return;
	};
	let position = to_frontend(params.text_document_position.position);
	let include_declaration = params.context.include_declaration;
	let this = server.clone();
	server.run_with_ast("References", &path, move |inputs| {
		let Some(inputs) = inputs else {
			reply.null();
			return;
		};
		let Some(target) = inputs.file.target_at(position) else {
			reply.null();
			return;
		};
		let mut locations =
			collect_reference_locations(&this, &inputs, target.symbol_id, include_declaration);
		locations.sort_by(|a, b| {
			(a.uri.as_str(), a.range.start.line, a.range.start.character).cmp(&(
				b.uri.as_str(),
				b.range.start.line,
				b.range.start.character,
			))
		});
		locations.dedup();
		reply.ok(locations);
	});
}

/// Same-package sites from the live snapshot, cross-package sites from the
/// index.
pub(crate) fn collect_reference_locations(
	server: &Arc<LanguageServer>,
	inputs: &InputsAndAst,
	symbol_id: cjls_frontend::SymbolId,
	include_declaration: bool,
) -> Vec<Location> {
	let mut locations = Vec::new();
	for file in &inputs.snapshot.files {
		for node in file.references_to(symbol_id) {
			let is_declaration = file.sema.decls.contains_key(&node);
			if is_declaration && !include_declaration {
				continue;
			}
			// Synthetic member-access children under a resolved access chain
			// would double count the same spelled site.
			if let NodeKind::MemberAccess { field, .. } = &file.ast.node(node).kind {
				if field.is_empty() {
					continue;
				}
			}
			locations.push(location(&file.path, file.reference_span(node)));
		}
	}
	// Dependent packages come from the persistent index; the declaring
	// package's rows are skipped in favor of the fresh AST walk above.
	if let Some(index) = server.index() {
		let mask = if include_declaration {
			RefKind::ALL
		} else {
			RefKind::Reference as i32 | RefKind::Call as i32
		};
		match index.references_of(symbol_id, mask) {
			Ok(refs) => {
				for reference in refs {
					let in_snapshot = inputs
						.snapshot
						.file(&reference.location.file)
						.is_some();
					if in_snapshot {
						continue;
					}
					locations.push(location(&reference.location.file, reference.location.span));
				}
			}
			Err(e) => tracing::warn!(error = %e, "index reference query failed"),
		}
	}
	locations
}

/// `textDocument/findFileReferences`: every location that references any
/// symbol declared in the given file.
pub fn file_references(server: &Arc<LanguageServer>, params: FileReferencesParams, reply: Reply) {
	let Some(path) = uri_path(&params.text_document.uri) else {
		reply.null();
		return;
	};
	let this = server.clone();
	server.run_with_ast("FileReferences", &path, move |inputs| {
		let Some(inputs) = inputs else {
			reply.null();
			return;
		};
		let mut locations: Vec<Location> = Vec::new();
		let declared: Vec<cjls_frontend::SymbolId> = inputs
			.file
			.sema
			.decls
			.values()
			.filter(|d| !d.export_id.contains('$'))
			.map(|d| d.symbol_id)
			.collect();
		for symbol_id in declared {
			locations.extend(collect_reference_locations(&this, &inputs, symbol_id, false));
		}
		locations.sort_by(|a, b| {
			(a.uri.as_str(), a.range.start.line, a.range.start.character).cmp(&(
				b.uri.as_str(),
				b.range.start.line,
				b.range.start.character,
			))
		});
		locations.dedup();
		// Self-references inside the declaring file are not file references.
		let own = crate::convert::file_uri(&inputs.file.path);
		locations.retain(|l| l.uri != own);
		reply.ok(locations);
	});
}
