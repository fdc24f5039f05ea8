//! Document highlight: every same-file occurrence of the symbol under the
//! cursor.

use std::sync::Arc;

use cjls_frontend::NodeKind;
use lsp_types::{DocumentHighlight, DocumentHighlightKind, TextDocumentPositionParams};

use crate::convert::{to_frontend, to_lsp_range, uri_path};
use crate::reply::Reply;
use crate::server::LanguageServer;

pub fn document_highlight(
	server: &Arc<LanguageServer>,
	params: TextDocumentPositionParams,
	reply: Reply,
) {
	let Some(path) = uri_path(&params.text_document.uri) else {
		reply.null();
		return;
	};
	let position = to_frontend(params.position);
	server.run_with_ast("Highlights", &path, move |inputs| {
		let Some(inputs) = inputs else {
			reply.null();
			return;
		};
		let Some(target) = inputs.file.target_at(position) else {
			reply.null();
			return;
		};
		let file = &inputs.file;
		let mut highlights: Vec<DocumentHighlight> = file
			.references_to(target.symbol_id)
			.into_iter()
			.map(|node| {
				let kind = if file.sema.decls.contains_key(&node) {
					DocumentHighlightKind::WRITE
				} else if is_assign_target(file, node) {
					DocumentHighlightKind::WRITE
				} else {
					DocumentHighlightKind::READ
				};
				DocumentHighlight {
					range: to_lsp_range(file.reference_span(node)),
					kind: Some(kind),
				}
			})
			.collect();
		highlights.sort_by_key(|h| (h.range.start.line, h.range.start.character));
		highlights.dedup_by_key(|h| h.range);
		reply.ok(highlights);
	});
}

fn is_assign_target(file: &cjls_frontend::FileAst, node: cjls_frontend::NodeId) -> bool {
	file.ast
		.parent(node)
		.is_some_and(|parent| match &file.ast.node(parent).kind {
			NodeKind::AssignExpr { lhs, .. } => *lhs == node,
			_ => false,
		})
}
