//! Go to definition.

use std::sync::Arc;

use lsp_types::TextDocumentPositionParams;

use crate::convert::{location, to_frontend, uri_path};
use crate::reply::Reply;
use crate::server::LanguageServer;

pub fn definition(server: &Arc<LanguageServer>, params: TextDocumentPositionParams, reply: Reply) {
	let Some(path) = uri_path(&params.text_document.uri) else {
		reply.null();
		return;
	};
	let position = to_frontend(params.position);
	let this = server.clone();
	server.run_with_ast("Definition", &path, move |inputs| {
		let Some(inputs) = inputs else {
			reply.null();
			return;
		};
		let Some(target) = inputs.file.target_at(position) else {
			reply.null();
			return;
		};
		// Declarations in this project resolve directly; indexed symbols
		// from elsewhere fall back to their recorded declaration site.
		if !target.file.is_empty() {
			reply.ok(location(&target.file, target.name_span));
			return;
		}
		let found = this
			.index()
			.and_then(|index| index.symbol_by_id(target.symbol_id).ok().flatten());
		match found {
			Some(symbol) if !symbol.declaration.is_empty() => {
				reply.ok(location(&symbol.declaration.file, symbol.declaration.span));
			}
			_ => reply.null(),
		}
	});
}
