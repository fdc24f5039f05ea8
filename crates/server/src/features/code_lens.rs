//! Code lens: a run marker on `main`.

use std::sync::Arc;

use cjls_frontend::{DeclKind, NodeKind};
use lsp_types::{CodeLens, CodeLensParams, Command};

use crate::convert::{to_lsp_range, uri_path};
use crate::reply::Reply;
use crate::server::LanguageServer;

pub fn code_lens(server: &Arc<LanguageServer>, params: CodeLensParams, reply: Reply) {
	if server.client.lock().embedded_host {
		// The embedding host draws its own lenses.
		reply.null();
		return;
	}
	let Some(path) = uri_path(&params.text_document.uri) else {
		reply.null();
		return;
	};
	server.run_with_ast("FindCodeLens", &path, move |inputs| {
		let Some(inputs) = inputs else {
			reply.null();
			return;
		};
		let file = &inputs.file;
		let mut lenses = Vec::new();
		file.ast.walk(file.ast.root, &mut |id| {
			let NodeKind::Decl(data) = &file.ast.node(id).kind else {
				return;
			};
			if data.kind != DeclKind::Main {
				return;
			}
			let range = to_lsp_range(data.name_span);
			lenses.push(CodeLens {
				range,
				command: Some(Command {
					title: "▶ Run".to_string(),
					command: "cjls.run".to_string(),
					arguments: Some(vec![serde_json::json!({"file": file.path})]),
				}),
				data: None,
			});
		});
		reply.ok(lenses);
	});
}
