//! Document links: imports link to their declaring files.

use std::sync::Arc;

use cjls_frontend::NodeKind;
use lsp_types::{DocumentLink, DocumentLinkParams};

use crate::convert::{file_uri, to_lsp_range, uri_path};
use crate::reply::Reply;
use crate::server::LanguageServer;

pub fn document_link(server: &Arc<LanguageServer>, params: DocumentLinkParams, reply: Reply) {
	let Some(path) = uri_path(&params.text_document.uri) else {
		reply.null();
		return;
	};
	server.run_with_ast("DocumentLink", &path, move |inputs| {
		let Some(inputs) = inputs else {
			reply.null();
			return;
		};
		let file = &inputs.file;
		let NodeKind::File { imports, .. } = &file.ast.node(file.ast.root).kind else {
			reply.null();
			return;
		};
		let links: Vec<DocumentLink> = imports
			.iter()
			.filter_map(|&import| {
				let target = file.sema.targets.get(&import)?;
				let NodeKind::Import { item_span, .. } = &file.ast.node(import).kind else {
					return None;
				};
				Some(DocumentLink {
					range: to_lsp_range(*item_span),
					target: Some(file_uri(&target.file)),
					tooltip: Some(target.export_id.clone()),
					data: None,
				})
			})
			.collect();
		reply.ok(links);
	});
}
