//! Hover: signature plus indexed doc comment, rendered as markdown.

use std::sync::Arc;

use lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind, TextDocumentPositionParams};

use crate::convert::{to_frontend, to_lsp_range, uri_path};
use crate::reply::Reply;
use crate::server::LanguageServer;

pub fn hover(server: &Arc<LanguageServer>, params: TextDocumentPositionParams, reply: Reply) {
	let Some(path) = uri_path(&params.text_document.uri) else {
		reply.null();
		return;
	};
	let position = to_frontend(params.position);
	let this = server.clone();
	server.run_with_ast("Hover", &path, move |inputs| {
		let Some(inputs) = inputs else {
			reply.null();
			return;
		};
		let Some(target) = inputs.file.target_at(position) else {
			reply.null();
			return;
		};
		let mut value = format!("```cangjie\n{}\n```", target.signature);
		if let Some(index) = this.index() {
			match index.comments_of(target.symbol_id) {
				Ok(comments) if !comments.is_empty() => {
					let docs: Vec<String> =
						comments.into_iter().map(|c| c.text).collect();
					value.push_str("\n\n---\n\n");
					value.push_str(&docs.join("\n"));
				}
				Ok(_) => {}
				Err(e) => tracing::warn!(error = %e, "comment lookup failed"),
			}
		}
		let range = inputs
			.file
			.token_at_skip_space(position)
			.map(|idx| to_lsp_range(inputs.file.token(idx).span()));
		reply.ok(Hover {
			contents: HoverContents::Markup(MarkupContent {
				kind: MarkupKind::Markdown,
				value,
			}),
			range,
		});
	});
}
