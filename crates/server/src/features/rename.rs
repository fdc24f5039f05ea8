//! Rename: prepare validation plus cross-package edit collection.

use std::collections::HashMap;
use std::sync::Arc;

use lsp_types::{
	PrepareRenameResponse, RenameParams, TextDocumentPositionParams, TextEdit, Uri, WorkspaceEdit,
};

use crate::convert::{to_frontend, to_lsp_range, uri_path};
use crate::features::references::collect_reference_locations;
use crate::reply::Reply;
use crate::server::LanguageServer;

pub fn prepare_rename(
	server: &Arc<LanguageServer>,
	params: TextDocumentPositionParams,
	reply: Reply,
) {
	let Some(path) = uri_path(&params.text_document.uri) else {
		reply.null();
		return;
	};
	let position = to_frontend(params.position);
	server.run_with_ast("PrepareRename", &path, move |inputs| {
		let Some(inputs) = inputs else {
			reply.null();
			return;
		};
		let Some(idx) = inputs.file.token_at_skip_space(position) else {
			reply.null();
			return;
		};
		let token = inputs.file.token(idx);
		if !token.kind.is_rename_addressable() {
			reply.null();
			return;
		}
		if inputs.file.target_at(position).is_none() {
			reply.null();
			return;
		}
		reply.ok(PrepareRenameResponse::RangeWithPlaceholder {
			range: to_lsp_range(token.span()),
			placeholder: token.text.clone(),
		});
	});
}

pub fn rename(server: &Arc<LanguageServer>, params: RenameParams, reply: Reply) {
	let Some(path) = uri_path(&params.text_document_position.text_document.uri) else {
		reply.null();
		return;
	};
	let position = to_frontend(params.text_document_position.position);
	let new_name = params.new_name;
	if !is_valid_identifier(&new_name) {
		reply.error(cjls_protocol::ResponseError::new(
			cjls_protocol::ErrorCode::InvalidParams,
			format!("'{new_name}' is not a valid identifier"),
		));
		return;
	}
	let this = server.clone();
	server.run_with_ast("Rename", &path, move |inputs| {
		let Some(inputs) = inputs else {
			reply.null();
			return;
		};
		let Some(target) = inputs.file.target_at(position) else {
			reply.null();
			return;
		};
		let locations = collect_reference_locations(&this, &inputs, target.symbol_id, true);
		let mut changes: HashMap<Uri, Vec<TextEdit>> = HashMap::new();
		for location in locations {
			let edits = changes.entry(location.uri).or_default();
			let edit = TextEdit {
				range: location.range,
				new_text: new_name.clone(),
			};
			if !edits.contains(&edit) {
				edits.push(edit);
			}
		}
		for edits in changes.values_mut() {
			edits.sort_by_key(|e| (e.range.start.line, e.range.start.character));
		}
		reply.ok(WorkspaceEdit {
			changes: Some(changes),
			..WorkspaceEdit::default()
		});
	});
}

fn is_valid_identifier(name: &str) -> bool {
	let mut chars = name.chars();
	match chars.next() {
		Some(c) if c.is_alphabetic() || c == '_' => {}
		_ => return false,
	}
	chars.all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn identifier_validation() {
		assert!(is_valid_identifier("K2"));
		assert!(is_valid_identifier("_private"));
		assert!(!is_valid_identifier("2K"));
		assert!(!is_valid_identifier("has space"));
		assert!(!is_valid_identifier("a-b"));
		assert!(!is_valid_identifier(""));
	}
}
