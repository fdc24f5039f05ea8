//! Signature help, on its own pool.

use std::sync::Arc;

use cjls_frontend::{NodeKind, Position};
use lsp_types::{
	ParameterInformation, ParameterLabel, SignatureHelp, SignatureHelpParams,
	SignatureInformation,
};

use crate::convert::{to_frontend, uri_path};
use crate::reply::Reply;
use crate::server::{LanguageServer, PoolKind};

pub fn signature_help(server: &Arc<LanguageServer>, params: SignatureHelpParams, reply: Reply) {
	let Some(path) = uri_path(&params.text_document_position_params.text_document.uri) else {
		reply.null();
		return;
	};
	let position = to_frontend(params.text_document_position_params.position);
	server.run_with_ast_cache(
		PoolKind::SignatureHelp,
		"SignatureHelp",
		&path,
		position,
		move |inputs| {
			let Some(inputs) = inputs else {
				reply.null();
				return;
			};
			let file = &inputs.file;
			// The innermost call whose parens contain the cursor.
			let Some(node) = file.node_at(position) else {
				reply.null();
				return;
			};
			let mut call = None;
			let mut current = Some(node);
			while let Some(id) = current {
				if let NodeKind::CallExpr { .. } = &file.ast.node(id).kind {
					call = Some(id);
					break;
				}
				current = file.ast.parent(id);
			}
			let Some(call) = call else {
				reply.null();
				return;
			};
			let Some(target) = file.target_of(call) else {
				reply.null();
				return;
			};
			if !target.kind.is_callable() {
				reply.null();
				return;
			}
			let active_parameter = comma_count_before(file, call, position);
			let parameters = parameter_labels(&target.signature);
			reply.ok(SignatureHelp {
				signatures: vec![SignatureInformation {
					label: target.signature.clone(),
					documentation: None,
					parameters: Some(parameters),
					active_parameter: Some(active_parameter),
				}],
				active_signature: Some(0),
				active_parameter: Some(active_parameter),
			});
		},
	);
}

/// Active parameter = commas between the call's `(` and the cursor.
fn comma_count_before(file: &cjls_frontend::FileAst, call: cjls_frontend::NodeId, pos: Position) -> u32 {
	let span = file.ast.node(call).span;
	file.tokens
		.iter()
		.filter(|t| {
			t.kind == cjls_frontend::TokenKind::Comma && t.begin >= span.begin && t.begin < pos
		})
		.count() as u32
}

/// Parameter label substrings of a rendered signature
/// (`func f(a: Int64, b: String): Unit`).
fn parameter_labels(signature: &str) -> Vec<ParameterInformation> {
	let Some(open) = signature.find('(') else {
		return Vec::new();
	};
	let Some(close) = signature.rfind(')') else {
		return Vec::new();
	};
	if close <= open + 1 {
		return Vec::new();
	}
	signature[open + 1..close]
		.split(',')
		.map(|param| ParameterInformation {
			label: ParameterLabel::Simple(param.trim().to_string()),
			documentation: None,
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parameter_labels_split_the_signature() {
		let labels = parameter_labels("func f(a: Int64, b: String): Unit");
		assert_eq!(labels.len(), 2);
		assert!(matches!(&labels[0].label, ParameterLabel::Simple(s) if s == "a: Int64"));
	}

	#[test]
	fn empty_parameter_list_yields_no_labels() {
		assert!(parameter_labels("func f(): Unit").is_empty());
	}
}
