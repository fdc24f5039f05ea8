//! Type and call hierarchy over relation rows, with AST confirmation for the
//! prepare step.

use std::sync::Arc;

use cjls_index::{RefKind, RelationKind, Symbol};
use lsp_types::{
	CallHierarchyIncomingCall, CallHierarchyIncomingCallsParams, CallHierarchyItem,
	CallHierarchyOutgoingCall, CallHierarchyOutgoingCallsParams, CallHierarchyPrepareParams,
	Range, SymbolKind, TextDocumentPositionParams, TypeHierarchyItem, TypeHierarchyPrepareParams,
	TypeHierarchySubtypesParams, TypeHierarchySupertypesParams,
};
use serde_json::json;

use crate::convert::{file_uri, to_frontend, to_lsp_range, uri_path};
use crate::features::symbols::symbol_kind;
use crate::reply::Reply;
use crate::server::LanguageServer;

fn symbol_id_of_item(data: &Option<serde_json::Value>) -> Option<cjls_frontend::SymbolId> {
	data.as_ref()?
		.get("symbolId")?
		.as_str()?
		.parse::<u64>()
		.ok()
}

fn type_item_of(symbol: &Symbol) -> TypeHierarchyItem {
	TypeHierarchyItem {
		name: symbol.name.clone(),
		kind: symbol_kind(cjls_index::kind_from_i32(symbol.kind)),
		tags: None,
		detail: Some(symbol.signature.clone()),
		uri: file_uri(&symbol.declaration.file),
		range: to_lsp_range(symbol.definition.span),
		selection_range: to_lsp_range(symbol.declaration.span),
		data: Some(json!({"symbolId": symbol.id.to_string()})),
	}
}

fn call_item_of(symbol: &Symbol) -> CallHierarchyItem {
	CallHierarchyItem {
		name: symbol.name.clone(),
		kind: symbol_kind(cjls_index::kind_from_i32(symbol.kind)),
		tags: None,
		detail: Some(symbol.signature.clone()),
		uri: file_uri(&symbol.declaration.file),
		range: to_lsp_range(symbol.definition.span),
		selection_range: to_lsp_range(symbol.declaration.span),
		data: Some(json!({"symbolId": symbol.id.to_string()})),
	}
}

pub fn prepare_type_hierarchy(
	server: &Arc<LanguageServer>,
	params: TypeHierarchyPrepareParams,
	reply: Reply,
) {
	prepare(server, params.text_document_position_params, reply, true);
}

pub fn prepare_call_hierarchy(
	server: &Arc<LanguageServer>,
	params: CallHierarchyPrepareParams,
	reply: Reply,
) {
	prepare(server, params.text_document_position_params, reply, false);
}

fn prepare(
	server: &Arc<LanguageServer>,
	position_params: TextDocumentPositionParams,
	reply: Reply,
	types: bool,
) {
	let Some(path) = uri_path(&position_params.text_document.uri) else {
		reply.null();
		return;
	};
	let position = to_frontend(position_params.position);
	let task = if types { "TypeHierarchy" } else { "CallHierarchy" };
	server.run_with_ast(task, &path, move |inputs| {
		let Some(inputs) = inputs else {
			reply.null();
			return;
		};
		let Some(target) = inputs.file.target_at(position) else {
			reply.null();
			return;
		};
		let applicable = if types {
			target.kind.is_type()
		} else {
			target.kind.is_callable()
		};
		if !applicable {
			reply.null();
			return;
		}
		let item = json!([{
			"name": target.name,
			"kind": wire_symbol_kind(symbol_kind(target.kind)),
			"detail": target.signature,
			"uri": cjls_protocol::path_to_uri(&target.file),
			"range": to_lsp_range(target.full_span),
			"selectionRange": to_lsp_range(target.name_span),
			"data": {"symbolId": target.symbol_id.to_string()},
		}]);
		reply.ok(item);
	});
}

/// SymbolKind serializes as its wire number.
fn wire_symbol_kind(kind: SymbolKind) -> serde_json::Value {
	serde_json::to_value(kind).unwrap_or(json!(12))
}

pub fn supertypes(
	server: &Arc<LanguageServer>,
	params: TypeHierarchySupertypesParams,
	reply: Reply,
) {
	let Some(id) = symbol_id_of_item(&params.item.data) else {
		reply.null();
		return;
	};
	let Some(index) = server.index() else {
		reply.null();
		return;
	};
	// Stored as BaseOf(super, this) / Implements(interface, this).
	let mut items = Vec::new();
	for kind in [RelationKind::BaseOf, RelationKind::Implements] {
		match index.relations_to(id, kind) {
			Ok(relations) => {
				for relation in relations {
					if let Ok(Some(symbol)) = index.symbol_by_id(relation.subject) {
						items.push(type_item_of(&symbol));
					}
				}
			}
			Err(e) => tracing::warn!(error = %e, "supertype query failed"),
		}
	}
	items.sort_by(|a, b| a.name.cmp(&b.name));
	reply.ok(items);
}

pub fn subtypes(server: &Arc<LanguageServer>, params: TypeHierarchySubtypesParams, reply: Reply) {
	let Some(id) = symbol_id_of_item(&params.item.data) else {
		reply.null();
		return;
	};
	let Some(index) = server.index() else {
		reply.null();
		return;
	};
	let mut items = Vec::new();
	for kind in [RelationKind::BaseOf, RelationKind::Implements] {
		match index.relations_of(id, kind) {
			Ok(relations) => {
				for relation in relations {
					// Only edges where this symbol is the base.
					if relation.subject != id {
						continue;
					}
					if let Ok(Some(symbol)) = index.symbol_by_id(relation.object) {
						items.push(type_item_of(&symbol));
					}
				}
			}
			Err(e) => tracing::warn!(error = %e, "subtype query failed"),
		}
	}
	items.sort_by(|a, b| a.name.cmp(&b.name));
	reply.ok(items);
}

pub fn incoming_calls(
	server: &Arc<LanguageServer>,
	params: CallHierarchyIncomingCallsParams,
	reply: Reply,
) {
	let Some(id) = symbol_id_of_item(&params.item.data) else {
		reply.null();
		return;
	};
	let Some(index) = server.index() else {
		reply.null();
		return;
	};
	// Call sites of this symbol, grouped by their enclosing caller.
	let refs = index
		.references_of(id, RefKind::Call as i32)
		.unwrap_or_default();
	let mut calls = Vec::new();
	match index.relations_to(id, RelationKind::Calls) {
		Ok(relations) => {
			for relation in relations {
				let Ok(Some(caller)) = index.symbol_by_id(relation.subject) else {
					continue;
				};
				let mut from_ranges: Vec<Range> = refs
					.iter()
					.filter(|r| r.container == caller.id)
					.map(|r| to_lsp_range(r.location.span))
					.collect();
				from_ranges.sort_by_key(|r| (r.start.line, r.start.character));
				calls.push(CallHierarchyIncomingCall {
					from: call_item_of(&caller),
					from_ranges,
				});
			}
		}
		Err(e) => tracing::warn!(error = %e, "incoming call query failed"),
	}
	calls.sort_by(|a, b| a.from.name.cmp(&b.from.name));
	reply.ok(calls);
}

pub fn outgoing_calls(
	server: &Arc<LanguageServer>,
	params: CallHierarchyOutgoingCallsParams,
	reply: Reply,
) {
	let Some(id) = symbol_id_of_item(&params.item.data) else {
		reply.null();
		return;
	};
	let Some(index) = server.index() else {
		reply.null();
		return;
	};
	// Symbols referred from inside this one.
	let referred = index.referred_in(id).unwrap_or_default();
	let mut calls = Vec::new();
	match index.relations_of(id, RelationKind::Calls) {
		Ok(relations) => {
			for relation in relations {
				if relation.subject != id {
					continue;
				}
				let Ok(Some(callee)) = index.symbol_by_id(relation.object) else {
					continue;
				};
				let mut from_ranges: Vec<Range> = referred
					.iter()
					.filter(|(sym, reference)| {
						*sym == callee.id && reference.kind == RefKind::Call
					})
					.map(|(_, reference)| to_lsp_range(reference.location.span))
					.collect();
				from_ranges.sort_by_key(|r| (r.start.line, r.start.character));
				calls.push(CallHierarchyOutgoingCall {
					to: call_item_of(&callee),
					from_ranges,
				});
			}
		}
		Err(e) => tracing::warn!(error = %e, "outgoing call query failed"),
	}
	calls.sort_by(|a, b| a.to.name.cmp(&b.to.name));
	reply.ok(calls);
}
