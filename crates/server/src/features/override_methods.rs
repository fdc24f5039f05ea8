//! Override-methods code generator: inheritable members not yet overridden
//! at the requested type.

use std::sync::Arc;

use cjls_frontend::{DeclKind, Modifiers};
use cjls_index::RelationKind;
use cjls_protocol::{OverrideMethodItem, OverrideMethodsParams};

use crate::convert::{to_frontend, uri_path};
use crate::reply::Reply;
use crate::server::LanguageServer;

pub fn override_methods(
	server: &Arc<LanguageServer>,
	params: OverrideMethodsParams,
	reply: Reply,
) {
	let Some(path) = uri_path(&params.text_document.uri) else {
		reply.null();
		return;
	};
	let position = to_frontend(params.position);
	let this = server.clone();
	server.run_with_ast("OverrideMethods", &path, move |inputs| {
		let Some(inputs) = inputs else {
			reply.null();
			return;
		};
		let Some(target) = inputs.file.target_at(position) else {
			reply.null();
			return;
		};
		if !target.kind.is_type() {
			reply.null();
			return;
		}
		let Some(index) = this.index() else {
			reply.null();
			return;
		};
		// Existing member names at the requested type.
		let own: Vec<String> = inputs
			.snapshot
			.exports
			.members
			.get(&target.name)
			.map(|members| members.iter().map(|m| m.name.clone()).collect())
			.unwrap_or_default();

		let mut items = Vec::new();
		for kind in [RelationKind::BaseOf, RelationKind::Implements] {
			let Ok(relations) = index.relations_to(target.symbol_id, kind) else {
				continue;
			};
			for relation in relations {
				let Ok(Some(base)) = index.symbol_by_id(relation.subject) else {
					continue;
				};
				let scope = format!("{}:{}.", base.package(), base.name);
				let Ok(members) = index.symbols_in_scope(&scope) else {
					continue;
				};
				for member in members {
					let member_kind = cjls_index::kind_from_i32(member.kind);
					if !member_kind.is_callable() && member_kind != DeclKind::Prop {
						continue;
					}
					if member_kind == DeclKind::Init {
						continue;
					}
					let overridable = member.modifier & Modifiers::OPEN != 0
						|| member.modifier & Modifiers::ABSTRACT != 0
						|| kind == RelationKind::Implements;
					if !overridable || own.contains(&member.name) {
						continue;
					}
					let bare = member
						.signature
						.strip_prefix("func ")
						.unwrap_or(&member.signature);
					items.push(OverrideMethodItem {
						name: member.name.clone(),
						from: base.name.clone(),
						insert_text: format!("public override func {bare} {{\n}}"),
						signature: member.signature.clone(),
					});
				}
			}
		}
		items.sort_by(|a, b| a.name.cmp(&b.name));
		items.dedup_by(|a, b| a.name == b.name);
		reply.ok(items);
	});
}
