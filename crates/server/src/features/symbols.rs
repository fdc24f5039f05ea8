//! Document and workspace symbols.

use std::sync::Arc;

use cjls_frontend::{Ast, DeclKind, NodeId, NodeKind};
use lsp_types::{
	DocumentSymbol, DocumentSymbolParams, SymbolInformation, SymbolKind, WorkspaceSymbolParams,
};

use crate::convert::{location, to_lsp_range, uri_path};
use crate::reply::Reply;
use crate::server::LanguageServer;

pub fn document_symbol(server: &Arc<LanguageServer>, params: DocumentSymbolParams, reply: Reply) {
	let Some(path) = uri_path(&params.text_document.uri) else {
		reply.null();
		return;
	};
	server.run_with_ast("DocumentSymbol", &path, move |inputs| {
		let Some(inputs) = inputs else {
			reply.null();
			return;
		};
		let ast = &inputs.file.ast;
		let NodeKind::File { decls, .. } = &ast.node(ast.root).kind else {
			reply.null();
			return;
		};
		let symbols: Vec<DocumentSymbol> = decls
			.iter()
			.filter_map(|&decl| document_symbol_of(ast, decl))
			.collect();
		reply.ok(symbols);
	});
}

#[allow(deprecated)] // `DocumentSymbol::deprecated` must still be populated.
fn document_symbol_of(ast: &Ast, id: NodeId) -> Option<DocumentSymbol> {
	let node = ast.node(id);
	let data = match &node.kind {
		NodeKind::Decl(data) => data,
		NodeKind::MacroExpand { target: Some(target), .. } => {
			return document_symbol_of(ast, *target);
		}
		_ => return None,
	};
	if data.name.is_empty() {
		return None;
	}
	let children: Vec<DocumentSymbol> = data
		.members
		.iter()
		.filter_map(|&member| document_symbol_of(ast, member))
		.collect();
	Some(DocumentSymbol {
		name: data.name.clone(),
		detail: None,
		kind: symbol_kind(data.kind),
		tags: None,
		deprecated: None,
		range: to_lsp_range(node.span),
		selection_range: to_lsp_range(data.name_span),
		children: (!children.is_empty()).then_some(children),
	})
}

pub fn workspace_symbol(
	server: &Arc<LanguageServer>,
	params: WorkspaceSymbolParams,
	reply: Reply,
) {
	let Some(index) = server.index() else {
		reply.null();
		return;
	};
	let query = params.query;
	match index.matching_symbols(&query, None, 100) {
		Ok(symbols) => {
			#[allow(deprecated)] // `SymbolInformation::deprecated` is wire-required.
			let infos: Vec<SymbolInformation> = symbols
				.into_iter()
				.map(|sym| SymbolInformation {
					name: sym.name.clone(),
					kind: symbol_kind(cjls_index::kind_from_i32(sym.kind)),
					tags: None,
					deprecated: None,
					location: location(&sym.declaration.file, sym.declaration.span),
					container_name: Some(sym.scope.clone()),
				})
				.collect();
			reply.ok(infos);
		}
		Err(e) => {
			tracing::warn!(error = %e, "workspace symbol query failed");
			reply.null();
		}
	}
}

pub(crate) fn symbol_kind(kind: DeclKind) -> SymbolKind {
	match kind {
		DeclKind::Func | DeclKind::Main | DeclKind::Macro => SymbolKind::FUNCTION,
		DeclKind::Init => SymbolKind::CONSTRUCTOR,
		DeclKind::Class | DeclKind::Extend => SymbolKind::CLASS,
		DeclKind::Interface => SymbolKind::INTERFACE,
		DeclKind::Struct => SymbolKind::STRUCT,
		DeclKind::Enum => SymbolKind::ENUM,
		DeclKind::EnumCtor => SymbolKind::ENUM_MEMBER,
		DeclKind::Prop => SymbolKind::PROPERTY,
		DeclKind::Var | DeclKind::Let | DeclKind::Param => SymbolKind::VARIABLE,
		DeclKind::TypeAlias => SymbolKind::TYPE_PARAMETER,
	}
}
