//! Cross-language interop: registration, lookup, exported names, and the
//! health probe.

use std::sync::Arc;

use cjls_frontend::Span;
use cjls_index::{CrossSymbol, SymLocation};
use cjls_protocol::{
	CheckHealthyResult, CrossLanguageJumpParams, CrossLanguageLocation, ExportsNameParams,
};
use serde_json::Value;

use crate::convert::{location, uri_path};
use crate::reply::Reply;
use crate::server::LanguageServer;

/// `textDocument/crossLanguageRegister`: records a foreign-name binding.
/// When two packages register the same name, the first registration wins.
pub fn register(server: &Arc<LanguageServer>, params: CrossLanguageJumpParams, reply: Reply) {
	let key = (params.package_name.clone(), params.name.clone());
	let mut registry = server.cross_registry.lock();
	if let Some(existing) = registry.get(&key) {
		tracing::warn!(
			pkg = %params.package_name,
			name = %params.name,
			kept = %existing.pkg,
			"duplicate cross-language registration dropped"
		);
		reply.ok(false);
		return;
	}
	registry.insert(
		key,
		CrossSymbol {
			pkg: params.package_name,
			id: 0,
			name: params.name,
			container: 0,
			container_name: params.container_name.unwrap_or_default(),
			cross_type: 0,
			location: SymLocation::default(),
			declaration: Span::default(),
		},
	);
	reply.ok(true);
}

/// `textDocument/crossLanguageDefinition`: jump target of a registered
/// foreign name.
pub fn definition(server: &Arc<LanguageServer>, params: CrossLanguageJumpParams, reply: Reply) {
	let Some(index) = server.index() else {
		reply.null();
		return;
	};
	match index.cross_symbols(&params.package_name, &params.name) {
		Ok(symbols) => {
			let locations: Vec<CrossLanguageLocation> = symbols
				.into_iter()
				.filter(|c| !c.location.is_empty())
				.map(|c| CrossLanguageLocation {
					location: location(&c.location.file, c.location.span),
					name: c.name,
					container_name: c.container_name,
				})
				.collect();
			if locations.is_empty() {
				reply.null();
			} else {
				reply.ok(locations);
			}
		}
		Err(e) => {
			tracing::warn!(error = %e, "cross symbol lookup failed");
			reply.null();
		}
	}
}

/// `textDocument/exportsName`: every name the file's package publishes to
/// the interop layer.
pub fn exports_name(server: &Arc<LanguageServer>, params: ExportsNameParams, reply: Reply) {
	let Some(path) = uri_path(&params.text_document.uri) else {
		reply.null();
		return;
	};
	let this = server.clone();
	server.run_with_ast("GetExportsName", &path, move |inputs| {
		let Some(inputs) = inputs else {
			reply.null();
			return;
		};
		let mut names: Vec<String> = Vec::new();
		if let Some(index) = this.index() {
			match index.cross_symbols_of_pkg(&inputs.file.package) {
				Ok(symbols) => names.extend(symbols.into_iter().map(|c| c.name)),
				Err(e) => tracing::warn!(error = %e, "exportsName query failed"),
			}
		}
		names.extend(
			inputs
				.snapshot
				.exports
				.decls
				.iter()
				.map(|d| d.name.clone()),
		);
		names.sort();
		names.dedup();
		reply.ok(names);
	});
}

/// `textDocument/checkHealthy`: liveness probe from embedding hosts.
pub fn check_healthy(server: &Arc<LanguageServer>, _params: Option<Value>, reply: Reply) {
	reply.ok(CheckHealthyResult {
		healthy: !server.shutdown.requested(),
	});
}
