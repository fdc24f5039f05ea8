//! Executable-line positions for the debugger extension.

use std::sync::Arc;

use cjls_frontend::NodeKind;
use cjls_protocol::{BreakpointLocation, BreakpointsParams};

use crate::convert::{to_lsp_range, uri_path};
use crate::reply::Reply;
use crate::server::LanguageServer;

pub fn breakpoints(server: &Arc<LanguageServer>, params: BreakpointsParams, reply: Reply) {
	let Some(path) = uri_path(&params.text_document.uri) else {
		reply.null();
		return;
	};
	server.run_with_ast("FindBreakpoints", &path, move |inputs| {
		let Some(inputs) = inputs else {
			reply.null();
			return;
		};
		let file = &inputs.file;
		let mut locations: Vec<BreakpointLocation> = Vec::new();
		file.ast.walk(file.ast.root, &mut |id| {
			// Every direct statement of a block is a stop point.
			let NodeKind::Block { stmts } = &file.ast.node(id).kind else {
				return;
			};
			for &stmt in stmts {
				locations.push(BreakpointLocation {
					range: to_lsp_range(file.ast.node(stmt).span),
				});
			}
		});
		locations.sort_by_key(|l| (l.range.start.line, l.range.start.character));
		locations.dedup_by_key(|l| l.range.start.line);
		reply.ok(locations);
	});
}
