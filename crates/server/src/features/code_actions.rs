//! Code actions: published quick-fixes plus tweaks over the selection.
//!
//! Tweaks follow an enumerate/execute split: `codeAction` lists applicable
//! tweaks as commands, `workspace/executeCommand` runs the chosen one and
//! round-trips the edit through `workspace/applyEdit`.

use std::collections::HashMap;
use std::sync::Arc;

use cjls_frontend::{FileAst, NodeKind, Span};
use lsp_types::{
	CodeAction, CodeActionKind, CodeActionOrCommand, CodeActionParams, Command,
	ExecuteCommandParams, TextEdit, WorkspaceEdit,
};
use serde_json::{Value, json};

use crate::convert::{file_uri, to_frontend_span, to_lsp_range, uri_path};
use crate::reply::Reply;
use crate::server::LanguageServer;

pub const APPLY_TWEAK_COMMAND: &str = "cjls.applyTweak";

/// A small, self-contained source transformation.
trait Tweak: Send + Sync {
	fn id(&self) -> &'static str;
	fn title(&self) -> String;
	fn is_applicable(&self, file: &FileAst, selection: Span) -> bool;
	fn execute(&self, file: &FileAst, selection: Span) -> Option<WorkspaceEdit>;
}

fn tweaks() -> &'static [&'static dyn Tweak] {
	&[&OrganizeImports]
}

/// Sorts the import block alphabetically.
struct OrganizeImports;

impl Tweak for OrganizeImports {
	fn id(&self) -> &'static str {
		"organizeImports"
	}

	fn title(&self) -> String {
		"Organize imports".to_string()
	}

	fn is_applicable(&self, file: &FileAst, _selection: Span) -> bool {
		let NodeKind::File { imports, .. } = &file.ast.node(file.ast.root).kind else {
			return false;
		};
		imports.len() > 1
	}

	fn execute(&self, file: &FileAst, _selection: Span) -> Option<WorkspaceEdit> {
		let NodeKind::File { imports, .. } = &file.ast.node(file.ast.root).kind else {
			return None;
		};
		let mut lines: Vec<(Span, String)> = imports
			.iter()
			.filter_map(|&import| match &file.ast.node(import).kind {
				NodeKind::Import { path, alias, .. } => {
					let mut text = format!("import {}", path.join("."));
					if let Some(alias) = alias {
						text.push_str(&format!(" as {alias}"));
					}
					Some((file.ast.node(import).span, text))
				}
				_ => None,
			})
			.collect();
		if lines.len() < 2 {
			return None;
		}
		let spans: Vec<Span> = lines.iter().map(|(span, _)| *span).collect();
		lines.sort_by(|a, b| a.1.cmp(&b.1));
		let edits: Vec<TextEdit> = spans
			.iter()
			.zip(lines.iter())
			.map(|(span, (_, text))| TextEdit {
				range: to_lsp_range(*span),
				new_text: text.clone(),
			})
			.collect();
		let mut changes = HashMap::new();
		changes.insert(file_uri(&file.path), edits);
		Some(WorkspaceEdit {
			changes: Some(changes),
			..WorkspaceEdit::default()
		})
	}
}

pub fn code_action(server: &Arc<LanguageServer>, params: CodeActionParams, reply: Reply) {
	let Some(path) = uri_path(&params.text_document.uri) else {
		reply.null();
		return;
	};
	let range = params.range;
	let selection = to_frontend_span(range);
	let this = server.clone();
	server.run_with_ast("EnumerateTweaks", &path.clone(), move |inputs| {
		let mut actions: Vec<CodeActionOrCommand> = Vec::new();
		// Quick-fixes computed at publish time, filtered to the requested
		// range.
		{
			let fix_its = this.fix_its.lock();
			if let Some(fixes) = fix_its.get(&path) {
				for fix in fixes {
					if ranges_overlap(&fix.diagnostic.range, &range) {
						actions.extend(
							fix.actions
								.iter()
								.cloned()
								.map(CodeActionOrCommand::CodeAction),
						);
					}
				}
			}
		}
		if let Some(inputs) = inputs {
			for tweak in tweaks() {
				if tweak.is_applicable(&inputs.file, selection) {
					actions.push(CodeActionOrCommand::CodeAction(CodeAction {
						title: tweak.title(),
						kind: Some(CodeActionKind::REFACTOR),
						command: Some(Command {
							title: tweak.title(),
							command: APPLY_TWEAK_COMMAND.to_string(),
							arguments: Some(vec![json!({
								"file": path,
								"tweakId": tweak.id(),
								"selection": {
									"start": {"line": range.start.line, "character": range.start.character},
									"end": {"line": range.end.line, "character": range.end.character},
								},
							})]),
						}),
						..CodeAction::default()
					}));
				}
			}
		}
		reply.ok(actions);
	});
}

pub fn execute_command(server: &Arc<LanguageServer>, params: ExecuteCommandParams, reply: Reply) {
	if params.command != APPLY_TWEAK_COMMAND {
		reply.error(cjls_protocol::ResponseError::new(
			cjls_protocol::ErrorCode::InvalidParams,
			format!("unknown command '{}'", params.command),
		));
		return;
	}
	let Some(args) = params.arguments.first() else {
		reply.error(cjls_protocol::ResponseError::new(
			cjls_protocol::ErrorCode::InvalidParams,
			"applyTweak needs arguments",
		));
		return;
	};
	let Some(file) = args.get("file").and_then(Value::as_str).map(str::to_string) else {
		reply.error(cjls_protocol::ResponseError::new(
			cjls_protocol::ErrorCode::InvalidParams,
			"applyTweak needs a file",
		));
		return;
	};
	let tweak_id = args
		.get("tweakId")
		.and_then(Value::as_str)
		.unwrap_or_default()
		.to_string();
	let selection: lsp_types::Range = args
		.get("selection")
		.and_then(|s| serde_json::from_value(s.clone()).ok())
		.unwrap_or_default();
	let this = server.clone();
	server.run_with_ast("ApplyTweak", &file.clone(), move |inputs| {
		let Some(inputs) = inputs else {
			reply.null();
			return;
		};
		let Some(tweak) = tweaks().iter().find(|t| t.id() == tweak_id) else {
			reply.null();
			return;
		};
		let Some(edit) = tweak.execute(&inputs.file, to_frontend_span(selection)) else {
			reply.null();
			return;
		};
		// Round-trip: the edit goes to the client as an applyEdit request.
		this.outgoing.call(
			"workspace/applyEdit",
			json!({"edit": serde_json::to_value(&edit).unwrap_or_default()}),
			|response| {
				if let Some(error) = response.error {
					tracing::warn!(error = %error, "client rejected applyEdit");
				}
			},
		);
		reply.null();
	});
}

fn ranges_overlap(a: &lsp_types::Range, b: &lsp_types::Range) -> bool {
	!(a.end.line < b.start.line
		|| (a.end.line == b.start.line && a.end.character < b.start.character)
		|| b.end.line < a.start.line
		|| (b.end.line == a.start.line && b.end.character < a.start.character))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn range(sl: u32, sc: u32, el: u32, ec: u32) -> lsp_types::Range {
		lsp_types::Range {
			start: lsp_types::Position {
				line: sl,
				character: sc,
			},
			end: lsp_types::Position {
				line: el,
				character: ec,
			},
		}
	}

	#[test]
	fn overlap_is_inclusive_of_shared_edges() {
		assert!(ranges_overlap(&range(0, 0, 0, 5), &range(0, 5, 0, 9)));
		assert!(ranges_overlap(&range(1, 0, 3, 0), &range(2, 0, 2, 4)));
		assert!(!ranges_overlap(&range(0, 0, 0, 4), &range(1, 0, 1, 2)));
	}
}
