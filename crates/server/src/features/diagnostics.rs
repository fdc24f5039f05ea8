//! Diagnostics publication and quick-fix derivation.
//!
//! Quick-fixes are computed once per publish, keyed by file in the server's
//! fix-its map, and served unchanged by `textDocument/codeAction` until the
//! next recompile replaces them.

use std::collections::HashMap;
use std::sync::Arc;

use cjls_frontend::{DiagCode, FileAst, NodeKind, Severity};
use cjls_project::PkgSnapshot;
use cjls_protocol::{ExtendDiagnostic, ExtendPublishDiagnosticsParams};
use lsp_types::{
	CodeAction, CodeActionKind, Diagnostic, DiagnosticSeverity, NumberOrString,
	PublishDiagnosticsParams, TextEdit, Uri, WorkspaceEdit,
};
use serde_json::json;

use crate::convert::{file_uri, to_lsp_range};
use crate::server::LanguageServer;

/// One published diagnostic with its derived quick-fixes.
#[derive(Debug, Clone)]
pub struct FixIt {
	pub diagnostic: Diagnostic,
	pub actions: Vec<CodeAction>,
}

/// Re-materializes and publishes diagnostics for every file of a snapshot.
pub fn publish_for_snapshot(server: &Arc<LanguageServer>, snapshot: &PkgSnapshot) {
	for file in &snapshot.files {
		publish_file(server, file);
	}
}

fn publish_file(server: &Arc<LanguageServer>, file: &Arc<FileAst>) {
	let mut fix_its = Vec::new();
	for diag in &file.diagnostics {
		let diagnostic = to_lsp_diagnostic(diag);
		let actions = quick_fixes_for(server, file, diag, &diagnostic);
		fix_its.push(FixIt {
			diagnostic,
			actions,
		});
	}
	append_batch_actions(&file.path, &mut fix_its);
	emit(server, &file.path, fix_its);
}

/// Publishes a broken compile attempt's diagnostics. There is no usable
/// snapshot to derive quick-fixes from, so none are attached.
pub fn publish_raw(
	server: &Arc<LanguageServer>,
	path: &str,
	diagnostics: &[cjls_frontend::Diagnostic],
) {
	let fix_its = diagnostics
		.iter()
		.map(|diag| FixIt {
			diagnostic: to_lsp_diagnostic(diag),
			actions: Vec::new(),
		})
		.collect();
	emit(server, path, fix_its);
}

fn emit(server: &Arc<LanguageServer>, path: &str, fix_its: Vec<FixIt>) {
	let client = server.client.lock().clone();
	let version = client
		.diagnostic_version_support
		.then(|| server.docs.version_of(path) as i32)
		.filter(|v| *v >= 0);
	let uri = file_uri(path);
	{
		let mut map = server.fix_its.lock();
		map.insert(path.to_string(), fix_its.clone());
	}
	if client.extend_publish_diagnostics {
		let params = ExtendPublishDiagnosticsParams {
			uri,
			diagnostics: fix_its
				.into_iter()
				.map(|f| ExtendDiagnostic {
					diagnostic: f.diagnostic,
					code_actions: f.actions,
				})
				.collect(),
			version,
		};
		server.outgoing.notify(
			"textDocument/extendPublishDiagnostics",
			serde_json::to_value(params).unwrap_or_default(),
		);
	} else {
		let params = PublishDiagnosticsParams {
			uri,
			diagnostics: fix_its.into_iter().map(|f| f.diagnostic).collect(),
			version,
		};
		server.outgoing.notify(
			"textDocument/publishDiagnostics",
			serde_json::to_value(params).unwrap_or_default(),
		);
	}
}

/// Clears the client's diagnostics for a removed file.
pub fn publish_empty(server: &Arc<LanguageServer>, path: &str) {
	let params = PublishDiagnosticsParams {
		uri: file_uri(path),
		diagnostics: Vec::new(),
		version: None,
	};
	server.outgoing.notify(
		"textDocument/publishDiagnostics",
		serde_json::to_value(params).unwrap_or_default(),
	);
}

fn to_lsp_diagnostic(diag: &cjls_frontend::Diagnostic) -> Diagnostic {
	Diagnostic {
		range: to_lsp_range(diag.span),
		severity: Some(match diag.severity {
			Severity::Error => DiagnosticSeverity::ERROR,
			Severity::Warning => DiagnosticSeverity::WARNING,
			Severity::Hint => DiagnosticSeverity::HINT,
		}),
		code: Some(NumberOrString::String(diag.code.as_str().to_string())),
		source: Some("Cangjie".to_string()),
		message: diag.message.clone(),
		..Diagnostic::default()
	}
}

fn quick_fixes_for(
	server: &Arc<LanguageServer>,
	file: &Arc<FileAst>,
	diag: &cjls_frontend::Diagnostic,
	lsp_diag: &Diagnostic,
) -> Vec<CodeAction> {
	match diag.code {
		DiagCode::UndeclaredIdentifier => add_import_actions(server, file, diag, lsp_diag),
		DiagCode::UnusedImport => remove_import_actions(file, diag, lsp_diag),
		_ => Vec::new(),
	}
}

/// `undeclared identifier 'X'`: offer one addImport per indexed package
/// exporting a public `X`.
fn add_import_actions(
	server: &Arc<LanguageServer>,
	file: &Arc<FileAst>,
	diag: &cjls_frontend::Diagnostic,
	lsp_diag: &Diagnostic,
) -> Vec<CodeAction> {
	let Some(identifier) = quoted_identifier(&diag.message) else {
		return Vec::new();
	};
	let Some(index) = server.index() else {
		return Vec::new();
	};
	let candidates = match index.symbols_by_name(&identifier) {
		Ok(candidates) => candidates,
		Err(e) => {
			tracing::warn!(error = %e, "import candidate lookup failed");
			return Vec::new();
		}
	};
	let insert_at = import_insert_position(file);
	let mut actions = Vec::new();
	for symbol in candidates {
		let pkg = symbol.package().to_string();
		if pkg.is_empty() || pkg == file.package {
			continue;
		}
		// Member symbols (`pkg:Type.`) are not importable.
		if !symbol.scope.ends_with(':') {
			continue;
		}
		let is_public = symbol.modifier & cjls_frontend::Modifiers::PUBLIC != 0;
		if !is_public && !cjls_index::kind_from_i32(symbol.kind).is_type() {
			continue;
		}
		let new_text = format!("import {pkg}.{identifier}\n");
		let mut changes = HashMap::new();
		changes.insert(
			file_uri(&file.path),
			vec![TextEdit {
				range: lsp_types::Range {
					start: insert_at,
					end: insert_at,
				},
				new_text,
			}],
		);
		actions.push(CodeAction {
			title: format!("import {pkg}.{identifier}"),
			kind: Some(CodeActionKind::QUICKFIX),
			diagnostics: Some(vec![lsp_diag.clone()]),
			edit: Some(WorkspaceEdit {
				changes: Some(changes),
				..WorkspaceEdit::default()
			}),
			data: Some(json!({"fix": "addImport", "identifier": identifier})),
			..CodeAction::default()
		});
	}
	actions
}

/// `unused import 'p.X'`: delete the import line.
fn remove_import_actions(
	file: &Arc<FileAst>,
	diag: &cjls_frontend::Diagnostic,
	lsp_diag: &Diagnostic,
) -> Vec<CodeAction> {
	let start = lsp_types::Position {
		line: diag.span.begin.line.saturating_sub(1),
		character: 0,
	};
	let end = lsp_types::Position {
		line: diag.span.begin.line,
		character: 0,
	};
	let mut changes = HashMap::new();
	changes.insert(
		file_uri(&file.path),
		vec![TextEdit {
			range: lsp_types::Range { start, end },
			new_text: String::new(),
		}],
	);
	vec![CodeAction {
		title: quoted_identifier(&diag.message)
			.map(|name| format!("remove unused import '{name}'"))
			.unwrap_or_else(|| "remove unused import".to_string()),
		kind: Some(CodeActionKind::QUICKFIX),
		diagnostics: Some(vec![lsp_diag.clone()]),
		edit: Some(WorkspaceEdit {
			changes: Some(changes),
			..WorkspaceEdit::default()
		}),
		data: Some(json!({"fix": "removeImport"})),
		..CodeAction::default()
	}]
}

/// Adds the batch "import all" / "remove all unused" actions when at least
/// two individual fixes of the kind exist.
fn append_batch_actions(path: &str, fix_its: &mut [FixIt]) {
	let mut add_edits: Vec<TextEdit> = Vec::new();
	let mut remove_edits: Vec<TextEdit> = Vec::new();
	for fix in fix_its.iter() {
		for action in &fix.actions {
			let fix_kind = action
				.data
				.as_ref()
				.and_then(|d| d.get("fix"))
				.and_then(|f| f.as_str());
			let Some(edit) = action
				.edit
				.as_ref()
				.and_then(|e| e.changes.as_ref())
				.and_then(|c| c.values().next())
				.and_then(|edits| edits.first())
			else {
				continue;
			};
			match fix_kind {
				// Only the first candidate of each missing identifier joins
				// the batch.
				Some("addImport") => {
					if !add_edits.iter().any(|e| e.new_text == edit.new_text) {
						add_edits.push(edit.clone());
					}
				}
				Some("removeImport") => remove_edits.push(edit.clone()),
				_ => {}
			}
			// One representative action per diagnostic.
			break;
		}
	}
	let uri = file_uri(path);
	if add_edits.len() >= 2 {
		let batch = batch_action("import all missing imports", &uri, add_edits);
		if let Some(first) = fix_its
			.iter_mut()
			.find(|f| f.actions.iter().any(|a| is_fix(a, "addImport")))
		{
			first.actions.push(batch);
		}
	}
	if remove_edits.len() >= 2 {
		let batch = batch_action("remove all unused imports", &uri, remove_edits);
		if let Some(first) = fix_its
			.iter_mut()
			.find(|f| f.actions.iter().any(|a| is_fix(a, "removeImport")))
		{
			first.actions.push(batch);
		}
	}
}

fn is_fix(action: &CodeAction, kind: &str) -> bool {
	action
		.data
		.as_ref()
		.and_then(|d| d.get("fix"))
		.and_then(|f| f.as_str())
		== Some(kind)
}

fn batch_action(title: &str, uri: &Uri, edits: Vec<TextEdit>) -> CodeAction {
	let mut changes = HashMap::new();
	changes.insert(uri.clone(), edits);
	CodeAction {
		title: title.to_string(),
		kind: Some(CodeActionKind::QUICKFIX),
		edit: Some(WorkspaceEdit {
			changes: Some(changes),
			..WorkspaceEdit::default()
		}),
		data: Some(json!({"fix": "batch"})),
		..CodeAction::default()
	}
}

/// The identifier quoted in a diagnostic message (`... 'Map' ...`).
pub fn quoted_identifier(message: &str) -> Option<String> {
	let start = message.find('\'')?;
	let rest = &message[start + 1..];
	let end = rest.find('\'')?;
	let quoted = &rest[..end];
	// `unused import 'p.X'` quotes a dotted path; the identifier is the
	// last segment.
	Some(quoted.rsplit('.').next().unwrap_or(quoted).to_string())
}

/// Where a new import line goes: after the last import, else after the
/// package spec, else at the top.
fn import_insert_position(file: &Arc<FileAst>) -> lsp_types::Position {
	let NodeKind::File { imports, .. } = &file.ast.node(file.ast.root).kind else {
		return lsp_types::Position {
			line: 0,
			character: 0,
		};
	};
	if let Some(&last) = imports.last() {
		// Frontend lines are 1-based; the line after import line N is wire
		// line N.
		return lsp_types::Position {
			line: file.ast.node(last).span.end.line,
			character: 0,
		};
	}
	// After the package spec when present.
	let mut line = 0;
	file.ast.walk(file.ast.root, &mut |id| {
		if let NodeKind::PackageSpec { .. } = &file.ast.node(id).kind {
			line = file.ast.node(id).span.end.line;
		}
	});
	lsp_types::Position { line, character: 0 }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn quoted_identifier_takes_last_segment() {
		assert_eq!(
			quoted_identifier("undeclared identifier 'Map'").as_deref(),
			Some("Map")
		);
		assert_eq!(
			quoted_identifier("unused import 'std.collection.Map'").as_deref(),
			Some("Map")
		);
		assert_eq!(quoted_identifier("no quotes here"), None);
	}
}
