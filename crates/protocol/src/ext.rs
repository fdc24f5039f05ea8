//! Non-standard extension payloads layered on top of LSP.

use lsp_types::{Location, Position, Range, TextDocumentIdentifier, Uri, WorkspaceEdit};
use serde::{Deserialize, Serialize};

/// `textDocument/trackCompletion` — completion acceptance telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackCompletionParams {
	pub text_document: TextDocumentIdentifier,
	pub label: String,
	#[serde(default)]
	pub is_accepted: bool,
}

/// `textDocument/crossLanguageDefinition` and `textDocument/crossLanguageRegister`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossLanguageJumpParams {
	/// Package the foreign symbol was registered under.
	pub package_name: String,
	/// Registered (exported) name of the symbol.
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub container_name: Option<String>,
}

/// `textDocument/exportsName` — names a package exports to the interop layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportsNameParams {
	pub text_document: TextDocumentIdentifier,
}

/// `textDocument/findFileReferences`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReferencesParams {
	pub text_document: TextDocumentIdentifier,
}

/// `textDocument/fileRefactor` — move/rename a source file, rewriting imports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRefactorParams {
	pub old_uri: Uri,
	pub new_uri: Uri,
}

/// Result of `textDocument/fileRefactor`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRefactorResult {
	pub edit: WorkspaceEdit,
}

/// `textDocument/breakpoints` — executable-line positions for the debugger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointsParams {
	pub text_document: TextDocumentIdentifier,
}

/// One verified breakpoint location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointLocation {
	pub range: Range,
}

/// `textDocument/publishCompletionTip` (notify) — nudges the client when a
/// better import candidate exists for the identifier just completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionTip {
	pub uri: Uri,
	pub label: String,
	pub message: String,
}

/// `codeGenerator/overrideMethods`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideMethodsParams {
	pub text_document: TextDocumentIdentifier,
	pub position: Position,
}

/// One inheritable member that can be overridden at the request position.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideMethodItem {
	pub name: String,
	pub signature: String,
	pub from: String,
	pub insert_text: String,
}

/// `textDocument/checkHealthy` — liveness probe from embedding hosts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckHealthyResult {
	pub healthy: bool,
}

/// Diagnostic payload for `textDocument/extendPublishDiagnostics`: the
/// standard publish plus per-diagnostic quick-fix actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendDiagnostic {
	#[serde(flatten)]
	pub diagnostic: lsp_types::Diagnostic,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub code_actions: Vec<lsp_types::CodeAction>,
}

/// `textDocument/extendPublishDiagnostics` (notify).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendPublishDiagnosticsParams {
	pub uri: Uri,
	pub diagnostics: Vec<ExtendDiagnostic>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub version: Option<i32>,
}

/// Cross-language jump target row surfaced to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossLanguageLocation {
	pub location: Location,
	pub name: String,
	pub container_name: String,
}
