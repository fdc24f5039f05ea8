//! Capability advertisement for the initialize handshake.

use lsp_types::{
	CallHierarchyServerCapability, CodeActionProviderCapability, CodeLensOptions,
	CompletionOptions, DocumentLinkOptions, HoverProviderCapability, OneOf, RenameOptions,
	SemanticTokenModifier, SemanticTokenType, SemanticTokensFullOptions, SemanticTokensLegend,
	SemanticTokensOptions, SemanticTokensServerCapabilities, ServerCapabilities,
	SignatureHelpOptions, TextDocumentSyncCapability, TextDocumentSyncKind,
	TypeHierarchyServerCapability, WorkDoneProgressOptions,
};

use crate::server::ClientState;

/// Token types in legend order; the encoder indexes into this list.
pub fn semantic_token_types() -> Vec<SemanticTokenType> {
	vec![
		SemanticTokenType::NAMESPACE,
		SemanticTokenType::TYPE,
		SemanticTokenType::CLASS,
		SemanticTokenType::ENUM,
		SemanticTokenType::INTERFACE,
		SemanticTokenType::STRUCT,
		SemanticTokenType::TYPE_PARAMETER,
		SemanticTokenType::PARAMETER,
		SemanticTokenType::VARIABLE,
		SemanticTokenType::PROPERTY,
		SemanticTokenType::ENUM_MEMBER,
		SemanticTokenType::FUNCTION,
		SemanticTokenType::METHOD,
		SemanticTokenType::MACRO,
		SemanticTokenType::KEYWORD,
		SemanticTokenType::COMMENT,
		SemanticTokenType::STRING,
		SemanticTokenType::NUMBER,
		SemanticTokenType::OPERATOR,
	]
}

pub fn semantic_token_modifiers() -> Vec<SemanticTokenModifier> {
	vec![
		SemanticTokenModifier::DECLARATION,
		SemanticTokenModifier::STATIC,
		SemanticTokenModifier::DEPRECATED,
		SemanticTokenModifier::READONLY,
	]
}

pub fn server_capabilities(client: &ClientState) -> ServerCapabilities {
	ServerCapabilities {
		text_document_sync: Some(TextDocumentSyncCapability::Kind(
			TextDocumentSyncKind::INCREMENTAL,
		)),
		document_highlight_provider: Some(OneOf::Left(true)),
		references_provider: Some(OneOf::Left(true)),
		definition_provider: Some(OneOf::Left(true)),
		hover_provider: Some(HoverProviderCapability::Simple(true)),
		workspace_symbol_provider: Some(OneOf::Left(true)),
		document_symbol_provider: Some(OneOf::Left(true)),
		rename_provider: Some(OneOf::Right(RenameOptions {
			prepare_provider: Some(true),
			work_done_progress_options: WorkDoneProgressOptions::default(),
		})),
		type_hierarchy_provider: Some(TypeHierarchyServerCapability::Simple(true)),
		call_hierarchy_provider: Some(CallHierarchyServerCapability::Simple(true)),
		completion_provider: Some(CompletionOptions {
			trigger_characters: Some(vec![".".to_string(), "`".to_string()]),
			..CompletionOptions::default()
		}),
		signature_help_provider: Some(SignatureHelpOptions {
			trigger_characters: Some(vec!["(".to_string(), ",".to_string()]),
			..SignatureHelpOptions::default()
		}),
		semantic_tokens_provider: Some(SemanticTokensServerCapabilities::SemanticTokensOptions(
			SemanticTokensOptions {
				legend: SemanticTokensLegend {
					token_types: semantic_token_types(),
					token_modifiers: semantic_token_modifiers(),
				},
				// Range mode is off on purpose; full with delta only.
				range: Some(false),
				full: Some(SemanticTokensFullOptions::Delta { delta: Some(true) }),
				work_done_progress_options: WorkDoneProgressOptions::default(),
			},
		)),
		document_link_provider: Some(DocumentLinkOptions {
			resolve_provider: Some(false),
			work_done_progress_options: WorkDoneProgressOptions::default(),
		}),
		code_action_provider: Some(CodeActionProviderCapability::Simple(true)),
		// Richer embedding hosts draw their own lenses.
		code_lens_provider: (!client.embedded_host).then_some(CodeLensOptions {
			resolve_provider: Some(false),
		}),
		execute_command_provider: Some(lsp_types::ExecuteCommandOptions {
			commands: vec!["cjls.applyTweak".to_string()],
			work_done_progress_options: WorkDoneProgressOptions::default(),
		}),
		experimental: Some(serde_json::json!({
			"breakpointsProvider": true,
			"crossLanguageDefinitionProvider": true,
			"exportsNameProvider": true,
			"fileRefactorProvider": true,
			"overrideMethodsProvider": true,
		})),
		..ServerCapabilities::default()
	}
}
