//! Semantic tokens: full documents, LSP delta-encoded 5-tuples.

use std::sync::Arc;

use cjls_frontend::{DeclKind, FileAst, Modifiers, TokenKind};
use lsp_types::{SemanticToken, SemanticTokens, SemanticTokensParams};

use crate::convert::uri_path;
use crate::reply::Reply;
use crate::server::LanguageServer;

// Indexes into the advertised legend.
const TYPE: u32 = 1;
const CLASS: u32 = 2;
const ENUM: u32 = 3;
const INTERFACE: u32 = 4;
const STRUCT: u32 = 5;
const PARAMETER: u32 = 7;
const VARIABLE: u32 = 8;
const PROPERTY: u32 = 9;
const ENUM_MEMBER: u32 = 10;
const FUNCTION: u32 = 11;
const METHOD: u32 = 12;
const MACRO: u32 = 13;
const KEYWORD: u32 = 14;
const COMMENT: u32 = 15;
const STRING: u32 = 16;
const NUMBER: u32 = 17;
const OPERATOR: u32 = 18;

const MOD_DECLARATION: u32 = 1 << 0;
const MOD_STATIC: u32 = 1 << 1;

pub fn full(server: &Arc<LanguageServer>, params: SemanticTokensParams, reply: Reply) {
	let Some(path) = uri_path(&params.text_document.uri) else {
		reply.null();
		return;
	};
	server.run_with_ast("SemanticTokens", &path, move |inputs| {
		let Some(inputs) = inputs else {
			reply.null();
			return;
		};
		let data = encode(&inputs.file);
		reply.ok(SemanticTokens {
			result_id: None,
			data,
		});
	});
}

/// Classifies every token and emits the relative-encoded array.
fn encode(file: &FileAst) -> Vec<SemanticToken> {
	let mut out = Vec::new();
	let mut prev_line = 0u32;
	let mut prev_start = 0u32;
	for token in &file.tokens {
		let Some((token_type, modifiers)) = classify(file, token) else {
			continue;
		};
		// Multi-line tokens (block comments, multi-line strings) highlight
		// their first line only; the delta encoding cannot span lines.
		let line = token.begin.line.saturating_sub(1);
		let start = token.begin.column.saturating_sub(1);
		let length = if token.end.line == token.begin.line {
			token.end.column.saturating_sub(token.begin.column)
		} else {
			token.text.lines().next().unwrap_or("").chars().count() as u32
		};
		let delta_line = line - prev_line;
		let delta_start = if delta_line == 0 { start - prev_start } else { start };
		out.push(SemanticToken {
			delta_line,
			delta_start,
			length,
			token_type,
			token_modifiers_bitset: modifiers,
		});
		prev_line = line;
		prev_start = start;
	}
	out
}

fn classify(file: &FileAst, token: &cjls_frontend::Token) -> Option<(u32, u32)> {
	use TokenKind::*;
	let kind = token.kind;
	if kind == Comment || kind == DocComment {
		return Some((COMMENT, 0));
	}
	if matches!(kind, StringLiteral | MultilineString | CharLiteral) {
		return Some((STRING, 0));
	}
	if matches!(kind, IntLiteral | FloatLiteral) {
		return Some((NUMBER, 0));
	}
	if kind.is_overloadable_operator() {
		return Some((OPERATOR, 0));
	}
	if kind.is_modifier() || matches!(
		kind,
		Package | Import | Func | Main | Init | Class | Interface | Struct | Enum | Extend | Var
			| Let | Prop | Macro | Type | This | Super | If | Else | While | Do | For | In
			| Match | Case | Return | Break | Continue | Throw | Try | Catch | Finally | Spawn
			| As | Is | Where | BoolLiteral | Operator
	) {
		return Some((KEYWORD, 0));
	}
	if !matches!(kind, Identifier | DollarIdentifier) {
		return None;
	}
	// Identifier: consult the semantic table.
	let node = file.node_at(token.begin)?;
	let target = file.target_of(node)?;
	let is_declaration = file
		.sema
		.decls
		.get(&node)
		.is_some_and(|d| d.symbol_id == target.symbol_id)
		|| file.ast.node(node).span == target.full_span && target.file == file.path;
	let token_type = match target.kind {
		DeclKind::Class => CLASS,
		DeclKind::Interface => INTERFACE,
		DeclKind::Struct => STRUCT,
		DeclKind::Enum => ENUM,
		DeclKind::EnumCtor => ENUM_MEMBER,
		DeclKind::Func | DeclKind::Main | DeclKind::Init => {
			if target.container != 0 { METHOD } else { FUNCTION }
		}
		DeclKind::Macro => MACRO,
		DeclKind::Prop => PROPERTY,
		DeclKind::Param => PARAMETER,
		DeclKind::Var | DeclKind::Let => VARIABLE,
		DeclKind::Extend | DeclKind::TypeAlias => TYPE,
	};
	let mut modifiers = 0u32;
	if is_declaration {
		modifiers |= MOD_DECLARATION;
	}
	if target.modifiers & Modifiers::STATIC != 0 {
		modifiers |= MOD_STATIC;
	}
	Some((token_type, modifiers))
}

#[cfg(test)]
mod tests {
	use cjls_frontend::{ExternalSymbols, FileInput, analyze, lex, parse};

	use super::*;

	fn file_ast(src: &str) -> FileAst {
		let (tokens, _) = lex(src);
		let (ast, _) = parse(&tokens);
		let mut semas = analyze(
			"p",
			&[FileInput {
				path: "/p/a.cj",
				ast: &ast,
			}],
			&ExternalSymbols::default(),
		);
		let sema = semas.remove(0);
		FileAst {
			path: "/p/a.cj".into(),
			package: "p".into(),
			tokens,
			ast,
			sema: sema.table,
			diagnostics: Vec::new(),
		}
	}

	#[test]
	fn deltas_are_relative_to_the_previous_token() {
		let file = file_ast("package p\nfunc f() {}\n");
		let data = encode(&file);
		assert!(!data.is_empty());
		// First token starts at (0, 0): `package`.
		assert_eq!(data[0].delta_line, 0);
		assert_eq!(data[0].delta_start, 0);
		assert_eq!(data[0].token_type, KEYWORD);
		// `func` begins line 1, so its delta_line is 1 and delta_start is
		// absolute.
		let func = data
			.iter()
			.find(|t| t.delta_line == 1)
			.expect("token on second line");
		assert_eq!(func.delta_start, 0);
	}

	#[test]
	fn function_declarations_carry_the_declaration_modifier() {
		let file = file_ast("package p\nfunc f() { f() }\n");
		let data = encode(&file);
		let functions: Vec<&SemanticToken> = data
			.iter()
			.filter(|t| t.token_type == FUNCTION)
			.collect();
		assert_eq!(functions.len(), 2);
		assert_eq!(functions[0].token_modifiers_bitset & MOD_DECLARATION, MOD_DECLARATION);
		assert_eq!(functions[1].token_modifiers_bitset & MOD_DECLARATION, 0);
	}
}
