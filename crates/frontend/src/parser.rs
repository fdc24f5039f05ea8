//! Recursive-descent parser building the arena AST.
//!
//! Recovery is per-declaration: a syntax error records a diagnostic, emits an
//! `Error` node and resynchronizes at the next declaration keyword, so one
//! bad function never hides the rest of the file from the index.

use crate::ast::{Ast, DeclData, DeclKind, LitKind, Modifiers, NodeId, NodeKind};
use crate::token::{Token, TokenKind};
use crate::{DiagCode, Diagnostic, Position, Span};

/// Parses one file's token array (comments are skipped internally).
pub fn parse(tokens: &[Token]) -> (Ast, Vec<Diagnostic>) {
	let filtered: Vec<&Token> = tokens
		.iter()
		.filter(|t| !matches!(t.kind, TokenKind::Comment | TokenKind::DocComment))
		.collect();
	let mut parser = Parser {
		tokens: filtered,
		pos: 0,
		ast: Ast::new(),
		diags: Vec::new(),
	};
	parser.file();
	(parser.ast, parser.diags)
}

struct Parser<'a> {
	tokens: Vec<&'a Token>,
	pos: usize,
	ast: Ast,
	diags: Vec<Diagnostic>,
}

impl<'a> Parser<'a> {
	fn peek(&self) -> Option<&'a Token> {
		self.tokens.get(self.pos).copied()
	}

	fn peek_kind(&self) -> Option<TokenKind> {
		self.peek().map(|t| t.kind)
	}

	fn nth_kind(&self, n: usize) -> Option<TokenKind> {
		self.tokens.get(self.pos + n).map(|t| t.kind)
	}

	fn bump(&mut self) -> Option<&'a Token> {
		let t = self.tokens.get(self.pos).copied();
		if t.is_some() {
			self.pos += 1;
		}
		t
	}

	fn at(&self, kind: TokenKind) -> bool {
		self.peek_kind() == Some(kind)
	}

	fn eat(&mut self, kind: TokenKind) -> Option<&'a Token> {
		if self.at(kind) { self.bump() } else { None }
	}

	fn expect(&mut self, kind: TokenKind) -> Option<&'a Token> {
		if let Some(t) = self.eat(kind) {
			return Some(t);
		}
		let here = self.here();
		self.error(here, format!("expected {kind:?}"));
		None
	}

	fn here(&self) -> Position {
		self.peek()
			.map(|t| t.begin)
			.or_else(|| self.tokens.last().map(|t| t.end))
			.unwrap_or(Position::new(1, 1))
	}

	fn prev_end(&self) -> Position {
		self.tokens
			.get(self.pos.wrapping_sub(1))
			.map(|t| t.end)
			.unwrap_or_else(|| self.here())
	}

	fn error(&mut self, at: Position, message: String) {
		self.diags.push(Diagnostic::error(
			Span::new(at, Position::new(at.line, at.column + 1)),
			DiagCode::Parse,
			message,
		));
	}

	fn link(&mut self, parent: NodeId, children: &[NodeId]) {
		for &child in children {
			self.ast.set_parent(child, parent);
		}
	}

	// ---- file structure ----

	fn file(&mut self) {
		let begin = self.here();
		let mut package = None;
		let mut imports = Vec::new();
		let mut decls = Vec::new();

		if self.at(TokenKind::Package) {
			let pkg_begin = self.bump().unwrap().begin;
			let name = self.dotted_name();
			let end = self.prev_end();
			let id = self.ast.alloc(
				NodeKind::PackageSpec { name: name.join(".") },
				pkg_begin,
				end,
			);
			package = Some((id, name.join(".")));
		}

		while self.at(TokenKind::Import) {
			imports.push(self.import());
		}

		while self.peek().is_some() {
			match self.declaration() {
				Some(decl) => decls.push(decl),
				None => {
					// Resynchronize: skip one token and try again.
					let here = self.here();
					self.error(here, "expected declaration".into());
					self.bump();
				}
			}
		}

		let end = self.prev_end();
		let root = self.ast.alloc(
			NodeKind::File {
				package: package.as_ref().map(|(_, name)| name.clone()),
				imports: imports.clone(),
				decls: decls.clone(),
			},
			begin,
			end,
		);
		if let Some((id, _)) = package {
			self.ast.set_parent(id, root);
		}
		self.link(root, &imports);
		self.link(root, &decls);
		self.ast.root = root;
	}

	fn dotted_name(&mut self) -> Vec<String> {
		let mut parts = Vec::new();
		loop {
			match self.peek_kind() {
				Some(TokenKind::Identifier) => parts.push(self.bump().unwrap().text.clone()),
				Some(TokenKind::Mul) => {
					parts.push("*".into());
					self.bump();
				}
				_ => break,
			}
			if self.eat(TokenKind::Dot).is_none() {
				break;
			}
		}
		parts
	}

	fn import(&mut self) -> NodeId {
		let begin = self.bump().unwrap().begin; // `import`
		let mut path = Vec::new();
		let mut item_span = Span::default();
		loop {
			match self.peek_kind() {
				Some(TokenKind::Identifier) | Some(TokenKind::Mul) => {
					let t = self.bump().unwrap();
					item_span = t.span();
					path.push(if t.kind == TokenKind::Mul {
						"*".into()
					} else {
						t.text.clone()
					});
				}
				_ => break,
			}
			if self.eat(TokenKind::Dot).is_none() {
				break;
			}
		}
		let alias = if self.eat(TokenKind::As).is_some() {
			self.eat(TokenKind::Identifier).map(|t| t.text.clone())
		} else {
			None
		};
		let end = self.prev_end();
		self.ast.alloc(NodeKind::Import { path, alias, item_span }, begin, end)
	}

	fn modifiers(&mut self) -> Modifiers {
		let mut mods = Modifiers::default();
		while let Some(kind) = self.peek_kind() {
			let bit = match kind {
				TokenKind::Public => Modifiers::PUBLIC,
				TokenKind::Private => Modifiers::PRIVATE,
				TokenKind::Protected => Modifiers::PROTECTED,
				TokenKind::Internal => Modifiers::INTERNAL,
				TokenKind::Static => Modifiers::STATIC,
				TokenKind::Open => Modifiers::OPEN,
				TokenKind::Override => Modifiers::OVERRIDE,
				TokenKind::Abstract => Modifiers::ABSTRACT,
				TokenKind::Sealed => Modifiers::SEALED,
				TokenKind::Redef => Modifiers::REDEF,
				TokenKind::Foreign => Modifiers::FOREIGN,
				TokenKind::Unsafe => Modifiers::UNSAFE,
				TokenKind::Mut => Modifiers::MUT,
				TokenKind::Operator => Modifiers::OPERATOR,
				_ => break,
			};
			mods.insert(bit);
			self.bump();
		}
		mods
	}

	fn declaration(&mut self) -> Option<NodeId> {
		let begin = self.here();
		let mods = self.modifiers();
		let kind = self.peek_kind()?;
		let decl = match kind {
			TokenKind::Func | TokenKind::Main | TokenKind::Init => {
				self.func_decl(begin, mods)
			}
			TokenKind::Class | TokenKind::Interface | TokenKind::Struct | TokenKind::Enum => {
				self.type_decl(begin, mods)
			}
			TokenKind::Extend => self.extend_decl(begin, mods),
			TokenKind::Var | TokenKind::Let | TokenKind::Const => self.var_decl(begin, mods),
			TokenKind::Prop => self.prop_decl(begin, mods),
			TokenKind::Macro => self.macro_decl(begin, mods),
			TokenKind::At => Some(self.macro_expand()),
			_ => return None,
		};
		decl
	}

	fn decl_name(&mut self) -> (String, Span) {
		if let Some(t) = self.eat(TokenKind::Identifier) {
			return (t.text.clone(), t.span());
		}
		if let Some(t) = self.eat(TokenKind::Backtick) {
			// Raw identifier: `name`
			let name = self
				.eat(TokenKind::Identifier)
				.map(|t| (t.text.clone(), t.span()))
				.unwrap_or_else(|| (String::new(), t.span()));
			self.eat(TokenKind::Backtick);
			return name;
		}
		// Operator functions use the operator token as the name.
		if self.peek_kind().is_some_and(|k| k.is_overloadable_operator()) {
			let t = self.bump().unwrap();
			let mut name = t.text.clone();
			let mut span = t.span();
			// `[]` is two tokens.
			if t.kind == TokenKind::LSquare && self.at(TokenKind::RSquare) {
				let close = self.bump().unwrap();
				name.push(']');
				span = Span::new(span.begin, close.end);
			}
			return (name, span);
		}
		let here = self.here();
		self.error(here, "expected a name".into());
		(String::new(), Span::new(here, here))
	}

	fn func_decl(&mut self, begin: Position, mods: Modifiers) -> Option<NodeId> {
		let kw = self.bump().unwrap();
		let kind = match kw.kind {
			TokenKind::Main => DeclKind::Main,
			TokenKind::Init => DeclKind::Init,
			_ => DeclKind::Func,
		};
		let (name, name_span) = match kind {
			DeclKind::Main => ("main".to_string(), kw.span()),
			DeclKind::Init => ("init".to_string(), kw.span()),
			_ => self.decl_name(),
		};
		self.generic_params();
		let params = self.param_list();
		let ret = if self.eat(TokenKind::Colon).is_some() {
			self.type_ref()
		} else {
			None
		};
		let body = if self.at(TokenKind::LBrace) {
			Some(self.block())
		} else {
			None
		};
		let end = self.prev_end();
		let id = self.ast.alloc(
			NodeKind::Decl(DeclData {
				kind,
				name,
				name_span,
				modifiers: mods,
				super_types: Vec::new(),
				params: params.clone(),
				ty_annotation: ret,
				init: None,
				body,
				members: Vec::new(),
			}),
			begin,
			end,
		);
		self.link(id, &params);
		if let Some(ret) = ret {
			self.ast.set_parent(ret, id);
		}
		if let Some(body) = body {
			self.ast.set_parent(body, id);
		}
		Some(id)
	}

	fn generic_params(&mut self) {
		// Generic parameter lists are recognized and skipped; the server does
		// not specialize generics.
		if !self.at(TokenKind::Lt) {
			return;
		}
		let mut depth = 0usize;
		while let Some(kind) = self.peek_kind() {
			match kind {
				TokenKind::Lt => depth += 1,
				TokenKind::Gt => {
					depth -= 1;
					if depth == 0 {
						self.bump();
						return;
					}
				}
				TokenKind::LBrace | TokenKind::LParen | TokenKind::Assign => return,
				_ => {}
			}
			self.bump();
		}
	}

	fn param_list(&mut self) -> Vec<NodeId> {
		let mut params = Vec::new();
		if self.expect(TokenKind::LParen).is_none() {
			return params;
		}
		while !self.at(TokenKind::RParen) && self.peek().is_some() {
			let begin = self.here();
			// Named params may carry a `!` suffix after the name.
			let (name, name_span) = self.decl_name();
			self.eat(TokenKind::Not);
			let ty = if self.eat(TokenKind::Colon).is_some() {
				self.type_ref()
			} else {
				None
			};
			let init = if self.eat(TokenKind::Assign).is_some() {
				self.expression()
			} else {
				None
			};
			let end = self.prev_end();
			let id = self.ast.alloc(
				NodeKind::Decl(DeclData {
					kind: DeclKind::Param,
					name,
					name_span,
					modifiers: Modifiers::default(),
					super_types: Vec::new(),
					params: Vec::new(),
					ty_annotation: ty,
					init,
					body: None,
					members: Vec::new(),
				}),
				begin,
				end,
			);
			if let Some(ty) = ty {
				self.ast.set_parent(ty, id);
			}
			if let Some(init) = init {
				self.ast.set_parent(init, id);
			}
			params.push(id);
			if self.eat(TokenKind::Comma).is_none() {
				break;
			}
		}
		self.expect(TokenKind::RParen);
		params
	}

	fn super_type_list(&mut self) -> Vec<NodeId> {
		// `<:` lexes as Lt Colon.
		let mut supers = Vec::new();
		if self.at(TokenKind::Lt) && self.nth_kind(1) == Some(TokenKind::Colon) {
			self.bump();
			self.bump();
			loop {
				if let Some(ty) = self.type_ref() {
					supers.push(ty);
				} else {
					break;
				}
				if self.eat(TokenKind::BitAnd).is_none() && self.eat(TokenKind::Comma).is_none() {
					break;
				}
			}
		}
		supers
	}

	fn type_decl(&mut self, begin: Position, mods: Modifiers) -> Option<NodeId> {
		let kw = self.bump().unwrap();
		let kind = match kw.kind {
			TokenKind::Class => DeclKind::Class,
			TokenKind::Interface => DeclKind::Interface,
			TokenKind::Struct => DeclKind::Struct,
			_ => DeclKind::Enum,
		};
		let (name, name_span) = self.decl_name();
		self.generic_params();
		let supers = self.super_type_list();
		let mut members = Vec::new();
		if self.expect(TokenKind::LBrace).is_some() {
			if kind == DeclKind::Enum {
				members.extend(self.enum_ctors());
			}
			while !self.at(TokenKind::RBrace) && self.peek().is_some() {
				match self.declaration() {
					Some(member) => members.push(member),
					None => {
						let here = self.here();
						self.error(here, "expected member declaration".into());
						self.bump();
					}
				}
			}
			self.expect(TokenKind::RBrace);
		}
		let end = self.prev_end();
		let id = self.ast.alloc(
			NodeKind::Decl(DeclData {
				kind,
				name,
				name_span,
				modifiers: mods,
				super_types: supers.clone(),
				params: Vec::new(),
				ty_annotation: None,
				init: None,
				body: None,
				members: members.clone(),
			}),
			begin,
			end,
		);
		self.link(id, &supers);
		self.link(id, &members);
		Some(id)
	}

	fn enum_ctors(&mut self) -> Vec<NodeId> {
		// `A | B(Int64) | C` — constructors come first in the body.
		let mut ctors = Vec::new();
		while self.at(TokenKind::Identifier) {
			let t = self.bump().unwrap();
			let begin = t.begin;
			let name = t.text.clone();
			let name_span = t.span();
			let mut params = Vec::new();
			if self.at(TokenKind::LParen) {
				self.bump();
				while !self.at(TokenKind::RParen) && self.peek().is_some() {
					if self.type_ref().is_none() {
						self.bump();
					}
					if self.eat(TokenKind::Comma).is_none() {
						break;
					}
				}
				self.expect(TokenKind::RParen);
			}
			let end = self.prev_end();
			let id = self.ast.alloc(
				NodeKind::Decl(DeclData {
					kind: DeclKind::EnumCtor,
					name,
					name_span,
					modifiers: Modifiers::default(),
					super_types: Vec::new(),
					params: std::mem::take(&mut params),
					ty_annotation: None,
					init: None,
					body: None,
					members: Vec::new(),
				}),
				begin,
				end,
			);
			ctors.push(id);
			if self.eat(TokenKind::BitOr).is_none() {
				break;
			}
		}
		ctors
	}

	fn extend_decl(&mut self, begin: Position, mods: Modifiers) -> Option<NodeId> {
		self.bump(); // `extend`
		self.generic_params();
		let target = self.type_ref();
		let (name, name_span) = match target {
			Some(ty) => match &self.ast.node(ty).kind {
				NodeKind::RefType { name, .. } => (name.clone(), self.ast.node(ty).span),
				_ => (String::new(), self.ast.node(ty).span),
			},
			None => (String::new(), Span::new(begin, begin)),
		};
		let supers = self.super_type_list();
		let mut members = Vec::new();
		if self.expect(TokenKind::LBrace).is_some() {
			while !self.at(TokenKind::RBrace) && self.peek().is_some() {
				match self.declaration() {
					Some(member) => members.push(member),
					None => {
						let here = self.here();
						self.error(here, "expected member declaration".into());
						self.bump();
					}
				}
			}
			self.expect(TokenKind::RBrace);
		}
		let end = self.prev_end();
		let id = self.ast.alloc(
			NodeKind::Decl(DeclData {
				kind: DeclKind::Extend,
				name,
				name_span,
				modifiers: mods,
				super_types: supers.clone(),
				params: Vec::new(),
				ty_annotation: target,
				init: None,
				body: None,
				members: members.clone(),
			}),
			begin,
			end,
		);
		if let Some(target) = target {
			self.ast.set_parent(target, id);
		}
		self.link(id, &supers);
		self.link(id, &members);
		Some(id)
	}

	fn var_decl(&mut self, begin: Position, mods: Modifiers) -> Option<NodeId> {
		let kw = self.bump().unwrap();
		let kind = if kw.kind == TokenKind::Var { DeclKind::Var } else { DeclKind::Let };
		let (name, name_span) = self.decl_name();
		let ty = if self.eat(TokenKind::Colon).is_some() {
			self.type_ref()
		} else {
			None
		};
		let init = if self.eat(TokenKind::Assign).is_some() {
			self.expression()
		} else {
			None
		};
		let end = self.prev_end();
		let id = self.ast.alloc(
			NodeKind::Decl(DeclData {
				kind,
				name,
				name_span,
				modifiers: mods,
				super_types: Vec::new(),
				params: Vec::new(),
				ty_annotation: ty,
				init,
				body: None,
				members: Vec::new(),
			}),
			begin,
			end,
		);
		if let Some(ty) = ty {
			self.ast.set_parent(ty, id);
		}
		if let Some(init) = init {
			self.ast.set_parent(init, id);
		}
		Some(id)
	}

	fn prop_decl(&mut self, begin: Position, mods: Modifiers) -> Option<NodeId> {
		self.bump(); // `prop`
		let (name, name_span) = self.decl_name();
		let ty = if self.eat(TokenKind::Colon).is_some() {
			self.type_ref()
		} else {
			None
		};
		let body = if self.at(TokenKind::LBrace) {
			Some(self.block())
		} else {
			None
		};
		let end = self.prev_end();
		let id = self.ast.alloc(
			NodeKind::Decl(DeclData {
				kind: DeclKind::Prop,
				name,
				name_span,
				modifiers: mods,
				super_types: Vec::new(),
				params: Vec::new(),
				ty_annotation: ty,
				init: None,
				body,
				members: Vec::new(),
			}),
			begin,
			end,
		);
		if let Some(ty) = ty {
			self.ast.set_parent(ty, id);
		}
		if let Some(body) = body {
			self.ast.set_parent(body, id);
		}
		Some(id)
	}

	fn macro_decl(&mut self, begin: Position, mods: Modifiers) -> Option<NodeId> {
		self.bump(); // `macro`
		let (name, name_span) = self.decl_name();
		let params = if self.at(TokenKind::LParen) {
			self.param_list()
		} else {
			Vec::new()
		};
		let body = if self.at(TokenKind::LBrace) {
			Some(self.block())
		} else {
			None
		};
		let end = self.prev_end();
		let id = self.ast.alloc(
			NodeKind::Decl(DeclData {
				kind: DeclKind::Macro,
				name,
				name_span,
				modifiers: mods,
				super_types: Vec::new(),
				params: params.clone(),
				ty_annotation: None,
				init: None,
				body,
				members: Vec::new(),
			}),
			begin,
			end,
		);
		self.link(id, &params);
		if let Some(body) = body {
			self.ast.set_parent(body, id);
		}
		Some(id)
	}

	fn macro_expand(&mut self) -> NodeId {
		let begin = self.bump().unwrap().begin; // `@`
		let (name, name_span) = self.decl_name();
		// The macro argument is the next declaration (annotation style) or a
		// parenthesized token stream.
		let target = if self.at(TokenKind::LParen) {
			self.bump();
			let mut depth = 1usize;
			while let Some(kind) = self.peek_kind() {
				match kind {
					TokenKind::LParen => depth += 1,
					TokenKind::RParen => {
						depth -= 1;
						if depth == 0 {
							self.bump();
							break;
						}
					}
					_ => {}
				}
				self.bump();
			}
			None
		} else {
			self.declaration()
		};
		let end = self.prev_end();
		let id = self.ast.alloc(
			NodeKind::MacroExpand {
				name,
				name_span,
				target,
			},
			begin,
			end,
		);
		if let Some(target) = target {
			self.ast.set_parent(target, id);
		}
		id
	}

	// ---- types ----

	fn type_ref(&mut self) -> Option<NodeId> {
		let begin = self.here();
		// Function types and parenthesized types.
		if self.at(TokenKind::LParen) {
			self.bump();
			let mut depth = 1usize;
			while let Some(kind) = self.peek_kind() {
				match kind {
					TokenKind::LParen => depth += 1,
					TokenKind::RParen => {
						depth -= 1;
						if depth == 0 {
							self.bump();
							break;
						}
					}
					_ => {}
				}
				self.bump();
			}
			if self.eat(TokenKind::Arrow).is_some() {
				self.type_ref();
			}
			let end = self.prev_end();
			return Some(self.ast.alloc(
				NodeKind::RefType {
					name: String::new(),
					args: Vec::new(),
				},
				begin,
				end,
			));
		}

		let first = self.eat(TokenKind::Identifier)?;
		let mut prefix = Vec::new();
		let mut name = first.text.clone();
		let mut name_span = first.span();
		while self.at(TokenKind::Dot) && self.nth_kind(1) == Some(TokenKind::Identifier) {
			self.bump();
			let seg = self.bump().unwrap();
			prefix.push(std::mem::replace(&mut name, seg.text.clone()));
			name_span = seg.span();
		}
		let mut args = Vec::new();
		if self.at(TokenKind::Lt) {
			self.bump();
			loop {
				if let Some(arg) = self.type_ref() {
					args.push(arg);
				} else {
					break;
				}
				if self.eat(TokenKind::Comma).is_none() {
					break;
				}
			}
			self.eat(TokenKind::Gt);
		}
		// Optional type suffix.
		self.eat(TokenKind::Question);
		let end = self.prev_end();
		let id = if prefix.is_empty() {
			self.ast.alloc(NodeKind::RefType { name, args: args.clone() }, begin, end)
		} else {
			self.ast.alloc(
				NodeKind::QualifiedType {
					prefix,
					name,
					name_span,
				},
				begin,
				end,
			)
		};
		self.link(id, &args);
		Some(id)
	}

	// ---- statements & expressions ----

	fn block(&mut self) -> NodeId {
		let begin = self.here();
		self.expect(TokenKind::LBrace);
		let mut stmts = Vec::new();
		while !self.at(TokenKind::RBrace) && self.peek().is_some() {
			match self.statement() {
				Some(stmt) => stmts.push(stmt),
				None => {
					let here = self.here();
					self.error(here, "expected statement".into());
					self.bump();
				}
			}
			self.eat(TokenKind::Semi);
		}
		self.expect(TokenKind::RBrace);
		let end = self.prev_end();
		let id = self.ast.alloc(NodeKind::Block { stmts: stmts.clone() }, begin, end);
		self.link(id, &stmts);
		id
	}

	fn statement(&mut self) -> Option<NodeId> {
		match self.peek_kind()? {
			TokenKind::Var | TokenKind::Let | TokenKind::Const => {
				let begin = self.here();
				self.var_decl(begin, Modifiers::default())
			}
			TokenKind::Func => {
				let begin = self.here();
				self.func_decl(begin, Modifiers::default())
			}
			TokenKind::Return => {
				let begin = self.bump().unwrap().begin;
				let expr = if self.at(TokenKind::RBrace) || self.at(TokenKind::Semi) {
					None
				} else {
					self.expression()
				};
				let end = self.prev_end();
				let id = self.ast.alloc(NodeKind::Return { expr }, begin, end);
				if let Some(expr) = expr {
					self.ast.set_parent(expr, id);
				}
				Some(id)
			}
			TokenKind::Throw => {
				let begin = self.bump().unwrap().begin;
				let expr = self.expression()?;
				let end = self.prev_end();
				let id = self.ast.alloc(NodeKind::Throw { expr }, begin, end);
				self.ast.set_parent(expr, id);
				Some(id)
			}
			TokenKind::Break | TokenKind::Continue => {
				let t = self.bump().unwrap();
				Some(self.ast.alloc(NodeKind::Error, t.begin, t.end))
			}
			TokenKind::While => {
				let begin = self.bump().unwrap().begin;
				self.eat(TokenKind::LParen);
				let cond = self.expression()?;
				self.eat(TokenKind::RParen);
				let body = self.block();
				let end = self.prev_end();
				let id = self.ast.alloc(NodeKind::While { cond, body }, begin, end);
				self.ast.set_parent(cond, id);
				self.ast.set_parent(body, id);
				Some(id)
			}
			TokenKind::For => {
				let begin = self.bump().unwrap().begin;
				self.eat(TokenKind::LParen);
				let binding = {
					let (name, name_span) = self.decl_name();
					let id = self.ast.alloc(
						NodeKind::Decl(DeclData {
							kind: DeclKind::Var,
							name,
							name_span,
							modifiers: Modifiers::default(),
							super_types: Vec::new(),
							params: Vec::new(),
							ty_annotation: None,
							init: None,
							body: None,
							members: Vec::new(),
						}),
						name_span.begin,
						name_span.end,
					);
					id
				};
				self.expect(TokenKind::In);
				let iterable = self.expression()?;
				self.eat(TokenKind::RParen);
				let body = self.block();
				let end = self.prev_end();
				let id = self.ast.alloc(
					NodeKind::For {
						binding,
						iterable,
						body,
					},
					begin,
					end,
				);
				self.ast.set_parent(binding, id);
				self.ast.set_parent(iterable, id);
				self.ast.set_parent(body, id);
				Some(id)
			}
			_ => self.expression(),
		}
	}

	fn expression(&mut self) -> Option<NodeId> {
		let lhs = self.binary_expr(0)?;
		if self.at(TokenKind::Assign)
			|| matches!(
				self.peek_kind(),
				Some(
					TokenKind::AddAssign
						| TokenKind::SubAssign | TokenKind::MulAssign
						| TokenKind::DivAssign | TokenKind::ModAssign
				)
			) {
			self.bump();
			let rhs = self.expression()?;
			let begin = self.ast.node(lhs).span.begin;
			let end = self.ast.node(rhs).span.end;
			let id = self.ast.alloc(NodeKind::AssignExpr { lhs, rhs }, begin, end);
			self.ast.set_parent(lhs, id);
			self.ast.set_parent(rhs, id);
			return Some(id);
		}
		Some(lhs)
	}

	fn binary_expr(&mut self, min_precedence: u8) -> Option<NodeId> {
		let mut lhs = self.unary_expr()?;
		while let Some(op) = self.peek_kind() {
			let Some(precedence) = binary_precedence(op) else { break };
			if precedence < min_precedence {
				break;
			}
			self.bump();
			let rhs = self.binary_expr(precedence + 1)?;
			let begin = self.ast.node(lhs).span.begin;
			let end = self.ast.node(rhs).span.end;
			let id = self.ast.alloc(NodeKind::BinaryExpr { op, lhs, rhs }, begin, end);
			self.ast.set_parent(lhs, id);
			self.ast.set_parent(rhs, id);
			lhs = id;
		}
		Some(lhs)
	}

	fn unary_expr(&mut self) -> Option<NodeId> {
		if matches!(self.peek_kind(), Some(TokenKind::Not | TokenKind::Sub)) {
			let t = self.bump().unwrap();
			let operand = self.unary_expr()?;
			let end = self.ast.node(operand).span.end;
			let id = self.ast.alloc(
				NodeKind::UnaryExpr {
					op: t.kind,
					operand,
				},
				t.begin,
				end,
			);
			self.ast.set_parent(operand, id);
			return Some(id);
		}
		self.postfix_expr()
	}

	fn postfix_expr(&mut self) -> Option<NodeId> {
		let mut expr = self.primary_expr()?;
		loop {
			match self.peek_kind() {
				Some(TokenKind::Dot) => {
					self.bump();
					let (field, field_span) = if self.at(TokenKind::Identifier) {
						let t = self.bump().unwrap();
						(t.text.clone(), t.span())
					} else {
						// Dangling dot: the completion position. Record an
						// empty member access so features can anchor on it.
						let here = self.here();
						(String::new(), Span::new(here, here))
					};
					let begin = self.ast.node(expr).span.begin;
					let end = if field_span.end > field_span.begin {
						field_span.end
					} else {
						self.prev_end()
					};
					let id = self.ast.alloc(
						NodeKind::MemberAccess {
							base: expr,
							field,
							field_span,
						},
						begin,
						end,
					);
					self.ast.set_parent(expr, id);
					expr = id;
				}
				Some(TokenKind::LParen) => {
					self.bump();
					let mut args = Vec::new();
					while !self.at(TokenKind::RParen) && self.peek().is_some() {
						// Named argument: `name: expr`.
						if self.at(TokenKind::Identifier)
							&& self.nth_kind(1) == Some(TokenKind::Colon)
						{
							self.bump();
							self.bump();
						}
						match self.expression() {
							Some(arg) => args.push(arg),
							None => break,
						}
						if self.eat(TokenKind::Comma).is_none() {
							break;
						}
					}
					self.expect(TokenKind::RParen);
					let begin = self.ast.node(expr).span.begin;
					let end = self.prev_end();
					let id = self.ast.alloc(
						NodeKind::CallExpr {
							callee: expr,
							args: args.clone(),
						},
						begin,
						end,
					);
					self.ast.set_parent(expr, id);
					self.link(id, &args);
					expr = id;
				}
				Some(TokenKind::LSquare) => {
					self.bump();
					let mut indices = Vec::new();
					while !self.at(TokenKind::RSquare) && self.peek().is_some() {
						match self.expression() {
							Some(index) => indices.push(index),
							None => break,
						}
						if self.eat(TokenKind::Comma).is_none() {
							break;
						}
					}
					self.expect(TokenKind::RSquare);
					let begin = self.ast.node(expr).span.begin;
					let end = self.prev_end();
					let id = self.ast.alloc(
						NodeKind::IndexExpr {
							base: expr,
							indices: indices.clone(),
						},
						begin,
						end,
					);
					self.ast.set_parent(expr, id);
					self.link(id, &indices);
					expr = id;
				}
				Some(TokenKind::Incr) | Some(TokenKind::Decr) => {
					let t = self.bump().unwrap();
					let begin = self.ast.node(expr).span.begin;
					let id = self.ast.alloc(
						NodeKind::UnaryExpr {
							op: t.kind,
							operand: expr,
						},
						begin,
						t.end,
					);
					self.ast.set_parent(expr, id);
					expr = id;
				}
				_ => break,
			}
		}
		Some(expr)
	}

	fn primary_expr(&mut self) -> Option<NodeId> {
		let t = self.peek()?;
		match t.kind {
			TokenKind::Identifier | TokenKind::DollarIdentifier => {
				let t = self.bump().unwrap();
				Some(self.ast.alloc(
					NodeKind::RefExpr { name: t.text.clone() },
					t.begin,
					t.end,
				))
			}
			TokenKind::This | TokenKind::Super => {
				let t = self.bump().unwrap();
				Some(self.ast.alloc(
					NodeKind::RefExpr { name: t.text.clone() },
					t.begin,
					t.end,
				))
			}
			TokenKind::IntLiteral => self.lit(LitKind::Int),
			TokenKind::FloatLiteral => self.lit(LitKind::Float),
			TokenKind::StringLiteral | TokenKind::MultilineString => self.lit(LitKind::Str),
			TokenKind::CharLiteral => self.lit(LitKind::Char),
			TokenKind::BoolLiteral => self.lit(LitKind::Bool),
			TokenKind::LParen => {
				self.bump();
				if self.at(TokenKind::RParen) {
					let t = self.bump().unwrap();
					return Some(self.ast.alloc(
						NodeKind::LitExpr {
							kind: LitKind::Unit,
							text: String::new(),
						},
						t.begin,
						t.end,
					));
				}
				let inner = self.expression();
				self.expect(TokenKind::RParen);
				inner
			}
			TokenKind::LBrace => Some(self.lambda_or_block()),
			TokenKind::If => {
				let begin = self.bump().unwrap().begin;
				self.eat(TokenKind::LParen);
				let cond = self.expression()?;
				self.eat(TokenKind::RParen);
				let then_block = self.block();
				let else_branch = if self.eat(TokenKind::Else).is_some() {
					if self.at(TokenKind::If) {
						self.primary_expr()
					} else {
						Some(self.block())
					}
				} else {
					None
				};
				let end = self.prev_end();
				let id = self.ast.alloc(
					NodeKind::If {
						cond,
						then_block,
						else_branch,
					},
					begin,
					end,
				);
				self.ast.set_parent(cond, id);
				self.ast.set_parent(then_block, id);
				if let Some(else_branch) = else_branch {
					self.ast.set_parent(else_branch, id);
				}
				Some(id)
			}
			TokenKind::Match => Some(self.match_expr()),
			TokenKind::At => Some(self.macro_expand()),
			TokenKind::Spawn | TokenKind::Unsafe | TokenKind::Try => {
				let begin = self.bump().unwrap().begin;
				let body = if self.at(TokenKind::LBrace) {
					self.block()
				} else {
					self.expression()?
				};
				// try/catch tails.
				while self.eat(TokenKind::Catch).is_some() {
					self.eat(TokenKind::LParen);
					let _ = self.expression();
					self.eat(TokenKind::RParen);
					if self.at(TokenKind::LBrace) {
						self.block();
					}
				}
				if self.eat(TokenKind::Finally).is_some() && self.at(TokenKind::LBrace) {
					self.block();
				}
				let end = self.prev_end();
				let id = self.ast.alloc(NodeKind::Block { stmts: vec![body] }, begin, end);
				self.ast.set_parent(body, id);
				Some(id)
			}
			_ => None,
		}
	}

	fn lit(&mut self, kind: LitKind) -> Option<NodeId> {
		let t = self.bump().unwrap();
		Some(self.ast.alloc(
			NodeKind::LitExpr {
				kind,
				text: t.text.clone(),
			},
			t.begin,
			t.end,
		))
	}

	fn lambda_or_block(&mut self) -> NodeId {
		// `{ a, b => body }` is a lambda, `{ ... }` a block. Look ahead for
		// `=>` before any brace nesting.
		let mut i = self.pos + 1;
		let mut is_lambda = false;
		while let Some(t) = self.tokens.get(i) {
			match t.kind {
				TokenKind::DoubleArrow => {
					is_lambda = true;
					break;
				}
				TokenKind::LBrace | TokenKind::RBrace | TokenKind::Semi => break,
				_ => i += 1,
			}
		}
		if !is_lambda {
			return self.block();
		}
		let begin = self.bump().unwrap().begin; // `{`
		let mut params = Vec::new();
		while !self.at(TokenKind::DoubleArrow) && self.peek().is_some() {
			let (name, name_span) = self.decl_name();
			let ty = if self.eat(TokenKind::Colon).is_some() {
				self.type_ref()
			} else {
				None
			};
			let id = self.ast.alloc(
				NodeKind::Decl(DeclData {
					kind: DeclKind::Param,
					name,
					name_span,
					modifiers: Modifiers::default(),
					super_types: Vec::new(),
					params: Vec::new(),
					ty_annotation: ty,
					init: None,
					body: None,
					members: Vec::new(),
				}),
				name_span.begin,
				name_span.end,
			);
			if let Some(ty) = ty {
				self.ast.set_parent(ty, id);
			}
			params.push(id);
			if self.eat(TokenKind::Comma).is_none() {
				break;
			}
		}
		self.expect(TokenKind::DoubleArrow);
		let mut stmts = Vec::new();
		while !self.at(TokenKind::RBrace) && self.peek().is_some() {
			match self.statement() {
				Some(stmt) => stmts.push(stmt),
				None => {
					self.bump();
				}
			}
			self.eat(TokenKind::Semi);
		}
		self.expect(TokenKind::RBrace);
		let end = self.prev_end();
		let body = self.ast.alloc(NodeKind::Block { stmts: stmts.clone() }, begin, end);
		self.link(body, &stmts);
		let id = self.ast.alloc(
			NodeKind::Lambda {
				params: params.clone(),
				body,
			},
			begin,
			end,
		);
		self.link(id, &params);
		self.ast.set_parent(body, id);
		id
	}

	fn match_expr(&mut self) -> NodeId {
		let begin = self.bump().unwrap().begin; // `match`
		let scrutinee = if self.eat(TokenKind::LParen).is_some() {
			let expr = self.expression();
			self.eat(TokenKind::RParen);
			expr
		} else {
			None
		};
		let mut arms = Vec::new();
		if self.expect(TokenKind::LBrace).is_some() {
			while self.at(TokenKind::Case) {
				let case_begin = self.bump().unwrap().begin;
				let pattern = self.pattern();
				let guard = if self.eat(TokenKind::Where).is_some() {
					self.expression()
				} else {
					None
				};
				self.expect(TokenKind::DoubleArrow);
				let mut stmts = Vec::new();
				while !self.at(TokenKind::Case) && !self.at(TokenKind::RBrace) && self.peek().is_some()
				{
					match self.statement() {
						Some(stmt) => stmts.push(stmt),
						None => {
							self.bump();
						}
					}
					self.eat(TokenKind::Semi);
				}
				let end = self.prev_end();
				let body = self.ast.alloc(NodeKind::Block { stmts: stmts.clone() }, case_begin, end);
				self.link(body, &stmts);
				let arm = self.ast.alloc(
					NodeKind::MatchArm {
						pattern,
						guard,
						body,
					},
					case_begin,
					end,
				);
				self.ast.set_parent(pattern, arm);
				if let Some(guard) = guard {
					self.ast.set_parent(guard, arm);
				}
				self.ast.set_parent(body, arm);
				arms.push(arm);
			}
			self.expect(TokenKind::RBrace);
		}
		let end = self.prev_end();
		let id = self.ast.alloc(NodeKind::Match { scrutinee, arms: arms.clone() }, begin, end);
		if let Some(scrutinee) = scrutinee {
			self.ast.set_parent(scrutinee, id);
		}
		self.link(id, &arms);
		id
	}

	fn pattern(&mut self) -> NodeId {
		// Patterns are parsed loosely: enough structure for binding and
		// reference resolution, not exhaustiveness.
		let begin = self.here();
		match self.peek_kind() {
			Some(TokenKind::Identifier) => {
				// Ctor pattern `Some(x)` vs binding `x`.
				if self.nth_kind(1) == Some(TokenKind::LParen)
					|| self.nth_kind(1) == Some(TokenKind::Dot)
				{
					let expr = self.postfix_expr();
					let end = self.prev_end();
					match expr {
						Some(expr) => {
							let id = self.ast.alloc(NodeKind::Block { stmts: vec![expr] }, begin, end);
							self.ast.set_parent(expr, id);
							id
						}
						None => self.ast.alloc(NodeKind::Error, begin, end),
					}
				} else {
					let t = self.bump().unwrap();
					let name = t.text.clone();
					if name == "_" {
						self.ast.alloc(NodeKind::WildcardPattern, t.begin, t.end)
					} else {
						self.ast.alloc(NodeKind::VarPattern { name }, t.begin, t.end)
					}
				}
			}
			Some(
				TokenKind::IntLiteral
				| TokenKind::FloatLiteral
				| TokenKind::StringLiteral
				| TokenKind::BoolLiteral
				| TokenKind::CharLiteral,
			) => {
				let t = self.bump().unwrap();
				self.ast.alloc(NodeKind::WildcardPattern, t.begin, t.end)
			}
			_ => {
				let t = self.bump();
				let end = t.map(|t| t.end).unwrap_or(begin);
				self.ast.alloc(NodeKind::Error, begin, end)
			}
		}
	}
}

fn binary_precedence(op: TokenKind) -> Option<u8> {
	use TokenKind::*;
	Some(match op {
		Coalesce => 1,
		OrOr => 2,
		AndAnd => 3,
		BitOr => 4,
		BitXor => 5,
		BitAnd => 6,
		Eq | NotEq => 7,
		Lt | Le | Gt | Ge => 8,
		Is | As => 8,
		Range | RangeEq => 9,
		LShift | RShift => 10,
		Add | Sub => 11,
		Mul | Div | Mod => 12,
		Exp => 13,
		_ => return None,
	})
}

#[cfg(test)]
mod tests {
	use crate::lexer::lex;

	use super::*;

	fn parse_src(src: &str) -> (Ast, Vec<Diagnostic>) {
		let (tokens, _) = lex(src);
		parse(&tokens)
	}

	fn decl_names(ast: &Ast) -> Vec<String> {
		let mut names = Vec::new();
		ast.walk(ast.root, &mut |id| {
			if let Some(decl) = ast.decl(id) {
				names.push(decl.name.clone());
			}
		});
		names
	}

	#[test]
	fn parses_package_imports_and_decls() {
		let (ast, diags) = parse_src(
			"package p1\nimport std.collection.Map\npublic func f(x: Int64): Int64 { return x }\n",
		);
		assert!(diags.is_empty(), "{diags:?}");
		let NodeKind::File { package, imports, decls } = &ast.node(ast.root).kind else {
			panic!("root is not a file");
		};
		assert_eq!(package.as_deref(), Some("p1"));
		assert_eq!(imports.len(), 1);
		assert_eq!(decls.len(), 1);
	}

	#[test]
	fn parses_class_with_members_and_supertype() {
		let (ast, diags) = parse_src(
			"package p\nclass K <: Base {\n\tvar count: Int64 = 0\n\tpublic func get(): Int64 { return count }\n}\n",
		);
		assert!(diags.is_empty(), "{diags:?}");
		assert_eq!(decl_names(&ast), vec!["K", "count", "get"]);
		let class = ast
			.ids()
			.find(|&id| ast.decl(id).is_some_and(|d| d.kind == DeclKind::Class))
			.unwrap();
		assert_eq!(ast.decl(class).unwrap().super_types.len(), 1);
	}

	#[test]
	fn parses_enum_ctors() {
		let (ast, _) = parse_src("package p\nenum E { A | B(Int64) }\n");
		let kinds: Vec<DeclKind> = ast
			.ids()
			.filter_map(|id| ast.decl(id).map(|d| d.kind))
			.collect();
		assert_eq!(kinds, vec![DeclKind::Enum, DeclKind::EnumCtor, DeclKind::EnumCtor]);
	}

	#[test]
	fn call_and_member_access_nest() {
		let (ast, diags) = parse_src("package p\nfunc f() { a.b().c }\n");
		assert!(diags.is_empty(), "{diags:?}");
		let mut member_fields = Vec::new();
		ast.walk(ast.root, &mut |id| {
			if let NodeKind::MemberAccess { field, .. } = &ast.node(id).kind {
				member_fields.push(field.clone());
			}
		});
		assert_eq!(member_fields, vec!["c", "b"]);
	}

	#[test]
	fn dangling_dot_yields_empty_member_access() {
		let (ast, _) = parse_src("package p\nfunc f() { foo. }\n");
		let mut found = false;
		ast.walk(ast.root, &mut |id| {
			if let NodeKind::MemberAccess { field, .. } = &ast.node(id).kind {
				found |= field.is_empty();
			}
		});
		assert!(found);
	}

	#[test]
	fn bad_decl_recovers_and_keeps_later_decls() {
		let (ast, diags) = parse_src("package p\n???\nfunc ok() {}\n");
		assert!(!diags.is_empty());
		assert!(decl_names(&ast).contains(&"ok".to_string()));
	}

	#[test]
	fn operator_func_uses_operator_as_name() {
		let (ast, _) = parse_src("package p\nclass K { operator func +(o: K): K { return o } }\n");
		assert!(decl_names(&ast).contains(&"+".to_string()));
	}
}
