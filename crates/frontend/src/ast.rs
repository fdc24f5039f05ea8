//! Arena AST.
//!
//! Nodes live in one `Vec` per file; identity is the [`NodeId`] index.
//! Parent links are indices, children are index lists, and semantic results
//! (resolved targets, inferred types) live in side-tables keyed by id.

use crate::{Position, Span};

pub type NodeId = u32;

/// Declaration kinds mirrored into the index `kind` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclKind {
	Func,
	Main,
	Init,
	Class,
	Interface,
	Struct,
	Enum,
	EnumCtor,
	Extend,
	Var,
	Let,
	Prop,
	Param,
	Macro,
	TypeAlias,
}

impl DeclKind {
	pub fn is_type(self) -> bool {
		matches!(
			self,
			DeclKind::Class | DeclKind::Interface | DeclKind::Struct | DeclKind::Enum
		)
	}

	pub fn is_callable(self) -> bool {
		matches!(
			self,
			DeclKind::Func | DeclKind::Main | DeclKind::Init | DeclKind::Macro | DeclKind::EnumCtor
		)
	}
}

/// Modifier bits, stored verbatim in the index `modifier` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers(pub u32);

impl Modifiers {
	pub const PUBLIC: u32 = 1 << 0;
	pub const PRIVATE: u32 = 1 << 1;
	pub const PROTECTED: u32 = 1 << 2;
	pub const INTERNAL: u32 = 1 << 3;
	pub const STATIC: u32 = 1 << 4;
	pub const OPEN: u32 = 1 << 5;
	pub const OVERRIDE: u32 = 1 << 6;
	pub const ABSTRACT: u32 = 1 << 7;
	pub const SEALED: u32 = 1 << 8;
	pub const REDEF: u32 = 1 << 9;
	pub const CONST: u32 = 1 << 10;
	pub const FOREIGN: u32 = 1 << 11;
	pub const UNSAFE: u32 = 1 << 12;
	pub const MUT: u32 = 1 << 13;
	pub const OPERATOR: u32 = 1 << 14;

	pub fn contains(self, bit: u32) -> bool {
		self.0 & bit != 0
	}

	pub fn insert(&mut self, bit: u32) {
		self.0 |= bit;
	}

	pub fn is_public(self) -> bool {
		self.contains(Self::PUBLIC)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LitKind {
	Int,
	Float,
	Str,
	Char,
	Bool,
	Unit,
}

/// Payload of a declaration node.
#[derive(Debug, Clone)]
pub struct DeclData {
	pub kind: DeclKind,
	pub name: String,
	pub name_span: Span,
	pub modifiers: Modifiers,
	/// Super types / implemented interfaces (`RefType` nodes).
	pub super_types: Vec<NodeId>,
	/// `Param` declaration nodes for callables.
	pub params: Vec<NodeId>,
	/// Declared type annotation (`RefType` node), if written.
	pub ty_annotation: Option<NodeId>,
	/// Initializer expression, if any.
	pub init: Option<NodeId>,
	/// Body block (functions) or member list holder (types).
	pub body: Option<NodeId>,
	/// Member declarations for type declarations.
	pub members: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
	File {
		package: Option<String>,
		imports: Vec<NodeId>,
		decls: Vec<NodeId>,
	},
	PackageSpec {
		name: String,
	},
	Import {
		/// Dotted path; the last segment is the imported item (or `*`).
		path: Vec<String>,
		alias: Option<String>,
		/// Span of the final segment.
		item_span: Span,
	},
	Decl(DeclData),
	Block {
		stmts: Vec<NodeId>,
	},
	RefExpr {
		name: String,
	},
	MemberAccess {
		base: NodeId,
		field: String,
		field_span: Span,
	},
	CallExpr {
		callee: NodeId,
		args: Vec<NodeId>,
	},
	IndexExpr {
		base: NodeId,
		indices: Vec<NodeId>,
	},
	BinaryExpr {
		op: crate::TokenKind,
		lhs: NodeId,
		rhs: NodeId,
	},
	UnaryExpr {
		op: crate::TokenKind,
		operand: NodeId,
	},
	AssignExpr {
		lhs: NodeId,
		rhs: NodeId,
	},
	LitExpr {
		kind: LitKind,
		text: String,
	},
	RefType {
		name: String,
		args: Vec<NodeId>,
	},
	QualifiedType {
		prefix: Vec<String>,
		name: String,
		name_span: Span,
	},
	If {
		cond: NodeId,
		then_block: NodeId,
		else_branch: Option<NodeId>,
	},
	While {
		cond: NodeId,
		body: NodeId,
	},
	For {
		binding: NodeId,
		iterable: NodeId,
		body: NodeId,
	},
	Match {
		scrutinee: Option<NodeId>,
		arms: Vec<NodeId>,
	},
	MatchArm {
		pattern: NodeId,
		guard: Option<NodeId>,
		body: NodeId,
	},
	VarPattern {
		name: String,
	},
	WildcardPattern,
	Return {
		expr: Option<NodeId>,
	},
	Throw {
		expr: NodeId,
	},
	Lambda {
		params: Vec<NodeId>,
		body: NodeId,
	},
	MacroExpand {
		name: String,
		name_span: Span,
		target: Option<NodeId>,
	},
	/// Parser recovery placeholder.
	Error,
}

#[derive(Debug, Clone)]
pub struct Node {
	pub parent: Option<NodeId>,
	pub kind: NodeKind,
	pub span: Span,
}

/// One file's arena.
#[derive(Debug, Default)]
pub struct Ast {
	nodes: Vec<Node>,
	pub root: NodeId,
}

impl Ast {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn alloc(&mut self, kind: NodeKind, begin: Position, end: Position) -> NodeId {
		let id = self.nodes.len() as NodeId;
		self.nodes.push(Node {
			parent: None,
			kind,
			span: Span::new(begin, end),
		});
		id
	}

	pub fn node(&self, id: NodeId) -> &Node {
		&self.nodes[id as usize]
	}

	pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
		&mut self.nodes[id as usize]
	}

	pub fn set_parent(&mut self, child: NodeId, parent: NodeId) {
		self.nodes[child as usize].parent = Some(parent);
	}

	pub fn parent(&self, id: NodeId) -> Option<NodeId> {
		self.nodes[id as usize].parent
	}

	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
		0..self.nodes.len() as NodeId
	}

	pub fn decl(&self, id: NodeId) -> Option<&DeclData> {
		match &self.node(id).kind {
			NodeKind::Decl(data) => Some(data),
			_ => None,
		}
	}

	/// Walks ancestors from `id` upward (excluding `id` itself).
	pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
		let mut current = self.parent(id);
		std::iter::from_fn(move || {
			let id = current?;
			current = self.parent(id);
			Some(id)
		})
	}

	/// Immediate children, derived from the node payload.
	pub fn children(&self, id: NodeId) -> Vec<NodeId> {
		use NodeKind::*;
		match &self.node(id).kind {
			File { imports, decls, .. } => imports.iter().chain(decls).copied().collect(),
			Decl(d) => {
				let mut out: Vec<NodeId> = Vec::new();
				out.extend(&d.super_types);
				out.extend(&d.params);
				out.extend(d.ty_annotation);
				out.extend(d.init);
				out.extend(d.body);
				out.extend(&d.members);
				out
			}
			Block { stmts } => stmts.clone(),
			MemberAccess { base, .. } => vec![*base],
			CallExpr { callee, args } => std::iter::once(*callee).chain(args.iter().copied()).collect(),
			IndexExpr { base, indices } => std::iter::once(*base).chain(indices.iter().copied()).collect(),
			BinaryExpr { lhs, rhs, .. } | AssignExpr { lhs, rhs } => vec![*lhs, *rhs],
			UnaryExpr { operand, .. } => vec![*operand],
			RefType { args, .. } => args.clone(),
			If {
				cond,
				then_block,
				else_branch,
			} => {
				let mut out = vec![*cond, *then_block];
				out.extend(else_branch);
				out
			}
			While { cond, body } => vec![*cond, *body],
			For {
				binding,
				iterable,
				body,
			} => vec![*binding, *iterable, *body],
			Match { scrutinee, arms } => scrutinee.iter().chain(arms.iter()).copied().collect(),
			MatchArm {
				pattern,
				guard,
				body,
			} => {
				let mut out = vec![*pattern];
				out.extend(guard);
				out.push(*body);
				out
			}
			Return { expr } => expr.iter().copied().collect(),
			Throw { expr } => vec![*expr],
			Lambda { params, body } => params.iter().copied().chain(std::iter::once(*body)).collect(),
			MacroExpand { target, .. } => target.iter().copied().collect(),
			PackageSpec { .. } | Import { .. } | RefExpr { .. } | LitExpr { .. }
			| QualifiedType { .. } | VarPattern { .. } | WildcardPattern | Error => Vec::new(),
		}
	}

	/// Depth-first preorder walk below (and including) `id`.
	pub fn walk(&self, id: NodeId, visit: &mut dyn FnMut(NodeId)) {
		visit(id);
		for child in self.children(id) {
			self.walk(child, visit);
		}
	}

	/// Deepest node whose span contains `pos`, preferring later siblings.
	pub fn node_at(&self, pos: Position) -> Option<NodeId> {
		let mut best: Option<NodeId> = None;
		self.walk(self.root, &mut |id| {
			if self.node(id).span.contains(pos) {
				best = Some(id);
			}
		});
		best
	}
}
