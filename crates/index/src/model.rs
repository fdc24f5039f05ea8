//! Row types stored in and returned from the index.

use cjls_frontend::{DeclKind, Position, Span, SymbolId};

/// A file location as stored in the index: path plus a span.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SymLocation {
	pub file: String,
	pub span: Span,
}

impl SymLocation {
	pub fn new(file: impl Into<String>, span: Span) -> Self {
		Self {
			file: file.into(),
			span,
		}
	}

	pub fn is_empty(&self) -> bool {
		self.file.is_empty()
	}
}

/// Symbol languages for the cross-language tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SymbolLang {
	Cangjie = 0,
	ArkTs = 1,
}

/// One indexed declaration.
#[derive(Debug, Clone, Default)]
pub struct Symbol {
	pub id: SymbolId,
	pub kind: i32,
	pub sub_kind: i32,
	pub lang: i32,
	pub flags: i32,
	pub name: String,
	/// `pkg:` for top-level, `pkg:Type.` for members.
	pub scope: String,
	pub declaration: SymLocation,
	pub definition: SymLocation,
	pub signature: String,
	pub return_type: String,
	pub ty: String,
	pub modifier: u32,
	pub is_deprecated: bool,
	pub syscap: String,
	pub cur_module: String,
	pub macro_call: SymLocation,
	pub is_cjo: bool,
	/// Filled by ranked queries only.
	pub references: u32,
}

impl Symbol {
	pub fn package(&self) -> &str {
		self.scope.split(':').next().unwrap_or_default()
	}
}

/// DeclKind <-> index `kind` column.
pub fn kind_to_i32(kind: DeclKind) -> i32 {
	match kind {
		DeclKind::Func => 1,
		DeclKind::Main => 2,
		DeclKind::Init => 3,
		DeclKind::Class => 4,
		DeclKind::Interface => 5,
		DeclKind::Struct => 6,
		DeclKind::Enum => 7,
		DeclKind::EnumCtor => 8,
		DeclKind::Extend => 9,
		DeclKind::Var => 10,
		DeclKind::Let => 11,
		DeclKind::Prop => 12,
		DeclKind::Param => 13,
		DeclKind::Macro => 14,
		DeclKind::TypeAlias => 15,
	}
}

pub fn kind_from_i32(kind: i32) -> DeclKind {
	match kind {
		2 => DeclKind::Main,
		3 => DeclKind::Init,
		4 => DeclKind::Class,
		5 => DeclKind::Interface,
		6 => DeclKind::Struct,
		7 => DeclKind::Enum,
		8 => DeclKind::EnumCtor,
		9 => DeclKind::Extend,
		10 => DeclKind::Var,
		11 => DeclKind::Let,
		12 => DeclKind::Prop,
		13 => DeclKind::Param,
		14 => DeclKind::Macro,
		15 => DeclKind::TypeAlias,
		_ => DeclKind::Func,
	}
}

/// Reference kinds, usable as a bitmask in queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum RefKind {
	Declaration = 1,
	Definition = 2,
	Reference = 4,
	Call = 8,
}

impl RefKind {
	pub const ALL: i32 = 0xF;
}

/// One use-site of a symbol.
#[derive(Debug, Clone)]
pub struct Ref {
	pub location: SymLocation,
	pub kind: RefKind,
	/// Enclosing symbol of the use-site.
	pub container: SymbolId,
	pub is_cjo: bool,
	pub is_super: bool,
}

/// Directed, kinded edge between two symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum RelationKind {
	BaseOf = 1,
	OverriddenBy = 2,
	/// Never stored; synthesized from `OverriddenBy` at query time.
	Overrides = 3,
	Implements = 4,
	Calls = 5,
	ExtendedBy = 6,
}

impl RelationKind {
	pub fn from_i32(value: i32) -> RelationKind {
		match value {
			2 => RelationKind::OverriddenBy,
			3 => RelationKind::Overrides,
			4 => RelationKind::Implements,
			5 => RelationKind::Calls,
			6 => RelationKind::ExtendedBy,
			_ => RelationKind::BaseOf,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
	pub subject: SymbolId,
	pub predicate: RelationKind,
	pub object: SymbolId,
}

/// Completion row: rendered label and insertion text for one symbol.
#[derive(Debug, Clone)]
pub struct CompletionEntry {
	pub symbol_id: SymbolId,
	pub label: String,
	pub insert_text: String,
}

/// Doc-comment row.
#[derive(Debug, Clone)]
pub struct Comment {
	pub symbol_id: SymbolId,
	/// 0 = line (`///`), 1 = block.
	pub style: i32,
	/// 0 = leading, 1 = trailing.
	pub kind: i32,
	pub text: String,
}

/// Member contributed to a type by an `extend` declaration.
#[derive(Debug, Clone)]
pub struct ExtendItem {
	/// Symbol id of the extended type.
	pub extend_id: SymbolId,
	/// Symbol id of the contributed member.
	pub member_id: SymbolId,
	pub modifier: u32,
	pub interface_name: String,
	pub pkg_name: String,
}

/// Foreign-language symbol registered through the interop layer.
#[derive(Debug, Clone)]
pub struct CrossSymbol {
	pub pkg: String,
	pub id: SymbolId,
	pub name: String,
	pub container: SymbolId,
	pub container_name: String,
	pub cross_type: i32,
	pub location: SymLocation,
	pub declaration: Span,
}

/// Row of the `files` table.
#[derive(Debug, Clone)]
pub struct FileRow {
	pub path: String,
	pub digest: String,
	pub package: String,
	pub module: String,
}

pub(crate) fn span_params(span: Span) -> [i64; 4] {
	[
		span.begin.line as i64,
		span.begin.column as i64,
		span.end.line as i64,
		span.end.column as i64,
	]
}

pub(crate) fn span_from_cols(
	begin_line: i64,
	begin_col: i64,
	end_line: i64,
	end_col: i64,
) -> Span {
	Span::new(
		Position::new(begin_line as u32, begin_col as u32),
		Position::new(end_line as u32, end_col as u32),
	)
}

/// Symbol ids are stored as sqlite INTEGER via a lossless bit cast.
pub(crate) fn id_to_db(id: SymbolId) -> i64 {
	id as i64
}

pub(crate) fn id_from_db(value: i64) -> SymbolId {
	value as u64
}
