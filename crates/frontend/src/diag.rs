//! Compile diagnostics.

use crate::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
	Error,
	Warning,
	Hint,
}

/// Diagnostic codes the quick-fix pipeline keys on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagCode {
	/// `undeclared identifier 'X'`
	UndeclaredIdentifier,
	/// `unused import 'p.X'`
	UnusedImport,
	/// `package 'p' not found`
	PackageNotFound,
	/// syntax error
	Parse,
}

impl DiagCode {
	pub fn as_str(self) -> &'static str {
		match self {
			DiagCode::UndeclaredIdentifier => "E0001",
			DiagCode::UnusedImport => "W0001",
			DiagCode::PackageNotFound => "E0002",
			DiagCode::Parse => "E0100",
		}
	}
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
	pub span: Span,
	pub severity: Severity,
	pub code: DiagCode,
	pub message: String,
}

impl Diagnostic {
	pub fn error(span: Span, code: DiagCode, message: impl Into<String>) -> Self {
		Self {
			span,
			severity: Severity::Error,
			code,
			message: message.into(),
		}
	}

	pub fn warning(span: Span, code: DiagCode, message: impl Into<String>) -> Self {
		Self {
			span,
			severity: Severity::Warning,
			code,
			message: message.into(),
		}
	}

	/// True if this diagnostic prevents the package from reaching sema-ready.
	pub fn is_fatal(&self) -> bool {
		self.severity == Severity::Error && matches!(self.code, DiagCode::Parse)
	}
}
