//! Wire <-> front-end coordinate conversion.
//!
//! The front end speaks 1-based line/column; the wire speaks 0-based
//! line/character. All conversion happens here so feature code never mixes
//! the two.

use cjls_frontend::{Position, Span};
use cjls_protocol::{path_to_uri, uri_to_path};
use lsp_types::Uri;
use std::str::FromStr;

pub fn to_frontend(position: lsp_types::Position) -> Position {
	Position::new(position.line + 1, position.character + 1)
}

pub fn to_lsp_position(position: Position) -> lsp_types::Position {
	lsp_types::Position {
		line: position.line.saturating_sub(1),
		character: position.column.saturating_sub(1),
	}
}

pub fn to_lsp_range(span: Span) -> lsp_types::Range {
	lsp_types::Range {
		start: to_lsp_position(span.begin),
		end: to_lsp_position(span.end),
	}
}

pub fn to_frontend_span(range: lsp_types::Range) -> Span {
	Span::new(to_frontend(range.start), to_frontend(range.end))
}

/// Normalized filesystem path of a document uri; `None` for non-file
/// schemes.
pub fn uri_path(uri: &Uri) -> Option<String> {
	uri_to_path(uri.as_str())
}

pub fn file_uri(path: &str) -> Uri {
	Uri::from_str(&path_to_uri(path)).unwrap_or_else(|_| {
		Uri::from_str("file:///").expect("root uri parses")
	})
}

pub fn location(path: &str, span: Span) -> lsp_types::Location {
	lsp_types::Location {
		uri: file_uri(path),
		range: to_lsp_range(span),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn wire_positions_are_zero_based() {
		let front = to_frontend(lsp_types::Position {
			line: 2,
			character: 4,
		});
		assert_eq!(front, Position::new(3, 5));
		assert_eq!(
			to_lsp_position(front),
			lsp_types::Position {
				line: 2,
				character: 4
			}
		);
	}

	#[test]
	fn uri_round_trip() {
		let uri = file_uri("/proj/a.cj");
		assert_eq!(uri.as_str(), "file:///proj/a.cj");
		assert_eq!(uri_path(&uri).as_deref(), Some("/proj/a.cj"));
	}
}
