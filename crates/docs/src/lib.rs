//! Live-edit document cache.
//!
//! Authoritative store of what the editor currently sees, keyed by
//! normalized absolute path. All methods serialize on one internal mutex;
//! reads hand out owned snapshots so callers never hold the lock across an
//! action. Patch positions use the wire convention (0-based line/character).

use std::collections::HashMap;

use parking_lot::Mutex;

/// Version sentinel for paths that were never opened.
pub const UNOPENED_VERSION: i64 = -1;

/// One cached document.
#[derive(Debug, Clone, Default)]
pub struct Doc {
	pub version: i64,
	pub contents: String,
	pub needs_reparse: bool,
	/// Registered during the initial project compile rather than by an
	/// editor `didOpen`.
	pub init_compiled: bool,
	/// Start of the earliest range in the last update batch (0-based), used
	/// to decide whether a cached snapshot still covers a cursor position.
	/// `None` after a whole-text replacement.
	pub last_edit_begin: Option<(u32, u32)>,
}

/// One incremental edit: replace `range` (or the whole text) with `text`.
#[derive(Debug, Clone)]
pub struct DocPatch {
	pub range: Option<PatchRange>,
	pub text: String,
}

/// 0-based half-open range, characters counted in bytes within the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchRange {
	pub start_line: u32,
	pub start_character: u32,
	pub end_line: u32,
	pub end_character: u32,
}

#[derive(Default)]
pub struct DocCache {
	docs: Mutex<HashMap<String, Doc>>,
}

impl DocCache {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers an opened document. Re-opening an already-open path resets
	/// contents but keeps the higher version.
	pub fn open(&self, path: &str, version: i64, text: String) {
		let mut docs = self.docs.lock();
		let doc = docs.entry(path.to_string()).or_default();
		doc.version = doc.version.max(version);
		doc.contents = text;
		doc.needs_reparse = true;
	}

	/// Applies an editor update. Returns `false` (leaving the document
	/// untouched) when the version does not advance or an edit is out of
	/// range.
	pub fn update(&self, path: &str, version: i64, patches: &[DocPatch]) -> bool {
		let mut docs = self.docs.lock();
		let Some(doc) = docs.get_mut(path) else {
			tracing::warn!(path, "update for unknown document dropped");
			return false;
		};
		if version < doc.version {
			tracing::warn!(
				path,
				have = doc.version,
				got = version,
				"stale document version rejected"
			);
			return false;
		}
		// Validate and apply against a scratch copy: a bad patch in the
		// middle must not leave half of the batch applied.
		let mut next = doc.contents.clone();
		let mut earliest: Option<(u32, u32)> = None;
		let mut whole_text = false;
		for patch in patches {
			match &patch.range {
				None => {
					next = patch.text.clone();
					whole_text = true;
				}
				Some(range) => {
					let Some((start, end)) = resolve_range(&next, range) else {
						tracing::warn!(path, ?range, "edit range out of bounds, update dropped");
						return false;
					};
					next.replace_range(start..end, &patch.text);
					let begin = (range.start_line, range.start_character);
					if earliest.is_none_or(|e| begin < e) {
						earliest = Some(begin);
					}
				}
			}
		}
		doc.contents = next;
		doc.version = version;
		doc.needs_reparse = true;
		doc.last_edit_begin = if whole_text { None } else { earliest };
		true
	}

	/// `didClose`: contents are kept — the file still exists on disk and in
	/// the project.
	pub fn close(&self, path: &str) {
		let mut docs = self.docs.lock();
		if let Some(doc) = docs.get_mut(path) {
			doc.needs_reparse = false;
		}
	}

	/// Watched-file delete: drop the entry entirely.
	pub fn delete(&self, path: &str) {
		self.docs.lock().remove(path);
	}

	/// Owned snapshot; unknown paths read as `{version: -1, contents: ""}`.
	pub fn get(&self, path: &str) -> Doc {
		self.docs.lock().get(path).cloned().unwrap_or(Doc {
			version: UNOPENED_VERSION,
			..Doc::default()
		})
	}

	pub fn version_of(&self, path: &str) -> i64 {
		self.docs
			.lock()
			.get(path)
			.map(|d| d.version)
			.unwrap_or(UNOPENED_VERSION)
	}

	pub fn contents_of(&self, path: &str) -> Option<String> {
		self.docs.lock().get(path).map(|d| d.contents.clone())
	}

	pub fn needs_reparse(&self, path: &str) -> bool {
		self.docs
			.lock()
			.get(path)
			.map(|d| d.needs_reparse)
			.unwrap_or(false)
	}

	/// Flips the reparse flag, but only if the version still matches — a
	/// compile that raced a newer edit must not clear the newer edit's flag.
	pub fn mark_reparse(&self, path: &str, version: i64, flag: bool) {
		let mut docs = self.docs.lock();
		if let Some(doc) = docs.get_mut(path) {
			if doc.version == version || flag {
				doc.needs_reparse = flag;
			}
		}
	}

	/// Registers a document discovered during the initial project compile.
	pub fn add_on_init_compile(&self, path: &str, text: String) {
		let mut docs = self.docs.lock();
		docs.entry(path.to_string()).or_insert_with(|| Doc {
			version: UNOPENED_VERSION,
			contents: text,
			needs_reparse: false,
			init_compiled: true,
			last_edit_begin: None,
		});
	}

	pub fn paths(&self) -> Vec<String> {
		self.docs.lock().keys().cloned().collect()
	}
}

/// Byte offsets of a 0-based line/character range, or `None` when the range
/// does not fit the text.
fn resolve_range(text: &str, range: &PatchRange) -> Option<(usize, usize)> {
	let start = offset_at(text, range.start_line, range.start_character)?;
	let end = offset_at(text, range.end_line, range.end_character)?;
	(start <= end).then_some((start, end))
}

fn offset_at(text: &str, line: u32, character: u32) -> Option<usize> {
	let mut current = 0u32;
	let mut offset = 0usize;
	if line > 0 {
		let mut found = false;
		for (i, b) in text.bytes().enumerate() {
			if b == b'\n' {
				current += 1;
				if current == line {
					offset = i + 1;
					found = true;
					break;
				}
			}
		}
		if !found {
			return None;
		}
	}
	let line_end = text[offset..]
		.find('\n')
		.map(|i| offset + i)
		.unwrap_or(text.len());
	let target = offset + character as usize;
	(target <= line_end).then_some(target)
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	fn range(sl: u32, sc: u32, el: u32, ec: u32) -> Option<PatchRange> {
		Some(PatchRange {
			start_line: sl,
			start_character: sc,
			end_line: el,
			end_character: ec,
		})
	}

	#[test]
	fn unknown_path_reads_as_unopened() {
		let cache = DocCache::new();
		let doc = cache.get("/nope.cj");
		assert_eq!(doc.version, UNOPENED_VERSION);
		assert_eq!(doc.contents, "");
		assert!(!doc.init_compiled);
	}

	#[test]
	fn versions_are_monotonic() {
		let cache = DocCache::new();
		cache.open("/a.cj", 1, "one".into());
		assert!(cache.update(
			"/a.cj",
			3,
			&[DocPatch {
				range: None,
				text: "three".into()
			}]
		));
		assert!(!cache.update(
			"/a.cj",
			2,
			&[DocPatch {
				range: None,
				text: "two".into()
			}]
		));
		let doc = cache.get("/a.cj");
		assert_eq!(doc.version, 3);
		assert_eq!(doc.contents, "three");
	}

	#[test]
	fn range_patches_apply_in_order() {
		let cache = DocCache::new();
		cache.open("/a.cj", 1, "hello world".into());
		// "hello" -> "goodbye", then append "!" after "world".
		let ok = cache.update(
			"/a.cj",
			2,
			&[
				DocPatch {
					range: range(0, 0, 0, 5),
					text: "goodbye".into(),
				},
				DocPatch {
					range: range(0, 13, 0, 13),
					text: "!".into(),
				},
			],
		);
		assert!(ok);
		assert_eq!(cache.get("/a.cj").contents, "goodbye world!");
	}

	#[test]
	fn multiline_insert_at_line_start() {
		let cache = DocCache::new();
		cache.open("/a.cj", 1, "line1\nline2\n".into());
		assert!(cache.update(
			"/a.cj",
			2,
			&[DocPatch {
				range: range(1, 0, 1, 0),
				text: "inserted\n".into(),
			}]
		));
		assert_eq!(cache.get("/a.cj").contents, "line1\ninserted\nline2\n");
	}

	#[test]
	fn out_of_range_edit_drops_the_whole_update() {
		let cache = DocCache::new();
		cache.open("/a.cj", 1, "short".into());
		let ok = cache.update(
			"/a.cj",
			2,
			&[
				DocPatch {
					range: range(0, 0, 0, 1),
					text: "S".into(),
				},
				DocPatch {
					range: range(5, 0, 5, 1),
					text: "x".into(),
				},
			],
		);
		assert!(!ok);
		let doc = cache.get("/a.cj");
		// Nothing applied, version unchanged.
		assert_eq!(doc.contents, "short");
		assert_eq!(doc.version, 1);
	}

	#[test]
	fn delete_removes_and_close_keeps() {
		let cache = DocCache::new();
		cache.open("/a.cj", 1, "text".into());
		cache.close("/a.cj");
		assert_eq!(cache.get("/a.cj").version, 1);
		cache.delete("/a.cj");
		assert_eq!(cache.get("/a.cj").version, UNOPENED_VERSION);
	}

	#[test]
	fn init_compile_does_not_clobber_open_docs() {
		let cache = DocCache::new();
		cache.open("/a.cj", 5, "edited".into());
		cache.add_on_init_compile("/a.cj", "disk".into());
		assert_eq!(cache.get("/a.cj").contents, "edited");
		cache.add_on_init_compile("/b.cj", "disk".into());
		let b = cache.get("/b.cj");
		assert!(b.init_compiled);
		assert_eq!(b.version, UNOPENED_VERSION);
	}
}
