//! File-id registry with line-start tables.

use rustc_hash::FxHashMap;

/// Maps paths to file ids and byte offsets to line/column pairs.
///
/// One instance lives inside each package snapshot; readers share it
/// immutably for the snapshot's lifetime.
#[derive(Debug, Default)]
pub struct SourceManager {
	files: Vec<SourceFile>,
	by_path: FxHashMap<String, u32>,
}

#[derive(Debug)]
struct SourceFile {
	path: String,
	line_starts: Vec<usize>,
	len: usize,
}

impl SourceManager {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a file's contents, returning its id. Re-registering a path
	/// replaces the previous line table.
	pub fn add_file(&mut self, path: &str, contents: &str) -> u32 {
		let line_starts = compute_line_starts(contents);
		if let Some(&id) = self.by_path.get(path) {
			self.files[id as usize] = SourceFile {
				path: path.to_string(),
				line_starts,
				len: contents.len(),
			};
			return id;
		}
		let id = self.files.len() as u32;
		self.files.push(SourceFile {
			path: path.to_string(),
			line_starts,
			len: contents.len(),
		});
		self.by_path.insert(path.to_string(), id);
		id
	}

	pub fn file_id(&self, path: &str) -> Option<u32> {
		self.by_path.get(path).copied()
	}

	pub fn path_of(&self, id: u32) -> Option<&str> {
		self.files.get(id as usize).map(|f| f.path.as_str())
	}

	pub fn line_count(&self, id: u32) -> usize {
		self.files
			.get(id as usize)
			.map(|f| f.line_starts.len())
			.unwrap_or(0)
	}

	/// Byte offset of a 1-based (line, column), clamped into the file.
	pub fn offset_of(&self, id: u32, line: u32, column: u32) -> Option<usize> {
		let file = self.files.get(id as usize)?;
		let line_start = *file.line_starts.get(line.saturating_sub(1) as usize)?;
		Some((line_start + column.saturating_sub(1) as usize).min(file.len))
	}
}

/// Byte offsets where each line begins.
pub(crate) fn compute_line_starts(text: &str) -> Vec<usize> {
	let mut starts = vec![0];
	for (i, b) in text.bytes().enumerate() {
		if b == b'\n' {
			starts.push(i + 1);
		}
	}
	starts
}
