//! The sqlite-backed index store.
//!
//! One logical handle owns one lazily-opened connection. Statements are
//! interned per connection through the prepared-statement cache. Writes go
//! through [`IndexDatabase::update`], which wraps the callback in
//! BEGIN/COMMIT and serializes on the update mutex; reads retry on busy with
//! a bounded sleep until shutdown is requested.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use cjls_frontend::SymbolId;
use cjls_worker::ShutdownFlag;
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, Row, params};

use crate::model::*;
use crate::sql;
use crate::{Error, Result};

/// How to open the database file.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexDbOptions {
	pub read_only: bool,
	pub in_memory: bool,
}

struct Inner {
	path: PathBuf,
	opts: IndexDbOptions,
	conn: Mutex<Option<Connection>>,
	upgrade: Mutex<Option<JoinHandle<()>>>,
	update_lock: Mutex<()>,
	shutdown: ShutdownFlag,
}

/// Handle to the persistent index.
#[derive(Clone)]
pub struct IndexDatabase {
	inner: Arc<Inner>,
}

impl IndexDatabase {
	/// Opens (or creates) the index at `path`, validating magic and schema
	/// version. A version mismatch on a writable DB schedules the upgrade on
	/// a background thread; the first query joins it. Read-only DBs refuse
	/// to open on any mismatch.
	pub fn open(
		path: impl Into<PathBuf>,
		opts: IndexDbOptions,
		shutdown: ShutdownFlag,
	) -> Result<IndexDatabase> {
		let path = path.into();
		let conn = open_connection(&path, opts)?;
		let schema_empty: bool = conn.query_row(
			"SELECT COUNT(*) = 0 FROM sqlite_master WHERE type = 'table'",
			[],
			|row| row.get(0),
		)?;
		if schema_empty {
			if opts.read_only {
				return Err(Error::ReadOnly);
			}
			create_schema(&conn)?;
			return Ok(Self::from_parts(path, opts, Some(conn), None, shutdown));
		}
		let magic = pragma_i32(&conn, "application_id")?;
		if magic != sql::DATABASE_MAGIC {
			return Err(Error::SchemaMismatch(format!(
				"application_id {magic:#x} is not a cjls index"
			)));
		}
		let version = pragma_i32(&conn, "user_version")?;
		if version == sql::DATABASE_VERSION {
			return Ok(Self::from_parts(path, opts, Some(conn), None, shutdown));
		}
		if opts.read_only {
			return Err(Error::ReadOnly);
		}
		tracing::info!(
			have = version,
			want = sql::DATABASE_VERSION,
			"index schema upgrade scheduled"
		);
		let handle = std::thread::Builder::new()
			.name("cjls-index-upgrade".into())
			.spawn(move || run_upgrade(&conn, version))
			.map_err(|e| Error::SchemaMismatch(format!("cannot spawn upgrade thread: {e}")))?;
		Ok(Self::from_parts(path, opts, None, Some(handle), shutdown))
	}

	fn from_parts(
		path: PathBuf,
		opts: IndexDbOptions,
		conn: Option<Connection>,
		upgrade: Option<JoinHandle<()>>,
		shutdown: ShutdownFlag,
	) -> IndexDatabase {
		IndexDatabase {
			inner: Arc::new(Inner {
				path,
				opts,
				conn: Mutex::new(conn),
				upgrade: Mutex::new(upgrade),
				update_lock: Mutex::new(()),
				shutdown,
			}),
		}
	}

	/// Runs `f` against the connection, opening it if needed and joining a
	/// pending schema upgrade first. Busy errors retry with a 100 ms sleep
	/// until shutdown is requested.
	fn with_conn<R>(&self, f: impl Fn(&Connection) -> rusqlite::Result<R>) -> Result<R> {
		if let Some(handle) = self.inner.upgrade.lock().take() {
			let _ = handle.join();
		}
		let mut slot = self.inner.conn.lock();
		if slot.is_none() {
			*slot = Some(open_connection(&self.inner.path, self.inner.opts)?);
		}
		let conn = slot.as_ref().expect("connection just ensured");
		loop {
			match f(conn) {
				Ok(value) => return Ok(value),
				Err(e) if is_busy(&e) && !self.inner.shutdown.requested() => {
					tracing::debug!("index busy; retrying");
					std::thread::sleep(Duration::from_millis(100));
				}
				Err(e) => return Err(e.into()),
			}
		}
	}

	/// Transactional bulk write. The callback's inserts become visible
	/// atomically on return; any error rolls every one of them back.
	pub fn update(&self, f: impl FnOnce(&IndexUpdate<'_>) -> Result<()>) -> Result<()> {
		let _guard = self.inner.update_lock.lock();
		if let Some(handle) = self.inner.upgrade.lock().take() {
			let _ = handle.join();
		}
		let mut slot = self.inner.conn.lock();
		if slot.is_none() {
			*slot = Some(open_connection(&self.inner.path, self.inner.opts)?);
		}
		let conn = slot.as_ref().expect("connection just ensured");
		conn.execute_batch("BEGIN")?;
		match f(&IndexUpdate { conn }) {
			Ok(()) => {
				conn.execute_batch("COMMIT")?;
				Ok(())
			}
			Err(e) => {
				if let Err(rollback) = conn.execute_batch("ROLLBACK") {
					tracing::error!(error = %rollback, "rollback failed");
				}
				Err(e)
			}
		}
	}

	// ---- queries ----

	pub fn symbol_by_id(&self, id: SymbolId) -> Result<Option<Symbol>> {
		self.with_conn(|conn| {
			let mut stmt = conn.prepare_cached(&format!(
				"SELECT {} FROM symbols WHERE id = ?1",
				sql::SYMBOL_COLUMNS
			))?;
			let mut rows = stmt.query(params![id_to_db(id)])?;
			match rows.next()? {
				Some(row) => Ok(Some(symbol_from_row(row)?)),
				None => Ok(None),
			}
		})
	}

	pub fn symbols_by_name(&self, name: &str) -> Result<Vec<Symbol>> {
		self.with_conn(|conn| {
			let mut stmt = conn.prepare_cached(&format!(
				"SELECT {} FROM symbols WHERE name = ?1 AND lang = 0",
				sql::SYMBOL_COLUMNS
			))?;
			let rows = stmt.query_map(params![name], |row| symbol_from_row(row))?;
			rows.collect()
		})
	}

	/// Symbols declared directly in a scope (`pkg:` or `pkg:Type.`).
	pub fn symbols_in_scope(&self, scope: &str) -> Result<Vec<Symbol>> {
		self.with_conn(|conn| {
			let mut stmt = conn.prepare_cached(&format!(
				"SELECT {} FROM symbols WHERE scope = ?1",
				sql::SYMBOL_COLUMNS
			))?;
			let rows = stmt.query_map(params![scope], |row| symbol_from_row(row))?;
			rows.collect()
		})
	}

	pub fn pkg_symbols(&self, pkg: &str) -> Result<Vec<Symbol>> {
		self.with_conn(|conn| {
			let mut stmt = conn.prepare_cached(&format!(
				"SELECT {} FROM symbols WHERE pkg = ?1",
				sql::SYMBOL_COLUMNS
			))?;
			let rows = stmt.query_map(params![pkg], |row| symbol_from_row(row))?;
			rows.collect()
		})
	}

	/// Fuzzy workspace-symbol query: the query is split into identifier
	/// tokens, candidates must prefix-match every token, results carry
	/// reference counts and come back ranked.
	pub fn matching_symbols(
		&self,
		query: &str,
		scope: Option<&str>,
		limit: usize,
	) -> Result<Vec<Symbol>> {
		let tokens = identifier_tokens(query);
		if tokens.is_empty() {
			return Ok(Vec::new());
		}
		let first = format!("{}%", tokens[0]);
		let mut symbols = self.with_conn(|conn| {
			let mut stmt = conn.prepare_cached(&format!(
				"SELECT DISTINCT {} FROM symbols \
				 JOIN symbol_tokens ON symbol_tokens.symbol_id = symbols.id \
				 WHERE symbol_tokens.token LIKE ?1",
				sql::SYMBOL_COLUMNS
					.split(", ")
					.map(|c| format!("symbols.{c}"))
					.collect::<Vec<_>>()
					.join(", ")
			))?;
			let rows = stmt.query_map(params![first], |row| symbol_from_row(row))?;
			rows.collect::<rusqlite::Result<Vec<Symbol>>>()
		})?;
		symbols.retain(|sym| {
			let name_tokens = identifier_tokens(&sym.name);
			tokens.iter().all(|q| name_tokens.iter().any(|t| t.starts_with(q.as_str())))
				&& scope.is_none_or(|s| sym.scope.starts_with(s))
		});
		for sym in &mut symbols {
			sym.references = self.reference_count(sym.id)?;
		}
		symbols.sort_by(|a, b| {
			let score_a = match_score(&tokens, &a.name);
			let score_b = match_score(&tokens, &b.name);
			score_b
				.partial_cmp(&score_a)
				.unwrap_or(std::cmp::Ordering::Equal)
				.then(b.references.cmp(&a.references))
				.then(a.name.cmp(&b.name))
		});
		symbols.truncate(limit);
		Ok(symbols)
	}

	pub fn reference_count(&self, id: SymbolId) -> Result<u32> {
		self.with_conn(|conn| {
			let mut stmt = conn.prepare_cached(
				"SELECT COUNT(*) FROM refs WHERE symbol_id = ?1 AND (kind & ?2) != 0",
			)?;
			stmt.query_row(params![id_to_db(id), RefKind::Reference as i32], |row| {
				row.get::<_, i64>(0).map(|n| n as u32)
			})
		})
	}

	pub fn references_of(&self, id: SymbolId, kind_mask: i32) -> Result<Vec<Ref>> {
		self.with_conn(|conn| {
			let mut stmt = conn.prepare_cached(
				"SELECT file, begin_line, begin_col, end_line, end_col, kind, container, \
				 is_cjo, is_super FROM refs WHERE symbol_id = ?1 AND (kind & ?2) != 0",
			)?;
			let rows = stmt.query_map(params![id_to_db(id), kind_mask], |row| ref_from_row(row))?;
			rows.collect()
		})
	}

	pub fn file_references(&self, file: &str, kind_mask: i32) -> Result<Vec<(SymbolId, Ref)>> {
		self.with_conn(|conn| {
			let mut stmt = conn.prepare_cached(
				"SELECT symbol_id, file, begin_line, begin_col, end_line, end_col, kind, \
				 container, is_cjo, is_super FROM refs WHERE file = ?1 AND (kind & ?2) != 0",
			)?;
			let rows = stmt.query_map(params![file, kind_mask], |row| {
				let id = id_from_db(row.get(0)?);
				let reference = Ref {
					location: SymLocation::new(
						row.get::<_, String>(1)?,
						span_from_cols(row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?),
					),
					kind: ref_kind_from_i32(row.get(6)?),
					container: id_from_db(row.get(7)?),
					is_cjo: row.get(8)?,
					is_super: row.get(9)?,
				};
				Ok((id, reference))
			})?;
			rows.collect()
		})
	}

	/// Symbols referred to from within the given container symbol.
	pub fn referred_in(&self, container: SymbolId) -> Result<Vec<(SymbolId, Ref)>> {
		self.with_conn(|conn| {
			let mut stmt = conn.prepare_cached(
				"SELECT symbol_id, file, begin_line, begin_col, end_line, end_col, kind, \
				 container, is_cjo, is_super FROM refs WHERE container = ?1",
			)?;
			let rows = stmt.query_map(params![id_to_db(container)], |row| {
				let id = id_from_db(row.get(0)?);
				let reference = Ref {
					location: SymLocation::new(
						row.get::<_, String>(1)?,
						span_from_cols(row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?),
					),
					kind: ref_kind_from_i32(row.get(6)?),
					container: id_from_db(row.get(7)?),
					is_cjo: row.get(8)?,
					is_super: row.get(9)?,
				};
				Ok((id, reference))
			})?;
			rows.collect()
		})
	}

	/// Relations with the given subject. `Overrides` is synthesized from
	/// stored `OverriddenBy` rows; other kinds also report the reverse
	/// direction so callers see both ends of the edge.
	pub fn relations_of(&self, subject: SymbolId, kind: RelationKind) -> Result<Vec<Relation>> {
		if kind == RelationKind::Overrides {
			return self.with_conn(|conn| {
				let mut stmt = conn.prepare_cached(
					"SELECT subject FROM relations WHERE object = ?1 AND predicate = ?2",
				)?;
				let rows = stmt.query_map(
					params![id_to_db(subject), RelationKind::OverriddenBy as i32],
					|row| {
						Ok(Relation {
							subject,
							predicate: RelationKind::Overrides,
							object: id_from_db(row.get(0)?),
						})
					},
				)?;
				rows.collect()
			});
		}
		let mut out = self.with_conn(|conn| {
			let mut stmt = conn.prepare_cached(
				"SELECT subject, predicate, object FROM relations \
				 WHERE subject = ?1 AND predicate = ?2",
			)?;
			let rows = stmt.query_map(params![id_to_db(subject), kind as i32], |row| {
				relation_from_row(row)
			})?;
			rows.collect::<rusqlite::Result<Vec<Relation>>>()
		})?;
		out.extend(self.relations_to(subject, kind)?);
		Ok(out)
	}

	/// Relations with the given object.
	pub fn relations_to(&self, object: SymbolId, kind: RelationKind) -> Result<Vec<Relation>> {
		self.with_conn(|conn| {
			let mut stmt = conn.prepare_cached(
				"SELECT subject, predicate, object FROM relations \
				 WHERE object = ?1 AND predicate = ?2",
			)?;
			let rows = stmt.query_map(params![id_to_db(object), kind as i32], |row| {
				relation_from_row(row)
			})?;
			rows.collect()
		})
	}

	pub fn extends_of(&self, type_id: SymbolId) -> Result<Vec<ExtendItem>> {
		self.with_conn(|conn| {
			let mut stmt = conn.prepare_cached(
				"SELECT extend_id, member_id, pkg, modifier, interface_name \
				 FROM extends WHERE extend_id = ?1",
			)?;
			let rows = stmt.query_map(params![id_to_db(type_id)], |row| {
				Ok(ExtendItem {
					extend_id: id_from_db(row.get(0)?),
					member_id: id_from_db(row.get(1)?),
					pkg_name: row.get(2)?,
					modifier: row.get::<_, i64>(3)? as u32,
					interface_name: row.get(4)?,
				})
			})?;
			rows.collect()
		})
	}

	/// Fuzzy completion candidates: every UTF-8 char of the prefix followed
	/// by a wildcard, LIKE-matched against completion labels.
	pub fn completions_for_prefix(&self, prefix: &str) -> Result<Vec<(Symbol, CompletionEntry)>> {
		let pattern = fuzzy_like_pattern(prefix);
		self.with_conn(|conn| {
			let mut stmt = conn.prepare_cached(&format!(
				"SELECT {}, completions.label, completions.insert_text FROM completions \
				 JOIN symbols ON symbols.id = completions.symbol_id \
				 WHERE completions.label LIKE ?1",
				sql::SYMBOL_COLUMNS
					.split(", ")
					.map(|c| format!("symbols.{c}"))
					.collect::<Vec<_>>()
					.join(", ")
			))?;
			let rows = stmt.query_map(params![pattern], |row| {
				let sym = symbol_from_row(row)?;
				let entry = CompletionEntry {
					symbol_id: sym.id,
					label: row.get(30)?,
					insert_text: row.get(31)?,
				};
				Ok((sym, entry))
			})?;
			rows.collect()
		})
	}

	pub fn completions_of(&self, id: SymbolId) -> Result<Vec<CompletionEntry>> {
		self.with_conn(|conn| {
			let mut stmt = conn.prepare_cached(
				"SELECT label, insert_text FROM completions WHERE symbol_id = ?1",
			)?;
			let rows = stmt.query_map(params![id_to_db(id)], |row| {
				Ok(CompletionEntry {
					symbol_id: id,
					label: row.get(0)?,
					insert_text: row.get(1)?,
				})
			})?;
			rows.collect()
		})
	}

	pub fn comments_of(&self, id: SymbolId) -> Result<Vec<Comment>> {
		self.with_conn(|conn| {
			let mut stmt = conn.prepare_cached(
				"SELECT style, kind, text FROM comments WHERE symbol_id = ?1",
			)?;
			let rows = stmt.query_map(params![id_to_db(id)], |row| {
				Ok(Comment {
					symbol_id: id,
					style: row.get(0)?,
					kind: row.get(1)?,
					text: row.get(2)?,
				})
			})?;
			rows.collect()
		})
	}

	pub fn cross_symbols(&self, pkg: &str, name: &str) -> Result<Vec<CrossSymbol>> {
		self.with_conn(|conn| {
			let mut stmt = conn.prepare_cached(
				"SELECT pkg, id, name, container_id, container_name, cross_type, file, \
				 begin_line, begin_col, end_line, end_col, \
				 decl_begin_line, decl_begin_col, decl_end_line, decl_end_col \
				 FROM cross_symbols WHERE pkg = ?1 AND name = ?2",
			)?;
			let rows = stmt.query_map(params![pkg, name], |row| cross_symbol_from_row(row))?;
			rows.collect()
		})
	}

	pub fn cross_symbols_of_pkg(&self, pkg: &str) -> Result<Vec<CrossSymbol>> {
		self.with_conn(|conn| {
			let mut stmt = conn.prepare_cached(
				"SELECT pkg, id, name, container_id, container_name, cross_type, file, \
				 begin_line, begin_col, end_line, end_col, \
				 decl_begin_line, decl_begin_col, decl_end_line, decl_end_col \
				 FROM cross_symbols WHERE pkg = ?1",
			)?;
			let rows = stmt.query_map(params![pkg], |row| cross_symbol_from_row(row))?;
			rows.collect()
		})
	}

	pub fn file_digest(&self, path: &str) -> Result<Option<String>> {
		self.with_conn(|conn| {
			let mut stmt = conn.prepare_cached("SELECT digest FROM files WHERE path = ?1")?;
			let mut rows = stmt.query(params![path])?;
			match rows.next()? {
				Some(row) => Ok(Some(row.get(0)?)),
				None => Ok(None),
			}
		})
	}

	pub fn file_row(&self, path: &str) -> Result<Option<FileRow>> {
		self.with_conn(|conn| {
			let mut stmt = conn.prepare_cached(
				"SELECT path, digest, package, module FROM files WHERE path = ?1",
			)?;
			let mut rows = stmt.query(params![path])?;
			match rows.next()? {
				Some(row) => Ok(Some(FileRow {
					path: row.get(0)?,
					digest: row.get(1)?,
					package: row.get(2)?,
					module: row.get(3)?,
				})),
				None => Ok(None),
			}
		})
	}

	pub fn file_exists(&self, path: &str) -> Result<bool> {
		self.with_conn(|conn| {
			let mut stmt =
				conn.prepare_cached("SELECT EXISTS(SELECT 1 FROM files WHERE path = ?1)")?;
			stmt.query_row(params![path], |row| row.get(0))
		})
	}
}

/// Write handle passed to the [`IndexDatabase::update`] callback.
pub struct IndexUpdate<'a> {
	conn: &'a Connection,
}

impl IndexUpdate<'_> {
	pub fn insert_file(&self, file: &FileRow) -> Result<()> {
		let mut stmt = self.conn.prepare_cached(
			"INSERT INTO files (path, digest, package, module) VALUES (?1, ?2, ?3, ?4) \
			 ON CONFLICT(path) DO UPDATE SET digest = ?2, package = ?3, module = ?4",
		)?;
		stmt.execute(params![file.path, file.digest, file.package, file.module])?;
		Ok(())
	}

	/// Removes the file row and every reference recorded in that file, plus
	/// symbols declared there.
	pub fn delete_file(&self, path: &str) -> Result<()> {
		self.conn
			.prepare_cached("DELETE FROM files WHERE path = ?1")?
			.execute(params![path])?;
		self.conn
			.prepare_cached("DELETE FROM refs WHERE file = ?1")?
			.execute(params![path])?;
		self.conn
			.prepare_cached(
				"DELETE FROM completions WHERE symbol_id IN \
				 (SELECT id FROM symbols WHERE decl_file = ?1)",
			)?
			.execute(params![path])?;
		self.conn
			.prepare_cached(
				"DELETE FROM comments WHERE symbol_id IN \
				 (SELECT id FROM symbols WHERE decl_file = ?1)",
			)?
			.execute(params![path])?;
		self.conn
			.prepare_cached(
				"DELETE FROM symbol_tokens WHERE symbol_id IN \
				 (SELECT id FROM symbols WHERE decl_file = ?1)",
			)?
			.execute(params![path])?;
		self.conn
			.prepare_cached("DELETE FROM symbols WHERE decl_file = ?1")?
			.execute(params![path])?;
		Ok(())
	}

	/// Clears every row a package previously contributed; each successful
	/// recompile fully replaces the package's rows.
	pub fn delete_pkg_rows(&self, pkg: &str) -> Result<()> {
		for table in [
			"symbols",
			"refs",
			"relations",
			"completions",
			"comments",
			"extends",
			"cross_symbols",
			"symbol_tokens",
		] {
			self.conn
				.prepare_cached(&format!("DELETE FROM {table} WHERE pkg = ?1"))?
				.execute(params![pkg])?;
		}
		Ok(())
	}

	pub fn insert_symbols(&self, pkg: &str, symbols: &[Symbol]) -> Result<()> {
		for chunk in symbols.chunks(sql::MULTI_INSERT_CHUNK) {
			let mut sql_text = String::from(
				"INSERT OR REPLACE INTO symbols (pkg, id, kind, sub_kind, lang, flags, name, \
				 scope, decl_file, decl_begin_line, decl_begin_col, decl_end_line, decl_end_col, \
				 def_file, def_begin_line, def_begin_col, def_end_line, def_end_col, signature, \
				 return_type, type, modifier, is_deprecated, syscap, cur_module, macro_file, \
				 macro_begin_line, macro_begin_col, macro_end_line, macro_end_col, is_cjo) VALUES ",
			);
			let row_sql = "(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";
			sql_text.push_str(&vec![row_sql; chunk.len()].join(", "));
			let mut stmt = self.conn.prepare(&sql_text)?;
			let mut values: Vec<rusqlite::types::Value> = Vec::with_capacity(chunk.len() * 31);
			for sym in chunk {
				let decl = span_params(sym.declaration.span);
				let def = span_params(sym.definition.span);
				let mac = span_params(sym.macro_call.span);
				values.push(pkg.to_string().into());
				values.push(id_to_db(sym.id).into());
				values.push((sym.kind as i64).into());
				values.push((sym.sub_kind as i64).into());
				values.push((sym.lang as i64).into());
				values.push((sym.flags as i64).into());
				values.push(sym.name.clone().into());
				values.push(sym.scope.clone().into());
				values.push(sym.declaration.file.clone().into());
				values.extend(decl.map(rusqlite::types::Value::from));
				values.push(sym.definition.file.clone().into());
				values.extend(def.map(rusqlite::types::Value::from));
				values.push(sym.signature.clone().into());
				values.push(sym.return_type.clone().into());
				values.push(sym.ty.clone().into());
				values.push((sym.modifier as i64).into());
				values.push((sym.is_deprecated as i64).into());
				values.push(sym.syscap.clone().into());
				values.push(sym.cur_module.clone().into());
				values.push(sym.macro_call.file.clone().into());
				values.extend(mac.map(rusqlite::types::Value::from));
				values.push((sym.is_cjo as i64).into());
			}
			stmt.execute(rusqlite::params_from_iter(values))?;
		}
		// Token rows for the fuzzy matcher.
		for sym in symbols {
			let mut stmt = self.conn.prepare_cached(
				"INSERT INTO symbol_tokens (symbol_id, pkg, token) VALUES (?1, ?2, ?3)",
			)?;
			for token in identifier_tokens(&sym.name) {
				stmt.execute(params![id_to_db(sym.id), pkg, token])?;
			}
		}
		Ok(())
	}

	pub fn insert_references(&self, pkg: &str, refs: &[(SymbolId, Ref)]) -> Result<()> {
		for chunk in refs.chunks(sql::MULTI_INSERT_CHUNK) {
			let mut sql_text = String::from(
				"INSERT INTO refs (symbol_id, pkg, kind, file, begin_line, begin_col, end_line, \
				 end_col, container, is_cjo, is_super) VALUES ",
			);
			let row_sql = "(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";
			sql_text.push_str(&vec![row_sql; chunk.len()].join(", "));
			let mut stmt = self.conn.prepare(&sql_text)?;
			let mut values: Vec<rusqlite::types::Value> = Vec::with_capacity(chunk.len() * 11);
			for (id, reference) in chunk {
				let span = span_params(reference.location.span);
				values.push(id_to_db(*id).into());
				values.push(pkg.to_string().into());
				values.push((reference.kind as i64).into());
				values.push(reference.location.file.clone().into());
				values.extend(span.map(rusqlite::types::Value::from));
				values.push(id_to_db(reference.container).into());
				values.push((reference.is_cjo as i64).into());
				values.push((reference.is_super as i64).into());
			}
			stmt.execute(rusqlite::params_from_iter(values))?;
		}
		Ok(())
	}

	pub fn insert_relations(&self, pkg: &str, relations: &[Relation]) -> Result<()> {
		let mut stmt = self.conn.prepare_cached(
			"INSERT OR IGNORE INTO relations (subject, predicate, object, pkg) \
			 VALUES (?1, ?2, ?3, ?4)",
		)?;
		for relation in relations {
			stmt.execute(params![
				id_to_db(relation.subject),
				relation.predicate as i32,
				id_to_db(relation.object),
				pkg
			])?;
		}
		Ok(())
	}

	pub fn insert_completions(&self, pkg: &str, completions: &[CompletionEntry]) -> Result<()> {
		for chunk in completions.chunks(sql::MULTI_INSERT_CHUNK) {
			let mut sql_text = String::from(
				"INSERT INTO completions (symbol_id, pkg, label, insert_text) VALUES ",
			);
			sql_text.push_str(&vec!["(?, ?, ?, ?)"; chunk.len()].join(", "));
			let mut stmt = self.conn.prepare(&sql_text)?;
			let mut values: Vec<rusqlite::types::Value> = Vec::with_capacity(chunk.len() * 4);
			for entry in chunk {
				values.push(id_to_db(entry.symbol_id).into());
				values.push(pkg.to_string().into());
				values.push(entry.label.clone().into());
				values.push(entry.insert_text.clone().into());
			}
			stmt.execute(rusqlite::params_from_iter(values))?;
		}
		Ok(())
	}

	pub fn insert_comments(&self, pkg: &str, comments: &[Comment]) -> Result<()> {
		let mut stmt = self.conn.prepare_cached(
			"INSERT INTO comments (symbol_id, pkg, style, kind, text) VALUES (?1, ?2, ?3, ?4, ?5)",
		)?;
		for comment in comments {
			stmt.execute(params![
				id_to_db(comment.symbol_id),
				pkg,
				comment.style,
				comment.kind,
				comment.text
			])?;
		}
		Ok(())
	}

	pub fn insert_extends(&self, pkg: &str, extends: &[ExtendItem]) -> Result<()> {
		let mut stmt = self.conn.prepare_cached(
			"INSERT INTO extends (extend_id, member_id, pkg, modifier, interface_name) \
			 VALUES (?1, ?2, ?3, ?4, ?5)",
		)?;
		for item in extends {
			stmt.execute(params![
				id_to_db(item.extend_id),
				id_to_db(item.member_id),
				pkg,
				item.modifier as i64,
				item.interface_name
			])?;
		}
		Ok(())
	}

	pub fn insert_cross_symbols(&self, pkg: &str, cross: &[CrossSymbol]) -> Result<()> {
		let mut stmt = self.conn.prepare_cached(
			"INSERT INTO cross_symbols (pkg, id, name, container_id, container_name, cross_type, \
			 file, begin_line, begin_col, end_line, end_col, decl_begin_line, decl_begin_col, \
			 decl_end_line, decl_end_col) \
			 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
		)?;
		for crs in cross {
			let span = span_params(crs.location.span);
			let decl = span_params(crs.declaration);
			stmt.execute(params![
				pkg,
				id_to_db(crs.id),
				crs.name,
				id_to_db(crs.container),
				crs.container_name,
				crs.cross_type,
				crs.location.file,
				span[0],
				span[1],
				span[2],
				span[3],
				decl[0],
				decl[1],
				decl[2],
				decl[3]
			])?;
		}
		Ok(())
	}
}

// ---- helpers ----

fn open_connection(path: &Path, opts: IndexDbOptions) -> Result<Connection> {
	let conn = if opts.in_memory {
		Connection::open_in_memory()?
	} else {
		let flags = if opts.read_only {
			OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI
		} else {
			OpenFlags::SQLITE_OPEN_READ_WRITE
				| OpenFlags::SQLITE_OPEN_CREATE
				| OpenFlags::SQLITE_OPEN_URI
		};
		Connection::open_with_flags(path, flags)?
	};
	conn.execute_batch(sql::PREPARE_CONNECTION)?;
	conn.busy_timeout(Duration::from_secs(5))?;
	Ok(conn)
}

fn pragma_i32(conn: &Connection, name: &str) -> Result<i32> {
	Ok(conn.query_row(&format!("PRAGMA {name}"), [], |row| row.get(0))?)
}

fn create_schema(conn: &Connection) -> Result<()> {
	conn.execute_batch(sql::CREATE_SCHEMA)?;
	conn.execute_batch(&format!(
		"PRAGMA application_id = {};\nPRAGMA user_version = {};",
		sql::DATABASE_MAGIC,
		sql::DATABASE_VERSION
	))?;
	Ok(())
}

fn run_upgrade(conn: &Connection, mut version: i32) {
	if let Some(start) = sql::UPGRADES.iter().position(|(from, _)| *from == version) {
		for (from, migration) in &sql::UPGRADES[start..] {
			tracing::info!(from, "applying index schema migration");
			if let Err(e) = conn.execute_batch(migration) {
				tracing::error!(error = %e, from, "schema migration failed");
				break;
			}
			version = pragma_i32(conn, "user_version").unwrap_or(version);
		}
	}
	if version != sql::DATABASE_VERSION {
		// No ladder to the current version: drop and recreate.
		tracing::warn!(
			have = version,
			want = sql::DATABASE_VERSION,
			"no migration path; recreating index schema"
		);
		let recreate = || -> Result<()> {
			conn.execute_batch("BEGIN")?;
			let result = conn
				.execute_batch(sql::DROP_SCHEMA)
				.and_then(|()| conn.execute_batch(sql::CREATE_SCHEMA));
			match result {
				Ok(()) => conn.execute_batch("COMMIT")?,
				Err(e) => {
					let _ = conn.execute_batch("ROLLBACK");
					return Err(e.into());
				}
			}
			conn.execute_batch(&format!(
				"PRAGMA application_id = {};\nPRAGMA user_version = {};",
				sql::DATABASE_MAGIC,
				sql::DATABASE_VERSION
			))?;
			Ok(())
		};
		if let Err(e) = recreate() {
			tracing::error!(error = %e, "index schema recreate failed");
		}
	}
}

fn is_busy(e: &rusqlite::Error) -> bool {
	matches!(
		e,
		rusqlite::Error::SqliteFailure(err, _)
			if err.code == rusqlite::ErrorCode::DatabaseBusy
				|| err.code == rusqlite::ErrorCode::DatabaseLocked
	)
}

fn ref_kind_from_i32(value: i32) -> RefKind {
	match value {
		1 => RefKind::Declaration,
		2 => RefKind::Definition,
		8 => RefKind::Call,
		_ => RefKind::Reference,
	}
}

fn ref_from_row(row: &Row<'_>) -> rusqlite::Result<Ref> {
	Ok(Ref {
		location: SymLocation::new(
			row.get::<_, String>(0)?,
			span_from_cols(row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?),
		),
		kind: ref_kind_from_i32(row.get(5)?),
		container: id_from_db(row.get(6)?),
		is_cjo: row.get(7)?,
		is_super: row.get(8)?,
	})
}

fn relation_from_row(row: &Row<'_>) -> rusqlite::Result<Relation> {
	Ok(Relation {
		subject: id_from_db(row.get(0)?),
		predicate: RelationKind::from_i32(row.get(1)?),
		object: id_from_db(row.get(2)?),
	})
}

fn cross_symbol_from_row(row: &Row<'_>) -> rusqlite::Result<CrossSymbol> {
	Ok(CrossSymbol {
		pkg: row.get(0)?,
		id: id_from_db(row.get(1)?),
		name: row.get(2)?,
		container: id_from_db(row.get(3)?),
		container_name: row.get(4)?,
		cross_type: row.get(5)?,
		location: SymLocation::new(
			row.get::<_, String>(6)?,
			span_from_cols(row.get(7)?, row.get(8)?, row.get(9)?, row.get(10)?),
		),
		declaration: span_from_cols(row.get(11)?, row.get(12)?, row.get(13)?, row.get(14)?),
	})
}

/// Column order follows [`sql::SYMBOL_COLUMNS`].
fn symbol_from_row(row: &Row<'_>) -> rusqlite::Result<Symbol> {
	Ok(Symbol {
		id: id_from_db(row.get(0)?),
		kind: row.get(1)?,
		sub_kind: row.get(2)?,
		lang: row.get(3)?,
		flags: row.get(4)?,
		name: row.get(5)?,
		scope: row.get(6)?,
		declaration: SymLocation::new(
			row.get::<_, String>(7)?,
			span_from_cols(row.get(8)?, row.get(9)?, row.get(10)?, row.get(11)?),
		),
		definition: SymLocation::new(
			row.get::<_, String>(12)?,
			span_from_cols(row.get(13)?, row.get(14)?, row.get(15)?, row.get(16)?),
		),
		signature: row.get(17)?,
		return_type: row.get(18)?,
		ty: row.get(19)?,
		modifier: row.get::<_, i64>(20)? as u32,
		is_deprecated: row.get(21)?,
		syscap: row.get(22)?,
		cur_module: row.get(23)?,
		macro_call: SymLocation::new(
			row.get::<_, String>(24)?,
			span_from_cols(row.get(25)?, row.get(26)?, row.get(27)?, row.get(28)?),
		),
		is_cjo: row.get(29)?,
		references: 0,
	})
}

/// Splits an identifier (or query) into lowercase sub-tokens on case and
/// separator boundaries: `parseJsonFile` -> `parse`, `json`, `file`.
pub fn identifier_tokens(identifier: &str) -> Vec<String> {
	let mut tokens = Vec::new();
	let mut current = String::new();
	let mut prev_lower = false;
	for ch in identifier.chars() {
		if !ch.is_alphanumeric() {
			if !current.is_empty() {
				tokens.push(std::mem::take(&mut current));
			}
			prev_lower = false;
			continue;
		}
		if ch.is_uppercase() && prev_lower && !current.is_empty() {
			tokens.push(std::mem::take(&mut current));
		}
		current.extend(ch.to_lowercase());
		prev_lower = ch.is_lowercase() || ch.is_numeric();
	}
	if !current.is_empty() {
		tokens.push(current);
	}
	tokens
}

/// `Map` -> `M%a%p%`: every UTF-8 char of the prefix followed by `%`.
pub fn fuzzy_like_pattern(prefix: &str) -> String {
	let mut out = String::with_capacity(prefix.len() * 2);
	for ch in prefix.chars() {
		out.push(ch);
		out.push('%');
	}
	out
}

fn match_score(query_tokens: &[String], name: &str) -> f64 {
	let name_tokens = identifier_tokens(name);
	if name_tokens.is_empty() {
		return 0.0;
	}
	let mut matched = 0usize;
	for q in query_tokens {
		if name_tokens.iter().any(|t| t.starts_with(q.as_str())) {
			matched += q.len();
		}
	}
	let total: usize = name_tokens.iter().map(|t| t.len()).sum();
	matched as f64 / total.max(1) as f64
}
