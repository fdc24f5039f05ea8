//! Persistent symbol index.
//!
//! The store keeps eight logical tables (symbols, references, relations,
//! completions, comments, extends, cross-language symbols, files) in one
//! sqlite database. Writers batch through a single transactional update
//! path; readers get typed queries with busy-retry. The collector derives a
//! package's rows from its compiled snapshot, and a package's rows are
//! always replaced whole.

mod collector;
mod db;
mod model;
mod sql;

pub use collector::{CollectedPackage, collect_package};
pub use db::{IndexDatabase, IndexDbOptions, IndexUpdate, fuzzy_like_pattern, identifier_tokens};
pub use model::{
	Comment, CompletionEntry, CrossSymbol, ExtendItem, FileRow, Ref, RefKind, Relation,
	RelationKind, SymLocation, Symbol, SymbolLang, kind_from_i32, kind_to_i32,
};
pub use sql::{DATABASE_MAGIC, DATABASE_VERSION, MULTI_INSERT_CHUNK};

/// Index-store errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("sqlite error: {0}")]
	Sqlite(#[from] rusqlite::Error),

	#[error("schema mismatch: {0}")]
	SchemaMismatch(String),

	#[error("database is read-only")]
	ReadOnly,

	#[error("{0}")]
	Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
	use cjls_frontend::{Span, symbol_id_of};
	use cjls_worker::ShutdownFlag;
	use pretty_assertions::assert_eq;

	use super::*;

	fn memory_db() -> IndexDatabase {
		IndexDatabase::open(
			":memory:",
			IndexDbOptions {
				in_memory: true,
				..Default::default()
			},
			ShutdownFlag::new(),
		)
		.expect("open in-memory index")
	}

	fn sample_symbol(export_id: &str, name: &str) -> Symbol {
		Symbol {
			id: symbol_id_of(export_id),
			kind: kind_to_i32(cjls_frontend::DeclKind::Func),
			name: name.to_string(),
			scope: "p:".to_string(),
			declaration: SymLocation::new("/p/a.cj", Span::default()),
			definition: SymLocation::new("/p/a.cj", Span::default()),
			signature: format!("func {name}()"),
			cur_module: "mod".into(),
			..Symbol::default()
		}
	}

	#[test]
	fn symbol_round_trips_by_id() {
		let db = memory_db();
		let sym = sample_symbol("p.f", "f");
		db.update(|tx| tx.insert_symbols("p", std::slice::from_ref(&sym)))
			.unwrap();
		let loaded = db.symbol_by_id(sym.id).unwrap().expect("symbol stored");
		assert_eq!(loaded.id, sym.id);
		assert_eq!(loaded.name, sym.name);
		assert_eq!(loaded.scope, sym.scope);
		assert_eq!(loaded.signature, sym.signature);
		assert_eq!(loaded.declaration, sym.declaration);
	}

	#[test]
	fn failed_update_rolls_back_everything() {
		let db = memory_db();
		let sym = sample_symbol("p.g", "g");
		let result = db.update(|tx| {
			tx.insert_symbols("p", std::slice::from_ref(&sym))?;
			Err(Error::Other("boom".into()))
		});
		assert!(result.is_err());
		assert!(db.symbol_by_id(sym.id).unwrap().is_none());

		// And a successful update makes everything visible at once.
		db.update(|tx| tx.insert_symbols("p", std::slice::from_ref(&sym)))
			.unwrap();
		assert!(db.symbol_by_id(sym.id).unwrap().is_some());
	}

	#[test]
	fn overrides_are_synthesized_from_overridden_by() {
		let db = memory_db();
		let base = symbol_id_of("p.Base.m");
		let derived = symbol_id_of("p.Derived.m");
		db.update(|tx| {
			tx.insert_relations(
				"p",
				&[Relation {
					subject: base,
					predicate: RelationKind::OverriddenBy,
					object: derived,
				}],
			)
		})
		.unwrap();
		let overrides = db.relations_of(derived, RelationKind::Overrides).unwrap();
		assert_eq!(overrides.len(), 1);
		assert_eq!(overrides[0].subject, derived);
		assert_eq!(overrides[0].object, base);
		// The stored direction is still queryable.
		let stored = db.relations_of(base, RelationKind::OverriddenBy).unwrap();
		assert!(stored.iter().any(|r| r.object == derived));
	}

	#[test]
	fn pkg_rows_are_replaced_whole() {
		let db = memory_db();
		let old_sym = sample_symbol("p.old", "old");
		db.update(|tx| {
			tx.insert_symbols("p", std::slice::from_ref(&old_sym))?;
			tx.insert_references(
				"p",
				&[(
					old_sym.id,
					Ref {
						location: SymLocation::new("/p/a.cj", Span::default()),
						kind: RefKind::Reference,
						container: 0,
						is_cjo: false,
						is_super: false,
					},
				)],
			)
		})
		.unwrap();
		let new_sym = sample_symbol("p.new", "new");
		db.update(|tx| {
			tx.delete_pkg_rows("p")?;
			tx.insert_symbols("p", std::slice::from_ref(&new_sym))
		})
		.unwrap();
		assert!(db.symbol_by_id(old_sym.id).unwrap().is_none());
		assert!(db.symbol_by_id(new_sym.id).unwrap().is_some());
		assert!(db.references_of(old_sym.id, RefKind::ALL).unwrap().is_empty());
	}

	#[test]
	fn bulk_insert_crosses_the_chunk_boundary() {
		let db = memory_db();
		let symbols: Vec<Symbol> = (0..MULTI_INSERT_CHUNK * 2 + 7)
			.map(|i| sample_symbol(&format!("p.f{i}"), &format!("f{i}")))
			.collect();
		db.update(|tx| tx.insert_symbols("p", &symbols)).unwrap();
		let all = db.pkg_symbols("p").unwrap();
		assert_eq!(all.len(), symbols.len());
	}

	#[test]
	fn matching_symbols_rank_and_carry_reference_counts() {
		let db = memory_db();
		let exact = sample_symbol("p.parse", "parse");
		let longer = sample_symbol("p.parseJsonFile", "parseJsonFile");
		db.update(|tx| {
			tx.insert_symbols("p", &[exact.clone(), longer.clone()])?;
			tx.insert_references(
				"p",
				&[(
					exact.id,
					Ref {
						location: SymLocation::new("/p/b.cj", Span::default()),
						kind: RefKind::Reference,
						container: 0,
						is_cjo: false,
						is_super: false,
					},
				)],
			)
		})
		.unwrap();
		let results = db.matching_symbols("parse", None, 10).unwrap();
		assert_eq!(results.len(), 2);
		// Exact token match outranks the partial one and carries its count.
		assert_eq!(results[0].name, "parse");
		assert_eq!(results[0].references, 1);
	}

	#[test]
	fn identifier_tokens_split_camel_and_snake() {
		assert_eq!(identifier_tokens("parseJsonFile"), vec!["parse", "json", "file"]);
		assert_eq!(identifier_tokens("snake_case_name"), vec!["snake", "case", "name"]);
		assert_eq!(identifier_tokens("HTTPServer"), vec!["httpserver"]);
	}

	#[test]
	fn fuzzy_pattern_wildcards_every_char() {
		assert_eq!(fuzzy_like_pattern("Map"), "M%a%p%");
	}

	#[test]
	fn completion_prefix_query_joins_symbols() {
		let db = memory_db();
		let sym = sample_symbol("p.hashMap", "hashMap");
		db.update(|tx| {
			tx.insert_symbols("p", std::slice::from_ref(&sym))?;
			tx.insert_completions(
				"p",
				&[CompletionEntry {
					symbol_id: sym.id,
					label: "hashMap".into(),
					insert_text: "hashMap()".into(),
				}],
			)
		})
		.unwrap();
		let hits = db.completions_for_prefix("hMap").unwrap();
		assert_eq!(hits.len(), 1);
		assert_eq!(hits[0].1.insert_text, "hashMap()");
	}

	#[test]
	fn delete_file_drops_its_rows() {
		let db = memory_db();
		let sym = sample_symbol("p.f", "f");
		db.update(|tx| {
			tx.insert_file(&FileRow {
				path: "/p/a.cj".into(),
				digest: "d1".into(),
				package: "p".into(),
				module: "mod".into(),
			})?;
			tx.insert_symbols("p", std::slice::from_ref(&sym))
		})
		.unwrap();
		assert!(db.file_exists("/p/a.cj").unwrap());
		db.update(|tx| tx.delete_file("/p/a.cj")).unwrap();
		assert!(!db.file_exists("/p/a.cj").unwrap());
		assert!(db.symbol_by_id(sym.id).unwrap().is_none());
	}

	#[test]
	fn on_disk_database_persists_and_validates_magic() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("index.db");
		let sym = sample_symbol("p.f", "f");
		{
			let db = IndexDatabase::open(
				&path,
				IndexDbOptions::default(),
				ShutdownFlag::new(),
			)
			.unwrap();
			db.update(|tx| tx.insert_symbols("p", std::slice::from_ref(&sym)))
				.unwrap();
		}
		let db =
			IndexDatabase::open(&path, IndexDbOptions::default(), ShutdownFlag::new()).unwrap();
		assert!(db.symbol_by_id(sym.id).unwrap().is_some());

		// A foreign sqlite file is rejected by the application-id check.
		let foreign = dir.path().join("foreign.db");
		{
			let conn = rusqlite::Connection::open(&foreign).unwrap();
			conn.execute_batch("CREATE TABLE t (x); PRAGMA application_id = 1;")
				.unwrap();
		}
		let err = IndexDatabase::open(&foreign, IndexDbOptions::default(), ShutdownFlag::new());
		assert!(matches!(err, Err(Error::SchemaMismatch(_))));
	}
}
