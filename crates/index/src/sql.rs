//! Schema and statement text for the index database.

/// `PRAGMA application_id` magic: "CJLS".
pub const DATABASE_MAGIC: i32 = 0x434A_4C53;

/// Bumped on every schema change.
pub const DATABASE_VERSION: i32 = 4;

/// Rows per multi-row INSERT; amortizes statement overhead on bulk writes.
pub const MULTI_INSERT_CHUNK: usize = 50;

/// Connection preamble, applied to every new connection.
pub const PREPARE_CONNECTION: &str = "\
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA temp_store = MEMORY;
";

pub const CREATE_SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS files (
	file_id INTEGER PRIMARY KEY AUTOINCREMENT,
	path TEXT NOT NULL UNIQUE,
	digest TEXT NOT NULL,
	package TEXT NOT NULL,
	module TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS files_package ON files (package);

CREATE TABLE IF NOT EXISTS symbols (
	id INTEGER PRIMARY KEY,
	pkg TEXT NOT NULL,
	kind INTEGER NOT NULL,
	sub_kind INTEGER NOT NULL DEFAULT 0,
	lang INTEGER NOT NULL DEFAULT 0,
	flags INTEGER NOT NULL DEFAULT 0,
	name TEXT NOT NULL,
	scope TEXT NOT NULL,
	decl_file TEXT NOT NULL,
	decl_begin_line INTEGER, decl_begin_col INTEGER,
	decl_end_line INTEGER, decl_end_col INTEGER,
	def_file TEXT NOT NULL,
	def_begin_line INTEGER, def_begin_col INTEGER,
	def_end_line INTEGER, def_end_col INTEGER,
	signature TEXT NOT NULL DEFAULT '',
	return_type TEXT NOT NULL DEFAULT '',
	type TEXT NOT NULL DEFAULT '',
	modifier INTEGER NOT NULL DEFAULT 0,
	is_deprecated INTEGER NOT NULL DEFAULT 0,
	syscap TEXT NOT NULL DEFAULT '',
	cur_module TEXT NOT NULL DEFAULT '',
	macro_file TEXT NOT NULL DEFAULT '',
	macro_begin_line INTEGER DEFAULT 0, macro_begin_col INTEGER DEFAULT 0,
	macro_end_line INTEGER DEFAULT 0, macro_end_col INTEGER DEFAULT 0,
	is_cjo INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS symbols_name ON symbols (name);
CREATE INDEX IF NOT EXISTS symbols_pkg ON symbols (pkg);
CREATE INDEX IF NOT EXISTS symbols_scope ON symbols (scope);

CREATE TABLE IF NOT EXISTS refs (
	symbol_id INTEGER NOT NULL,
	pkg TEXT NOT NULL,
	kind INTEGER NOT NULL,
	file TEXT NOT NULL,
	begin_line INTEGER, begin_col INTEGER,
	end_line INTEGER, end_col INTEGER,
	container INTEGER NOT NULL DEFAULT 0,
	is_cjo INTEGER NOT NULL DEFAULT 0,
	is_super INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS refs_symbol ON refs (symbol_id);
CREATE INDEX IF NOT EXISTS refs_file ON refs (file);
CREATE INDEX IF NOT EXISTS refs_pkg ON refs (pkg);

CREATE TABLE IF NOT EXISTS relations (
	subject INTEGER NOT NULL,
	predicate INTEGER NOT NULL,
	object INTEGER NOT NULL,
	pkg TEXT NOT NULL,
	UNIQUE (subject, predicate, object)
);
CREATE INDEX IF NOT EXISTS relations_subject ON relations (subject, predicate);
CREATE INDEX IF NOT EXISTS relations_object ON relations (object, predicate);
CREATE INDEX IF NOT EXISTS relations_pkg ON relations (pkg);

CREATE TABLE IF NOT EXISTS completions (
	symbol_id INTEGER NOT NULL,
	pkg TEXT NOT NULL,
	label TEXT NOT NULL,
	insert_text TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS completions_symbol ON completions (symbol_id);
CREATE INDEX IF NOT EXISTS completions_label ON completions (label);
CREATE INDEX IF NOT EXISTS completions_pkg ON completions (pkg);

CREATE TABLE IF NOT EXISTS comments (
	symbol_id INTEGER NOT NULL,
	pkg TEXT NOT NULL,
	style INTEGER NOT NULL DEFAULT 0,
	kind INTEGER NOT NULL DEFAULT 0,
	text TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS comments_symbol ON comments (symbol_id);
CREATE INDEX IF NOT EXISTS comments_pkg ON comments (pkg);

CREATE TABLE IF NOT EXISTS extends (
	extend_id INTEGER NOT NULL,
	member_id INTEGER NOT NULL,
	pkg TEXT NOT NULL,
	modifier INTEGER NOT NULL DEFAULT 0,
	interface_name TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS extends_target ON extends (extend_id);
CREATE INDEX IF NOT EXISTS extends_pkg ON extends (pkg);

CREATE TABLE IF NOT EXISTS cross_symbols (
	pkg TEXT NOT NULL,
	id INTEGER NOT NULL,
	name TEXT NOT NULL,
	container_id INTEGER NOT NULL DEFAULT 0,
	container_name TEXT NOT NULL DEFAULT '',
	cross_type INTEGER NOT NULL DEFAULT 0,
	file TEXT NOT NULL,
	begin_line INTEGER, begin_col INTEGER,
	end_line INTEGER, end_col INTEGER,
	decl_begin_line INTEGER, decl_begin_col INTEGER,
	decl_end_line INTEGER, decl_end_col INTEGER
);
CREATE INDEX IF NOT EXISTS cross_symbols_name ON cross_symbols (pkg, name);

CREATE TABLE IF NOT EXISTS symbol_tokens (
	symbol_id INTEGER NOT NULL,
	pkg TEXT NOT NULL,
	token TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS symbol_tokens_token ON symbol_tokens (token);
CREATE INDEX IF NOT EXISTS symbol_tokens_pkg ON symbol_tokens (pkg);
";

pub const DROP_SCHEMA: &str = "\
DROP TABLE IF EXISTS files;
DROP TABLE IF EXISTS symbols;
DROP TABLE IF EXISTS refs;
DROP TABLE IF EXISTS relations;
DROP TABLE IF EXISTS completions;
DROP TABLE IF EXISTS comments;
DROP TABLE IF EXISTS extends;
DROP TABLE IF EXISTS cross_symbols;
DROP TABLE IF EXISTS symbol_tokens;
";

/// Migration ladder: (from_version, sql). Applying an entry must leave
/// `user_version` at the next rung. A version with no entry falls through to
/// drop-and-recreate.
pub const UPGRADES: &[(i32, &str)] = &[
	// v3 -> v4: per-package replacement keys on refs/relations/completions.
	(
		3,
		"ALTER TABLE refs ADD COLUMN is_super INTEGER NOT NULL DEFAULT 0;\n\
		 PRAGMA user_version = 4;",
	),
];

pub const SYMBOL_COLUMNS: &str = "\
id, kind, sub_kind, lang, flags, name, scope, \
decl_file, decl_begin_line, decl_begin_col, decl_end_line, decl_end_col, \
def_file, def_begin_line, def_begin_col, def_end_line, def_end_col, \
signature, return_type, type, modifier, is_deprecated, syscap, cur_module, \
macro_file, macro_begin_line, macro_begin_col, macro_end_line, macro_end_col, is_cjo";
