//! Feature handlers: stateless query algorithms over the current snapshot.
//!
//! Every handler resolves the file through the project, schedules an action
//! on a named pool, and inspects AST + index inside the action. Handlers
//! never retain snapshots past the action.

pub mod breakpoints;
pub mod code_actions;
pub mod code_lens;
pub mod completion;
pub mod cross_language;
pub mod definition;
pub mod diagnostics;
pub mod document_link;
pub mod file_refactor;
pub mod hierarchy;
pub mod highlight;
pub mod hover;
pub mod override_methods;
pub mod references;
pub mod rename;
pub mod semantic_tokens;
pub mod signature;
pub mod symbols;
