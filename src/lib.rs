//! Schema-driven generator for AST node types and their polymorphic view.
//!
//! ```text
//! meta/ast.yaml ──load──▶ Schema ──check──▶ derive (per kind) ──▶ view ──▶ generated.rs
//! ```
pub mod cli;
pub mod codegen;
pub mod config;
pub mod derive;
pub mod error;
pub mod naming;
pub mod path_de;
pub mod schema;
pub mod ty;
pub mod view;

pub use codegen::{Outcome, generate, run};
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use schema::Schema;
