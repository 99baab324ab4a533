//! Every failure is fatal for a run: the schema is fixed and the tool re-invoked.
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Coarse classification used by callers and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The schema resource is missing or structurally unparsable.
    SchemaLoad,
    /// A name in the schema does not resolve to a declared node, field or type.
    SchemaReference,
    /// The schema is well-formed but cannot be emitted consistently.
    EmissionInvariant,
    /// The generated artifact could not be persisted.
    Output,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to read schema `{}`: {source}", path.display())]
    SchemaRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse schema `{}` at {location}: {message}", path.display())]
    SchemaParse {
        path: PathBuf,
        location: String,
        message: String,
    },

    /// A schema entry has the wrong structure (bad key value, bad type expression, ...).
    #[error("schema entry `{node}`: {message}")]
    SchemaShape { node: String, message: String },

    #[error("`{node}` refers to undeclared {what} `{name}`")]
    UnknownReference {
        node: String,
        what: &'static str,
        name: String,
    },

    #[error("`{node}` refers to `{name}`: {message}")]
    BadReference {
        node: String,
        name: String,
        message: String,
    },

    #[error("`{node}`: {message}")]
    Invariant { node: String, message: String },

    #[error("cannot access output `{}`: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::SchemaRead { .. } | Error::SchemaParse { .. } | Error::SchemaShape { .. } => {
                ErrorKind::SchemaLoad
            }
            Error::UnknownReference { .. } | Error::BadReference { .. } => {
                ErrorKind::SchemaReference
            }
            Error::Invariant { .. } => ErrorKind::EmissionInvariant,
            Error::Write { .. } => ErrorKind::Output,
        }
    }

    pub(crate) fn shape(node: impl Into<String>, message: impl Into<String>) -> Self {
        Error::SchemaShape { node: node.into(), message: message.into() }
    }

    pub(crate) fn invariant(node: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Invariant { node: node.into(), message: message.into() }
    }

    pub(crate) fn bad_reference(
        node: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::BadReference { node: node.into(), name: name.into(), message: message.into() }
    }
}
