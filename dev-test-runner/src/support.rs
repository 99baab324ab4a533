use crate::ast::NodeId;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

pub trait HasId {
    fn id(&self) -> NodeId;
}

pub trait Spanned {
    fn span(&self) -> Span;
}

/// Elements plus the separators between them.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommaSeparated<T> {
    pub inner: Vec<T>,
    pub commas: Vec<Span>,
}

impl<T> CommaSeparated<T> {
    pub fn new(inner: Vec<T>) -> Self {
        Self { inner, commas: Vec::new() }
    }
}
