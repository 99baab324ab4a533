use std::path::PathBuf;

pub const DEFAULT_SCHEMA_PATH: &str = "meta/ast.yaml";
pub const DEFAULT_OUT_PATH: &str = "src/generated.rs";

/// Prelude the generated file imports unless told otherwise.
pub const DEFAULT_IMPORTS: &[&str] = &[
    "crate::HasId",
    "crate::utils::CommaSeparated",
    "pxp_span::Span",
    "pxp_span::Spanned",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub schema_path: PathBuf,
    pub out_path: PathBuf,
    /// `use` paths emitted at the top of the artifact. Their last segments are
    /// the type names the schema may use without declaring them.
    pub imports: Vec<String>,
    /// Reject sum variants with no derivable position instead of emitting
    /// an explicit `Span::default()` arm.
    pub strict_spans: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_path: PathBuf::from(DEFAULT_SCHEMA_PATH),
            out_path: PathBuf::from(DEFAULT_OUT_PATH),
            imports: DEFAULT_IMPORTS.iter().map(|s| s.to_string()).collect(),
            strict_spans: false,
        }
    }
}

impl Config {
    pub fn with_paths(schema_path: impl Into<PathBuf>, out_path: impl Into<PathBuf>) -> Self {
        Self {
            schema_path: schema_path.into(),
            out_path: out_path.into(),
            ..Self::default()
        }
    }

    pub fn with_imports<I, S>(mut self, imports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.imports = imports.into_iter().map(Into::into).collect();
        self
    }

    pub fn strict_spans(mut self, strict: bool) -> Self {
        self.strict_spans = strict;
        self
    }
}
