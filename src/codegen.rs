//! Emitter: assembles the artifact in memory, then persists it in one write.
//!
//! Output order is fixed: header, prelude, then for every kind in declaration
//! order its guarded definition, identity impl and position impl; then the
//! global union, its inherent operations and the per-kind conversions. The
//! union and its operations name kinds that are already declared above them.
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::Config;
use crate::derive::{self, Positions};
use crate::error::{Error, Result};
use crate::naming;
use crate::schema::{FeatureGate, Schema, check};
use crate::ty::POSITION_TRAIT;
use crate::view;

/// Indentation-aware source writer.
#[derive(Debug, Default)]
pub struct Codegen {
    out: String,
    depth: usize,
}

impl Codegen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if text.is_empty() {
            self.out.push('\n');
            return;
        }
        for _ in 0..self.depth {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    /// Write `text` (ending in `{`) and indent what follows.
    pub fn open(&mut self, text: impl AsRef<str>) {
        self.line(text);
        self.depth += 1;
    }

    /// Dedent and write `text` (normally `}` or `},`).
    pub fn close(&mut self, text: impl AsRef<str>) {
        self.depth = self.depth.saturating_sub(1);
        self.line(text);
    }

    /// Dedent, write `text` (like `} else {`), indent again.
    pub fn reopen(&mut self, text: impl AsRef<str>) {
        self.close(text);
        self.depth += 1;
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    /// The `#[cfg(...)]` line for `gate`, if any.
    pub fn gate(&mut self, gate: Option<&FeatureGate>) {
        if let Some(gate) = gate {
            self.line(gate.cfg_attr());
        }
    }

    pub fn into_string(self) -> String {
        self.out
    }
}

/// Prelude items whose names the schema does not define itself.
fn effective_imports<'c>(schema: &Schema, config: &'c Config) -> Vec<&'c str> {
    let mut out: Vec<&str> = Vec::new();
    for import in &config.imports {
        let import = import.as_str();
        if schema.resolve(naming::last_segment(import)).is_empty() && !out.contains(&import) {
            out.push(import);
        }
    }
    out
}

/// Check `schema` and render the whole artifact.
pub fn generate(schema: &Schema, config: &Config) -> Result<String> {
    let imports = effective_imports(schema, config);
    let prelude: Vec<&str> = imports.iter().map(|import| naming::last_segment(import)).collect();
    check::check(schema, &prelude)?;

    // Every plan is built before the first line is written; a failure leaves nothing behind.
    let positions = Positions::analyze(schema);
    if let Some(first) = schema.nodes.values().find(|def| positions.is_positioned(&def.name)) {
        if !prelude.contains(&POSITION_TRAIT) && schema.resolve(POSITION_TRAIT).is_empty() {
            return Err(Error::UnknownReference {
                node: first.name.clone(),
                what: "trait",
                name: POSITION_TRAIT.to_string(),
            });
        }
    }
    let kinds = schema
        .nodes
        .values()
        .map(|def| derive::derive_kind(schema, &positions, def, config.strict_spans))
        .collect::<Result<Vec<_>>>()?;
    let view = view::plan(schema, &positions)?;

    let mut cg = Codegen::new();
    cg.line(format!(
        "// This file is generated by astgen from {}.",
        config.schema_path.display()
    ));
    cg.line("// Do not make modifications to this file directly.");
    cg.blank();
    for import in &imports {
        cg.line(format!("use {import};"));
    }
    cg.line("use std::ptr::NonNull;");
    cg.blank();

    for kind in &kinds {
        derive::render_kind(schema, kind, &mut cg);
    }
    view::render(&view, &mut cg);

    info!(kinds = kinds.len(), participating = view.kinds.len(), "generated AST source");
    Ok(cg.into_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Written { path: PathBuf, bytes: usize },
    UpToDate { path: PathBuf },
    Stale { path: PathBuf },
}

/// Load, generate, then write (or compare, in check mode).
pub fn run(config: &Config, check_only: bool) -> Result<Outcome> {
    let schema = Schema::load(&config.schema_path)?;
    let source = generate(&schema, config)?;
    let path = config.out_path.clone();

    if check_only {
        let current = match std::fs::read_to_string(&path) {
            Ok(current) => Some(current),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(source) => return Err(Error::Write { path, source }),
        };
        return Ok(if current.as_deref() == Some(source.as_str()) {
            Outcome::UpToDate { path }
        } else {
            Outcome::Stale { path }
        });
    }

    write_atomic(&path, &source)?;
    info!(path = %path.display(), "wrote generated source");
    Ok(Outcome::Written { path, bytes: source.len() })
}

/// Write through a temporary file in the target directory, then rename over `path`.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let write_error = |source: std::io::Error| Error::Write { path: path.to_path_buf(), source };
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(write_error)?;
    let mut file = tempfile::NamedTempFile::new_in(&parent).map_err(write_error)?;
    file.write_all(contents.as_bytes()).map_err(write_error)?;
    file.persist(path).map_err(|err| write_error(err.error))?;
    Ok(())
}
