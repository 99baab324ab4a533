//! Minimal CLI: schema → generated AST source
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use colored::Colorize;

use crate::codegen::{self, Outcome};
use crate::config::{Config, DEFAULT_OUT_PATH, DEFAULT_SCHEMA_PATH};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// generate AST node types, identity/position accessors and the `NodeKind` view from a YAML schema
#[derive(Parser, Debug)]
pub struct CommandLineInterface {
    /// schema file (.yaml, or .json)
    #[arg(long, default_value = DEFAULT_SCHEMA_PATH)]
    schema: PathBuf,

    /// output .rs file
    #[arg(short, long, default_value = DEFAULT_OUT_PATH)]
    out: PathBuf,

    /// `use` path for the generated file's prelude; repeat to give several.
    /// Replaces the default prelude.
    #[arg(long = "import", value_name = "PATH")]
    imports: Vec<String>,

    /// fail on sum variants with no derivable position instead of emitting `Span::default()`
    #[arg(long, default_value_t = false)]
    strict_spans: bool,

    /// compare against the existing output instead of writing it; fails when stale
    #[arg(long, default_value_t = false)]
    check: bool,

    /// debugging
    #[arg(long)]
    no_op: bool,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn config(&self) -> Config {
        let config = Config::with_paths(&self.schema, &self.out).strict_spans(self.strict_spans);
        if self.imports.is_empty() {
            config
        } else {
            config.with_imports(self.imports.iter().cloned())
        }
    }

    pub fn run(&self) -> anyhow::Result<()> {
        // debug path
        if self.no_op {
            eprintln!("{self:#?}");
            return Ok(());
        }

        let config = self.config();
        let outcome = codegen::run(&config, self.check)
            .with_context(|| format!("failed to generate from `{}`", config.schema_path.display()))?;
        match outcome {
            Outcome::Written { .. } => println!("{}", "AST file generated.".green()),
            Outcome::UpToDate { path } => {
                println!("{}", format!("{} is up to date.", path.display()).green());
            }
            Outcome::Stale { path } => {
                bail!("{} is out of date; run astgen without --check", path.display());
            }
        }
        Ok(())
    }
}
