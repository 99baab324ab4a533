use std::path::PathBuf;

fn main() {
    let manifest_dir = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").unwrap());
    let schema = manifest_dir.join("..").join("meta").join("ast.yaml");
    let out = PathBuf::from(std::env::var("OUT_DIR").unwrap()).join("generated.rs");
    println!("cargo:rerun-if-changed={}", schema.display());

    let config = astgen::Config::with_paths(&schema, &out).with_imports([
        "crate::support::HasId",
        "crate::support::Spanned",
        "crate::support::Span",
        "crate::support::CommaSeparated",
    ]);
    if let Err(error) = astgen::run(&config, false) {
        panic!("failed to generate the AST from {}: {error}", schema.display());
    }
}
