//! Compiles the artifact generated from `meta/ast.yaml` against a minimal
//! support layer, so the generated accessors can be exercised at runtime.
pub mod support;

pub mod ast {
    include!(concat!(env!("OUT_DIR"), "/generated.rs"));
}
