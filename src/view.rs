//! The polymorphic view: a closed union over borrowed node kinds.
//!
//! Emitted after every kind definition, in this order:
//!
//! - `NodeKind<'a>`, one case per participating kind in declaration order;
//! - `Node<'a>`, the erased view carrying identity, tag and position;
//! - the inherent block on `Node<'a>`: `new`, `as_<kind>`/`is_<kind>`,
//!   `name`, `children` and `as_ptr`;
//! - one `From<&'a Kind>` conversion per kind.
//!
//! Every dispatch is an exhaustive `match` over `NodeKind`; a gated kind's
//! case, arms and functions carry the kind's `#[cfg]`.
pub mod children;

use indexmap::IndexMap;
use tracing::debug;

use crate::codegen::Codegen;
use crate::derive::Positions;
use crate::error::{Error, Result};
use crate::naming;
use crate::schema::{NodeDef, Schema};
use crate::ty::{IDENTITY_TYPE, POSITION_TYPE};
use children::ChildrenPlan;

pub const UNION_NAME: &str = "NodeKind";
pub const VIEW_NAME: &str = "Node";

/// Inherent methods of the view a narrowing accessor could shadow.
const VIEW_METHODS: &[&str] = &["as_ptr"];

#[derive(Debug, Clone)]
pub struct ViewKind<'s> {
    pub def: &'s NodeDef,
    /// Canonical lowercase name used by the narrowing accessors.
    pub accessor: String,
    pub positioned: bool,
    pub children: ChildrenPlan,
}

impl ViewKind<'_> {
    fn type_name(&self) -> &str {
        &self.def.display_name
    }

    fn case(&self) -> String {
        format!("{UNION_NAME}::{}", self.def.display_name)
    }
}

#[derive(Debug, Clone)]
pub struct ViewPlan<'s> {
    pub kinds: Vec<ViewKind<'s>>,
}

impl ViewPlan<'_> {
    fn has_children(&self) -> bool {
        self.kinds.iter().any(|kind| !kind.children.is_none())
    }
}

pub fn plan<'s>(schema: &'s Schema, positions: &Positions) -> Result<ViewPlan<'s>> {
    for def in schema.nodes.values() {
        if def.display_name == UNION_NAME || def.display_name == VIEW_NAME {
            return Err(Error::invariant(
                &def.name,
                format!("`{}` is reserved for the polymorphic view", def.display_name),
            ));
        }
    }

    let mut kinds = Vec::new();
    for def in schema.participating() {
        let kind = ViewKind {
            def,
            accessor: naming::snake_case(&def.display_name),
            positioned: positions.is_positioned(&def.name),
            children: children::plan(schema, def)?,
        };
        debug!(kind = %def.name, accessor = %kind.accessor, children = !kind.children.is_none(), "view case");
        kinds.push(kind);
    }
    if kinds.is_empty() {
        return Err(Error::invariant(UNION_NAME, "no kind participates in the polymorphic view"));
    }
    check_accessors(&kinds)?;
    Ok(ViewPlan { kinds })
}

/// Distinct kinds must not share an accessor name, nor shadow the view's own methods.
fn check_accessors(kinds: &[ViewKind<'_>]) -> Result<()> {
    let mut seen: IndexMap<&str, &str> = IndexMap::new();
    for kind in kinds {
        let as_method = format!("as_{}", kind.accessor);
        if VIEW_METHODS.contains(&as_method.as_str()) {
            return Err(Error::invariant(
                &kind.def.name,
                format!("accessor `{as_method}` collides with a method of `{VIEW_NAME}`"),
            ));
        }
        match seen.get(kind.accessor.as_str()) {
            Some(other) if *other != kind.type_name() => {
                return Err(Error::invariant(
                    &kind.def.name,
                    format!("accessor name `{}` is also derived from `{other}`", kind.accessor),
                ));
            }
            _ => {
                seen.insert(&kind.accessor, kind.type_name());
            }
        }
    }
    Ok(())
}

pub fn render(view: &ViewPlan<'_>, cg: &mut Codegen) {
    render_union(view, cg);
    render_view_struct(cg);

    cg.open(format!("impl<'a> {VIEW_NAME}<'a> {{"));
    cg.open(format!(
        "pub fn new(id: {IDENTITY_TYPE}, kind: {UNION_NAME}<'a>, span: {POSITION_TYPE}) -> Self {{"
    ));
    cg.line("Self { id, kind, span }");
    cg.close("}");
    cg.blank();

    for kind in &view.kinds {
        render_narrowing(kind, cg);
    }
    render_name(view, cg);
    cg.blank();
    render_children(view, cg);
    cg.blank();
    render_as_ptr(view, cg);
    cg.close("}");
    cg.blank();

    for kind in &view.kinds {
        render_conversion(kind, cg);
    }
}

fn render_union(view: &ViewPlan<'_>, cg: &mut Codegen) {
    cg.line("#[derive(Debug, PartialEq, Clone, Copy)]");
    cg.open(format!("pub enum {UNION_NAME}<'a> {{"));
    for kind in &view.kinds {
        cg.gate(kind.def.feature.as_ref());
        cg.line(format!("{}(&'a {}),", kind.type_name(), kind.type_name()));
    }
    cg.close("}");
    cg.blank();
}

fn render_view_struct(cg: &mut Codegen) {
    cg.line("#[derive(Debug, PartialEq, Clone, Copy)]");
    cg.open(format!("pub struct {VIEW_NAME}<'a> {{"));
    cg.line(format!("pub id: {IDENTITY_TYPE},"));
    cg.line(format!("pub kind: {UNION_NAME}<'a>,"));
    cg.line(format!("pub span: {POSITION_TYPE},"));
    cg.close("}");
    cg.blank();
}

fn render_narrowing(kind: &ViewKind<'_>, cg: &mut Codegen) {
    let gate = kind.def.feature.as_ref();
    cg.gate(gate);
    cg.open(format!("pub fn as_{}(&self) -> Option<&'a {}> {{", kind.accessor, kind.type_name()));
    cg.open(format!("if let {}(node) = self.kind {{", kind.case()));
    cg.line("Some(node)");
    cg.reopen("} else {");
    cg.line("None");
    cg.close("}");
    cg.close("}");
    cg.blank();

    cg.gate(gate);
    cg.open(format!("pub fn is_{}(&self) -> bool {{", kind.accessor));
    cg.line(format!("matches!(self.kind, {}(_))", kind.case()));
    cg.close("}");
    cg.blank();
}

fn render_name(view: &ViewPlan<'_>, cg: &mut Codegen) {
    cg.open("pub fn name(&self) -> &'static str {");
    cg.open("match self.kind {");
    for kind in &view.kinds {
        cg.gate(kind.def.feature.as_ref());
        cg.line(format!("{}(_) => \"{}\",", kind.case(), kind.type_name()));
    }
    cg.close("}");
    cg.close("}");
}

fn render_children(view: &ViewPlan<'_>, cg: &mut Codegen) {
    cg.open(format!("pub fn children(&self) -> Vec<{VIEW_NAME}<'a>> {{"));
    if !view.has_children() {
        cg.line("Vec::new()");
        cg.close("}");
        return;
    }
    cg.line("let mut children = Vec::new();");
    cg.open("match self.kind {");
    for kind in &view.kinds {
        cg.gate(kind.def.feature.as_ref());
        if kind.children.is_none() {
            cg.line(format!("{}(_) => {{}}", kind.case()));
            continue;
        }
        cg.open(format!("{}(node) => {{", kind.case()));
        children::render(&kind.children, kind.type_name(), cg);
        cg.close("}");
    }
    cg.close("}");
    cg.line("children");
    cg.close("}");
}

fn render_as_ptr(view: &ViewPlan<'_>, cg: &mut Codegen) {
    cg.open("pub fn as_ptr(&self) -> NonNull<()> {");
    cg.open("match self.kind {");
    for kind in &view.kinds {
        cg.gate(kind.def.feature.as_ref());
        cg.line(format!("{}(node) => NonNull::from(node).cast(),", kind.case()));
    }
    cg.close("}");
    cg.close("}");
}

fn render_conversion(kind: &ViewKind<'_>, cg: &mut Codegen) {
    let span = if kind.positioned {
        "node.span()".to_string()
    } else {
        format!("{POSITION_TYPE}::default()")
    };
    cg.gate(kind.def.feature.as_ref());
    cg.open(format!("impl<'a> From<&'a {}> for {VIEW_NAME}<'a> {{", kind.type_name()));
    cg.open(format!("fn from(node: &'a {}) -> Self {{", kind.type_name()));
    cg.line(format!("{VIEW_NAME}::new(node.id(), {}(node), {span})", kind.case()));
    cg.close("}");
    cg.close("}");
    cg.blank();
}
