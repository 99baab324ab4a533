//! Structural children: which fields of a kind are walked, and how.
//!
//! A plan is a list of [`Walk`]s per kind (or per variant for sum kinds). A
//! walk is the container rule applied to one field's type expression, resolved
//! down to node-kind leaves, so rendering never has to look at the schema again.
use crate::codegen::Codegen;
use crate::error::{Error, Result};
use crate::schema::{ChildModifier, ChildRef, ChildrenSpec, NodeDef, Schema, Shape, Variant};
use crate::ty::TypeExpr;

/// Names the children accessor's own locals use.
const RESERVED_LOCALS: &[&str] = &["children", "node", "self"];

/// How the values of one expression are reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// A node kind: push it.
    Node,
    /// `Box<T>`: dereference, then continue.
    Deref(Box<Access>),
    /// `Vec<T>`: every element, in order.
    Each(Box<Access>),
    /// `CommaSeparated<T>`: every element of `.inner`, in order.
    EachSeparated(Box<Access>),
    /// `Option<T>`: only when present.
    IfPresent(Box<Access>),
}

impl Access {
    /// Apply the container rule to `ty`, looking through aliases.
    pub fn of(schema: &Schema, owner: &NodeDef, field: &str, ty: &TypeExpr) -> Result<Access> {
        let access = match schema.resolve_alias(ty) {
            TypeExpr::Boxed(inner) => Access::Deref(Box::new(Access::of(schema, owner, field, inner)?)),
            TypeExpr::Sequence(inner) => Access::Each(Box::new(Access::of(schema, owner, field, inner)?)),
            TypeExpr::SeparatorList(inner) => {
                Access::EachSeparated(Box::new(Access::of(schema, owner, field, inner)?))
            }
            TypeExpr::Optional(inner) => Access::IfPresent(Box::new(Access::of(schema, owner, field, inner)?)),
            TypeExpr::Position => {
                return Err(Error::bad_reference(
                    &owner.name,
                    field,
                    "a bare position is not a node and cannot be a child",
                ));
            }
            TypeExpr::Named(name) => {
                let targets = schema.resolve(name);
                if targets.is_empty() {
                    return Err(Error::bad_reference(
                        &owner.name,
                        field,
                        format!("`{name}` is not a node kind and cannot be a child"),
                    ));
                }
                if let Some(target) = targets.iter().find(|target| !target.participates()) {
                    return Err(Error::bad_reference(
                        &owner.name,
                        field,
                        format!("`{}` is outside the polymorphic view and cannot be a child", target.name),
                    ));
                }
                Access::Node
            }
        };
        Ok(access)
    }
}

/// One child reference with its access path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Walk {
    pub field: String,
    /// Local the field is bound to when it comes from a destructured variant.
    pub binding: Option<String>,
    pub access: Access,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArmBody {
    /// Contributes nothing.
    Empty,
    /// The wrapped payload of a `self` variant.
    Payload(Access),
    /// Destructured fields of a field-bearing variant.
    Fields(Vec<Walk>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantWalk {
    pub variant: String,
    pub pattern: VariantPattern,
    pub body: ArmBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantPattern {
    Unit,
    Tuple,
    Struct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildrenPlan {
    None,
    Fields(Vec<Walk>),
    Variants(Vec<VariantWalk>),
}

impl ChildrenPlan {
    pub fn is_none(&self) -> bool {
        matches!(self, ChildrenPlan::None)
    }
}

/// Resolve the children declaration of `def` into a plan.
pub fn plan(schema: &Schema, def: &NodeDef) -> Result<ChildrenPlan> {
    let Some(spec) = &def.children else {
        return Ok(ChildrenPlan::None);
    };
    match (&def.shape, spec) {
        (Shape::Sum { variants }, ChildrenSpec::SelfVariants) => {
            let mut walks = Vec::with_capacity(variants.len());
            for (name, variant) in variants {
                let (pattern, body) = match variant {
                    Variant::Unit => (VariantPattern::Unit, ArmBody::Empty),
                    Variant::Wrap(ty) if ty.is_position() => (VariantPattern::Tuple, ArmBody::Empty),
                    Variant::Wrap(ty) => (VariantPattern::Tuple, ArmBody::Payload(Access::of(schema, def, name, ty)?)),
                    Variant::Fields { .. } => {
                        return Err(Error::invariant(
                            &def.name,
                            format!("`children: self` requires wrapping variants, but `{name}` has named fields"),
                        ));
                    }
                };
                walks.push(VariantWalk { variant: name.clone(), pattern, body });
            }
            Ok(ChildrenPlan::Variants(walks))
        }
        (Shape::Sum { variants }, ChildrenSpec::Refs(refs)) => {
            let mut walks = Vec::with_capacity(variants.len());
            for (name, variant) in variants {
                let (pattern, body) = match variant {
                    Variant::Unit => (VariantPattern::Unit, ArmBody::Empty),
                    Variant::Wrap(_) => (VariantPattern::Tuple, ArmBody::Empty),
                    Variant::Fields { fields, .. } => {
                        let mut field_walks = Vec::new();
                        for child in traversed(refs) {
                            if let Some(ty) = fields.get(&child.field) {
                                field_walks.push(Walk {
                                    field: child.field.clone(),
                                    binding: Some(binding_for(&child.field)),
                                    access: Access::of(schema, def, &child.field, ty)?,
                                });
                            }
                        }
                        if field_walks.is_empty() {
                            (VariantPattern::Struct, ArmBody::Empty)
                        } else {
                            (VariantPattern::Struct, ArmBody::Fields(field_walks))
                        }
                    }
                };
                walks.push(VariantWalk { variant: name.clone(), pattern, body });
            }
            Ok(ChildrenPlan::Variants(walks))
        }
        (Shape::Product { fields }, ChildrenSpec::Refs(refs)) => {
            let mut walks = Vec::with_capacity(refs.len());
            for child in traversed(refs) {
                let ty = fields.get(&child.field).ok_or_else(|| Error::UnknownReference {
                    node: def.name.clone(),
                    what: "field",
                    name: child.field.clone(),
                })?;
                walks.push(Walk {
                    field: child.field.clone(),
                    binding: None,
                    access: Access::of(schema, def, &child.field, ty)?,
                });
            }
            Ok(ChildrenPlan::Fields(walks))
        }
        (_, ChildrenSpec::SelfVariants) => {
            Err(Error::invariant(&def.name, "`children: self` is only valid on sum kinds"))
        }
        (Shape::Alias(_), ChildrenSpec::Refs(_)) => {
            Err(Error::invariant(&def.name, "aliases cannot declare children"))
        }
    }
}

/// Child references that are walked, in declaration order.
fn traversed(refs: &[ChildRef]) -> impl Iterator<Item = &ChildRef> {
    refs.iter().filter(|child| child.modifier != ChildModifier::Excluded)
}

fn binding_for(field: &str) -> String {
    if RESERVED_LOCALS.contains(&field) {
        format!("{field}_")
    } else {
        field.to_string()
    }
}

/// An expression the renderer is holding: a place of type `T`, or a reference `&T`.
#[derive(Debug, Clone)]
enum Value {
    Place(String),
    Ref(String),
}

impl Value {
    fn reference(&self) -> String {
        match self {
            Value::Place(place) => format!("&{place}"),
            Value::Ref(reference) => reference.clone(),
        }
    }

    /// Receiver for a method call or field access.
    fn receiver(&self) -> String {
        match self {
            Value::Place(place) if place.starts_with('*') => format!("({place})"),
            Value::Place(place) => place.clone(),
            Value::Ref(reference) => reference.clone(),
        }
    }

    fn deref(&self) -> Value {
        match self {
            Value::Place(place) => Value::Place(format!("*{place}")),
            Value::Ref(reference) => Value::Place(format!("**{reference}")),
        }
    }
}

fn render_access(access: &Access, value: Value, depth: usize, cg: &mut Codegen) {
    match access {
        Access::Node => cg.line(format!("children.push(Node::from({}));", value.reference())),
        Access::Deref(inner) => render_access(inner, value.deref(), depth, cg),
        Access::Each(inner) => {
            let item = format!("child_{depth}");
            cg.open(format!("for {item} in {}.iter() {{", value.receiver()));
            render_access(inner, Value::Ref(item), depth + 1, cg);
            cg.close("}");
        }
        Access::EachSeparated(inner) => {
            let item = format!("child_{depth}");
            cg.open(format!("for {item} in {}.inner.iter() {{", value.receiver()));
            render_access(inner, Value::Ref(item), depth + 1, cg);
            cg.close("}");
        }
        Access::IfPresent(inner) => {
            let item = format!("child_{depth}");
            cg.open(format!("if let Some({item}) = {} {{", value.reference()));
            render_access(inner, Value::Ref(item), depth + 1, cg);
            cg.close("}");
        }
    }
}

/// Body of the `NodeKind::X(node) => { ... }` arm for a kind with children.
/// `type_name` is the kind's emitted name.
pub fn render(plan: &ChildrenPlan, type_name: &str, cg: &mut Codegen) {
    match plan {
        ChildrenPlan::None => {}
        ChildrenPlan::Fields(walks) => {
            for walk in walks {
                render_access(&walk.access, Value::Place(format!("node.{}", walk.field)), 0, cg);
            }
        }
        ChildrenPlan::Variants(variants) => {
            cg.open("match node {");
            for variant in variants {
                let path = format!("{type_name}::{}", variant.variant);
                match &variant.body {
                    ArmBody::Empty => {
                        let pattern = match variant.pattern {
                            VariantPattern::Unit => path,
                            VariantPattern::Tuple => format!("{path}(_)"),
                            VariantPattern::Struct => format!("{path} {{ .. }}"),
                        };
                        cg.line(format!("{pattern} => {{}}"));
                    }
                    ArmBody::Payload(access) => {
                        cg.open(format!("{path}(inner) => {{"));
                        render_access(access, Value::Ref("inner".to_string()), 0, cg);
                        cg.close("}");
                    }
                    ArmBody::Fields(walks) => {
                        let bindings: Vec<String> = walks
                            .iter()
                            .map(|walk| match &walk.binding {
                                Some(binding) if binding != &walk.field => format!("{}: {binding}", walk.field),
                                _ => walk.field.clone(),
                            })
                            .collect();
                        cg.open(format!("{path} {{ {}, .. }} => {{", bindings.join(", ")));
                        for walk in walks {
                            let binding = walk.binding.clone().unwrap_or_else(|| walk.field.clone());
                            render_access(&walk.access, Value::Ref(binding), 0, cg);
                        }
                        cg.close("}");
                    }
                }
            }
            cg.close("}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::error::ErrorKind;
    use crate::schema::Format;

    const BASE: &str = "NodeId: u32\n\
        Expression:\n  span: Span\n  kind: ExpressionKind\n\
        Variable:\n  span: Span\n\
        ExpressionKind:\n  as: Enum\n  Missing: ''\n  Literal: Span\n  Variable: Variable\n  Nested: Box<Expression>\n  children: self\n\
        Statement:\n  span: Span\n  value: u8\n\
        Block: Vec<Statement>\n";

    fn rendered(extra: &str, kind: &str) -> String {
        let schema = Schema::parse(Path::new("t.yaml"), &format!("{BASE}{extra}"), Format::Yaml).unwrap();
        let def = &schema.nodes[kind];
        let plan = plan(&schema, def).unwrap();
        let mut cg = Codegen::new();
        render(&plan, &def.display_name, &mut cg);
        cg.into_string()
    }

    fn plan_error(extra: &str, kind: &str) -> ErrorKind {
        let schema = Schema::parse(Path::new("t.yaml"), &format!("{BASE}{extra}"), Format::Yaml).unwrap();
        plan(&schema, &schema.nodes[kind]).unwrap_err().kind()
    }

    #[test]
    fn product_children_follow_declaration_order() {
        let out = rendered(
            "Call:\n  span: Span\n  args: CommaSeparated<Expression>\n  target: Box<Expression>\n  body: Block\n  children: [target, args, body]\n",
            "Call",
        );
        assert_eq!(
            out,
            "children.push(Node::from(&*node.target));\n\
             for child_0 in node.args.inner.iter() {\n    children.push(Node::from(child_0));\n}\n\
             for child_0 in node.body.iter() {\n    children.push(Node::from(child_0));\n}\n"
        );
    }

    #[test]
    fn optional_and_excluded_children() {
        let out = rendered(
            "Return:\n  span: Span\n  value: Option<Box<Expression>>\n  label: Variable\n  children: [value?, label!]\n",
            "Return",
        );
        assert_eq!(
            out,
            "if let Some(child_0) = &node.value {\n    children.push(Node::from(&**child_0));\n}\n"
        );
    }

    #[test]
    fn self_children_unwrap_one_box_and_skip_leaves() {
        let out = rendered("", "ExpressionKind");
        assert_eq!(
            out,
            "match node {\n\
             \x20   ExpressionKind::Missing => {}\n\
             \x20   ExpressionKind::Literal(_) => {}\n\
             \x20   ExpressionKind::Variable(inner) => {\n        children.push(Node::from(inner));\n    }\n\
             \x20   ExpressionKind::Nested(inner) => {\n        children.push(Node::from(&**inner));\n    }\n\
             }\n"
        );
    }

    #[test]
    fn qualified_children_destructure_variant_fields() {
        let out = rendered(
            "Use:\n  as: Enum\n  Single:\n    span: Span\n    target: Variable\n  Group:\n    span: Span\n    children: Vec<Variable>\n    alias: Option<Variable>\n  Empty: Span\n  children: [self.target, self.children, self.alias?]\n",
            "Use",
        );
        assert!(out.contains("Use::Single { target, .. } => {\n        children.push(Node::from(target));\n    }"));
        assert!(out.contains("Use::Group { children: children_, alias, .. } => {\n        for child_0 in children_.iter() {"));
        assert!(out.contains("if let Some(child_0) = alias {"));
        assert!(out.contains("Use::Empty(_) => {}"));
    }

    #[test]
    fn nested_containers_get_distinct_bindings() {
        let out = rendered("Matrix:\n  rows: Vec<Vec<Statement>>\n  children: [rows]\n", "Matrix");
        assert!(out.contains("for child_0 in node.rows.iter() {\n    for child_1 in child_0.iter() {\n        children.push(Node::from(child_1));"));
    }

    #[test]
    fn children_must_be_view_kinds() {
        assert_eq!(plan_error("Bad:\n  value: u8\n  children: [value]\n", "Bad"), ErrorKind::SchemaReference);
        assert_eq!(plan_error("Bad:\n  span: Span\n  children: [span]\n", "Bad"), ErrorKind::SchemaReference);
        assert_eq!(
            plan_error("Raw:\n  x: u8\n  node: false\nBad:\n  raw: Raw\n  children: [raw]\n", "Bad"),
            ErrorKind::SchemaReference
        );
    }
}
