//! Derivation engine: per-kind type definitions, identity and position accessors.
//!
//! Everything fallible happens in [`derive_kind`], which turns a [`NodeDef`]
//! into a [`KindPlan`]. [`render_kind`] only writes plans out, so a schema
//! problem is always reported before the first byte of output exists.
use std::collections::HashSet;

use tracing::{debug, warn};

use crate::codegen::Codegen;
use crate::error::{Error, Result};
use crate::schema::{NodeDef, Schema, Shape, Variant};
use crate::ty::{IDENTITY_SENTINEL, IDENTITY_TRAIT, IDENTITY_TYPE, POSITION_TRAIT, POSITION_TYPE, TypeExpr};

/// Discriminant-only sums whose position lives on the containing node.
pub const POSITION_EXCLUDED: &[&str] = &["StatementKind", "ExpressionKind"];

/// Matched against both the entry name and the emitted name.
fn position_excluded(def: &NodeDef) -> bool {
    POSITION_EXCLUDED.contains(&def.name.as_str()) || POSITION_EXCLUDED.contains(&def.display_name.as_str())
}

/// Which kinds get a position accessor.
#[derive(Debug, Default)]
pub struct Positions {
    positioned: HashSet<String>,
}

impl Positions {
    /// Decide positioned-ness for every kind.
    ///
    /// Direct evidence is a position-typed field, a bare position variant or a
    /// field-bearing variant with a position field. A sum is also positioned
    /// when one of its variants wraps a positioned kind, which is propagated
    /// until nothing changes.
    pub fn analyze(schema: &Schema) -> Positions {
        let mut positions = Positions::default();
        loop {
            let mut changed = false;
            for def in schema.nodes.values() {
                if !positions.positioned.contains(&def.name) && positions.qualifies(schema, def) {
                    positions.positioned.insert(def.name.clone());
                    changed = true;
                }
            }
            if !changed {
                return positions;
            }
        }
    }

    pub fn is_positioned(&self, name: &str) -> bool {
        self.positioned.contains(name)
    }

    pub fn len(&self) -> usize {
        self.positioned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positioned.is_empty()
    }

    fn qualifies(&self, schema: &Schema, def: &NodeDef) -> bool {
        match &def.shape {
            Shape::Alias(_) => false,
            Shape::Product { fields } => def.force_span || fields.values().any(TypeExpr::is_position),
            Shape::Sum { variants } => {
                if def.force_span {
                    return true;
                }
                if position_excluded(def) {
                    return false;
                }
                variants.values().any(|variant| match variant {
                    Variant::Unit => false,
                    Variant::Wrap(ty) => ty.is_position() || self.wraps_positioned(schema, ty),
                    Variant::Fields { fields, .. } => fields.values().any(TypeExpr::is_position),
                })
            }
        }
    }

    /// `ty` (after one `Box` and any aliases) names kinds that are all positioned.
    fn wraps_positioned(&self, schema: &Schema, ty: &TypeExpr) -> bool {
        let targets = wrapped_kinds(schema, ty);
        !targets.is_empty() && targets.iter().all(|def| self.is_positioned(&def.name))
    }
}

/// Kinds a wrapping payload refers to, looking through one `Box` and aliases.
pub fn wrapped_kinds<'s>(schema: &'s Schema, ty: &'s TypeExpr) -> Vec<&'s NodeDef> {
    let resolved = schema.resolve_alias(ty.unboxed()).unboxed();
    match resolved {
        TypeExpr::Named(name) => schema.resolve(name).into_iter().filter(|def| !def.is_alias()).collect(),
        _ => Vec::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityImpl {
    /// `self.id`
    Stored,
    Dispatch(Vec<VariantArm<IdentityArm>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityArm {
    /// No identity of its own: the sentinel.
    Sentinel,
    /// The variant's synthesized `id` field.
    Stored,
    /// `inner.id()` on the wrapped node.
    Delegate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionImpl {
    Field(String),
    Dispatch(Vec<VariantArm<PositionArm>>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionArm {
    /// The payload is the position.
    Leaf,
    Field(String),
    /// `inner.span()` on the wrapped node.
    Forward,
    /// Nothing to derive it from; `Span::default()`.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantArm<A> {
    pub variant: String,
    pub shape: VariantShape,
    pub arm: A,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantShape {
    Unit,
    Tuple,
    Struct,
}

impl VariantShape {
    fn of(variant: &Variant) -> VariantShape {
        match variant {
            Variant::Unit => VariantShape::Unit,
            Variant::Wrap(_) => VariantShape::Tuple,
            Variant::Fields { .. } => VariantShape::Struct,
        }
    }

    /// `Self::V`, `Self::V(binding)`, `Self::V { binding, .. }`; `None` ignores the payload.
    pub fn pattern(self, variant: &str, binding: Option<&str>) -> String {
        match (self, binding) {
            (VariantShape::Unit, _) => format!("Self::{variant}"),
            (VariantShape::Tuple, Some(b)) => format!("Self::{variant}({b})"),
            (VariantShape::Tuple, None) => format!("Self::{variant}(_)"),
            (VariantShape::Struct, Some(b)) => format!("Self::{variant} {{ {b}, .. }}"),
            (VariantShape::Struct, None) => format!("Self::{variant} {{ .. }}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KindPlan<'s> {
    pub def: &'s NodeDef,
    pub identity: Option<IdentityImpl>,
    pub position: Option<PositionImpl>,
}

pub fn derive_kind<'s>(
    schema: &'s Schema,
    positions: &Positions,
    def: &'s NodeDef,
    strict_spans: bool,
) -> Result<KindPlan<'s>> {
    let identity = if def.participates() { Some(derive_identity(schema, def)?) } else { None };
    let position = if positions.is_positioned(&def.name) {
        Some(derive_position(schema, positions, def, strict_spans)?)
    } else {
        None
    };
    debug!(kind = %def.name, identity = identity.is_some(), positioned = position.is_some(), "derived kind");
    Ok(KindPlan { def, identity, position })
}

fn derive_identity(schema: &Schema, def: &NodeDef) -> Result<IdentityImpl> {
    let variants = match &def.shape {
        Shape::Sum { variants } => variants,
        _ => return Ok(IdentityImpl::Stored),
    };
    let mut arms = Vec::with_capacity(variants.len());
    for (name, variant) in variants {
        let arm = match variant {
            Variant::Unit => IdentityArm::Sentinel,
            Variant::Wrap(ty) if ty.is_position() => IdentityArm::Sentinel,
            Variant::Fields { has_id: true, .. } => IdentityArm::Stored,
            Variant::Fields { has_id: false, .. } => IdentityArm::Sentinel,
            Variant::Wrap(ty) => {
                check_delegate(schema, def, name, ty)?;
                IdentityArm::Delegate
            }
        };
        arms.push(VariantArm { variant: name.clone(), shape: VariantShape::of(variant), arm });
    }
    Ok(IdentityImpl::Dispatch(arms))
}

/// A wrapping variant delegates identity; the wrapped kind must have one.
fn check_delegate(schema: &Schema, def: &NodeDef, variant: &str, ty: &TypeExpr) -> Result<()> {
    let rendered = schema.render_type(ty);
    let targets = wrapped_kinds(schema, ty);
    if targets.is_empty() {
        return match ty.unboxed() {
            TypeExpr::Named(name) if schema.resolve(name).is_empty() => Err(Error::UnknownReference {
                node: def.name.clone(),
                what: "node for identity delegation",
                name: name.clone(),
            }),
            _ => Err(Error::bad_reference(
                &def.name,
                rendered,
                format!("variant `{variant}` wraps a value that is not a node kind, so it has no identity to delegate to"),
            )),
        };
    }
    if let Some(target) = targets.iter().find(|target| !target.participates()) {
        return Err(Error::bad_reference(
            &def.name,
            &target.name,
            format!("variant `{variant}` delegates identity to a kind marked `node: false`"),
        ));
    }
    Ok(())
}

/// Name of the position field: `span` if it is one, else the first position-typed field.
fn position_field<'a>(fields: impl Iterator<Item = (&'a String, &'a TypeExpr)>) -> Option<String> {
    let candidates: Vec<&String> = fields.filter(|(_, ty)| ty.is_position()).map(|(name, _)| name).collect();
    candidates
        .iter()
        .find(|name| name.as_str() == "span")
        .or(candidates.first())
        .map(|name| name.to_string())
}

fn derive_position(
    schema: &Schema,
    positions: &Positions,
    def: &NodeDef,
    strict_spans: bool,
) -> Result<PositionImpl> {
    match &def.shape {
        Shape::Alias(_) => Err(Error::invariant(&def.name, "aliases have no position accessor")),
        Shape::Product { fields } => position_field(fields.iter())
            .map(PositionImpl::Field)
            .ok_or_else(|| Error::invariant(&def.name, "positioned product kind without a position field")),
        Shape::Sum { variants } => {
            let mut arms = Vec::with_capacity(variants.len());
            for (name, variant) in variants {
                let arm = match variant {
                    Variant::Wrap(ty) if ty.is_position() => PositionArm::Leaf,
                    Variant::Wrap(ty) if positions.wraps_positioned(schema, ty) => PositionArm::Forward,
                    Variant::Fields { fields, .. } => match position_field(fields.iter()) {
                        Some(field) => PositionArm::Field(field),
                        None => PositionArm::Empty,
                    },
                    _ => PositionArm::Empty,
                };
                if arm == PositionArm::Empty {
                    if strict_spans {
                        return Err(Error::invariant(
                            &def.name,
                            format!("variant `{name}` has no derivable position"),
                        ));
                    }
                    warn!(kind = %def.name, variant = %name, "variant falls back to an empty position");
                }
                arms.push(VariantArm { variant: name.clone(), shape: VariantShape::of(variant), arm });
            }
            Ok(PositionImpl::Dispatch(arms))
        }
    }
}

/// Guarded definition, identity impl and position impl for one kind.
pub fn render_kind(schema: &Schema, plan: &KindPlan<'_>, cg: &mut Codegen) {
    let def = plan.def;
    let gate = def.feature.as_ref();
    let name = &def.display_name;

    match &def.shape {
        Shape::Alias(target) => {
            cg.gate(gate);
            cg.line(format!("pub type {name} = {};", schema.render_type(target)));
            cg.blank();
            return;
        }
        Shape::Product { fields } => {
            cg.gate(gate);
            cg.line(format!("#[derive({})]", def.derives().join(", ")));
            cg.open(format!("pub struct {name} {{"));
            if def.has_own_identity {
                cg.line(format!("pub id: {IDENTITY_TYPE},"));
            }
            for (field, ty) in fields {
                cg.line(format!("pub {field}: {},", schema.render_type(ty)));
            }
            cg.close("}");
        }
        Shape::Sum { variants } => {
            cg.gate(gate);
            cg.line(format!("#[derive({})]", def.derives().join(", ")));
            cg.open(format!("pub enum {name} {{"));
            for (variant, payload) in variants {
                match payload {
                    Variant::Unit => cg.line(format!("{variant},")),
                    Variant::Wrap(ty) => cg.line(format!("{variant}({}),", schema.render_type(ty))),
                    Variant::Fields { fields, has_id } => {
                        cg.open(format!("{variant} {{"));
                        if *has_id {
                            cg.line(format!("id: {IDENTITY_TYPE},"));
                        }
                        for (field, ty) in fields {
                            cg.line(format!("{field}: {},", schema.render_type(ty)));
                        }
                        cg.close("},");
                    }
                }
            }
            cg.close("}");
        }
    }
    cg.blank();

    if let Some(identity) = &plan.identity {
        cg.gate(gate);
        cg.open(format!("impl {IDENTITY_TRAIT} for {name} {{"));
        cg.open(format!("fn id(&self) -> {IDENTITY_TYPE} {{"));
        match identity {
            IdentityImpl::Stored => cg.line("self.id"),
            IdentityImpl::Dispatch(arms) => {
                cg.open("match self {");
                for arm in arms {
                    let line = match arm.arm {
                        IdentityArm::Sentinel => {
                            format!("{} => {IDENTITY_SENTINEL},", arm.shape.pattern(&arm.variant, None))
                        }
                        IdentityArm::Stored => format!("{} => *id,", arm.shape.pattern(&arm.variant, Some("id"))),
                        IdentityArm::Delegate => {
                            format!("{} => inner.id(),", arm.shape.pattern(&arm.variant, Some("inner")))
                        }
                    };
                    cg.line(line);
                }
                cg.close("}");
            }
        }
        cg.close("}");
        cg.close("}");
        cg.blank();
    }

    if let Some(position) = &plan.position {
        cg.gate(gate);
        cg.open(format!("impl {POSITION_TRAIT} for {name} {{"));
        cg.open(format!("fn span(&self) -> {POSITION_TYPE} {{"));
        match position {
            PositionImpl::Field(field) => cg.line(format!("self.{field}")),
            PositionImpl::Dispatch(arms) => {
                cg.open("match self {");
                for arm in arms {
                    let line = match &arm.arm {
                        PositionArm::Leaf => format!("{} => *span,", arm.shape.pattern(&arm.variant, Some("span"))),
                        PositionArm::Field(field) => {
                            format!("{} => *{field},", arm.shape.pattern(&arm.variant, Some(field.as_str())))
                        }
                        PositionArm::Forward => {
                            format!("{} => inner.span(),", arm.shape.pattern(&arm.variant, Some("inner")))
                        }
                        PositionArm::Empty => {
                            format!("{} => {POSITION_TYPE}::default(),", arm.shape.pattern(&arm.variant, None))
                        }
                    };
                    cg.line(line);
                }
                cg.close("}");
            }
        }
        cg.close("}");
        cg.close("}");
        cg.blank();
    }
}
