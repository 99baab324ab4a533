//! Reference and invariant checks that run before anything is derived.
use indexmap::IndexMap;

use super::{ChildModifier, ChildrenSpec, FeatureGate, NodeDef, Schema, Shape, Variant};
use crate::error::{Error, Result};
use crate::ty::{self, IDENTITY_TRAIT, IDENTITY_TYPE, POSITION_TYPE, TypeExpr};

/// Check `schema` against itself and the prelude's type names.
pub fn check(schema: &Schema, prelude: &[&str]) -> Result<()> {
    check_display_names(schema)?;
    for def in schema.nodes.values() {
        check_type_references(schema, prelude, def)?;
        check_shape(def)?;
        if let Some(spec) = &def.children {
            check_children(def, spec)?;
        }
    }
    // The view and the identity impls need these in scope.
    if let Some(first) = schema.participating().next() {
        let required = [
            ("identity type", IDENTITY_TYPE),
            ("position type", POSITION_TYPE),
            ("trait", IDENTITY_TRAIT),
        ];
        for (what, name) in required {
            if !is_known_type(schema, prelude, name) {
                return Err(Error::UnknownReference {
                    node: first.name.clone(),
                    what,
                    name: name.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn is_known_type(schema: &Schema, prelude: &[&str], name: &str) -> bool {
    ty::is_primitive(name)
        || name.contains("::")
        || prelude.contains(&name)
        || !schema.resolve(name).is_empty()
}

/// Type expressions declared by `def`, labelled for error messages.
fn declared_types(def: &NodeDef) -> Vec<&TypeExpr> {
    match &def.shape {
        Shape::Alias(target) => vec![target],
        Shape::Product { fields } => fields.values().collect(),
        Shape::Sum { variants } => variants
            .values()
            .flat_map(|variant| match variant {
                Variant::Unit => Vec::new(),
                Variant::Wrap(ty) => vec![ty],
                Variant::Fields { fields, .. } => fields.values().collect(),
            })
            .collect(),
    }
}

fn check_type_references(schema: &Schema, prelude: &[&str], def: &NodeDef) -> Result<()> {
    for ty in declared_types(def) {
        for name in ty.names() {
            if !is_known_type(schema, prelude, name) {
                return Err(Error::UnknownReference {
                    node: def.name.clone(),
                    what: "type",
                    name: name.to_string(),
                });
            }
            check_gate_reference(schema, def, name)?;
        }
    }
    Ok(())
}

/// A kind may only mention a gated kind from under the same gate, unless the
/// name is defined under both polarities of that gate.
fn check_gate_reference(schema: &Schema, def: &NodeDef, name: &str) -> Result<()> {
    let targets = schema.resolve(name);
    let gates: Vec<&FeatureGate> = match targets.iter().map(|t| t.feature.as_ref()).collect::<Option<Vec<_>>>() {
        Some(gates) if !gates.is_empty() => gates,
        _ => return Ok(()),
    };
    if let Some(own) = &def.feature {
        if gates.contains(&own) {
            return Ok(());
        }
    }
    let covered = gates.iter().any(|a| gates.iter().any(|b| a.is_complement_of(b)));
    if covered {
        return Ok(());
    }
    Err(Error::bad_reference(
        &def.name,
        name,
        format!(
            "the referenced kind is only defined under `{}`; guard the referring kind the same way",
            gates[0].cfg_attr()
        ),
    ))
}

fn check_display_names(schema: &Schema) -> Result<()> {
    let mut by_name: IndexMap<&str, Vec<&NodeDef>> = IndexMap::new();
    for def in schema.nodes.values() {
        by_name.entry(def.display_name.as_str()).or_default().push(def);
    }
    for (name, defs) in by_name {
        let ok = match defs.as_slice() {
            [_] => true,
            [a, b] => match (&a.feature, &b.feature) {
                (Some(x), Some(y)) => x.is_complement_of(y),
                _ => false,
            },
            _ => false,
        };
        if !ok {
            return Err(Error::invariant(
                &defs[defs.len() - 1].name,
                format!("type name `{name}` is emitted more than once without mutually exclusive feature gates"),
            ));
        }
    }
    Ok(())
}

fn check_shape(def: &NodeDef) -> Result<()> {
    match &def.shape {
        Shape::Alias(_) => {
            if def.children.is_some() {
                return Err(Error::invariant(&def.name, "aliases cannot declare children"));
            }
        }
        Shape::Product { fields } => {
            if def.has_own_identity && fields.contains_key("id") {
                return Err(Error::invariant(&def.name, "field `id` collides with the synthesized identity field"));
            }
            if def.force_span && !fields.values().any(TypeExpr::is_position) {
                return Err(Error::invariant(&def.name, "`span: true` on a product kind without a position field"));
            }
        }
        Shape::Sum { variants } => {
            if variants.is_empty() {
                return Err(Error::invariant(&def.name, "sum kinds need at least one variant"));
            }
            for (variant_name, variant) in variants {
                if let Variant::Fields { fields, has_id: true } = variant {
                    if fields.contains_key("id") {
                        return Err(Error::invariant(
                            &def.name,
                            format!("field `{variant_name}.id` collides with the synthesized identity field"),
                        ));
                    }
                }
            }
        }
    }
    Ok(())
}

fn check_children(def: &NodeDef, spec: &ChildrenSpec) -> Result<()> {
    if !def.participates() {
        return Err(Error::invariant(&def.name, "children declared on a kind outside the polymorphic view"));
    }
    match (&def.shape, spec) {
        (Shape::Sum { variants }, ChildrenSpec::SelfVariants) => {
            for (variant_name, variant) in variants {
                if let Variant::Fields { .. } = variant {
                    return Err(Error::invariant(
                        &def.name,
                        format!("`children: self` requires wrapping variants, but `{variant_name}` has named fields"),
                    ));
                }
            }
        }
        (_, ChildrenSpec::SelfVariants) => {
            return Err(Error::invariant(&def.name, "`children: self` is only valid on sum kinds"));
        }
        (Shape::Product { fields }, ChildrenSpec::Refs(refs)) => {
            for child in refs {
                if child.qualified {
                    return Err(Error::invariant(
                        &def.name,
                        format!("`self.{}` only applies to sum kinds with field-bearing variants", child.field),
                    ));
                }
                let Some(ty) = fields.get(&child.field) else {
                    return Err(Error::invariant(&def.name, format!("children refers to missing field `{}`", child.field)));
                };
                check_modifier(def, &child.field, child.modifier, ty)?;
            }
        }
        (Shape::Sum { variants }, ChildrenSpec::Refs(refs)) => {
            for child in refs {
                if !child.qualified {
                    return Err(Error::invariant(
                        &def.name,
                        format!("children of a sum kind must be written `self.{}`", child.field),
                    ));
                }
                let mut found = false;
                for ty in variants.values().filter_map(|v| v.fields()).filter_map(|f| f.get(&child.field)) {
                    found = true;
                    check_modifier(def, &child.field, child.modifier, ty)?;
                }
                if !found {
                    return Err(Error::invariant(
                        &def.name,
                        format!("children refers to `self.{}`, which no variant declares", child.field),
                    ));
                }
            }
        }
        (Shape::Alias(_), ChildrenSpec::Refs(_)) => {
            return Err(Error::invariant(&def.name, "aliases cannot declare children"));
        }
    }
    Ok(())
}

fn check_modifier(def: &NodeDef, field: &str, modifier: ChildModifier, ty: &TypeExpr) -> Result<()> {
    if modifier == ChildModifier::Optional && !matches!(ty, TypeExpr::Optional(_)) {
        return Err(Error::invariant(&def.name, format!("`{field}?` marks a field that is not an `Option`")));
    }
    Ok(())
}
