//! Schema model: the ordered set of node definitions a run works from.
//!
//! Declaration order is significant everywhere downstream: it fixes the order
//! of emitted definitions, of union cases and of every accessor table. The
//! model is built once by [`Schema::load`] (or [`Schema::parse`]), checked for
//! dangling references and structural invariants, and never mutated afterwards.
pub mod check;
pub mod raw;

use std::path::Path;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};
use crate::naming;
use crate::ty::TypeExpr;
use raw::{RawEntry, RawSchema, RawValue};

/// Derives every emitted definition carries.
pub const BASE_DERIVES: &[&str] = &["Debug", "PartialEq", "Eq", "Clone"];

static CHILD_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(self\.)?([A-Za-z_][A-Za-z0-9_]*)([?!])?$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
}

impl Format {
    pub fn for_path(path: &Path) -> Format {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Format::Json,
            _ => Format::Yaml,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Schema {
    pub nodes: IndexMap<String, NodeDef>,
}

#[derive(Debug, Clone)]
pub struct NodeDef {
    /// Lookup key; stable even when the emitted name is overridden.
    pub name: String,
    /// Emitted type name (`rename`, or the key).
    pub display_name: String,
    pub shape: Shape,
    /// `false` only when the entry says `node: false`.
    pub has_own_identity: bool,
    /// `span: true` forces position derivation.
    pub force_span: bool,
    pub feature: Option<FeatureGate>,
    pub children: Option<ChildrenSpec>,
    pub extra_derives: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum Shape {
    Alias(TypeExpr),
    Product { fields: IndexMap<String, TypeExpr> },
    Sum { variants: IndexMap<String, Variant> },
}

#[derive(Debug, Clone)]
pub enum Variant {
    Unit,
    /// Tuple payload: either the bare position type or a wrapped value.
    Wrap(TypeExpr),
    Fields {
        fields: IndexMap<String, TypeExpr>,
        has_id: bool,
    },
}

impl Variant {
    pub fn is_position_leaf(&self) -> bool {
        matches!(self, Variant::Wrap(ty) if ty.is_position())
    }

    pub fn fields(&self) -> Option<&IndexMap<String, TypeExpr>> {
        match self {
            Variant::Fields { fields, .. } => Some(fields),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureGate {
    pub feature: String,
    /// Leading `!`: include only when the feature is absent.
    pub negated: bool,
}

impl FeatureGate {
    pub fn parse(src: &str) -> Option<FeatureGate> {
        let src = src.trim();
        let (negated, feature) = match src.strip_prefix('!') {
            Some(rest) => (true, rest.trim()),
            None => (false, src),
        };
        if feature.is_empty() || feature.contains('"') || feature.contains(char::is_whitespace) {
            return None;
        }
        Some(FeatureGate { feature: feature.to_string(), negated })
    }

    pub fn cfg_attr(&self) -> String {
        if self.negated {
            format!("#[cfg(not(feature = \"{}\"))]", self.feature)
        } else {
            format!("#[cfg(feature = \"{}\")]", self.feature)
        }
    }

    pub fn is_complement_of(&self, other: &FeatureGate) -> bool {
        self.feature == other.feature && self.negated != other.negated
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildrenSpec {
    /// The variants themselves are the children.
    SelfVariants,
    Refs(Vec<ChildRef>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildRef {
    pub field: String,
    /// `self.field`: the field lives on the variants of a sum kind.
    pub qualified: bool,
    pub modifier: ChildModifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildModifier {
    Required,
    /// `?`: contributes nothing when absent.
    Optional,
    /// `!`: declared but never traversed.
    Excluded,
}

impl ChildRef {
    pub fn parse(src: &str) -> Option<ChildRef> {
        let caps = CHILD_REF.captures(src.trim())?;
        let modifier = match caps.get(3).map(|m| m.as_str()) {
            Some("?") => ChildModifier::Optional,
            Some("!") => ChildModifier::Excluded,
            _ => ChildModifier::Required,
        };
        Some(ChildRef {
            field: caps[2].to_string(),
            qualified: caps.get(1).is_some(),
            modifier,
        })
    }
}

impl NodeDef {
    pub fn is_alias(&self) -> bool {
        matches!(self.shape, Shape::Alias(_))
    }

    pub fn is_sum(&self) -> bool {
        matches!(self.shape, Shape::Sum { .. })
    }

    /// Kinds that get an identity accessor, a union case and a conversion.
    pub fn participates(&self) -> bool {
        !self.is_alias() && self.has_own_identity
    }

    pub fn derives(&self) -> Vec<&str> {
        let mut out: Vec<&str> = BASE_DERIVES.to_vec();
        for extra in &self.extra_derives {
            if !out.contains(&extra.as_str()) {
                out.push(extra);
            }
        }
        out
    }

    fn from_raw(name: &str, entry: RawEntry) -> Result<NodeDef> {
        if !naming::is_ident(name) {
            return Err(Error::shape(name, "entry names must be identifiers"));
        }
        let mut def = NodeDef {
            name: name.to_string(),
            display_name: name.to_string(),
            shape: Shape::Product { fields: IndexMap::new() },
            has_own_identity: true,
            force_span: false,
            feature: None,
            children: None,
            extra_derives: Vec::new(),
        };
        let entries = match entry {
            RawEntry::Alias(target) => {
                def.shape = Shape::Alias(parse_type(name, &target)?);
                return Ok(def);
            }
            RawEntry::Def(entries) => entries.0,
        };

        let is_sum = match entries.get("as") {
            None => false,
            Some(RawValue::Text(t)) if t == "Enum" => true,
            Some(other) => {
                return Err(Error::shape(name, format!("`as` must be `Enum`, found {}", other.describe())));
            }
        };

        let mut fields = IndexMap::new();
        let mut variants = IndexMap::new();
        for (key, value) in entries {
            match key.as_str() {
                "as" => {}
                "derive" => def.extra_derives = parse_derives(name, value)?,
                "node" => match value {
                    RawValue::Bool(flag) => def.has_own_identity = flag,
                    other => return Err(expected(name, "node", "a boolean", &other)),
                },
                "children" => def.children = Some(parse_children(name, value)?),
                "feature" => match value {
                    RawValue::Text(t) => {
                        let gate = FeatureGate::parse(&t)
                            .ok_or_else(|| Error::shape(name, format!("invalid feature gate `{t}`")))?;
                        def.feature = Some(gate);
                    }
                    other => return Err(expected(name, "feature", "a string", &other)),
                },
                "rename" => match value {
                    RawValue::Text(t) if naming::is_ident(&t) => def.display_name = t,
                    RawValue::Text(t) => {
                        return Err(Error::shape(name, format!("`rename` must be an identifier, found `{t}`")));
                    }
                    other => return Err(expected(name, "rename", "a string", &other)),
                },
                "span" if matches!(value, RawValue::Bool(_)) => {
                    def.force_span = matches!(value, RawValue::Bool(true));
                }
                _ if is_sum => {
                    if !naming::is_ident(&key) {
                        return Err(Error::shape(name, format!("variant `{key}` is not an identifier")));
                    }
                    let variant = parse_variant(name, &key, value)?;
                    variants.insert(key.clone(), variant);
                }
                _ => {
                    if !naming::is_ident(&key) {
                        return Err(Error::shape(name, format!("field `{key}` is not an identifier")));
                    }
                    match value {
                        RawValue::Text(t) => {
                            fields.insert(key.clone(), parse_type(name, &t)?);
                        }
                        other => return Err(expected(name, &key, "a type expression", &other)),
                    }
                }
            }
        }

        def.shape = if is_sum { Shape::Sum { variants } } else { Shape::Product { fields } };
        Ok(def)
    }
}

impl Schema {
    /// Read and parse the schema resource.
    pub fn load(path: &Path) -> Result<Schema> {
        let src = std::fs::read_to_string(path).map_err(|source| Error::SchemaRead {
            path: path.to_path_buf(),
            source,
        })?;
        Schema::parse(path, &src, Format::for_path(path))
    }

    /// Parse schema source; `path` only labels errors. References are
    /// resolved later by [`check::check`], once the prelude is known.
    pub fn parse(path: &Path, src: &str, format: Format) -> Result<Schema> {
        let raw: RawSchema = match format {
            Format::Yaml => crate::path_de::from_yaml_with_path(path, src)?,
            Format::Json => crate::path_de::from_json_with_path(path, src)?,
        };
        Schema::from_raw(raw)
    }

    pub fn from_raw(raw: RawSchema) -> Result<Schema> {
        let mut nodes = IndexMap::with_capacity(raw.0.len());
        for (name, entry) in raw.0 {
            let def = NodeDef::from_raw(&name, entry)?;
            nodes.insert(name, def);
        }
        Ok(Schema { nodes })
    }

    pub fn get(&self, name: &str) -> Option<&NodeDef> {
        self.nodes.get(name)
    }

    /// Definitions a type name refers to: the entry keyed `name`, or every entry
    /// emitted under that display name.
    pub fn resolve(&self, name: &str) -> Vec<&NodeDef> {
        if let Some(def) = self.nodes.get(name) {
            return vec![def];
        }
        self.nodes.values().filter(|def| def.display_name == name).collect()
    }

    /// Emitted name for a type name used inside a type expression.
    pub fn display_name_of(&self, name: &str) -> String {
        match self.nodes.get(name) {
            Some(def) => def.display_name.clone(),
            None => name.to_string(),
        }
    }

    pub fn render_type(&self, ty: &TypeExpr) -> String {
        ty.render(&|name: &str| self.display_name_of(name))
    }

    /// Follow aliases until a non-alias expression is reached.
    pub fn resolve_alias<'a>(&'a self, ty: &'a TypeExpr) -> &'a TypeExpr {
        let mut current = ty;
        for _ in 0..self.nodes.len() {
            let TypeExpr::Named(name) = current else { break };
            match self.resolve(name).as_slice() {
                [def] => match &def.shape {
                    Shape::Alias(target) => current = target,
                    _ => break,
                },
                _ => break,
            }
        }
        current
    }

    pub fn participating(&self) -> impl Iterator<Item = &NodeDef> {
        self.nodes.values().filter(|def| def.participates())
    }
}

fn parse_type(node: &str, src: &str) -> Result<TypeExpr> {
    TypeExpr::parse(src).map_err(|message| Error::shape(node, message))
}

fn expected(node: &str, key: &str, what: &str, found: &RawValue) -> Error {
    Error::shape(node, format!("`{key}` must be {what}, found {}", found.describe()))
}

fn parse_derives(node: &str, value: RawValue) -> Result<Vec<String>> {
    let items: Vec<String> = match value {
        RawValue::Text(t) => t.split(',').map(|s| s.trim().to_string()).collect(),
        RawValue::List(items) => items.into_iter().map(|s| s.trim().to_string()).collect(),
        other => return Err(expected(node, "derive", "a string or a list", &other)),
    };
    let items: Vec<String> = items.into_iter().filter(|s| !s.is_empty()).collect();
    if let Some(bad) = items.iter().find(|s| !naming::is_ident_path(s)) {
        return Err(Error::shape(node, format!("`{bad}` is not a derivable trait name")));
    }
    Ok(items)
}

fn parse_children(node: &str, value: RawValue) -> Result<ChildrenSpec> {
    let items = match value {
        RawValue::Text(t) if t.trim() == "self" => return Ok(ChildrenSpec::SelfVariants),
        RawValue::Text(t) => vec![t],
        RawValue::List(items) => items,
        other => return Err(expected(node, "children", "a list", &other)),
    };
    if let [only] = items.as_slice() {
        if only.trim() == "self" {
            return Ok(ChildrenSpec::SelfVariants);
        }
    }
    let refs = items
        .iter()
        .map(|item| {
            ChildRef::parse(item)
                .ok_or_else(|| Error::shape(node, format!("invalid children entry `{item}`")))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(ChildrenSpec::Refs(refs))
}

fn parse_variant(node: &str, variant: &str, value: RawValue) -> Result<Variant> {
    match value {
        RawValue::Null => Ok(Variant::Unit),
        RawValue::Text(t) if t.trim().is_empty() => Ok(Variant::Unit),
        RawValue::Text(t) => Ok(Variant::Wrap(parse_type(node, &t)?)),
        RawValue::Map(entries) => {
            let mut fields = IndexMap::new();
            let mut has_id = true;
            for (key, value) in entries.0 {
                match (key.as_str(), value) {
                    ("node", RawValue::Bool(flag)) => has_id = flag,
                    (_, RawValue::Text(_)) if !naming::is_ident(&key) => {
                        return Err(Error::shape(node, format!("variant field `{variant}.{key}` is not an identifier")));
                    }
                    (_, RawValue::Text(t)) => {
                        fields.insert(key.clone(), parse_type(node, &t)?);
                    }
                    (_, other) => {
                        return Err(Error::shape(
                            node,
                            format!("variant field `{variant}.{key}` must be a type expression, found {}", other.describe()),
                        ));
                    }
                }
            }
            Ok(Variant::Fields { fields, has_id })
        }
        other => Err(expected(node, variant, "a payload type or a field mapping", &other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn parse(src: &str) -> Result<Schema> {
        Schema::parse(Path::new("test.yaml"), src, Format::Yaml)
    }

    #[test]
    fn classifies_shapes_in_declaration_order() {
        let schema = parse(
            "NodeId: u32\n\
             Block: Vec<Stmt>\n\
             Stmt:\n  span: Span\n  kind: StmtKind\n\
             StmtKind:\n  as: Enum\n  Missing: ''\n  Noop: Span\n  Echo:\n    span: Span\n    value: u8\n",
        )
        .unwrap();
        assert_eq!(schema.nodes.keys().collect::<Vec<_>>(), ["NodeId", "Block", "Stmt", "StmtKind"]);
        assert!(schema.nodes["NodeId"].is_alias());
        let Shape::Product { fields } = &schema.nodes["Stmt"].shape else { panic!("product") };
        assert_eq!(fields.keys().collect::<Vec<_>>(), ["span", "kind"]);
        let Shape::Sum { variants } = &schema.nodes["StmtKind"].shape else { panic!("sum") };
        assert!(matches!(variants["Missing"], Variant::Unit));
        assert!(variants["Noop"].is_position_leaf());
        assert!(matches!(variants["Echo"], Variant::Fields { has_id: true, .. }));
    }

    #[test]
    fn reserved_keys_configure_the_entry() {
        let schema = parse(
            "NodeId: u32\n\
             A:\n  value: u8\n  derive: PartialOrd, Ord\n  feature: '!legacy'\n  rename: Alpha\n  node: false\n",
        )
        .unwrap();
        let a = &schema.nodes["A"];
        assert_eq!(a.display_name, "Alpha");
        assert_eq!(a.derives(), ["Debug", "PartialEq", "Eq", "Clone", "PartialOrd", "Ord"]);
        assert_eq!(a.feature, Some(FeatureGate { feature: "legacy".into(), negated: true }));
        assert!(!a.has_own_identity);
        assert!(!a.participates());
        let Shape::Product { fields } = &a.shape else { panic!("product") };
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn children_entries() {
        assert_eq!(ChildRef::parse("self.value?").unwrap(), ChildRef {
            field: "value".into(),
            qualified: true,
            modifier: ChildModifier::Optional,
        });
        assert_eq!(ChildRef::parse("body!").unwrap().modifier, ChildModifier::Excluded);
        assert!(ChildRef::parse("a.b").is_none());
        assert_eq!(parse_children("A", RawValue::List(vec!["self".into()])).unwrap(), ChildrenSpec::SelfVariants);
    }

    #[test]
    fn feature_gates_render_cfg_attributes() {
        assert_eq!(FeatureGate::parse("docblocks").unwrap().cfg_attr(), "#[cfg(feature = \"docblocks\")]");
        assert_eq!(FeatureGate::parse("!docblocks").unwrap().cfg_attr(), "#[cfg(not(feature = \"docblocks\"))]");
        assert!(FeatureGate::parse("!").is_none());
    }

    #[test]
    fn load_errors() {
        let err = parse("A:\n  as: Struct\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaLoad);
        let err = parse("A:\n  value: HashMap<u8>\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaLoad);
        let err = parse("- just\n- a list\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaLoad);
        let missing = Schema::load(Path::new("does/not/exist.yaml")).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::SchemaLoad);
    }

    #[test]
    fn keywords_cannot_name_anything() {
        for src in [
            "NodeId: u32\nCast:\n  span: Span\n  type: u8\n",
            "NodeId: u32\nSelfKw:\n  span: Span\n  rename: Self\n",
            "NodeId: u32\nimpl:\n  span: Span\n",
            "NodeId: u32\nTag:\n  as: Enum\n  fn: ''\n",
            "NodeId: u32\nTag:\n  as: Enum\n  Arm:\n    match: u8\n",
            "NodeId: u32\nTag:\n  _: u8\n",
        ] {
            let err = parse(src).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::SchemaLoad, "{src}");
        }
    }

    #[test]
    fn aliases_resolve_transitively() {
        let schema = parse("NodeId: u32\nStmt:\n  value: u8\nStmts: Vec<Stmt>\nBlock: Stmts\n").unwrap();
        let ty = TypeExpr::Named("Block".into());
        assert!(matches!(schema.resolve_alias(&ty), TypeExpr::Sequence(_)));
    }

    #[test]
    fn json_schemas_are_accepted() {
        let schema = Schema::parse(
            Path::new("ast.json"),
            r#"{"NodeId": "u32", "B": {"x": "u8"}, "A": {"b": "B"}}"#,
            Format::Json,
        )
        .unwrap();
        assert_eq!(schema.nodes.keys().collect::<Vec<_>>(), ["NodeId", "B", "A"]);
    }
}
