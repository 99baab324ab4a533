// Strongly-typed type expressions. No raw strings past the loader.
use crate::naming;

/// The literal position type.
pub const POSITION_TYPE: &str = "Span";
/// The identity type; product kinds store one in a synthesized `id` field.
pub const IDENTITY_TYPE: &str = "NodeId";
/// Trait providing `fn id(&self) -> NodeId`.
pub const IDENTITY_TRAIT: &str = "HasId";
/// Trait providing `fn span(&self) -> Span`.
pub const POSITION_TRAIT: &str = "Spanned";
/// Identity returned by variants with no identity of their own.
pub const IDENTITY_SENTINEL: &str = "0";

const BOX: &str = "Box";
const VEC: &str = "Vec";
const SEPARATED: &str = "CommaSeparated";
const OPTION: &str = "Option";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    Position,
    /// Primitive, prelude import, qualified path or reference to a node kind.
    Named(String),
    Boxed(Box<TypeExpr>),
    Sequence(Box<TypeExpr>),
    /// Ordered elements plus inter-element trivia; elements live in `.inner`.
    SeparatorList(Box<TypeExpr>),
    Optional(Box<TypeExpr>),
}

impl TypeExpr {
    pub fn parse(src: &str) -> Result<TypeExpr, String> {
        let src = src.trim();
        if src.is_empty() {
            return Err("empty type expression".to_string());
        }
        if let Some(open) = src.find('<') {
            let Some(inner) = src[open + 1..].strip_suffix('>') else {
                return Err(format!("unbalanced `<` in `{src}`"));
            };
            let ctor = src[..open].trim();
            if has_top_level_comma(inner) {
                return Err(format!("`{ctor}` takes exactly one type parameter in `{src}`"));
            }
            let inner = Box::new(TypeExpr::parse(inner)?);
            return match ctor {
                BOX => Ok(TypeExpr::Boxed(inner)),
                VEC => Ok(TypeExpr::Sequence(inner)),
                SEPARATED => Ok(TypeExpr::SeparatorList(inner)),
                OPTION => Ok(TypeExpr::Optional(inner)),
                other => Err(format!("unsupported type constructor `{other}` in `{src}`")),
            };
        }
        if src.contains('>') {
            return Err(format!("unbalanced `>` in `{src}`"));
        }
        if !naming::is_ident_path(src) {
            return Err(format!("`{src}` is not a type name"));
        }
        if src == POSITION_TYPE {
            return Ok(TypeExpr::Position);
        }
        Ok(TypeExpr::Named(src.to_string()))
    }

    /// Render back to Rust, mapping node names through `name_of`.
    pub fn render(&self, name_of: &dyn Fn(&str) -> String) -> String {
        match self {
            TypeExpr::Position => POSITION_TYPE.to_string(),
            TypeExpr::Named(name) => name_of(name),
            TypeExpr::Boxed(inner) => format!("{BOX}<{}>", inner.render(name_of)),
            TypeExpr::Sequence(inner) => format!("{VEC}<{}>", inner.render(name_of)),
            TypeExpr::SeparatorList(inner) => format!("{SEPARATED}<{}>", inner.render(name_of)),
            TypeExpr::Optional(inner) => format!("{OPTION}<{}>", inner.render(name_of)),
        }
    }

    pub fn is_position(&self) -> bool {
        matches!(self, TypeExpr::Position)
    }

    /// Peel one level of heap indirection.
    pub fn unboxed(&self) -> &TypeExpr {
        match self {
            TypeExpr::Boxed(inner) => &**inner,
            other => other,
        }
    }

    /// Every `Named` leaf, outermost first.
    pub fn names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            TypeExpr::Position => {}
            TypeExpr::Named(name) => out.push(name),
            TypeExpr::Boxed(inner)
            | TypeExpr::Sequence(inner)
            | TypeExpr::SeparatorList(inner)
            | TypeExpr::Optional(inner) => inner.collect_names(out),
        }
    }
}

fn has_top_level_comma(src: &str) -> bool {
    let mut depth = 0usize;
    for c in src.chars() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => return true,
            _ => {}
        }
    }
    false
}

/// Rust's built-in scalar types; always resolvable.
pub fn is_primitive(name: &str) -> bool {
    matches!(
        name,
        "bool" | "char" | "String"
            | "u8" | "u16" | "u32" | "u64" | "u128" | "usize"
            | "i8" | "i16" | "i32" | "i64" | "i128" | "isize"
            | "f32" | "f64"
    )
}
