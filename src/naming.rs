use once_cell::sync::Lazy;
use regex::Regex;

static IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

static IDENT_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(::[A-Za-z_][A-Za-z0-9_]*)*$").unwrap());

/// Strict and reserved keywords; none of them can name a type, variant or field.
const KEYWORDS: &[&str] = &[
    "Self", "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "crate", "do",
    "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "if", "impl", "in", "let", "loop", "macro",
    "match", "mod", "move", "mut", "override", "priv", "pub", "ref", "return", "self", "static", "struct",
    "super", "trait", "true", "try", "type", "typeof", "unsafe", "unsized", "use", "virtual", "where", "while",
    "yield",
];

pub fn is_keyword(s: &str) -> bool {
    KEYWORDS.contains(&s)
}

/// A plain identifier: not a keyword and not `_`.
pub fn is_ident(s: &str) -> bool {
    s != "_" && IDENT.is_match(s) && !is_keyword(s)
}

/// `Foo`, `foo_bar`, or a `::`-separated path of those.
pub fn is_ident_path(s: &str) -> bool {
    IDENT_PATH.is_match(s)
}

/// Canonical lowercase-with-separators form of a kind name.
///
/// Every character followed by an uppercase letter gets a `_` after it, so
/// `IfStatement` → `if_statement` and `HTMLTag` → `h_t_m_l_tag`. Already
/// lowercase names are returned unchanged.
pub fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().filter(|c| !c.is_whitespace()).collect();
    let mut out = String::with_capacity(chars.len() + 4);
    for (i, c) in chars.iter().enumerate() {
        out.extend(c.to_lowercase());
        if chars.get(i + 1).is_some_and(|next| next.is_uppercase()) {
            out.push('_');
        }
    }
    out
}

/// Last segment of a `::` path: `pxp_span::Span` → `Span`.
pub fn last_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_case_inserts_separators_before_uppercase() {
        assert_eq!(snake_case("Echo"), "echo");
        assert_eq!(snake_case("IfStatement"), "if_statement");
        assert_eq!(snake_case("HTMLTag"), "h_t_m_l_tag");
        assert_eq!(snake_case("Self_"), "self_");
        assert_eq!(snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn identifiers() {
        assert!(is_ident("Echo"));
        assert!(is_ident("_private"));
        assert!(!is_ident("9lives"));
        assert!(!is_ident("a::b"));
        assert!(!is_ident("_"));
        assert!(is_ident("Self_"));
        assert!(is_ident("union"));
        assert!(is_ident_path("pxp_span::Span"));
        assert!(!is_ident_path("pxp_span::"));
        assert_eq!(last_segment("crate::utils::CommaSeparated"), "CommaSeparated");
        assert_eq!(last_segment("Span"), "Span");
    }

    #[test]
    fn keywords_are_not_identifiers() {
        for keyword in ["type", "Self", "self", "fn", "match", "async", "try", "yield"] {
            assert!(is_keyword(keyword), "{keyword}");
            assert!(!is_ident(keyword), "{keyword}");
        }
    }
}
