use std::path::{Path, PathBuf};

use astgen::schema::Format;
use astgen::{Config, ErrorKind, Outcome, Schema};

fn meta_schema_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("meta").join("ast.yaml")
}

fn generate(src: &str) -> astgen::Result<String> {
    let schema = Schema::parse(Path::new("inline.yaml"), src, Format::Yaml)?;
    astgen::generate(&schema, &Config::default())
}

fn union_cases(src: &str) -> Vec<String> {
    let file = syn::parse_file(src).expect("generated source should parse");
    file.items
        .iter()
        .find_map(|item| match item {
            syn::Item::Enum(item) if item.ident == "NodeKind" => {
                Some(item.variants.iter().map(|v| v.ident.to_string()).collect())
            }
            _ => None,
        })
        .expect("NodeKind is emitted")
}

#[test]
fn meta_schema_generates_well_formed_rust() {
    let schema = Schema::load(&meta_schema_path()).unwrap();
    let src = astgen::generate(&schema, &Config::default()).unwrap();
    syn::parse_file(&src).unwrap();
    assert!(src.starts_with("// This file is generated by astgen from "));
    assert!(src.contains("use crate::HasId;\nuse crate::utils::CommaSeparated;\nuse pxp_span::Span;\nuse pxp_span::Spanned;\nuse std::ptr::NonNull;\n"));
    assert!(!src.contains(" _ =>"), "dispatch must not fall through a wildcard");
}

#[test]
fn union_cases_follow_declaration_order() {
    let schema = Schema::load(&meta_schema_path()).unwrap();
    let src = astgen::generate(&schema, &Config::default()).unwrap();
    assert_eq!(
        union_cases(&src),
        [
            "Program",
            "Statement",
            "StatementKind",
            "EchoStatement",
            "ExpressionStatement",
            "IfStatement",
            "ReturnStatement",
            "UseStatement",
            "UseKind",
            "Expression",
            "ExpressionKind",
            "Name",
            "SimpleIdentifier",
            "Variable",
            "CallExpression",
            "ArgumentList",
            "Argument",
            "ParenthesizedExpression",
            "Array",
            "Array",
            "AttributeGroup",
            "Attribute",
        ]
    );
}

#[test]
fn excluded_kinds_stay_out_of_the_view() {
    let schema = Schema::load(&meta_schema_path()).unwrap();
    let src = astgen::generate(&schema, &Config::default()).unwrap();
    for excluded in ["Comment", "Ending", "NodeId", "Block"] {
        assert!(!src.contains(&format!("NodeKind::{excluded}(")), "{excluded} is in the view");
        assert!(!src.contains(&format!("impl HasId for {excluded} ")), "{excluded} has an identity");
    }
    assert!(src.contains("impl Spanned for Ending {"));
    assert!(src.contains("impl Spanned for Comment {"));
    assert!(src.contains("pub type Block = Vec<Statement>;"));
}

#[test]
fn gated_kinds_are_guarded_at_every_site() {
    let schema = Schema::load(&meta_schema_path()).unwrap();
    let src = astgen::generate(&schema, &Config::default()).unwrap();
    let lines: Vec<&str> = src.lines().collect();
    let guarded_sites = [
        "AttributeGroup(&'a AttributeGroup),",
        "NodeKind::AttributeGroup(",
        "pub fn as_attribute_group(",
        "pub fn is_attribute_group(",
        "impl<'a> From<&'a AttributeGroup>",
        "pub struct AttributeGroup {",
        "impl HasId for AttributeGroup {",
        "impl Spanned for AttributeGroup {",
    ];
    let mut checked = 0;
    for (i, line) in lines.iter().enumerate() {
        let line = line.trim_start();
        if guarded_sites.iter().any(|site| line.starts_with(site)) {
            let previous = lines[i - 1].trim();
            let guard = if line.starts_with("pub struct") { lines[i - 2].trim() } else { previous };
            assert_eq!(guard, "#[cfg(feature = \"attributes\")]", "unguarded: {line}");
            checked += 1;
        }
    }
    // definition, two impls, union case, as/is, name/children/as_ptr arms, conversion
    assert_eq!(checked, 10);
    assert_eq!(src.matches("#[cfg(not(feature = \"legacy\"))]").count(), src.matches("#[cfg(feature = \"legacy\")]").count());
}

#[test]
fn scenario_echo_with_separated_values() {
    let src = generate(
        "NodeId: u32\n\
         Span: pxp_span::Span\n\
         Expression:\n  span: Span\n  value: u8\n\
         Echo:\n  span: Span\n  values: CommaSeparated<Expression>\n  children: [values]\n",
    )
    .unwrap();
    syn::parse_file(&src).unwrap();
    assert!(src.contains("pub type Span = pxp_span::Span;"));
    assert!(!src.contains("use pxp_span::Span;"));
    assert!(src.contains("pub struct Echo {\n    pub id: NodeId,\n    pub span: Span,\n    pub values: CommaSeparated<Expression>,\n}"));
    assert!(src.contains("impl HasId for Echo {\n    fn id(&self) -> NodeId {\n        self.id\n    }\n}"));
    assert!(src.contains("impl Spanned for Echo {\n    fn span(&self) -> Span {\n        self.span\n    }\n}"));
    assert_eq!(union_cases(&src), ["Expression", "Echo"]);
    assert!(src.contains("NodeKind::Echo(node) => {\n                for child_0 in node.values.inner.iter() {\n                    children.push(Node::from(child_0));\n                }\n            }"));
}

#[test]
fn scenario_position_leaf_in_expression_kind() {
    let src = generate(
        "NodeId: u32\n\
         Expression:\n  span: Span\n  kind: ExpressionKind\n\
         ExpressionKind:\n  as: Enum\n  Literal: Span\n  Missing: ''\n",
    )
    .unwrap();
    syn::parse_file(&src).unwrap();
    assert!(src.contains("Self::Literal(_) => 0,"));
    assert!(src.contains("Self::Missing => 0,"));
    assert!(!src.contains("impl Spanned for ExpressionKind"));
    assert!(src.contains("Node::new(node.id(), NodeKind::ExpressionKind(node), Span::default())"));
}

#[test]
fn strict_spans_reject_variants_without_a_position() {
    let src = "NodeId: u32\nToken:\n  as: Enum\n  At: Span\n  Eof: ''\n";
    let lenient = generate(src).unwrap();
    assert!(lenient.contains("Self::Eof => Span::default(),"));

    let schema = Schema::parse(Path::new("inline.yaml"), src, Format::Yaml).unwrap();
    let err = astgen::generate(&schema, &Config::default().strict_spans(true)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmissionInvariant);
}

#[test]
fn schema_errors_are_classified() {
    let cases = [
        ("NodeId: u32\nA:\n  b: Missing\n", ErrorKind::SchemaReference),
        ("NodeId: u32\nA:\n  b: u8\n  children: self\n", ErrorKind::EmissionInvariant),
        ("NodeId: u32\nA:\n  b: u8\n  children: [c]\n", ErrorKind::EmissionInvariant),
        ("NodeId: u32\nA:\n  b: u8\n  children: [b]\n", ErrorKind::SchemaReference),
        ("NodeId: u32\nA:\n  as: Union\n", ErrorKind::SchemaLoad),
        ("NodeId: u32\nA:\n  b: Vec<u8, u8>\n", ErrorKind::SchemaLoad),
        ("A:\n  b: u8\n", ErrorKind::SchemaReference),
        ("NodeId: u32\nCast:\n  span: Span\n  type: u8\n", ErrorKind::SchemaLoad),
        ("NodeId: u32\nSelfKw:\n  span: Span\n  rename: Self\n", ErrorKind::SchemaLoad),
    ];
    for (src, expected) in cases {
        let err = generate(src).unwrap_err();
        assert_eq!(err.kind(), expected, "{src}: {err}");
    }
}

#[test]
fn positions_need_the_spanned_trait() {
    let schema = Schema::parse(Path::new("inline.yaml"), "NodeId: u32\nA:\n  span: Span\n", Format::Yaml).unwrap();
    let config = Config::default().with_imports(["crate::HasId", "crate::Span"]);
    let err = astgen::generate(&schema, &config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaReference);
}

#[test]
fn runs_write_identical_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("src").join("generated.rs");
    let config = Config::with_paths(meta_schema_path(), &out);

    let first = astgen::run(&config, false).unwrap();
    assert!(matches!(first, Outcome::Written { .. }));
    let before = std::fs::read(&out).unwrap();
    astgen::run(&config, false).unwrap();
    assert_eq!(std::fs::read(&out).unwrap(), before);
}

#[test]
fn check_mode_compares_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("generated.rs");
    let config = Config::with_paths(meta_schema_path(), &out);

    assert!(matches!(astgen::run(&config, true).unwrap(), Outcome::Stale { .. }));
    assert!(!out.exists());
    astgen::run(&config, false).unwrap();
    assert!(matches!(astgen::run(&config, true).unwrap(), Outcome::UpToDate { .. }));
    std::fs::write(&out, "// edited by hand\n").unwrap();
    assert!(matches!(astgen::run(&config, true).unwrap(), Outcome::Stale { .. }));
}

#[test]
fn check_mode_reports_unreadable_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::with_paths(meta_schema_path(), dir.path());
    let err = astgen::run(&config, true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Output);
}

#[test]
fn failed_runs_leave_the_output_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let schema = dir.path().join("ast.yaml");
    let out = dir.path().join("generated.rs");
    std::fs::write(&schema, "NodeId: u32\nA:\n  b: Missing\n").unwrap();
    let config = Config::with_paths(&schema, &out);

    let err = astgen::run(&config, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaReference);
    assert!(!out.exists());

    std::fs::write(&out, "previous").unwrap();
    astgen::run(&config, false).unwrap_err();
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "previous");
    let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(leftovers, 2);
}

#[test]
fn json_schemas_generate_the_same_view() {
    let dir = tempfile::tempdir().unwrap();
    let schema = dir.path().join("ast.json");
    std::fs::write(
        &schema,
        r#"{
            "NodeId": "u32",
            "Echo": {"span": "Span", "values": "Vec<Name>", "children": ["values"]},
            "Name": {"span": "Span", "symbol": "String"}
        }"#,
    )
    .unwrap();
    let config = Config::with_paths(&schema, dir.path().join("generated.rs"));
    astgen::run(&config, false).unwrap();
    let src = std::fs::read_to_string(&config.out_path).unwrap();
    assert_eq!(union_cases(&src), ["Echo", "Name"]);
}

#[test]
fn missing_schema_is_a_load_error() {
    let config = Config::with_paths("does/not/exist.yaml", "unused.rs");
    assert_eq!(astgen::run(&config, false).unwrap_err().kind(), ErrorKind::SchemaLoad);
}
