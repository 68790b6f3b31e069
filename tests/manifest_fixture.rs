//! Integration tests checking a manifest and templates loaded from disk

use std::path::PathBuf;

use pretty_assertions::assert_eq;
use template_check::manifest::Manifest;
use template_check::{CheckError, Variant};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

#[test]
fn test_shop_fixture() {
    let root = fixture("shop");
    let manifest = Manifest::from_file(&root.join("templates.toml")).expect("manifest parses");
    assert_eq!(manifest.templates.variant, Variant::Html);

    let bundle = manifest.load_bundle(&root).expect("templates load");
    assert_eq!(
        bundle.paths().collect::<Vec<_>>(),
        vec!["templates/header.gohtml", "templates/index.gohtml"]
    );

    let project = manifest.build(&bundle).expect("manifest builds");
    let report = project.check();
    let messages: Vec<String> = report.diagnostics.iter().map(|d| d.to_string()).collect();
    assert_eq!(
        messages,
        vec![
            "header.gohtml:1:22: Email not found on example.com/shop.User",
            "index.gohtml:7:43: Cost not found on example.com/shop.Product",
        ]
    );

    let calls: Vec<(&str, &str)> = report
        .calls
        .iter()
        .map(|c| (c.template.as_str(), c.data.as_str()))
        .collect();
    assert_eq!(
        calls,
        vec![
            ("index.gohtml", "example.com/shop.Page"),
            ("header.gohtml", "*example.com/shop.User"),
        ]
    );
}

#[test]
fn test_report_converts_to_type_check_error() {
    let root = fixture("shop");
    let manifest = Manifest::from_file(&root.join("templates.toml")).unwrap();
    let bundle = manifest.load_bundle(&root).unwrap();
    let err = manifest.build(&bundle).unwrap().check().into_result().unwrap_err();
    assert!(matches!(&err, CheckError::TypeCheck(d) if d.len() == 2));
    assert!(err.to_string().starts_with("type check failed: header.gohtml:1:22:"));
}

#[test]
fn test_unmatched_pattern_fails_to_load() {
    let root = fixture("shop");
    let manifest = Manifest::from_str(
        r#"
[templates]
files = ["missing/*.gohtml"]
"#,
    )
    .unwrap();
    let bundle = manifest.load_bundle(&root).unwrap();
    assert!(bundle.is_empty());
    let err = manifest.build(&bundle).unwrap_err();
    assert_eq!(
        err.to_string(),
        r#"template: pattern matches no files: "missing/*.gohtml""#
    );
}
