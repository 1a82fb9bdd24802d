//! The bundled suite files parse and name only registered scenarios

use std::path::Path;

use preserve_e2e::scenarios;
use preserve_e2e::Suite;

#[test]
fn test_bundled_suites_resolve() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("suites");
    let suites = Suite::load_all(&dir).unwrap();
    let names: Vec<&str> = suites.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["load", "smoke", "ui"]);

    let registry = scenarios::builtin();
    for suite in &suites {
        for entry in &suite.scenarios {
            let scenario = scenarios::find(&registry, &entry.scenario).unwrap();
            assert_eq!(scenario.name(), entry.scenario);
        }
    }
}

#[test]
fn test_load_suite_params() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("suites");
    let load = Suite::from_file(&dir.join("load.yaml")).unwrap();
    let large = load
        .scenarios
        .iter()
        .find(|e| e.scenario == "large-file")
        .unwrap();
    assert_eq!(large.display_name(), "large-file-250mib");
    assert_eq!(large.timeout_secs, Some(3600));
    assert_eq!(large.params.u64_or("size_mib", 100).unwrap(), 250);
    assert!(load.entry_tags(large).any(|t| t == "nightly"));
}

#[test]
fn test_parse_inline_suite() {
    let yaml = r#"
name: smoke
description: Quick API checks
tags: [smoke]
scenarios:
  - scenario: container-lifecycle
  - scenario: deposit-mets
    params:
      path: objects/readme.txt
"#;
    let suite = Suite::from_yaml(yaml).unwrap();
    assert_eq!(suite.name, "smoke");
    assert_eq!(suite.scenarios.len(), 2);
    assert_eq!(
        suite.scenarios[1].params.str_or("path", "objects/hello.txt").unwrap(),
        "objects/readme.txt"
    );
}
