//! Integration tests for the facade and the core data structures.

use pretty_assertions::assert_eq;
use rexamine::cache::{Cache, FsCache, MemoryCache};
use rexamine::config::Config;
use rexamine::core::errors::SourceError;
use rexamine::core::literals::LiteralOptions;
use rexamine::core::nodes::Node;
use rexamine::facade::{ExplainFormat, Facade};
use rexamine::{Flags, TargetVersion};
use std::sync::Arc;

#[test]
fn test_flags_from_letters() {
    let (flags, unknown) = Flags::from_letters("ims");
    assert!(flags.ignore_case);
    assert!(flags.multiline);
    assert!(flags.dot_all);
    assert!(!flags.unicode);
    assert!(!flags.extended);
    assert!(unknown.is_empty());

    let (_, unknown) = Flags::from_letters("iq");
    assert_eq!(unknown, vec!['q']);
}

#[test]
fn test_flag_letters_round_trip() {
    let (flags, _) = Flags::from_letters("imxU");
    assert_eq!(flags.letters(), "imxU");
}

#[test]
fn test_ast_node_serialization() {
    let f = Facade::new(Config::default());
    let out = f.parse("/ab/").unwrap();
    let json = serde_json::to_value(&out.root).unwrap();
    assert_eq!(json["type"], "Regex");
    assert_eq!(json["body"]["type"], "Literal");
    assert_eq!(json["body"]["value"], "ab");

    let back: Node = serde_json::from_value(json).unwrap();
    assert_eq!(back, out.root);
}

#[test]
fn test_error_formatting() {
    let error = SourceError::new("Unexpected character", 6, "hello world", "parser.unexpected")
        .with_hint(Some("Did you mean to escape this?".to_string()));

    let formatted = error.to_string();
    assert!(formatted.contains("Unexpected character"));
    assert!(formatted.contains("hint:"));
    assert!(formatted.contains("Did you mean to escape this?"));
}

#[test]
fn test_error_lsp_diagnostic() {
    let f = Facade::new(Config::default());
    let err = f.parse("/(ab/").unwrap_err();
    match err {
        rexamine::Error::Parser(source) => {
            let diag = source.to_lsp_diagnostic();
            assert_eq!(diag["severity"], 1);
            assert_eq!(diag["source"], "rexamine");
            assert_eq!(diag["code"], "parser.unbalanced_group");
        }
        other => panic!("expected parser error, got {:?}", other),
    }
}

#[test]
fn test_tolerant_parse_through_facade() {
    let f = Facade::new(Config::default());
    let out = f.parse_tolerant("/a)b(/").unwrap();
    assert!(!out.errors.is_empty());
    let mut error_nodes = 0;
    out.root.walk(&mut |n| {
        if matches!(n, Node::Error(_)) {
            error_nodes += 1;
        }
    });
    assert!(error_nodes >= 1 || out.errors.len() >= 2);
}

#[test]
fn test_validation_offset_and_snippet() {
    let f = Facade::new(Config::default());
    let v = f.validate("/abc[z-a]/");
    assert!(!v.valid);
    assert_eq!(v.code.as_deref(), Some("range.reversed"));
    assert_eq!(v.offset, Some(4));
    assert!(v.snippet.unwrap().contains('^'));
}

#[test]
fn test_runtime_validation_surfaces_host_failures() {
    let mut config = Config::default();
    config.runtime_validation = true;
    let f = Facade::new(config);
    // Valid for the front end, but the host matcher has no lookbehind
    let v = f.validate("/(?<=a)b/");
    assert!(!v.valid);
    assert_eq!(v.code.as_deref(), Some("runtime.compile"));
}

#[test]
fn test_literals_through_facade() {
    let f = Facade::new(Config::default());
    let set = f.literals("/^(foo|bar)baz$/", LiteralOptions::default()).unwrap();
    assert!(set.complete);
    assert!(set.prefixes.contains("foobaz"));
    assert!(set.prefixes.contains("barbaz"));
    assert!(set.suffixes.contains("foobaz"));
}

#[test]
fn test_fs_cache_integration() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(FsCache::new(dir.path()));
    let mut config = Config::default();
    config.cache = Some(cache.clone());
    let f = Facade::new(config);

    let first = f.parse("/(a|b)+c/").unwrap();
    // One file per key appears under the root
    let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(files.len(), 1);

    let second = f.parse("/(a|b)+c/").unwrap();
    assert_eq!(first.root, second.root);

    cache.clear(None);
    assert!(f.parse("/(a|b)+c/").is_ok());
}

#[test]
fn test_cache_key_depends_on_version() {
    let cache = Arc::new(MemoryCache::new());

    let mut config = Config::default();
    config.cache = Some(cache.clone());
    let f1 = Facade::new(config);
    f1.parse("/a/").unwrap();

    let mut config = Config::default();
    config.target_version = TargetVersion::new(7, 4);
    config.cache = Some(cache.clone());
    let f2 = Facade::new(config);
    f2.parse("/a/").unwrap();

    assert_eq!(cache.len(), 2);
}

#[test]
fn test_explain_text_shows_structure() {
    let f = Facade::new(Config::default());
    let text = f.explain("/(?<n>a|b)+/", ExplainFormat::Text).unwrap();
    assert!(text.contains("Quantifier"));
    assert!(text.contains("name=n"));
    assert!(text.contains("Alternation"));
}

#[test]
fn test_concurrent_reads() {
    let mut config = Config::default();
    config.cache = Some(Arc::new(MemoryCache::new()));
    let facade = Arc::new(Facade::new(config));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let f = Arc::clone(&facade);
            std::thread::spawn(move || {
                let source = format!("/(a|b){{1,{}}}c/", i + 1);
                assert!(f.validate(&source).valid);
                f.parse(&source).unwrap().groups.count
            })
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap(), 1);
    }
}
