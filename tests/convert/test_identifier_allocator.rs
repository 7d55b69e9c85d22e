use pipeline_convert::core::convert::identifier::{
    is_valid_identifier, normalize_identifier, IdentifierRegistry, MAX_IDENTIFIER_LEN,
};
use proptest::prelude::*;
use std::collections::HashSet;

#[test]
fn blank_seeds_fall_back_to_kind() {
    let mut registry = IdentifierRegistry::new();
    assert_eq!(registry.allocate("", "save-cache").unwrap(), "save-cache");
    assert_eq!(registry.allocate("  ", "save-cache").unwrap(), "save-cache-1");
    assert_eq!(registry.len(), 2);
}

#[test]
fn suffixes_skip_identifiers_already_issued() {
    let mut registry = IdentifierRegistry::new();
    registry.allocate("test-1", "run").unwrap();
    assert_eq!(registry.allocate("test", "run").unwrap(), "test");
    assert_eq!(registry.allocate("test", "run").unwrap(), "test-2");
    assert!(registry.contains("test-1"));
}

#[test]
fn separate_registries_do_not_share_state() {
    let mut first = IdentifierRegistry::new();
    let mut second = IdentifierRegistry::new();
    assert_eq!(first.allocate("run", "run").unwrap(), "run");
    assert_eq!(second.allocate("run", "run").unwrap(), "run");
}

#[test]
fn unicode_names_normalize_to_ascii() {
    assert_eq!(normalize_identifier("déploy prod", "run"), "d_ploy_prod");
    assert!(is_valid_identifier(&normalize_identifier("🚀", "run")));
}

#[test]
fn validity_rule() {
    assert!(is_valid_identifier("_build-1"));
    assert!(!is_valid_identifier(""));
    assert!(!is_valid_identifier("1build"));
    assert!(!is_valid_identifier("-build"));
    assert!(!is_valid_identifier("build step"));
    assert!(!is_valid_identifier(&"a".repeat(MAX_IDENTIFIER_LEN + 1)));
}

proptest! {
    #[test]
    fn allocated_identifiers_are_unique_and_valid(seeds in prop::collection::vec(".{0,12}", 1..40)) {
        let mut registry = IdentifierRegistry::new();
        let mut seen = HashSet::new();
        for seed in &seeds {
            let id = registry.allocate(seed, "run").unwrap();
            prop_assert!(is_valid_identifier(&id), "invalid identifier {:?}", id);
            prop_assert!(seen.insert(id));
        }
        prop_assert_eq!(registry.len(), seeds.len());
    }

    #[test]
    fn repeated_seed_is_deterministic(seed in "[a-z ]{0,10}", count in 1usize..20) {
        let run = || {
            let mut registry = IdentifierRegistry::new();
            (0..count)
                .map(|_| registry.allocate(&seed, "run").unwrap())
                .collect::<Vec<_>>()
        };
        prop_assert_eq!(run(), run());
    }
}
