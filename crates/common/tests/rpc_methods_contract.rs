use std::collections::BTreeSet;

use quire_common::protocol::jsonrpc::{CURRENT_PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS};
use quire_common::protocol::rpc_methods::IMPLEMENTED_METHODS;

#[test]
fn implemented_methods_are_unique() {
    let unique: BTreeSet<&str> = IMPLEMENTED_METHODS.iter().copied().collect();
    assert_eq!(unique.len(), IMPLEMENTED_METHODS.len(), "duplicate method name in IMPLEMENTED_METHODS");
}

#[test]
fn method_names_are_namespaced() {
    for method in IMPLEMENTED_METHODS {
        let (namespace, name) =
            method.split_once('.').unwrap_or_else(|| panic!("`{method}` should be namespaced"));
        assert!(!namespace.is_empty() && !name.is_empty(), "`{method}` has an empty segment");
        assert!(
            method.chars().all(|ch| ch.is_ascii_lowercase() || ch == '.' || ch == '_'),
            "`{method}` should be lowercase snake case"
        );
    }
}

#[test]
fn current_protocol_version_is_listed_first() {
    assert_eq!(SUPPORTED_PROTOCOL_VERSIONS.first(), Some(&CURRENT_PROTOCOL_VERSION));
}
