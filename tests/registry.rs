//! Primitive discovery/resolution and stdlib declarations through the
//! public API (spec §4.B / §10.A).

use voxlogica::primitives::PrimitiveRegistry;

#[test]
fn default_namespace_is_imported_on_construction() {
    let registry = PrimitiveRegistry::new();
    assert!(registry.imported_namespaces().contains(&"default".to_string()));
}

#[test]
fn namespaces_are_discoverable_in_sorted_order() {
    let registry = PrimitiveRegistry::new();
    let namespaces = registry.list_namespaces();
    let mut sorted = namespaces.clone();
    sorted.sort();
    assert_eq!(namespaces, sorted);
    assert!(namespaces.contains(&"default".to_string()));
    assert!(namespaces.contains(&"simpleitk".to_string()));
}

#[test]
fn qualified_lookup_does_not_require_the_namespace_to_be_imported() {
    let registry = PrimitiveRegistry::new();
    assert!(!registry.imported_namespaces().contains(&"simpleitk".to_string()));
    assert!(registry.resolve("simpleitk.WriteImage").is_ok());
}

#[test]
fn unqualified_lookup_prefers_the_default_namespace() {
    let registry = PrimitiveRegistry::new();
    let spec = registry.resolve("+").expect("default arithmetic must resolve unqualified");
    assert_eq!(spec.namespace, "default");
}

#[test]
fn stdlib_declarations_are_available_without_an_explicit_import() {
    let program = voxlogica::parser::parse_program_content("print \"r\" sq(4)").unwrap();
    let mut registry = PrimitiveRegistry::new();
    voxlogica::reducer::reduce_program(&program, &mut registry).expect("stdlib's sq() must be in scope by default");
}

#[test]
fn list_primitives_scoped_to_a_namespace_returns_unqualified_names() {
    let registry = PrimitiveRegistry::new();
    let primitives = registry.list_primitives(Some("default"));
    assert!(primitives.iter().any(|(name, _)| name == "range"));
    assert!(primitives.iter().all(|(name, _)| !name.contains('.')));
}

#[test]
fn reset_runtime_state_runs_every_registered_hook_without_panicking() {
    let registry = PrimitiveRegistry::new();
    registry.reset_runtime_state();
}
