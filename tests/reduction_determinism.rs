//! The same source text reduces to the same node ids every time, and
//! structurally identical subexpressions collapse onto one node (spec
//! §4.C's content-addressing invariant).

use voxlogica::primitives::PrimitiveRegistry;
use voxlogica::reducer::reduce_program;

fn node_ids(source: &str) -> Vec<String> {
    let program = voxlogica::parser::parse_program_content(source).unwrap();
    let mut registry = PrimitiveRegistry::new();
    let plan = reduce_program(&program, &mut registry).unwrap().to_symbolic_plan();
    plan.nodes.iter().map(|(id, _)| id.as_str().to_string()).collect()
}

#[test]
fn identical_source_reduces_to_identical_node_ids() {
    let source = "print \"r\" (1 + 2) * 3";
    assert_eq!(node_ids(source), node_ids(source));
}

#[test]
fn repeated_subexpressions_share_one_node() {
    let program = voxlogica::parser::parse_program_content("print \"r\" (1 + 2) + (1 + 2)").unwrap();
    let mut registry = PrimitiveRegistry::new();
    let plan = reduce_program(&program, &mut registry).unwrap().to_symbolic_plan();
    // (1+2) appears twice in source but must be a single shared node: one
    // "+" node over the two integer constants, not two.
    let plus_nodes = plan
        .nodes
        .iter()
        .filter(|(_, spec)| matches!(spec, voxlogica::ir::NodeSpec::Primitive { operator, .. } if operator == "+"))
        .count();
    assert_eq!(plus_nodes, 2, "expected the shared '1+2' node plus the outer '+' node");
}

#[test]
fn differing_source_reduces_to_different_node_ids() {
    let a = node_ids("print \"r\" 1 + 2");
    let b = node_ids("print \"r\" 1 + 3");
    assert_ne!(a, b);
}

#[test]
fn plan_validates_acyclic_and_reference_closed() {
    let program = voxlogica::parser::parse_program_content("let f(x) = x * x\nprint \"r\" f(5)").unwrap();
    let mut registry = PrimitiveRegistry::new();
    let plan = reduce_program(&program, &mut registry).unwrap().to_symbolic_plan();
    plan.validate().expect("a freshly reduced plan must validate");
}
