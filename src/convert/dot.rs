//! Graphviz DOT export of a reduced `SymbolicPlan` (spec §0.D
//! `--save-task-graph`), grounded on
//! `original_source/implementation/python/voxlogica/converters/dot_converter.py`.

use crate::ir::{NodeSpec, SymbolicPlan};
use std::fmt::Write as _;

/// Render `plan` as a DOT digraph: one node per plan node, labelled by its
/// kind/operator/value, edges from each dependency to its dependent.
pub fn to_dot(plan: &SymbolicPlan) -> String {
    let mut out = String::from("digraph {\n");
    for (node_id, spec) in plan.nodes.iter() {
        match spec {
            NodeSpec::Primitive { operator, .. } => {
                let _ = writeln!(out, "  \"{node_id}\" [label=\"{}\"]", escape(operator));
                for dep in spec.dependencies() {
                    let _ = writeln!(out, "  \"{dep}\" -> \"{node_id}\";");
                }
            }
            NodeSpec::Constant(value) => {
                let _ = writeln!(out, "  \"{node_id}\" [label=\"const: {}\"]", escape(&format!("{value:?}")));
            }
            NodeSpec::Closure { parameter, .. } => {
                let _ = writeln!(out, "  \"{node_id}\" [label=\"closure({})\"]", escape(parameter));
                for dep in spec.dependencies() {
                    let _ = writeln!(out, "  \"{dep}\" -> \"{node_id}\";");
                }
            }
        }
    }
    out.push_str("}\n");
    out
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program_content;
    use crate::primitives::PrimitiveRegistry;
    use crate::reducer::reduce_program;

    #[test]
    fn renders_a_digraph_with_one_node_per_plan_node() {
        let mut registry = PrimitiveRegistry::new();
        let program = parse_program_content("print \"r\" 1 + 2").unwrap();
        let plan = reduce_program(&program, &mut registry).unwrap().to_symbolic_plan();
        let dot = to_dot(&plan);
        assert!(dot.starts_with("digraph {\n"));
        assert!(dot.ends_with("}\n"));
        assert_eq!(dot.matches("->").count(), 2);
    }
}
