//! JSON task-graph export of a reduced `SymbolicPlan` (spec §0.D
//! `--save-task-graph-as-json`), grounded on
//! `original_source/implementation/python/voxlogica/converters/json_converter.py`.

use crate::ir::{GoalOperation, NodeSpec, SymbolicPlan};
use serde_json::{json, Value};

/// Render `plan` as `{"nodes": [...], "goals": [...]}`, each node carrying
/// its id, kind, and kind-specific fields (operator/arguments/attrs for
/// primitives and closures, value for constants).
pub fn to_json_graph(plan: &SymbolicPlan) -> Value {
    let mut nodes = Vec::new();
    for (node_id, spec) in plan.nodes.iter() {
        let entry = match spec {
            NodeSpec::Primitive { operator, args, kwargs, attrs, output_kind } => json!({
                "id": node_id.as_str(),
                "type": "operation",
                "operator": operator,
                "arguments": argument_ids(args, kwargs),
                "attrs": attrs,
                "output_kind": output_kind.as_str(),
            }),
            NodeSpec::Constant(value) => json!({
                "id": node_id.as_str(),
                "type": "constant",
                "value": serde_json::to_value(value).unwrap_or(Value::Null),
                "output_kind": "scalar",
            }),
            NodeSpec::Closure { parameter, captures, .. } => json!({
                "id": node_id.as_str(),
                "type": "closure",
                "parameter": parameter,
                "arguments": captures.iter().map(crate::ir::NodeId::as_str).collect::<Vec<_>>(),
                "output_kind": "closure",
            }),
        };
        nodes.push(entry);
    }

    let goals: Vec<Value> = plan
        .goals
        .iter()
        .map(|goal| {
            json!({
                "operation": match goal.operation {
                    GoalOperation::Print => "print",
                    GoalOperation::Save => "save",
                },
                "id": goal.target.as_str(),
                "name": goal.label,
            })
        })
        .collect();

    json!({ "nodes": nodes, "goals": goals })
}

fn argument_ids(args: &[crate::ir::NodeId], kwargs: &[(String, crate::ir::NodeId)]) -> Vec<String> {
    args.iter()
        .map(crate::ir::NodeId::as_str)
        .chain(kwargs.iter().map(|(_, id)| id.as_str()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program_content;
    use crate::primitives::PrimitiveRegistry;
    use crate::reducer::reduce_program;

    #[test]
    fn renders_nodes_and_goals() {
        let mut registry = PrimitiveRegistry::new();
        let program = parse_program_content("print \"r\" 1 + 2").unwrap();
        let plan = reduce_program(&program, &mut registry).unwrap().to_symbolic_plan();
        let graph = to_json_graph(&plan);
        assert_eq!(graph["goals"].as_array().unwrap().len(), 1);
        assert_eq!(graph["goals"][0]["name"], "r");
        assert!(graph["nodes"].as_array().unwrap().len() >= 3);
    }
}
