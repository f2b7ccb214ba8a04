//! Registration-contract-only stub for the `simpleitk` namespace: real
//! kernel bodies are explicitly out of scope, but the effect-producing
//! surface (`WriteImage`) must exist so the policy layer's effect allowlist
//! (spec §10.C) has something concrete to permit or block.

use crate::ir::OutputKind;
use crate::primitives::api::{default_planner_factory, AritySpec, KernelError, PrimitiveSpec};
use crate::primitives::registry::PrimitiveRegistry;
use std::sync::Arc;

pub fn register(registry: &mut PrimitiveRegistry) {
    let write_image = PrimitiveSpec {
        name: "WriteImage".to_string(),
        namespace: "simpleitk".to_string(),
        kind: OutputKind::Effect,
        arity: AritySpec::fixed(2),
        attrs_schema: serde_json::json!({}),
        planner: default_planner_factory("simpleitk.WriteImage", OutputKind::Effect),
        kernel_name: "simpleitk.WriteImage".to_string(),
        description: "write an image to a filesystem path (registration contract only)".to_string(),
        is_legacy_adapter: false,
    };
    registry
        .register(
            write_image,
            Arc::new(|_args| Err(KernelError::new("simpleitk.WriteImage: no imaging backend is bundled"))),
        )
        .expect("simpleitk.WriteImage must register cleanly");
}
