//! Registration-contract-only stub for the `vox1` namespace. Demonstrates
//! the registry's runtime-state reset hook (spec §10.D / Design Notes): a
//! `LoadModel` effect primitive stashes a "current model" handle in process
//! state, and `reset_runtime_state()` clears it between plan executions so
//! state from one run never leaks into the next.

use crate::ir::OutputKind;
use crate::primitives::api::{default_planner_factory, AritySpec, KernelError, KernelResult, PrimitiveSpec};
use crate::primitives::registry::PrimitiveRegistry;
use crate::value::{ScalarValue, VoxValue};
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};

fn current_model() -> &'static Mutex<Option<String>> {
    static CURRENT_MODEL: OnceLock<Mutex<Option<String>>> = OnceLock::new();
    CURRENT_MODEL.get_or_init(|| Mutex::new(None))
}

fn load_model(args: &std::collections::HashMap<String, VoxValue>) -> KernelResult {
    let path = match args.get("0") {
        Some(VoxValue::Scalar(ScalarValue::Str(s))) => s.clone(),
        _ => return Err(KernelError::new("vox1.LoadModel: expected a string model path")),
    };
    *current_model().lock() = Some(path.clone());
    Ok(VoxValue::Scalar(ScalarValue::Str(path)))
}

pub fn register(registry: &mut PrimitiveRegistry) {
    let load_model_spec = PrimitiveSpec {
        name: "LoadModel".to_string(),
        namespace: "vox1".to_string(),
        kind: OutputKind::Effect,
        arity: AritySpec::fixed(1),
        attrs_schema: serde_json::json!({}),
        planner: default_planner_factory("vox1.LoadModel", OutputKind::Effect),
        kernel_name: "vox1.LoadModel".to_string(),
        description: "load a model file, becoming the namespace's current model".to_string(),
        is_legacy_adapter: false,
    };
    registry.register(load_model_spec, Arc::new(load_model)).expect("vox1.LoadModel must register cleanly");

    registry.register_reset_hook(
        "vox1",
        Arc::new(|| {
            *current_model().lock() = None;
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_hook_clears_current_model() {
        let registry = PrimitiveRegistry::new();
        let kernel = registry.load_kernel("vox1.LoadModel");
        if kernel.is_ok() {
            *current_model().lock() = Some("placeholder".to_string());
            registry.reset_runtime_state();
            assert!(current_model().lock().is_none());
        }
    }
}
