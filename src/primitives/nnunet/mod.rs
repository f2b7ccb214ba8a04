//! Registration-contract-only stub for the `nnunet` namespace: a single
//! effect-kind primitive exercising the effect allowlist's namespace-scoped
//! entries (spec §10.C) alongside `simpleitk.WriteImage` and
//! `vox1.LoadModel`.

use crate::ir::OutputKind;
use crate::primitives::api::{default_planner_factory, AritySpec, KernelError, PrimitiveSpec};
use crate::primitives::registry::PrimitiveRegistry;
use std::sync::Arc;

pub fn register(registry: &mut PrimitiveRegistry) {
    let train = PrimitiveSpec {
        name: "train".to_string(),
        namespace: "nnunet".to_string(),
        kind: OutputKind::Effect,
        arity: AritySpec::range(1, 2),
        attrs_schema: serde_json::json!({}),
        planner: default_planner_factory("nnunet.train", OutputKind::Effect),
        kernel_name: "nnunet.train".to_string(),
        description: "train a segmentation model (registration contract only)".to_string(),
        is_legacy_adapter: false,
    };
    registry
        .register(train, Arc::new(|_args| Err(KernelError::new("nnunet.train: no training backend is bundled"))))
        .expect("nnunet.train must register cleanly");
}
