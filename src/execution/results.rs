//! Contracts shared by every execution strategy (spec §4.E): the compiled
//! `PreparedPlan`, and the `ExecutionResult`/`PageResult` payloads `run`/
//! `page` return.

use crate::ir::{NodeId, SymbolicPlan};
use crate::policy::RuntimePolicyContext;
use crate::primitives::PrimitiveRegistry;
use crate::storage::MaterializationStore;
use crate::value::VoxValue;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

/// A plan bound to the registry/materialization store it will run against.
/// `compiled_at` is a caller-supplied timestamp (seconds since epoch) rather
/// than one taken internally, keeping this crate's execution core free of
/// non-deterministic wall-clock reads outside of `ExecutionResult::execution_time`.
pub struct PreparedPlan {
    pub plan: SymbolicPlan,
    pub registry: Arc<PrimitiveRegistry>,
    pub materialization_store: Arc<MaterializationStore>,
    pub strategy_name: String,
    pub compiled_at: f64,
    pub policy_context: Option<Arc<RuntimePolicyContext>>,
}

#[derive(Debug, Clone)]
pub struct PageResult {
    pub items: Vec<VoxValue>,
    pub offset: usize,
    pub limit: usize,
    pub next_offset: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub success: bool,
    pub completed_operations: HashSet<NodeId>,
    pub failed_operations: HashMap<NodeId, String>,
    pub execution_time: f64,
    pub total_operations: usize,
}
