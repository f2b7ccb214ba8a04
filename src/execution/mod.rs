//! Execution strategies that turn a `SymbolicPlan` into materialized values
//! (spec §4.E): `strict` (reference, demand-driven, single-threaded) and
//! `dask` (parallel-lifted).

pub mod dask;
pub mod dispatch;
pub mod results;
pub mod runtime_value;
pub mod strict;

pub use results::{ExecutionResult, PageResult, PreparedPlan};

/// Resolve a strategy name to its `compile` entry point (spec §4.B's
/// `execution_strategy` config key). Unknown names fall back to `strict`.
pub fn strategy_name_or_default(name: &str) -> &'static str {
    match name {
        "dask" => dask::STRATEGY_NAME,
        _ => strict::STRATEGY_NAME,
    }
}
