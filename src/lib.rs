//! Analyzer and runtime for IMGQL, a declarative image-query language.
//!
//! A program is parsed into an [`ast::Program`], reduced against a
//! [`primitives::PrimitiveRegistry`] into a content-addressed
//! [`ir::SymbolicPlan`] (the same plan shared by every execution strategy,
//! spec §4.C), checked by the [`policy`] module's static effect/read-root
//! diagnostics, and finally evaluated by an [`execution`] strategy that
//! materializes [`value::VoxValue`]s through a [`storage`] backend. The
//! [`codec`] module is the wire/persistence format shared by storage and the
//! `--save-*` CLI flags ([`convert`]).
//!
//! ```text
//! source text -> parser -> ast::Program
//!             -> reducer -> ir::SymbolicPlan (+ primitives::PrimitiveRegistry)
//!             -> policy   -> StaticDiagnostic*
//!             -> execution -> value::VoxValue (+ storage::MaterializationStore)
//! ```

pub mod ast;
pub mod cli;
pub mod codec;
pub mod config;
pub mod convert;
pub mod execution;
pub mod ir;
pub mod parser;
pub mod policy;
pub mod primitives;
pub mod reducer;
pub mod storage;
pub mod value;
