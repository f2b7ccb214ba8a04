//! Deterministic primitive discovery and resolution registry.
//!
//! The reference implementation discovers namespaces by scanning a
//! directory tree and `importlib`-loading one Python module per primitive.
//! Rust has no equivalent runtime module loader, so discovery here is a
//! fixed, sorted table of namespace constructors (`NAMESPACE_MODULES`) —
//! each one a real Rust module under `primitives/` that registers its specs
//! the same way the reference implementation's `register_specs()` hook
//! does. This preserves the deterministic, sorted-by-name discovery order
//! without inventing a plugin loader this crate has no use for.

use super::api::{validate_spec, KernelFn, PrimitiveSpec};
use crate::ast::Command;
use crate::parser::parse_program_content;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[allow(clippy::type_complexity)]
const NAMESPACE_MODULES: &[(&str, fn(&mut PrimitiveRegistry))] = &[
    ("default", super::default::register),
    ("nnunet", super::nnunet::register),
    ("simpleitk", super::simpleitk::register),
    ("vox1", super::vox1::register),
];

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown primitive namespace: {0}")]
    UnknownNamespace(String),
    #[error("unknown primitive: {0}")]
    UnknownPrimitive(String),
    #[error("primitive already registered: {0}")]
    DuplicateQualifiedName(String),
    #[error("kernel name already registered: {0}")]
    DuplicateKernelName(String),
    #[error("invalid primitive spec: {0}")]
    InvalidSpec(String),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Deterministic namespace loading and name resolution.
///
/// `Clone` is cheap: every field is either `Arc`-backed or a plain
/// string/`Vec` map, so cloning a registry to hand an owned copy to a
/// lazily-evaluated value (e.g. a `map`/`for_loop` sequence that must
/// outlive the call that produced it) never deep-copies kernel bodies.
#[derive(Clone)]
pub struct PrimitiveRegistry {
    specs_by_qualified: HashMap<String, PrimitiveSpec>,
    kernels_by_name: HashMap<String, KernelFn>,
    specs_by_namespace: HashMap<String, HashMap<String, PrimitiveSpec>>,
    import_order: Vec<String>,
    loaded_namespaces: Vec<String>,
    imgql_exports_by_namespace: HashMap<String, Vec<Command>>,
    reset_hooks: HashMap<String, Arc<dyn Fn() + Send + Sync>>,
}

impl std::fmt::Debug for PrimitiveRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimitiveRegistry")
            .field("loaded_namespaces", &self.loaded_namespaces)
            .field("import_order", &self.import_order)
            .finish()
    }
}

impl Default for PrimitiveRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PrimitiveRegistry {
    pub fn new() -> Self {
        let mut registry = PrimitiveRegistry {
            specs_by_qualified: HashMap::new(),
            kernels_by_name: HashMap::new(),
            specs_by_namespace: HashMap::new(),
            import_order: Vec::new(),
            loaded_namespaces: Vec::new(),
            imgql_exports_by_namespace: HashMap::new(),
            reset_hooks: HashMap::new(),
        };
        registry.discover_namespaces();
        registry.import_namespace("default");
        registry
    }

    pub fn imported_namespaces(&self) -> &[String] {
        &self.import_order
    }

    fn discover_namespaces(&mut self) {
        let mut sorted: Vec<&(&str, fn(&mut PrimitiveRegistry))> = NAMESPACE_MODULES.iter().collect();
        sorted.sort_by_key(|(name, _)| *name);
        for (name, _) in sorted {
            self.load_namespace(name)
                .unwrap_or_else(|e| panic!("built-in namespace '{name}' must load: {e}"));
        }
    }

    fn load_namespace(&mut self, namespace: &str) -> RegistryResult<()> {
        if self.loaded_namespaces.iter().any(|n| n == namespace) {
            return Ok(());
        }
        let constructor = NAMESPACE_MODULES
            .iter()
            .find(|(n, _)| *n == namespace)
            .map(|(_, f)| *f)
            .ok_or_else(|| RegistryError::UnknownNamespace(namespace.to_string()))?;
        debug!(namespace, "loading primitive namespace");
        self.specs_by_namespace.entry(namespace.to_string()).or_default();
        constructor(self);

        if namespace == "default" {
            match parse_program_content(super::default::NAMESPACE_IMGQL_EXPORTS) {
                Ok(program) => {
                    self.imgql_exports_by_namespace.insert(namespace.to_string(), program.commands);
                }
                Err(e) => warn!(namespace, error = %e, "failed parsing namespace imgql exports"),
            }
        }

        self.loaded_namespaces.push(namespace.to_string());
        Ok(())
    }

    pub fn register(&mut self, spec: PrimitiveSpec, kernel: KernelFn) -> RegistryResult<()> {
        validate_spec(&spec).map_err(RegistryError::InvalidSpec)?;
        let qualified = spec.qualified_name();
        if self.specs_by_qualified.contains_key(&qualified) {
            return Err(RegistryError::DuplicateQualifiedName(qualified));
        }
        if self.kernels_by_name.contains_key(&spec.kernel_name) {
            return Err(RegistryError::DuplicateKernelName(spec.kernel_name.clone()));
        }
        info!(primitive = %qualified, "registered primitive");
        self.specs_by_namespace
            .entry(spec.namespace.clone())
            .or_default()
            .insert(spec.name.clone(), spec.clone());
        self.kernels_by_name.insert(spec.kernel_name.clone(), kernel);
        self.specs_by_qualified.insert(qualified, spec);
        Ok(())
    }

    pub fn register_reset_hook(&mut self, namespace: &str, hook: Arc<dyn Fn() + Send + Sync>) {
        self.reset_hooks.insert(namespace.to_string(), hook);
    }

    pub fn import_namespace(&mut self, namespace: &str) {
        if !self.loaded_namespaces.iter().any(|n| n == namespace) {
            self.load_namespace(namespace)
                .unwrap_or_else(|e| warn!(namespace, error = %e, "failed to load namespace on import"));
        }
        if !self.import_order.iter().any(|n| n == namespace) {
            info!(namespace, "imported namespace");
            self.import_order.push(namespace.to_string());
        }
    }

    pub fn apply_imports<'a>(&mut self, namespaces: impl IntoIterator<Item = &'a str>) {
        for namespace in namespaces {
            self.import_namespace(namespace);
        }
    }

    pub fn namespace_imgql_exports(&self, namespace: &str) -> &[Command] {
        self.imgql_exports_by_namespace.get(namespace).map_or(&[], Vec::as_slice)
    }

    /// Resolve `name` to its `PrimitiveSpec` under the deterministic order:
    /// qualified lookup if `name` contains `.`; otherwise `default` first,
    /// then the rest of the import order, then any remaining loaded
    /// namespaces in lexicographic order.
    pub fn resolve(&self, name: &str) -> RegistryResult<&PrimitiveSpec> {
        if let Some((namespace, primitive_name)) = name.split_once('.') {
            if !namespace.is_empty() && !primitive_name.is_empty() && self.specs_by_namespace.contains_key(namespace) {
                return self
                    .specs_by_namespace
                    .get(namespace)
                    .and_then(|specs| specs.get(primitive_name))
                    .ok_or_else(|| RegistryError::UnknownPrimitive(name.to_string()));
            }
        }

        let mut ordered: Vec<&str> = Vec::new();
        if self.import_order.iter().any(|n| n == "default") {
            ordered.push("default");
        }
        for namespace in &self.import_order {
            if namespace != "default" {
                ordered.push(namespace);
            }
        }
        let mut remaining: Vec<&str> = self
            .specs_by_namespace
            .keys()
            .map(String::as_str)
            .filter(|n| !ordered.contains(n))
            .collect();
        remaining.sort_unstable();
        ordered.extend(remaining);

        for namespace in ordered {
            if let Some(spec) = self.specs_by_namespace.get(namespace).and_then(|specs| specs.get(name)) {
                return Ok(spec);
            }
        }
        Err(RegistryError::UnknownPrimitive(name.to_string()))
    }

    pub fn load_kernel(&self, name: &str) -> RegistryResult<KernelFn> {
        let spec = self.resolve(name)?;
        self.kernels_by_name
            .get(&spec.kernel_name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownPrimitive(name.to_string()))
    }

    pub fn list_namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.specs_by_namespace.keys().cloned().collect();
        names.sort();
        names
    }

    /// Enumerate primitives. With a namespace given, keys are unqualified
    /// names within that namespace; without one, keys are fully qualified
    /// `namespace.name` across every loaded namespace.
    pub fn list_primitives(&self, namespace: Option<&str>) -> Vec<(String, String)> {
        let mut out = Vec::new();
        if let Some(namespace) = namespace {
            if let Some(specs) = self.specs_by_namespace.get(namespace) {
                let mut names: Vec<&String> = specs.keys().collect();
                names.sort();
                for name in names {
                    out.push((name.clone(), specs[name].description.clone()));
                }
            }
            return out;
        }
        for namespace in self.list_namespaces() {
            if let Some(specs) = self.specs_by_namespace.get(&namespace) {
                let mut names: Vec<&String> = specs.keys().collect();
                names.sort();
                for name in names {
                    let spec = &specs[name];
                    out.push((spec.qualified_name(), spec.description.clone()));
                }
            }
        }
        out
    }

    /// Reset per-run namespace state (e.g. the vox1 "current model" handle)
    /// before each plan execution (spec §4.B, Design Notes).
    pub fn reset_runtime_state(&self) {
        for hook in self.reset_hooks.values() {
            hook();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_namespace_is_imported_at_construction() {
        let registry = PrimitiveRegistry::new();
        assert_eq!(registry.imported_namespaces(), &["default".to_string()]);
    }

    #[test]
    fn resolve_finds_default_namespace_arithmetic() {
        let registry = PrimitiveRegistry::new();
        let spec = registry.resolve("+").expect("+ must resolve");
        assert_eq!(spec.namespace, "default");
    }

    #[test]
    fn resolve_qualified_name_bypasses_import_order() {
        let mut registry = PrimitiveRegistry::new();
        registry.import_namespace("simpleitk");
        let spec = registry.resolve("simpleitk.WriteImage").expect("qualified lookup must succeed");
        assert_eq!(spec.name, "WriteImage");
    }

    #[test]
    fn unknown_primitive_is_an_error() {
        let registry = PrimitiveRegistry::new();
        assert!(registry.resolve("not_a_real_primitive").is_err());
    }

    #[test]
    fn list_namespaces_is_sorted() {
        let registry = PrimitiveRegistry::new();
        let namespaces = registry.list_namespaces();
        let mut sorted = namespaces.clone();
        sorted.sort();
        assert_eq!(namespaces, sorted);
    }
}
