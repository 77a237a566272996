//! Module registry for cross-module lookup.
//!
//! The registry holds every module visible to the compilation: native
//! (builtin) modules registered by the environment, and source modules
//! registered by the build driver after parsing. Loading tracks a stack
//! of in-flight paths to reject import cycles.

use rustc_hash::{FxHashMap, FxHashSet};
use tml_ir::Name;

use crate::{BehaviorDef, EnumDef, FuncSig, StructDef, TypeId};

/// A module's exported surface, keyed by qualified name.
#[derive(Clone, Debug, Default)]
pub struct ModuleDef {
    pub path: Name,
    pub functions: FxHashMap<Name, Vec<FuncSig>>,
    pub structs: FxHashMap<Name, StructDef>,
    pub enums: FxHashMap<Name, EnumDef>,
    pub behaviors: FxHashMap<Name, BehaviorDef>,
    pub constants: FxHashMap<Name, TypeId>,
    /// Structs not exported across the module boundary.
    pub internal_structs: FxHashSet<Name>,
}

impl ModuleDef {
    pub fn new(path: Name) -> Self {
        ModuleDef {
            path,
            ..ModuleDef::default()
        }
    }

    /// True if the module exports `symbol` under any table.
    pub fn exports(&self, symbol: Name) -> bool {
        (self.functions.contains_key(&symbol)
            || self.structs.contains_key(&symbol)
            || self.enums.contains_key(&symbol)
            || self.behaviors.contains_key(&symbol)
            || self.constants.contains_key(&symbol))
            && !self.internal_structs.contains(&symbol)
    }

    /// All exported symbol names (for glob imports).
    pub fn exported_names(&self) -> Vec<Name> {
        let mut names: Vec<Name> = self
            .functions
            .keys()
            .chain(self.structs.keys())
            .chain(self.enums.keys())
            .chain(self.behaviors.keys())
            .chain(self.constants.keys())
            .copied()
            .filter(|n| !self.internal_structs.contains(n))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

/// Error from module loading.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum ModuleError {
    /// Import cycle; the chain of module paths that closed the loop.
    ImportCycle(Vec<Name>),
    UnknownModule(Name),
    UnknownSymbol { module: Name, symbol: Name },
}

/// Registry for all modules in a compilation.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: FxHashMap<Name, ModuleDef>,
    /// Stack of modules currently being loaded (cycle detection).
    loading: Vec<Name>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        ModuleRegistry::default()
    }

    /// Register (or replace) a module.
    pub fn register(&mut self, module: ModuleDef) {
        self.modules.insert(module.path, module);
    }

    pub fn get(&self, path: Name) -> Option<&ModuleDef> {
        self.modules.get(&path)
    }

    pub fn contains(&self, path: Name) -> bool {
        self.modules.contains_key(&path)
    }

    /// All `(path, module)` pairs, sorted by path for determinism.
    pub fn all(&self) -> Vec<(&Name, &ModuleDef)> {
        let mut out: Vec<_> = self.modules.iter().collect();
        out.sort_by_key(|(path, _)| **path);
        out
    }

    /// Mark a module as being loaded. Returns the cycle chain if `path`
    /// is already in flight.
    pub fn begin_load(&mut self, path: Name) -> Result<(), ModuleError> {
        if self.loading.contains(&path) {
            let mut cycle = self.loading.clone();
            cycle.push(path);
            return Err(ModuleError::ImportCycle(cycle));
        }
        self.loading.push(path);
        Ok(())
    }

    /// Pop the load stack after a module finishes (or fails) loading.
    pub fn finish_load(&mut self, path: Name) {
        if let Some(pos) = self.loading.iter().rposition(|&p| p == path) {
            self.loading.remove(pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_detection() {
        let mut registry = ModuleRegistry::new();
        let a = Name::from_raw(1);
        let b = Name::from_raw(2);
        registry.begin_load(a).unwrap();
        registry.begin_load(b).unwrap();
        let err = registry.begin_load(a).unwrap_err();
        assert_eq!(err, ModuleError::ImportCycle(vec![a, b, a]));
        registry.finish_load(b);
        registry.finish_load(a);
        assert!(registry.begin_load(a).is_ok());
    }

    #[test]
    fn exports_hide_internal_structs() {
        let path = Name::from_raw(10);
        let secret = Name::from_raw(11);
        let mut module = ModuleDef::new(path);
        module.structs.insert(
            secret,
            StructDef {
                name: secret,
                type_params: Vec::new(),
                const_params: Vec::new(),
                fields: Vec::new(),
                span: tml_ir::Span::DUMMY,
            },
        );
        module.internal_structs.insert(secret);
        assert!(!module.exports(secret));
        assert!(module.exported_names().is_empty());
    }
}
