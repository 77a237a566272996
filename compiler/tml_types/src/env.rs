//! The type environment.
//!
//! Central repository for all type information during compilation:
//! type definitions, function overload sets, behavior implementations,
//! type aliases, builtins, lexical scopes, inference state and the
//! module system.

use rustc_hash::{FxHashMap, FxHashSet};
use tml_ir::{Name, SharedInterner, Span};

use crate::{
    BehaviorDef, EnumDef, FuncSig, ModuleDef, ModuleError, ModuleRegistry, Scopes, StructDef,
    Subst, Symbol, TypeData, TypeId, TypePool,
};

/// Error from a `define_*` operation.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum DefineError {
    /// Same name, incompatible definition.
    Conflict { name: Name, previous: Span, new: Span },
}

/// Result of overload selection: exact match first, then
/// generic-compatible, ambiguity rejected.
#[derive(Clone, Debug)]
pub enum OverloadResolution {
    Found(FuncSig),
    Ambiguous(Vec<FuncSig>),
    NotFound,
}

/// Driver-injected parser hook: given a module path and source file
/// path, parse and return the module's exported surface.
pub type ModuleLoader = Box<dyn Fn(Name, &str) -> Option<ModuleDef> + Send + Sync>;

/// Names the environment interns once at construction.
#[derive(Clone, Debug)]
pub struct WellKnown {
    pub copy_behavior: Name,
    pub drop_behavior: Name,
    pub this_type: Name,
}

/// Type environment for semantic analysis.
pub struct TypeEnv {
    pool: TypePool,
    interner: SharedInterner,
    well_known: WellKnown,

    // Type definition tables
    structs: FxHashMap<Name, StructDef>,
    enums: FxHashMap<Name, EnumDef>,
    behaviors: FxHashMap<Name, BehaviorDef>,
    /// Functions, with overloads.
    functions: FxHashMap<Name, Vec<FuncSig>>,
    /// Type name -> behaviors it implements.
    behavior_impls: FxHashMap<Name, Vec<Name>>,
    /// (type, behavior) -> associated type bindings from the impl.
    assoc_bindings: FxHashMap<(Name, Name), FxHashMap<Name, TypeId>>,
    type_aliases: FxHashMap<Name, TypeId>,
    builtin_types: FxHashMap<Name, TypeId>,
    /// Names typed-checked as variadic builtins (`print`, `println`, ...).
    variadic_builtins: FxHashSet<Name>,
    /// Runtime-backed collection types that monomorphize to a handle.
    runtime_collections: FxHashSet<Name>,

    // Scope state
    scopes: Scopes,

    // Module system
    registry: ModuleRegistry,
    current_module: Name,
    source_directory: String,
    /// Imported symbols, keyed by their local (possibly aliased) name.
    imported_symbols: FxHashMap<Name, crate::ImportedSymbol>,
    abort_on_module_error: bool,
    module_loader: Option<ModuleLoader>,
}

impl TypeEnv {
    /// Construct an environment with builtin types and function
    /// families registered.
    pub fn new(interner: SharedInterner) -> Self {
        let well_known = WellKnown {
            copy_behavior: interner.intern("Copy"),
            drop_behavior: interner.intern("Drop"),
            this_type: interner.intern("This"),
        };
        let mut env = TypeEnv {
            pool: TypePool::new(),
            interner,
            well_known,
            structs: FxHashMap::default(),
            enums: FxHashMap::default(),
            behaviors: FxHashMap::default(),
            functions: FxHashMap::default(),
            behavior_impls: FxHashMap::default(),
            assoc_bindings: FxHashMap::default(),
            type_aliases: FxHashMap::default(),
            builtin_types: FxHashMap::default(),
            variadic_builtins: FxHashSet::default(),
            runtime_collections: FxHashSet::default(),
            scopes: Scopes::new(),
            registry: ModuleRegistry::new(),
            current_module: Name::EMPTY,
            source_directory: String::new(),
            imported_symbols: FxHashMap::default(),
            abort_on_module_error: true,
            module_loader: None,
        };
        crate::builtins::install(&mut env);
        env
    }

    // === Accessors ===

    pub fn pool(&self) -> &TypePool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut TypePool {
        &mut self.pool
    }

    pub fn interner(&self) -> &SharedInterner {
        &self.interner
    }

    pub fn well_known(&self) -> &WellKnown {
        &self.well_known
    }

    /// Intern `base::member` as a qualified name.
    pub fn qualify(&self, base: Name, member: Name) -> Name {
        let base = self.interner.lookup(base);
        let member = self.interner.lookup(member);
        self.interner.intern(&format!("{base}::{member}"))
    }

    // === Type definitions ===

    /// Register a struct definition. Idempotent for identical
    /// definitions; conflicting redefinition is an error.
    pub fn define_struct(&mut self, def: StructDef) -> Result<(), DefineError> {
        if let Some(existing) = self.structs.get(&def.name) {
            if *existing == def {
                return Ok(());
            }
            return Err(DefineError::Conflict {
                name: def.name,
                previous: existing.span,
                new: def.span,
            });
        }
        self.structs.insert(def.name, def);
        Ok(())
    }

    pub fn define_enum(&mut self, def: EnumDef) -> Result<(), DefineError> {
        if let Some(existing) = self.enums.get(&def.name) {
            if *existing == def {
                return Ok(());
            }
            return Err(DefineError::Conflict {
                name: def.name,
                previous: existing.span,
                new: def.span,
            });
        }
        self.enums.insert(def.name, def);
        Ok(())
    }

    pub fn define_behavior(&mut self, def: BehaviorDef) -> Result<(), DefineError> {
        if let Some(existing) = self.behaviors.get(&def.name) {
            if *existing == def {
                return Ok(());
            }
            return Err(DefineError::Conflict {
                name: def.name,
                previous: existing.span,
                new: def.span,
            });
        }
        self.behaviors.insert(def.name, def);
        Ok(())
    }

    /// Register a function signature. Multiple signatures under one name
    /// form an overload set; an exact duplicate is idempotent, and the
    /// same parameter list with a different return type is a conflict.
    pub fn define_func(&mut self, sig: FuncSig) -> Result<(), DefineError> {
        let overloads = self.functions.entry(sig.name).or_default();
        for existing in overloads.iter() {
            if *existing == sig {
                return Ok(());
            }
            if existing.params == sig.params && existing.ret != sig.ret {
                return Err(DefineError::Conflict {
                    name: sig.name,
                    previous: existing.span,
                    new: sig.span,
                });
            }
        }
        overloads.push(sig);
        Ok(())
    }

    pub fn define_type_alias(&mut self, name: Name, ty: TypeId) -> Result<(), DefineError> {
        if let Some(&existing) = self.type_aliases.get(&name) {
            if existing == ty {
                return Ok(());
            }
            return Err(DefineError::Conflict {
                name,
                previous: Span::DUMMY,
                new: Span::DUMMY,
            });
        }
        self.type_aliases.insert(name, ty);
        Ok(())
    }

    pub fn lookup_struct(&self, name: Name) -> Option<&StructDef> {
        self.structs.get(&name)
    }

    pub fn lookup_enum(&self, name: Name) -> Option<&EnumDef> {
        self.enums.get(&name)
    }

    pub fn lookup_behavior(&self, name: Name) -> Option<&BehaviorDef> {
        self.behaviors.get(&name)
    }

    /// First overload under `name`, if any.
    pub fn lookup_func(&self, name: Name) -> Option<&FuncSig> {
        self.functions.get(&name).and_then(|v| v.first())
    }

    pub fn all_overloads(&self, name: Name) -> &[FuncSig] {
        self.functions.get(&name).map_or(&[], Vec::as_slice)
    }

    pub fn lookup_type_alias(&self, name: Name) -> Option<TypeId> {
        self.type_aliases.get(&name).copied()
    }

    pub fn builtin_type(&self, name: Name) -> Option<TypeId> {
        self.builtin_types.get(&name).copied()
    }

    pub(crate) fn register_builtin_type(&mut self, name: Name, ty: TypeId) {
        self.builtin_types.insert(name, ty);
    }

    pub(crate) fn register_variadic_builtin(&mut self, name: Name) {
        self.variadic_builtins.insert(name);
    }

    pub fn is_variadic_builtin(&self, name: Name) -> bool {
        self.variadic_builtins.contains(&name)
    }

    pub(crate) fn register_runtime_collection(&mut self, name: Name) {
        self.runtime_collections.insert(name);
    }

    /// True for runtime-backed collection types (`List`, `HashMap`, ...)
    /// that monomorphize to a one-pointer handle regardless of `T`.
    pub fn is_runtime_collection(&self, name: Name) -> bool {
        self.runtime_collections.contains(&name)
    }

    /// Overload selection: (1) exact match, (2) generic-compatible
    /// match; more than one candidate in the winning category is
    /// ambiguous.
    pub fn lookup_func_overload(&mut self, name: Name, arg_types: &[TypeId]) -> OverloadResolution {
        let overloads: Vec<FuncSig> = self.all_overloads(name).to_vec();
        if overloads.is_empty() {
            return OverloadResolution::NotFound;
        }

        let mut exact = Vec::new();
        let mut generic = Vec::new();
        for sig in &overloads {
            if sig.params.len() != arg_types.len() {
                continue;
            }
            if sig.is_generic() {
                let mut subst = Subst::default();
                let ok = sig
                    .params
                    .iter()
                    .zip(arg_types.iter())
                    .all(|(&p, &a)| self.pool.match_generic(p, a, &mut subst));
                if ok {
                    generic.push(sig.clone());
                }
            } else {
                let ok = sig
                    .params
                    .iter()
                    .zip(arg_types.iter())
                    .all(|(&p, &a)| self.pool.types_equal(p, a));
                if ok {
                    exact.push(sig.clone());
                }
            }
        }

        match (exact.len(), generic.len()) {
            (1, _) => OverloadResolution::Found(exact.remove(0)),
            (0, 1) => OverloadResolution::Found(generic.remove(0)),
            (0, 0) => OverloadResolution::NotFound,
            (0, _) => OverloadResolution::Ambiguous(generic),
            (_, _) => OverloadResolution::Ambiguous(exact),
        }
    }

    // === Behavior implementation tracking ===

    /// Record that `type_name` implements `behavior_name`.
    pub fn register_impl(&mut self, type_name: Name, behavior_name: Name) {
        let impls = self.behavior_impls.entry(type_name).or_default();
        if !impls.contains(&behavior_name) {
            impls.push(behavior_name);
        }
    }

    /// True if the type implements the behavior, transitively over
    /// super-behaviors: implementing `B2` where `B2: B` implies `B`.
    pub fn type_implements(&self, type_name: Name, behavior_name: Name) -> bool {
        let Some(direct) = self.behavior_impls.get(&type_name) else {
            return false;
        };
        let mut work: Vec<Name> = direct.clone();
        let mut seen = FxHashSet::default();
        while let Some(candidate) = work.pop() {
            if candidate == behavior_name {
                return true;
            }
            if !seen.insert(candidate) {
                continue;
            }
            if let Some(def) = self.behaviors.get(&candidate) {
                work.extend(def.super_behaviors.iter().copied());
            }
        }
        false
    }

    /// Behaviors implemented by a type, directly.
    pub fn impls_of(&self, type_name: Name) -> &[Name] {
        self.behavior_impls.get(&type_name).map_or(&[], Vec::as_slice)
    }

    /// All `(type, behavior)` implementation pairs, sorted for
    /// deterministic vtable emission.
    pub fn impl_pairs(&self) -> Vec<(Name, Name)> {
        let mut out = Vec::new();
        for (&ty, behaviors) in &self.behavior_impls {
            for &b in behaviors {
                out.push((ty, b));
            }
        }
        out.sort_unstable();
        out
    }

    /// Record the associated-type bindings of an impl.
    pub fn set_assoc_binding(
        &mut self,
        type_name: Name,
        behavior: Name,
        assoc: Name,
        ty: TypeId,
    ) {
        self.assoc_bindings
            .entry((type_name, behavior))
            .or_default()
            .insert(assoc, ty);
    }

    /// Resolve `T::Assoc` once `T` is specialized to `type_name`.
    pub fn assoc_binding(&self, type_name: Name, behavior: Name, assoc: Name) -> Option<TypeId> {
        self.assoc_bindings
            .get(&(type_name, behavior))
            .and_then(|m| m.get(&assoc).copied())
            .or_else(|| {
                self.behaviors
                    .get(&behavior)
                    .and_then(|def| def.associated_types.iter().find(|a| a.name == assoc))
                    .and_then(|a| a.default_type)
            })
    }

    // === Copy / Drop predicates ===

    /// Copy-like semantics: usable after a "move".
    pub fn type_is_copy(&mut self, ty: TypeId) -> bool {
        let ty = self.pool.resolve_shallow(ty);
        match self.pool.data(ty).clone() {
            TypeData::Prim(kind) => kind != crate::PrimKind::Str,
            TypeData::Ref { is_mut, .. } => !is_mut,
            TypeData::Ptr { .. } | TypeData::Func { .. } => true,
            TypeData::Array { element, .. } => self.type_is_copy(element),
            TypeData::Tuple(elements) => elements.iter().all(|&e| self.type_is_copy(e)),
            TypeData::Named { name, .. } => {
                self.type_implements(name, self.well_known.copy_behavior)
            }
            TypeData::Generic(_)
            | TypeData::Var(_)
            | TypeData::Slice(_)
            | TypeData::Closure { .. }
            | TypeData::DynBehavior { .. } => false,
            TypeData::ConstValue(_) | TypeData::Error => true,
        }
    }

    /// True if dropping a value of this type runs user code, directly
    /// or through a field/payload.
    pub fn type_needs_drop(&mut self, ty: TypeId) -> bool {
        let mut visited = FxHashSet::default();
        self.needs_drop_inner(ty, &mut visited)
    }

    fn needs_drop_inner(&mut self, ty: TypeId, visited: &mut FxHashSet<Name>) -> bool {
        let ty = self.pool.resolve_shallow(ty);
        match self.pool.data(ty).clone() {
            TypeData::Named { name, .. } => {
                if self.type_implements(name, self.well_known.drop_behavior) {
                    return true;
                }
                if !visited.insert(name) {
                    return false;
                }
                if let Some(def) = self.structs.get(&name).cloned() {
                    return def
                        .fields
                        .iter()
                        .any(|&(_, field_ty)| self.needs_drop_inner(field_ty, visited));
                }
                if let Some(def) = self.enums.get(&name).cloned() {
                    return def.variants.iter().any(|(_, payload)| {
                        payload.iter().any(|&p| self.needs_drop_inner(p, visited))
                    });
                }
                false
            }
            TypeData::Array { element, .. } | TypeData::Slice(element) => {
                self.needs_drop_inner(element, visited)
            }
            TypeData::Tuple(elements) => elements
                .iter()
                .any(|&e| self.needs_drop_inner(e, visited)),
            _ => false,
        }
    }

    // === Definition enumeration ===

    pub fn all_structs(&self) -> &FxHashMap<Name, StructDef> {
        &self.structs
    }

    pub fn all_enums(&self) -> &FxHashMap<Name, EnumDef> {
        &self.enums
    }

    pub fn all_behaviors(&self) -> &FxHashMap<Name, BehaviorDef> {
        &self.behaviors
    }

    /// All registered function names, sorted (for suggestions).
    pub fn all_func_names(&self) -> Vec<Name> {
        let mut names: Vec<Name> = self.functions.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// All known type names (structs, enums, behaviors, aliases,
    /// builtins), sorted.
    pub fn all_type_names(&self) -> Vec<Name> {
        let mut names: Vec<Name> = self
            .structs
            .keys()
            .chain(self.enums.keys())
            .chain(self.behaviors.keys())
            .chain(self.type_aliases.keys())
            .chain(self.builtin_types.keys())
            .copied()
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    // === Scope management ===

    pub fn push_scope(&mut self) {
        self.scopes.push();
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub fn define(&mut self, name: Name, ty: TypeId, is_mutable: bool, span: Span) {
        self.scopes.define(name, ty, is_mutable, span);
    }

    pub fn lookup(&self, name: Name) -> Option<&Symbol> {
        self.scopes.lookup(name)
    }

    pub fn scopes(&self) -> &Scopes {
        &self.scopes
    }

    // === Type inference ===

    pub fn fresh_type_var(&mut self) -> TypeId {
        self.pool.fresh_var()
    }

    pub fn unify(&mut self, expected: TypeId, found: TypeId) -> Result<(), crate::UnifyError> {
        self.pool.unify(expected, found)
    }

    pub fn resolve(&mut self, ty: TypeId) -> TypeId {
        self.pool.resolve(ty)
    }

    pub fn substitute(&mut self, ty: TypeId, subst: &Subst) -> TypeId {
        self.pool.substitute(ty, subst)
    }

    // === Module system ===

    pub fn set_current_module(&mut self, path: Name) {
        self.current_module = path;
    }

    pub fn current_module(&self) -> Name {
        self.current_module
    }

    pub fn set_source_directory(&mut self, dir: impl Into<String>) {
        self.source_directory = dir.into();
    }

    pub fn source_directory(&self) -> &str {
        &self.source_directory
    }

    pub fn set_abort_on_module_error(&mut self, abort: bool) {
        self.abort_on_module_error = abort;
    }

    pub fn abort_on_module_error(&self) -> bool {
        self.abort_on_module_error
    }

    pub fn module_registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn module_registry_mut(&mut self) -> &mut ModuleRegistry {
        &mut self.registry
    }

    pub fn get_module(&self, path: Name) -> Option<&ModuleDef> {
        self.registry.get(path)
    }

    /// Register a native (builtin) module table on demand. Returns
    /// false if the path names no native module.
    pub fn load_native_module(&mut self, path: Name) -> bool {
        if self.registry.contains(path) {
            return true;
        }
        match crate::builtins::native_module(self, path) {
            Some(module) => {
                tracing::debug!(module = %self.interner.lookup(path), "loaded native module");
                self.registry.register(module);
                true
            }
            None => false,
        }
    }

    /// Register a source module parsed by the driver. The driver calls
    /// `begin_load`/`finish_load` around its parse to surface cycles.
    pub fn load_module(&mut self, module: ModuleDef) {
        self.registry.register(module);
    }

    /// Install the callback that parses and registers a module from a
    /// source file. Parsing lives outside the core, so the driver
    /// injects it.
    pub fn set_module_loader(&mut self, loader: ModuleLoader) {
        self.module_loader = Some(loader);
    }

    /// Load and register a module from a TML source file through the
    /// injected loader. Import cycles are rejected; whether a load
    /// failure is fatal is the caller's call via
    /// [`abort_on_module_error`](Self::abort_on_module_error).
    pub fn load_module_from_file(
        &mut self,
        module_path: Name,
        file_path: &str,
    ) -> Result<(), ModuleError> {
        if self.registry.contains(module_path) {
            return Ok(());
        }
        self.registry.begin_load(module_path)?;
        let loaded = self
            .module_loader
            .as_ref()
            .and_then(|loader| loader(module_path, file_path));
        self.registry.finish_load(module_path);
        match loaded {
            Some(module) => {
                self.registry.register(module);
                Ok(())
            }
            None => Err(ModuleError::UnknownModule(module_path)),
        }
    }

    // === Import management ===

    /// Import a symbol from another module, optionally with an alias.
    pub fn import_symbol(
        &mut self,
        module_path: Name,
        symbol_name: Name,
        alias: Option<Name>,
    ) -> Result<(), ModuleError> {
        self.load_native_module(module_path);
        let Some(module) = self.registry.get(module_path) else {
            return Err(ModuleError::UnknownModule(module_path));
        };
        if !module.exports(symbol_name) {
            return Err(ModuleError::UnknownSymbol {
                module: module_path,
                symbol: symbol_name,
            });
        }
        let imported = crate::ImportedSymbol {
            module_path,
            symbol_name,
            alias,
        };
        self.imported_symbols.insert(imported.local_name(), imported);
        Ok(())
    }

    /// Import all public symbols from a module (`use foo::*`).
    pub fn import_all_from(&mut self, module_path: Name) -> Result<(), ModuleError> {
        self.load_native_module(module_path);
        let Some(module) = self.registry.get(module_path) else {
            return Err(ModuleError::UnknownModule(module_path));
        };
        let names = module.exported_names();
        for symbol in names {
            let imported = crate::ImportedSymbol {
                module_path,
                symbol_name: symbol,
                alias: None,
            };
            self.imported_symbols.insert(symbol, imported);
        }
        Ok(())
    }

    /// Resolve a locally visible name to its imported origin.
    pub fn resolve_imported_symbol(&self, name: Name) -> Option<&crate::ImportedSymbol> {
        self.imported_symbols.get(&name)
    }

    pub fn all_imports(&self) -> &FxHashMap<Name, crate::ImportedSymbol> {
        &self.imported_symbols
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn test_env() -> TypeEnv {
        TypeEnv::new(SharedInterner::new())
    }

    #[test]
    fn define_struct_is_idempotent_but_rejects_conflicts() {
        let mut env = test_env();
        let name = env.interner().intern("Point");
        let x = env.interner().intern("x");
        let def = StructDef {
            name,
            type_params: Vec::new(),
            const_params: Vec::new(),
            fields: vec![(x, TypeId::I32)],
            span: Span::DUMMY,
        };
        assert!(env.define_struct(def.clone()).is_ok());
        assert!(env.define_struct(def.clone()).is_ok());

        let conflicting = StructDef {
            fields: vec![(x, TypeId::STR)],
            ..def
        };
        assert!(matches!(
            env.define_struct(conflicting),
            Err(DefineError::Conflict { .. })
        ));
    }

    #[test]
    fn overload_selection_prefers_exact() {
        let mut env = test_env();
        let name = env.interner().intern("max");
        // max(I64, I64) and max(F64, F64) are registered by the math
        // builtins; exact match on I64 picks the integer overload.
        match env.lookup_func_overload(name, &[TypeId::I64, TypeId::I64]) {
            OverloadResolution::Found(sig) => assert_eq!(sig.ret, TypeId::I64),
            other => panic!("expected Found, got {other:?}"),
        }
        match env.lookup_func_overload(name, &[TypeId::F64, TypeId::F64]) {
            OverloadResolution::Found(sig) => assert_eq!(sig.ret, TypeId::F64),
            other => panic!("expected Found, got {other:?}"),
        }
        assert!(matches!(
            env.lookup_func_overload(name, &[TypeId::STR, TypeId::STR]),
            OverloadResolution::NotFound
        ));
    }

    #[test]
    fn impl_tracking_is_transitive_over_supers() {
        let mut env = test_env();
        let eq = env.interner().intern("Eq");
        let ord = env.interner().intern("Ord");
        let point = env.interner().intern("Point");
        env.define_behavior(BehaviorDef {
            name: eq,
            type_params: Vec::new(),
            const_params: Vec::new(),
            associated_types: Vec::new(),
            methods: Vec::new(),
            super_behaviors: Vec::new(),
            methods_with_defaults: Vec::new(),
            span: Span::DUMMY,
        })
        .unwrap();
        env.define_behavior(BehaviorDef {
            name: ord,
            type_params: Vec::new(),
            const_params: Vec::new(),
            associated_types: Vec::new(),
            methods: Vec::new(),
            super_behaviors: vec![eq],
            methods_with_defaults: Vec::new(),
            span: Span::DUMMY,
        })
        .unwrap();
        env.register_impl(point, ord);
        assert!(env.type_implements(point, ord));
        assert!(env.type_implements(point, eq));
        let absent = env.interner().intern("Hash");
        assert!(!env.type_implements(point, absent));
    }

    #[test]
    fn import_unknown_module_fails() {
        let mut env = test_env();
        let nowhere = env.interner().intern("no::such::module");
        let sym = env.interner().intern("thing");
        assert_eq!(
            env.import_symbol(nowhere, sym, None),
            Err(ModuleError::UnknownModule(nowhere))
        );
    }

    #[test]
    fn import_native_module_symbol() {
        let mut env = test_env();
        let math = env.interner().intern("std::math");
        let sin = env.interner().intern("sin");
        let alias = env.interner().intern("sine");
        env.import_symbol(math, sin, Some(alias)).unwrap();
        let resolved = env.resolve_imported_symbol(alias).unwrap();
        assert_eq!(resolved.module_path, math);
        assert_eq!(resolved.symbol_name, sin);
    }

    #[test]
    fn module_loader_hook_registers_modules() {
        let mut env = test_env();
        let path = env.interner().intern("app::util");
        env.set_module_loader(Box::new(|p, _file| Some(ModuleDef::new(p))));
        assert!(env.load_module_from_file(path, "util.tml").is_ok());
        assert!(env.get_module(path).is_some());
        // Idempotent once registered.
        assert!(env.load_module_from_file(path, "util.tml").is_ok());
    }

    #[test]
    fn load_without_loader_fails() {
        let mut env = test_env();
        let path = env.interner().intern("app::missing");
        assert_eq!(
            env.load_module_from_file(path, "missing.tml"),
            Err(ModuleError::UnknownModule(path))
        );
    }

    #[test]
    fn copy_predicate() {
        let mut env = test_env();
        assert!(env.type_is_copy(TypeId::I32));
        assert!(!env.type_is_copy(TypeId::STR));
        let shared = env.pool_mut().reference(false, TypeId::I32);
        let exclusive = env.pool_mut().reference(true, TypeId::I32);
        assert!(env.type_is_copy(shared));
        assert!(!env.type_is_copy(exclusive));
    }
}
