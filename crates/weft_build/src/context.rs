//! Mutable generation state for recursive module construction.
//!
//! [`GenerationContext`] holds the module definitions generated so far, the
//! library they come from, a cache so each module's construction function
//! runs once, and the stack of modules under construction for cycle
//! detection. A child is generated while its parent's construction function
//! is still running, so definitions land in the arena children first.

use crate::backend::Capabilities;
use crate::builder::ModuleBuilder;
use crate::errors::BuildError;
use crate::library::Library;
use std::collections::HashMap;
use std::sync::Arc;
use weft_common::Interner;
use weft_config::BackendPreset;
use weft_ir::{Arena, ModuleDef, ModuleDefId, PortDef, Type, TypeDb};

/// State carried through one `generate()` pass.
pub struct GenerationContext<'a> {
    /// The declarations being generated.
    pub library: &'a Library,
    /// The interner shared with the owning system.
    pub interner: &'a Interner,
    /// The backend preset selected for the system.
    pub backend: BackendPreset,
    /// What that backend can realize.
    pub capabilities: Capabilities,
    /// Generated module definitions, children before parents.
    pub modules: Arena<ModuleDefId, ModuleDef>,
    /// Types used by the generated definitions.
    pub types: TypeDb,
    /// Module name → generated definition.
    cache: HashMap<String, ModuleDefId>,
    /// Modules whose construction function is currently running.
    elab_stack: Vec<String>,
    /// Next builder scope number, used to tie handles to their module.
    next_scope: u32,
}

impl<'a> GenerationContext<'a> {
    /// Creates an empty context.
    pub fn new(
        library: &'a Library,
        interner: &'a Interner,
        backend: BackendPreset,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            library,
            interner,
            backend,
            capabilities,
            modules: Arena::new(),
            types: TypeDb::new(),
            cache: HashMap::new(),
            elab_stack: Vec::new(),
            next_scope: 0,
        }
    }

    /// Generates the named module, running its construction function unless
    /// it already ran, and returns its definition ID.
    pub fn elaborate_module(&mut self, name: &str) -> Result<ModuleDefId, BuildError> {
        if let Some(&id) = self.cache.get(name) {
            return Ok(id);
        }
        if let Some(pos) = self.elab_stack.iter().position(|n| n == name) {
            let mut cycle = self.elab_stack[pos..].to_vec();
            cycle.push(name.to_string());
            return Err(BuildError::RecursiveInstantiation { cycle });
        }

        let library = self.library;
        let decl = library
            .module(name)
            .ok_or_else(|| BuildError::UnknownModule {
                name: name.to_string(),
            })?;

        let mut ports = Vec::with_capacity(decl.ports().len());
        for (port, ty) in decl.ports() {
            if !matches!(ty, Type::Clock) && !ty.is_payload() {
                return Err(BuildError::TypeMismatch {
                    module: name.to_string(),
                    context: format!("port '{port}'"),
                    expected: "clock, bits or struct".to_string(),
                    found: ty.to_string(),
                });
            }
            ports.push(PortDef {
                name: self.interner.get_or_intern(port),
                ty: self.types.intern(ty),
            });
        }
        let def = ModuleDef::new(
            ModuleDefId::from_raw(0),
            self.interner.get_or_intern(name),
            ports,
            decl.metadata_ref().cloned(),
        );

        let scope = self.next_scope;
        self.next_scope += 1;
        self.elab_stack.push(name.to_string());
        tracing::debug!(module = name, depth = self.elab_stack.len(), "constructing module");

        let construct = Arc::clone(decl.construct_fn());
        let mut builder = ModuleBuilder::new(self, def, name.to_string(), scope);
        let result = construct(&mut builder);
        let mut def = builder.finish();
        self.elab_stack.pop();
        result?;

        let id = self.modules.next_id();
        def.id = id;
        self.modules.alloc(def);
        self.cache.insert(name.to_string(), id);
        Ok(id)
    }

    /// Returns the number of modules generated so far.
    pub fn generated_count(&self) -> usize {
        self.modules.len()
    }

    /// Consumes the context, returning the definitions and type database.
    pub fn finish(self) -> (Arena<ModuleDefId, ModuleDef>, TypeDb) {
        (self.modules, self.types)
    }
}
