//! Module declarations and the library that registers them by name.
//!
//! A [`ModuleDecl`] is pure data: a name, input ports, optional metadata, and
//! a reference to the construction function. Declarations do nothing until a
//! parent instantiates them by name during generation.

use crate::builder::ModuleBuilder;
use crate::errors::BuildError;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use weft_ir::{Metadata, ServiceDecl, Type};

/// A module construction function.
///
/// It reads ports from the builder and declares channels, bundles, service
/// instances and sub-modules. It must be a pure function of its inputs; it
/// runs once per module, however many times the module is instantiated.
pub type ConstructFn = Arc<dyn Fn(&mut ModuleBuilder<'_, '_>) -> Result<(), BuildError> + Send + Sync>;

/// A declared module.
#[derive(Clone)]
pub struct ModuleDecl {
    name: String,
    ports: Vec<(String, Type)>,
    metadata: Option<Metadata>,
    construct: ConstructFn,
}

impl ModuleDecl {
    /// Declares a module with no ports and an empty construction function.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ports: Vec::new(),
            metadata: None,
            construct: Arc::new(construct_nothing),
        }
    }

    /// Adds a clock input.
    pub fn clock(self, name: impl Into<String>) -> Self {
        self.input(name, Type::Clock)
    }

    /// Adds a data input.
    pub fn input(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.ports.push((name.into(), ty));
        self
    }

    /// Attaches metadata copied into the manifest.
    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Sets the construction function.
    pub fn construct<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ModuleBuilder<'_, '_>) -> Result<(), BuildError> + Send + Sync + 'static,
    {
        self.construct = Arc::new(f);
        self
    }

    /// Returns the module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the input ports in declaration order.
    pub fn ports(&self) -> &[(String, Type)] {
        &self.ports
    }

    /// Returns the attached metadata.
    pub fn metadata_ref(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    pub(crate) fn construct_fn(&self) -> &ConstructFn {
        &self.construct
    }
}

fn construct_nothing(_: &mut ModuleBuilder<'_, '_>) -> Result<(), BuildError> {
    Ok(())
}

impl fmt::Debug for ModuleDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDecl")
            .field("name", &self.name)
            .field("ports", &self.ports)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Name-indexed collection of module and service declarations.
#[derive(Debug, Default, Clone)]
pub struct Library {
    modules: Vec<ModuleDecl>,
    module_index: HashMap<String, usize>,
    services: Vec<ServiceDecl>,
}

impl Library {
    /// Creates an empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module, rejecting duplicate names.
    pub fn add_module(&mut self, decl: ModuleDecl) -> Result<(), BuildError> {
        if self.module_index.contains_key(decl.name()) {
            return Err(BuildError::Duplicate {
                what: "module",
                name: decl.name().to_string(),
            });
        }
        self.module_index
            .insert(decl.name().to_string(), self.modules.len());
        self.modules.push(decl);
        Ok(())
    }

    /// Registers a service, rejecting duplicate names.
    pub fn add_service(&mut self, decl: ServiceDecl) -> Result<(), BuildError> {
        if self.services.iter().any(|s| s.name() == decl.name()) {
            return Err(BuildError::Duplicate {
                what: "service",
                name: decl.name().to_string(),
            });
        }
        self.services.push(decl);
        Ok(())
    }

    /// Looks up a module by name.
    pub fn module(&self, name: &str) -> Option<&ModuleDecl> {
        self.module_index.get(name).map(|&i| &self.modules[i])
    }

    /// Looks up a service by name, returning its position and declaration.
    pub fn service(&self, name: &str) -> Option<(u32, &ServiceDecl)> {
        self.services
            .iter()
            .enumerate()
            .find(|(_, s)| s.name() == name)
            .map(|(i, s)| (i as u32, s))
    }

    /// Returns every registered service in registration order.
    pub fn services(&self) -> &[ServiceDecl] {
        &self.services
    }

    /// Returns the module names in registration order.
    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(|m| m.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decl_builder_records_ports() {
        let decl = ModuleDecl::new("MemWriter")
            .clock("clk")
            .input("rst", Type::Bits(1))
            .metadata(Metadata::new().version("0.1"));
        assert_eq!(decl.name(), "MemWriter");
        assert_eq!(
            decl.ports(),
            &[
                ("clk".to_string(), Type::Clock),
                ("rst".to_string(), Type::Bits(1))
            ]
        );
        assert_eq!(
            decl.metadata_ref().and_then(|m| m.version.as_deref()),
            Some("0.1")
        );
    }

    #[test]
    fn duplicate_module_rejected() {
        let mut lib = Library::new();
        lib.add_module(ModuleDecl::new("Dummy")).unwrap();
        let err = lib.add_module(ModuleDecl::new("Dummy")).unwrap_err();
        assert!(matches!(err, BuildError::Duplicate { what: "module", .. }));
    }

    #[test]
    fn duplicate_service_rejected() {
        let mut lib = Library::new();
        lib.add_service(ServiceDecl::host("MemComms")).unwrap();
        assert!(lib.add_service(ServiceDecl::host("MemComms")).is_err());
    }

    #[test]
    fn lookup_by_name() {
        let mut lib = Library::new();
        lib.add_module(ModuleDecl::new("Top")).unwrap();
        lib.add_module(ModuleDecl::new("Dummy")).unwrap();
        lib.add_service(ServiceDecl::random_access_memory("Ram", Type::Bits(8), 4))
            .unwrap();
        assert!(lib.module("Dummy").is_some());
        assert!(lib.module("Missing").is_none());
        assert_eq!(lib.service("Ram").map(|(i, _)| i), Some(0));
        assert_eq!(lib.module_names().collect::<Vec<_>>(), vec!["Top", "Dummy"]);
    }

    #[test]
    fn debug_omits_closure() {
        let text = format!("{:?}", ModuleDecl::new("Dummy"));
        assert!(text.contains("Dummy"));
    }
}
