//! The generate stage: construction of every module and materialization of
//! the instance tree.

use crate::backend::Capabilities;
use crate::context::GenerationContext;
use crate::errors::BuildError;
use crate::library::Library;
use weft_common::Interner;
use weft_config::BackendPreset;
use weft_ir::{AppId, AppIdPath, Arena, HwGraph, Instance, InstanceId, ModuleDef, ModuleDefId};

/// Runs every construction function reachable from `top` and returns the
/// materialized graph. The root instance's AppID is the top module's name.
pub fn generate(
    library: &Library,
    interner: &Interner,
    top: &str,
    backend: BackendPreset,
    capabilities: Capabilities,
) -> Result<HwGraph, BuildError> {
    let mut ctx = GenerationContext::new(library, interner, backend, capabilities);
    let top_id = ctx.elaborate_module(top)?;
    let (modules, types) = ctx.finish();

    let mut instances = Arena::new();
    let root = materialize(
        &modules,
        &mut instances,
        top_id,
        AppIdPath::root(AppId::new(top)),
        None,
    );
    tracing::debug!(
        modules = modules.len(),
        instances = instances.len(),
        "materialized instance tree"
    );

    Ok(HwGraph {
        modules,
        instances,
        root,
        types,
        services: library.services().to_vec(),
    })
}

/// Allocates the instance for `module` and, depth-first, its children.
fn materialize(
    modules: &Arena<ModuleDefId, ModuleDef>,
    instances: &mut Arena<InstanceId, Instance>,
    module: ModuleDefId,
    path: AppIdPath,
    parent: Option<InstanceId>,
) -> InstanceId {
    let id = instances.next_id();
    instances.alloc(Instance {
        id,
        path: path.clone(),
        module,
        parent,
        children: Vec::new(),
    });
    for child in &modules[module].children {
        let child_id = materialize(
            modules,
            instances,
            child.module,
            path.child(child.appid.clone()),
            Some(id),
        );
        instances[id].children.push(child_id);
    }
    id
}
