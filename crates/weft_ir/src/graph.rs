//! The materialized hardware graph.
//!
//! A [`HwGraph`] is the output of generation: every module definition, the
//! instance tree addressed by [`AppIdPath`], the type database, and the
//! service declarations the design refers to. It is plain data, so it can be
//! serialized into build artifacts and fingerprinted to check determinism.

use crate::appid::AppIdPath;
use crate::arena::Arena;
use crate::ids::{InstanceId, ModuleDefId};
use crate::module::ModuleDef;
use crate::service::ServiceDecl;
use crate::types::TypeDb;
use serde::{Deserialize, Serialize};
use weft_common::{ContentHash, InternalError, WeftResult};

/// A node of the instance tree.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Instance {
    /// This instance's ID.
    pub id: InstanceId,
    /// Full AppID path from the root.
    pub path: AppIdPath,
    /// The module definition this instance runs.
    pub module: ModuleDefId,
    /// The enclosing instance, `None` for the root.
    pub parent: Option<InstanceId>,
    /// Child instances, in the order the parent declared them.
    pub children: Vec<InstanceId>,
}

/// A complete generated system.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HwGraph {
    /// Module definitions, children before the parents that instantiate them.
    pub modules: Arena<ModuleDefId, ModuleDef>,
    /// The instance tree, root first, depth-first.
    pub instances: Arena<InstanceId, Instance>,
    /// The root instance.
    pub root: InstanceId,
    /// Every type used in the graph.
    pub types: TypeDb,
    /// Service declarations referenced by position from service instances
    /// and builtins.
    pub services: Vec<ServiceDecl>,
}

impl HwGraph {
    /// Returns the root instance.
    pub fn root_instance(&self) -> &Instance {
        &self.instances[self.root]
    }

    /// Returns the module definition run by `instance`.
    pub fn module_of(&self, instance: InstanceId) -> &ModuleDef {
        &self.modules[self.instances[instance].module]
    }

    /// Returns the number of module definitions.
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Returns the number of instances.
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Finds the instance at `path`.
    pub fn find_instance(&self, path: &AppIdPath) -> Option<InstanceId> {
        self.instances
            .iter()
            .find(|(_, inst)| &inst.path == path)
            .map(|(id, _)| id)
    }

    /// Returns `instance` followed by its ancestors up to the root.
    pub fn ancestors(&self, instance: InstanceId) -> Vec<InstanceId> {
        let mut chain = vec![instance];
        let mut current = self.instances[instance].parent;
        while let Some(id) = current {
            chain.push(id);
            current = self.instances[id].parent;
        }
        chain
    }

    /// Returns the service declaration at `index`.
    pub fn service(&self, index: u32) -> &ServiceDecl {
        &self.services[index as usize]
    }

    /// Hashes the serialized graph. Two generations of the same declarations
    /// produce the same fingerprint.
    pub fn fingerprint(&self) -> WeftResult<ContentHash> {
        let bytes = serde_json::to_vec(self)
            .map_err(|e| InternalError::new(format!("cannot serialize graph: {e}")))?;
        Ok(ContentHash::from_bytes(&bytes))
    }
}
