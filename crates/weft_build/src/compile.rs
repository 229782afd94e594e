//! The compile stage: validation, service resolution, manifest collection
//! and backend lowering.

use crate::backend::{Artifact, Backend, LoweringInput};
use crate::errors::{warning_idle_builtin, BuildError};
use crate::manifest::{Manifest, ManifestInfo};
use crate::resolve::ServiceMap;
use crate::validate::validate;
use weft_common::{ContentHash, Interner};
use weft_config::{Arbitration, BackendPreset};
use weft_diagnostics::DiagnosticSink;
use weft_ir::HwGraph;

/// A validated, resolved and lowered design.
#[derive(Debug, Clone)]
pub struct CompiledDesign {
    /// The system name.
    pub name: String,
    /// The system version.
    pub version: String,
    /// The generated graph.
    pub graph: HwGraph,
    /// Where every service instance is served.
    pub services: ServiceMap,
    /// The collected manifest.
    pub manifest: Manifest,
    /// Files produced by the backend, not yet written.
    pub artifacts: Vec<Artifact>,
    /// The backend preset compiled for.
    pub backend: BackendPreset,
    /// Arbitration policy for shared builtins.
    pub arbitration: Arbitration,
    /// Fingerprint of `graph`.
    pub fingerprint: ContentHash,
}

impl CompiledDesign {
    /// Returns the artifact at `path`, if the backend produced one.
    pub fn artifact(&self, path: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.path.as_os_str() == path)
    }
}

/// Compiles `graph` for `backend`.
pub fn compile(
    name: &str,
    version: &str,
    graph: HwGraph,
    interner: &Interner,
    backend: &dyn Backend,
    arbitration: Arbitration,
    sink: &DiagnosticSink,
) -> Result<CompiledDesign, BuildError> {
    validate(&graph, interner, backend, sink)?;

    let services = ServiceMap::resolve(&graph, interner)?;
    for builtin in services.builtins.iter().filter(|b| b.clients.is_empty()) {
        let path = builtin.path.to_string();
        tracing::warn!(builtin = %path, tag = %builtin.tag, "builtin has no clients");
        sink.emit(warning_idle_builtin(&path, &builtin.tag));
    }

    let info = ManifestInfo {
        name,
        version,
        backend: backend.preset(),
        arbitration,
    };
    let manifest = Manifest::collect(&info, &graph, &services, interner)?;
    let fingerprint = graph.fingerprint()?;

    let artifacts = backend.lower(&LoweringInput {
        system_name: name,
        graph: &graph,
        services: &services,
        manifest: &manifest,
        interner,
        arbitration,
    })?;
    tracing::debug!(artifacts = artifacts.len(), "lowered design");

    Ok(CompiledDesign {
        name: name.to_string(),
        version: version.to_string(),
        graph,
        services,
        manifest,
        artifacts,
        backend: backend.preset(),
        arbitration,
        fingerprint,
    })
}
