//! Backend presets.
//!
//! A backend is the target-specific half of the pipeline: it declares what
//! it can realize ([`Capabilities`]), which arbitration policy it uses when
//! several service instances share one builtin, how a compiled design is
//! lowered into artifact files, and how those files are packaged. The
//! generic stages in [`System`](crate::System) delegate to it.

mod cosim;
mod xrt;

pub use cosim::CosimBackend;
pub use xrt::XrtBackend;

use crate::arbitration::{policy_for, ArbitrationPolicy};
use crate::errors::BuildError;
use crate::manifest::Manifest;
use crate::package::{write_package, PackageReport};
use crate::resolve::ServiceMap;
use std::path::{Path, PathBuf};
use weft_common::Interner;
use weft_config::{Arbitration, BackendPreset};
use weft_ir::HwGraph;

/// Constructs a backend can realize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Whether bundles may be bridged to the host.
    pub host_channels: bool,
    /// Builtin implementation tags the backend knows.
    pub builtins: &'static [&'static str],
}

impl Capabilities {
    /// Returns `true` if `tag` is one of the supported builtins.
    pub fn supports_builtin(&self, tag: &str) -> bool {
        self.builtins.contains(&tag)
    }
}

/// One file produced by lowering, relative to the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Relative path inside the output directory.
    pub path: PathBuf,
    /// File contents.
    pub contents: Vec<u8>,
}

impl Artifact {
    /// Creates an artifact from text.
    pub fn text(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into().into_bytes(),
        }
    }
}

/// Everything a backend sees when lowering.
pub struct LoweringInput<'a> {
    /// The system name; base name of some artifacts.
    pub system_name: &'a str,
    /// The generated graph.
    pub graph: &'a HwGraph,
    /// Resolved service instances.
    pub services: &'a ServiceMap,
    /// The collected manifest.
    pub manifest: &'a Manifest,
    /// Interner for names in the graph.
    pub interner: &'a Interner,
    /// The effective arbitration policy.
    pub arbitration: Arbitration,
}

/// A target-specific implementation of the lowering and packaging stages.
pub trait Backend: Send + Sync {
    /// Returns the preset this backend implements.
    fn preset(&self) -> BackendPreset;

    /// Returns what this backend can realize.
    fn capabilities(&self) -> Capabilities;

    /// Returns the arbitration policy used unless configuration overrides it.
    fn default_arbitration(&self) -> Arbitration;

    /// Creates the arbitration state for one shared builtin port, given the
    /// effective policy kind. The stock policy of that kind unless the
    /// backend supplies its own.
    fn arbitration_policy(&self, kind: Arbitration) -> Box<dyn ArbitrationPolicy> {
        policy_for(kind)
    }

    /// Lowers a compiled design into artifact files.
    fn lower(&self, input: &LoweringInput<'_>) -> Result<Vec<Artifact>, BuildError>;

    /// Writes the artifacts into `output_dir`.
    fn package(
        &self,
        system_name: &str,
        artifacts: &[Artifact],
        output_dir: &Path,
    ) -> Result<PackageReport, BuildError> {
        write_package(system_name, artifacts, output_dir)
    }
}

/// Returns the backend implementing `preset`.
pub fn backend_for(preset: BackendPreset) -> Box<dyn Backend> {
    match preset {
        BackendPreset::Cosim => Box::new(CosimBackend),
        BackendPreset::Xrt => Box::new(XrtBackend),
    }
}

/// Artifacts every backend emits: the manifest and the serialized graph.
pub(crate) fn common_artifacts(input: &LoweringInput<'_>) -> Result<Vec<Artifact>, BuildError> {
    let graph = serde_json::to_string_pretty(input.graph).map_err(|e| {
        weft_common::InternalError::new(format!("cannot serialize graph: {e}"))
    })?;
    Ok(vec![
        Artifact::text("esi_system_manifest.json", input.manifest.to_json()?),
        Artifact::text(format!("hw/{}.weft.json", input.system_name), graph),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_map_to_backends() {
        for preset in BackendPreset::ALL {
            assert_eq!(backend_for(preset).preset(), preset);
        }
    }

    #[test]
    fn cosim_and_xrt_capabilities_differ() {
        let cosim = backend_for(BackendPreset::Cosim).capabilities();
        let xrt = backend_for(BackendPreset::Xrt).capabilities();
        assert!(cosim.host_channels);
        assert!(!xrt.host_channels);
        assert!(cosim.supports_builtin("sv_mem"));
        assert!(xrt.supports_builtin("sv_mem"));
        assert!(!xrt.supports_builtin("hbm"));
    }

    #[test]
    fn default_arbitration_per_backend() {
        assert_eq!(
            backend_for(BackendPreset::Cosim).default_arbitration(),
            Arbitration::RoundRobin
        );
        assert_eq!(
            backend_for(BackendPreset::Xrt).default_arbitration(),
            Arbitration::FixedPriority
        );
    }

    #[test]
    fn stock_policy_follows_the_kind() {
        let backend = backend_for(BackendPreset::Xrt);
        assert_eq!(
            backend.arbitration_policy(Arbitration::RoundRobin).kind(),
            Arbitration::RoundRobin
        );
    }

    #[test]
    fn text_artifact_bytes() {
        let a = Artifact::text("xrt/xrt.ini", "[Runtime]\n");
        assert_eq!(a.contents, b"[Runtime]\n");
    }
}
