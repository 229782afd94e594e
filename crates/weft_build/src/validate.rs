//! Whole-graph checks run at the start of `compile()`.
//!
//! The builder already rejects malformed constructs when they are declared;
//! these checks cover what can only be seen once construction has finished
//! (bundles left half-bound, channels nobody consumes) and re-check AppID
//! scopes and backend capabilities on the finished graph.

use crate::backend::Backend;
use crate::errors::{warning_dangling_channel, BuildError};
use std::collections::HashSet;
use weft_common::Interner;
use weft_diagnostics::DiagnosticSink;
use weft_ir::{HwGraph, ServiceProvider};

/// Validates `graph` against the structural rules and `backend`'s
/// capabilities. Warnings go to `sink`; the first error is returned.
pub fn validate(
    graph: &HwGraph,
    interner: &Interner,
    backend: &dyn Backend,
    sink: &DiagnosticSink,
) -> Result<(), BuildError> {
    let caps = backend.capabilities();

    for def in graph.modules.values() {
        let module = interner.resolve(def.name);

        let mut seen = HashSet::new();
        for appid in def.appids() {
            if !appid.is_well_formed() {
                return Err(BuildError::InvalidAppId {
                    module: module.to_string(),
                    appid: appid.to_string(),
                });
            }
            if !seen.insert(appid) {
                return Err(BuildError::DuplicateAppId {
                    module: module.to_string(),
                    appid: appid.to_string(),
                });
            }
        }

        for bundle in def.bundles.values() {
            for (bound, end) in [(bundle.client.is_bound(), "client"), (bundle.server.is_bound(), "server")] {
                if !bound {
                    return Err(BuildError::UnservicedBundle {
                        module: module.to_string(),
                        end,
                    });
                }
            }
        }

        for svc in def.services.values() {
            let decl = graph.service(svc.service);
            if decl.provider() == ServiceProvider::Host && !caps.host_channels {
                return Err(BuildError::HostChannelsUnsupported {
                    backend: backend.preset().to_string(),
                    scope: module.to_string(),
                    service: decl.name().to_string(),
                });
            }
        }

        for builtin in &def.builtins {
            let tag = interner.resolve(builtin.tag);
            if !caps.supports_builtin(tag) {
                return Err(BuildError::UnsupportedBuiltin {
                    backend: backend.preset().to_string(),
                    scope: module.to_string(),
                    tag: tag.to_string(),
                });
            }
        }

        for channel in def.dangling_channels() {
            let payload = graph.types.get(def.channels[channel].payload).to_string();
            tracing::warn!(module, %payload, "channel is never consumed");
            sink.emit(warning_dangling_channel(module, &payload));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Artifact, Capabilities, CosimBackend, LoweringInput};
    use crate::errors::{B201, B202};
    use crate::{Library, ModuleDecl, Stage, System};
    use std::sync::atomic::{AtomicBool, Ordering};
    use weft_config::{Arbitration, BackendPreset};
    use weft_ir::{AppId, ServiceDecl, Type};

    /// Hands full cosim capabilities to generation and `narrowed` to every
    /// later caller.
    struct Narrowing {
        narrowed: Capabilities,
        generated: AtomicBool,
    }

    impl Narrowing {
        fn boxed(narrowed: Capabilities) -> Box<dyn Backend> {
            Box::new(Self {
                narrowed,
                generated: AtomicBool::new(false),
            })
        }
    }

    impl Backend for Narrowing {
        fn preset(&self) -> BackendPreset {
            BackendPreset::Cosim
        }

        fn capabilities(&self) -> Capabilities {
            if self.generated.swap(true, Ordering::SeqCst) {
                self.narrowed
            } else {
                CosimBackend.capabilities()
            }
        }

        fn default_arbitration(&self) -> Arbitration {
            CosimBackend.default_arbitration()
        }

        fn lower(&self, input: &LoweringInput<'_>) -> Result<Vec<Artifact>, BuildError> {
            CosimBackend.lower(input)
        }
    }

    /// One module bridging a host read request straight to its own memory.
    fn pass_through() -> Library {
        let ram = ServiceDecl::random_access_memory("Ram", Type::Bits(8), 4);
        let comms =
            ServiceDecl::host("Comms").with_operation_from("read", ram.operation("read").unwrap());
        let mut lib = Library::new();
        lib.add_service(ram.clone()).unwrap();
        lib.add_service(comms.clone()).unwrap();
        lib.add_module(ModuleDecl::new("M").clock("clk").construct(move |b| {
            let clk = b.port("clk")?;
            let read = b.request(&comms, "read", "host_read".into())?;
            b.call(&ram, "read", read, "ram_read".into())?;
            b.instantiate_builtin(&ram, "mem".into(), "sv_mem", &[], &[clk])?;
            Ok(())
        }))
        .unwrap();
        lib
    }

    fn compile_with(backend: Box<dyn Backend>) -> (BuildError, System) {
        let dir = tempfile::tempdir().unwrap();
        let mut sys = System::with_backend("S", pass_through(), "M", backend, dir.path().join("out"));
        sys.generate().unwrap();
        let err = sys.compile().unwrap_err();
        (err, sys)
    }

    fn generated() -> (HwGraph, System) {
        let dir = tempfile::tempdir().unwrap();
        let mut sys = System::new("S", pass_through(), "M", BackendPreset::Cosim, dir.path().join("out"));
        let graph = sys.generate().unwrap().clone();
        (graph, sys)
    }

    fn rename_builtin(graph: &mut HwGraph, appid: AppId) {
        let root = graph.instances[graph.root].module;
        graph.modules[root].builtins[0].appid = appid;
    }

    #[test]
    fn finished_pass_through_is_valid() {
        let (graph, sys) = generated();
        let sink = DiagnosticSink::new();
        validate(&graph, sys.interner(), &CosimBackend, &sink).unwrap();
        assert!(sink.diagnostics().is_empty());
    }

    #[test]
    fn host_service_is_rechecked_at_compile() {
        let (err, sys) = compile_with(Narrowing::boxed(Capabilities {
            host_channels: false,
            builtins: &["sv_mem"],
        }));
        match &err {
            BuildError::HostChannelsUnsupported { scope, service, .. } => {
                assert_eq!(scope, "M");
                assert_eq!(service, "Comms");
            }
            other => panic!("expected HostChannelsUnsupported, got {other:?}"),
        }
        assert_eq!(err.code(), B201);
        assert_eq!(sys.stage(), Stage::Failed);
        assert!(sys.diagnostics().iter().any(|d| d.code == B201));
    }

    #[test]
    fn builtin_is_rechecked_at_compile() {
        let (err, sys) = compile_with(Narrowing::boxed(Capabilities {
            host_channels: true,
            builtins: &[],
        }));
        match &err {
            BuildError::UnsupportedBuiltin { scope, tag, .. } => {
                assert_eq!(scope, "M");
                assert_eq!(tag, "sv_mem");
            }
            other => panic!("expected UnsupportedBuiltin, got {other:?}"),
        }
        assert_eq!(err.code(), B202);
        assert_eq!(sys.stage(), Stage::Failed);
    }

    #[test]
    fn duplicate_appid_in_finished_graph() {
        let (mut graph, sys) = generated();
        rename_builtin(&mut graph, AppId::new("ram_read"));
        let err = validate(&graph, sys.interner(), &CosimBackend, &DiagnosticSink::new()).unwrap_err();
        match err {
            BuildError::DuplicateAppId { module, appid } => {
                assert_eq!(module, "M");
                assert_eq!(appid, "ram_read");
            }
            other => panic!("expected DuplicateAppId, got {other:?}"),
        }
    }

    #[test]
    fn malformed_appid_in_finished_graph() {
        let (mut graph, sys) = generated();
        rename_builtin(&mut graph, AppId::new("two words"));
        let err = validate(&graph, sys.interner(), &CosimBackend, &DiagnosticSink::new()).unwrap_err();
        assert!(
            matches!(&err, BuildError::InvalidAppId { appid, .. } if appid == "two words"),
            "{err:?}"
        );
    }
}
