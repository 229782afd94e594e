//! End-to-end tests of the generate → compile → package pipeline.

use std::fs;
use weft_build::errors::{E116, W101, W102};
use weft_build::{BuildError, ErrorKind, Library, ModuleDecl, Stage, System};
use weft_config::{Arbitration, BackendPreset};
use weft_ir::{AppId, Metadata, ServiceDecl, Type};

fn ram() -> ServiceDecl {
    ServiceDecl::random_access_memory("Ram", Type::Bits(8), 4)
}

fn comms() -> ServiceDecl {
    let ram = ram();
    ServiceDecl::host("Comms").with_operation_from("read", ram.operation("read").unwrap())
}

/// A module issuing one read of address 1 and draining the response.
fn reader() -> ModuleDecl {
    let ram = ram();
    ModuleDecl::new("Reader").clock("clk").construct(move |b| {
        let bundle_ty = ram.operation("read").unwrap().bundle.clone();
        let addr = b.constant(&Type::Bits(2), 1)?;
        let valid = b.bool(true);
        let (address, _ready) = b.wrap(&Type::Bits(2), addr, valid)?;
        let (bundle, mut responses) = b.pack(&bundle_ty, vec![("address", address)])?;
        b.call(&ram, "read", bundle, "rd".into())?;
        let data = responses.take("data")?;
        let ready = b.bool(true);
        b.unwrap(data, ready)?;
        Ok(())
    })
}

fn ram_library(with_builtin: bool) -> Library {
    let mut lib = Library::new();
    lib.add_service(ram()).unwrap();
    lib.add_module(reader()).unwrap();
    let ram = ram();
    lib.add_module(ModuleDecl::new("Top").clock("clk").construct(move |b| {
        let clk = b.port("clk")?;
        b.instantiate("Reader", AppId::indexed("reader", 0), &[("clk", clk)])?;
        b.instantiate("Reader", AppId::indexed("reader", 1), &[("clk", clk)])?;
        if with_builtin {
            b.instantiate_builtin(&ram, "mem".into(), "sv_mem", &[], &[clk])?;
        }
        Ok(())
    }))
    .unwrap();
    lib
}

#[test]
fn services_resolve_to_enclosing_builtin() {
    let dir = tempfile::tempdir().unwrap();
    let mut sys = System::new("S", ram_library(true), "Top", BackendPreset::Cosim, dir.path());
    sys.generate().unwrap();
    let compiled = sys.compile().unwrap();

    assert_eq!(compiled.services.builtins.len(), 1);
    let mem = &compiled.services.builtins[0];
    assert_eq!(mem.path.to_string(), "Top.mem");
    assert_eq!(mem.tag, "sv_mem");
    let clients: Vec<String> = mem.clients.iter().map(|c| c.path.to_string()).collect();
    assert_eq!(clients, vec!["Top.reader[0].rd", "Top.reader[1].rd"]);
    assert!(mem.clients.iter().all(|c| c.operation == "read"));
    assert_eq!(compiled.services.len(), 2);
}

#[test]
fn missing_builtin_is_unresolved() {
    let dir = tempfile::tempdir().unwrap();
    let mut sys = System::new("S", ram_library(false), "Top", BackendPreset::Cosim, dir.path());
    sys.generate().unwrap();
    let err = sys.compile().unwrap_err();
    assert!(matches!(err, BuildError::UnresolvedService { .. }));
    assert_eq!(err.scope(), Some("Top.reader[0].rd"));
    assert_eq!(sys.stage(), Stage::Failed);
}

#[test]
fn pack_then_unpack_preserves_roles() {
    let ram = ram();
    let mut lib = Library::new();
    lib.add_service(ram.clone()).unwrap();
    lib.add_module(ModuleDecl::new("Loop").construct(move |b| {
        let ty = ram.operation("read").unwrap().bundle.clone();
        let addr = b.constant(&Type::Bits(2), 3)?;
        let word = b.constant(&Type::Bits(8), 7)?;
        let valid = b.bool(true);
        let (address, _) = b.wrap(&Type::Bits(2), addr, valid)?;
        let (data, _) = b.wrap(&Type::Bits(8), word, valid)?;

        let (bundle, mut back) = b.pack(&ty, vec![("address", address)])?;
        assert_eq!(back.roles().collect::<Vec<_>>(), vec!["data"]);
        let mut served = b.unpack(bundle, vec![("data", data)])?;
        assert_eq!(served.roles().collect::<Vec<_>>(), vec!["address"]);

        let ready = b.bool(true);
        let (got_addr, _) = b.unwrap(served.take("address")?, ready)?;
        let (got_data, _) = b.unwrap(back.take("data")?, ready)?;
        assert_eq!(got_addr.ty, addr.ty);
        assert_eq!(got_data.ty, word.ty);
        Ok(())
    }))
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let mut sys = System::new("S", lib, "Loop", BackendPreset::Cosim, dir.path());
    sys.generate().unwrap();
    sys.compile().unwrap();
    assert_eq!(sys.sink().warning_count(), 0);
}

fn single_module(construct: ModuleDecl) -> Library {
    let mut lib = Library::new();
    lib.add_service(ram()).unwrap();
    lib.add_service(comms()).unwrap();
    lib.add_module(construct).unwrap();
    lib
}

fn generate_err(lib: Library, preset: BackendPreset) -> (BuildError, System) {
    let dir = tempfile::tempdir().unwrap();
    let mut sys = System::new("S", lib, "M", preset, dir.path().join("out"));
    let err = sys.generate().unwrap_err();
    (err, sys)
}

#[test]
fn pack_rejects_missing_role() {
    let ram = ram();
    let lib = single_module(ModuleDecl::new("M").construct(move |b| {
        let ty = ram.operation("write").unwrap().bundle.clone();
        b.pack(&ty, vec![])?;
        Ok(())
    }));
    let (err, sys) = generate_err(lib, BackendPreset::Cosim);
    match err {
        BuildError::MissingRole { role, .. } => assert_eq!(role, "req"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(sys.stage(), Stage::Failed);
    assert_eq!(sys.diagnostics()[0].code.to_string(), "E110");
}

#[test]
fn pack_rejects_role_flowing_from_service() {
    let ram = ram();
    let lib = single_module(ModuleDecl::new("M").construct(move |b| {
        let ty = ram.operation("read").unwrap().bundle.clone();
        let word = b.constant(&Type::Bits(8), 0)?;
        let valid = b.bool(false);
        let (data, _) = b.wrap(&Type::Bits(8), word, valid)?;
        b.pack(&ty, vec![("data", data)])?;
        Ok(())
    }));
    let (err, _) = generate_err(lib, BackendPreset::Cosim);
    assert!(matches!(err, BuildError::UnexpectedRole { .. }), "{err}");
}

#[test]
fn pack_rejects_wrong_payload() {
    let ram = ram();
    let lib = single_module(ModuleDecl::new("M").construct(move |b| {
        let ty = ram.operation("read").unwrap().bundle.clone();
        let addr = b.constant(&Type::Bits(5), 0)?;
        let valid = b.bool(true);
        let (address, _) = b.wrap(&Type::Bits(5), addr, valid)?;
        b.pack(&ty, vec![("address", address)])?;
        Ok(())
    }));
    let (err, _) = generate_err(lib, BackendPreset::Cosim);
    match err {
        BuildError::RoleTypeMismatch {
            expected, found, ..
        } => {
            assert_eq!(expected, "bits<2>");
            assert_eq!(found, "bits<5>");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn wrap_checks_value_type() {
    let lib = single_module(ModuleDecl::new("M").construct(|b| {
        let v = b.constant(&Type::Bits(4), 1)?;
        let valid = b.bool(true);
        b.wrap(&Type::Bits(8), v, valid)?;
        Ok(())
    }));
    let (err, _) = generate_err(lib, BackendPreset::Cosim);
    assert!(matches!(err, BuildError::TypeMismatch { .. }));
}

#[test]
fn constant_must_fit() {
    let lib = single_module(ModuleDecl::new("M").construct(|b| {
        b.constant(&Type::Bits(2), 4)?;
        Ok(())
    }));
    let (err, _) = generate_err(lib, BackendPreset::Cosim);
    assert!(matches!(err, BuildError::ConstantOutOfRange { .. }));
}

#[test]
fn duplicate_appid_in_scope() {
    let mut lib = single_module(ModuleDecl::new("M").construct(|b| {
        b.instantiate("Leaf", "x".into(), &[])?;
        b.instantiate("Leaf", "x".into(), &[])
    }));
    lib.add_module(ModuleDecl::new("Leaf")).unwrap();
    let (err, _) = generate_err(lib, BackendPreset::Cosim);
    match err {
        BuildError::DuplicateAppId { module, appid } => {
            assert_eq!(module, "M");
            assert_eq!(appid, "x");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn same_appid_in_different_scopes_is_fine() {
    let mut lib = Library::new();
    lib.add_module(ModuleDecl::new("Leaf")).unwrap();
    lib.add_module(ModuleDecl::new("Mid").construct(|b| b.instantiate("Leaf", "x".into(), &[])))
        .unwrap();
    lib.add_module(ModuleDecl::new("M").construct(|b| {
        b.instantiate("Mid", "x".into(), &[])?;
        b.instantiate("Leaf", "y".into(), &[])
    }))
    .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let mut sys = System::new("S", lib, "M", BackendPreset::Cosim, dir.path());
    let graph = sys.generate().unwrap();
    assert_eq!(graph.instance_count(), 4);
}

#[test]
fn instantiate_checks_ports() {
    let mut lib = single_module(ModuleDecl::new("M").construct(|b| {
        let v = b.constant(&Type::Bits(4), 1)?;
        b.instantiate("Leaf", "leaf".into(), &[("rst", v)])
    }));
    lib.add_module(ModuleDecl::new("Leaf").input("rst", Type::Bits(1)))
        .unwrap();
    let (err, _) = generate_err(lib, BackendPreset::Cosim);
    assert!(matches!(err, BuildError::PortTypeMismatch { .. }), "{err}");
}

#[test]
fn host_request_rejected_without_host_channels() {
    let comms = comms();
    let lib = single_module(ModuleDecl::new("M").construct(move |b| {
        b.request(&comms, "read", "host_read".into())?;
        Ok(())
    }));
    let (err, sys) = generate_err(lib, BackendPreset::Xrt);
    assert_eq!(err.kind(), ErrorKind::Capability);
    assert!(matches!(err, BuildError::HostChannelsUnsupported { .. }));
    assert_eq!(sys.stage(), Stage::Failed);
}

#[test]
fn unserviced_bundle_fails_compile() {
    let ram = ram();
    let lib = single_module(ModuleDecl::new("M").construct(move |b| {
        let ty = ram.operation("read").unwrap().bundle.clone();
        let addr = b.constant(&Type::Bits(2), 0)?;
        let valid = b.bool(true);
        let (address, _) = b.wrap(&Type::Bits(2), addr, valid)?;
        let (_bundle, mut back) = b.pack(&ty, vec![("address", address)])?;
        let ready = b.bool(true);
        b.unwrap(back.take("data")?, ready)?;
        Ok(())
    }));
    let dir = tempfile::tempdir().unwrap();
    let mut sys = System::new("S", lib, "M", BackendPreset::Cosim, dir.path());
    sys.generate().unwrap();
    let err = sys.compile().unwrap_err();
    assert_eq!(err.code(), E116);
    assert_eq!(sys.stage(), Stage::Failed);
}

#[test]
fn dangling_channel_and_idle_builtin_warn() {
    let ram = ram();
    let lib = single_module(ModuleDecl::new("M").clock("clk").construct(move |b| {
        let clk = b.port("clk")?;
        let v = b.constant(&Type::Bits(8), 1)?;
        let valid = b.bool(true);
        b.wrap(&Type::Bits(8), v, valid)?;
        b.instantiate_builtin(&ram, "mem".into(), "sv_mem", &[], &[clk])?;
        Ok(())
    }));
    let dir = tempfile::tempdir().unwrap();
    let mut sys = System::new("S", lib, "M", BackendPreset::Cosim, dir.path());
    sys.generate().unwrap();
    sys.compile().unwrap();
    let codes: Vec<_> = sys.diagnostics().iter().map(|d| d.code).collect();
    assert_eq!(codes, vec![W101, W102]);
    assert!(!sys.sink().has_errors());
}

#[test]
fn stages_must_run_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut sys = System::new("S", ram_library(true), "Top", BackendPreset::Cosim, dir.path());
    sys.generate().unwrap();
    let err = sys.package().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Sequencing);
    assert_eq!(
        err.to_string(),
        "cannot package: system is generated, expected compiled"
    );
    assert!(matches!(
        sys.compile().unwrap_err(),
        BuildError::PreviouslyFailed { .. }
    ));
}

#[test]
fn output_directory_is_exclusive() {
    let dir = tempfile::tempdir().unwrap();
    let mut first = System::new("A", ram_library(true), "Top", BackendPreset::Cosim, dir.path());
    let mut second = System::new("B", ram_library(true), "Top", BackendPreset::Cosim, dir.path());

    first.generate().unwrap();
    let err = second.generate().unwrap_err();
    assert!(matches!(err, BuildError::OutputLocked { .. }));
    assert_eq!(err.kind(), ErrorKind::Io);

    first.compile().unwrap();
    first.package().unwrap();

    let mut third = System::new("C", ram_library(true), "Top", BackendPreset::Cosim, dir.path());
    third.build().unwrap();
}

#[test]
fn cosim_package_contents() {
    let dir = tempfile::tempdir().unwrap();
    let mut sys = System::new("Mem", ram_library(true), "Top", BackendPreset::Cosim, dir.path())
        .with_version("1.2.3");
    let report = sys.build().unwrap().clone();

    let paths: Vec<String> = report
        .files
        .iter()
        .map(|f| f.path.to_string_lossy().replace('\\', "/"))
        .collect();
    assert_eq!(
        paths,
        vec!["esi_system_manifest.json", "hw/Mem.weft.json", "cosim/endpoints.json"]
    );
    for path in &paths {
        assert!(dir.path().join(path).is_file(), "{path} missing");
    }
    assert!(dir.path().join("weft-package.json").is_file());

    let manifest: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(dir.path().join("esi_system_manifest.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(manifest["system"]["name"], "Mem");
    assert_eq!(manifest["system"]["version"], "1.2.3");
    assert_eq!(manifest["backend"], "cosim");
    assert_eq!(manifest["arbitration"], "round-robin");
    assert_eq!(manifest["builtins"][0]["path"], "Top.mem");
    assert_eq!(manifest["instances"][0]["path"], "Top");
}

#[test]
fn xrt_package_describes_memories() {
    let dir = tempfile::tempdir().unwrap();
    let mut sys = System::new("Mem", ram_library(true), "Top", BackendPreset::Xrt, dir.path())
        .with_arbitration(Some(Arbitration::RoundRobin));
    sys.build().unwrap();

    let xml = fs::read_to_string(dir.path().join("xrt/kernel.xml")).unwrap();
    assert!(xml.contains("<kernel name=\"Mem\""));
    assert!(xml.contains("arbitration=\"round-robin\""));
    assert!(xml.contains(
        "<memory path=\"Top.mem\" service=\"Ram\" impl=\"sv_mem\" dataWidth=\"8\" depth=\"4\" clients=\"2\"/>"
    ));
    assert!(dir.path().join("xrt/xrt.ini").is_file());
    assert!(!dir.path().join("cosim").exists());
}

#[test]
fn manifest_lists_modules_with_and_without_metadata() {
    let mut lib = Library::new();
    lib.add_module(
        ModuleDecl::new("Tagged").metadata(Metadata::new().version("0.1").with("style", "plain")),
    )
    .unwrap();
    lib.add_module(ModuleDecl::new("Top").construct(|b| b.instantiate("Tagged", "t".into(), &[])))
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let mut sys = System::new("S", lib, "Top", BackendPreset::Cosim, dir.path());
    sys.generate().unwrap();
    let manifest = &sys.compile().unwrap().manifest;

    assert_eq!(manifest.modules.len(), 2);
    let tagged = manifest.module("Tagged").unwrap();
    assert_eq!(
        tagged.metadata.as_ref().unwrap().version.as_deref(),
        Some("0.1")
    );
    assert!(manifest.module("Top").unwrap().metadata.is_none());
}

#[test]
fn generation_is_deterministic_across_systems() {
    let a_dir = tempfile::tempdir().unwrap();
    let b_dir = tempfile::tempdir().unwrap();
    let mut a = System::new("S", ram_library(true), "Top", BackendPreset::Cosim, a_dir.path());
    let mut b = System::new("S", ram_library(true), "Top", BackendPreset::Cosim, b_dir.path());
    a.generate().unwrap();
    b.generate().unwrap();
    let fa = a.compile().unwrap().fingerprint;
    let fb = b.compile().unwrap().fingerprint;
    assert_eq!(fa, fb);
}
