//! Simulation of small designs: memory traffic, host endpoints, handshake
//! violations and combinational loops.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use weft_build::backend::LoweringInput;
use weft_build::{
    ArbitrationPolicy, Artifact, Backend, BuildError, Capabilities, CosimBackend, FixedPriority,
    Library, ModuleDecl, System,
};
use weft_config::{Arbitration, BackendPreset};
use weft_ir::{AppId, ServiceDecl, Type};
use weft_sim::{SimError, SimValue, Simulator, ViolationKind};

fn ram() -> ServiceDecl {
    ServiceDecl::random_access_memory("Ram", Type::Bits(8), 4)
}

fn write_req_ty() -> Type {
    Type::struct_of(&[("address", Type::Bits(2)), ("data", Type::Bits(8))])
}

/// Writes `value` to address 1 whenever `go` is high.
fn writer_top() -> Library {
    let mut lib = Library::new();
    lib.add_service(ram()).unwrap();
    let ram = ram();
    lib.add_module(
        ModuleDecl::new("Top")
            .clock("clk")
            .input("rst", Type::Bits(1))
            .input("go", Type::Bits(1))
            .input("value", Type::Bits(8))
            .construct(move |b| {
                let clk = b.port("clk")?;
                let rst = b.port("rst")?;
                let go = b.port("go")?;
                let value = b.port("value")?;
                let address = b.constant(&Type::Bits(2), 1)?;
                let req = b.make_struct(&write_req_ty(), &[("address", address), ("data", value)])?;
                let (req, _ready) = b.wrap(&write_req_ty(), req, go)?;
                let ty = ram.operation("write").unwrap().bundle.clone();
                let (bundle, mut acks) = b.pack(&ty, vec![("req", req)])?;
                b.call(&ram, "write", bundle, "wr".into())?;
                let ready = b.bool(true);
                b.unwrap(acks.take("ack")?, ready)?;
                b.instantiate_builtin(&ram, "mem".into(), "sv_mem", &[], &[clk, rst])?;
                Ok(())
            }),
    )
    .unwrap();
    lib
}

fn simulator(lib: Library, preset: BackendPreset) -> Simulator {
    let dir = tempfile::tempdir().unwrap();
    let mut sys = System::new("S", lib, "Top", preset, dir.path());
    sys.generate().unwrap();
    sys.compile().unwrap();
    Simulator::new(sys.compiled().unwrap(), sys.interner()).unwrap()
}

#[test]
fn write_lands_after_reset_release() {
    let mut sim = simulator(writer_top(), BackendPreset::Cosim);
    sim.set_input("rst", 1u64.into()).unwrap();
    sim.set_input("go", 1u64.into()).unwrap();
    sim.set_input("value", 9u64.into()).unwrap();
    sim.run(3).unwrap();
    assert_eq!(sim.memory("Top.mem").unwrap()[1], SimValue::Bits(0));

    sim.set_input("rst", 0u64.into()).unwrap();
    let transfers = sim.step().unwrap();
    assert_eq!(transfers, 1);
    assert_eq!(sim.memory("Top.mem").unwrap()[1], SimValue::Bits(9));

    // The acknowledgement is taken while the held request waits.
    assert_eq!(sim.step().unwrap(), 1);
    sim.run(4).unwrap();
    assert!(sim.violations().is_empty());
    assert_eq!(sim.cycle(), 9);
}

#[test]
fn dropping_valid_while_stalled_is_recorded() {
    let mut sim = simulator(writer_top(), BackendPreset::Cosim);
    sim.set_input("rst", 1u64.into()).unwrap();
    sim.set_input("go", 1u64.into()).unwrap();
    sim.step().unwrap();
    assert!(sim.violations().is_empty());

    sim.set_input("go", 0u64.into()).unwrap();
    sim.step().unwrap();
    let violations = sim.violations();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].kind, ViolationKind::ValidDropped);
    assert_eq!(violations[0].cycle, 1);
    assert_eq!(violations[0].path, "Top");
}

#[test]
fn changing_payload_while_stalled_is_recorded() {
    let mut sim = simulator(writer_top(), BackendPreset::Xrt);
    sim.set_input("rst", 1u64.into()).unwrap();
    sim.set_input("go", 1u64.into()).unwrap();
    sim.set_input("value", 5u64.into()).unwrap();
    sim.step().unwrap();
    sim.set_input("value", 6u64.into()).unwrap();
    sim.step().unwrap();
    assert_eq!(sim.violations().len(), 1);
    assert_eq!(sim.violations()[0].kind, ViolationKind::DataChanged);
}

#[test]
fn inputs_are_checked() {
    let mut sim = simulator(writer_top(), BackendPreset::Cosim);
    assert_eq!(sim.input_names(), ["clk", "rst", "go", "value"]);
    assert!(matches!(
        sim.set_input("nope", 1u64.into()),
        Err(SimError::UnknownInput { .. })
    ));
    assert!(matches!(
        sim.set_input("go", 2u64.into()),
        Err(SimError::InvalidValue { .. })
    ));
    assert!(matches!(
        sim.memory("Top.other"),
        Err(SimError::UnknownMemory { .. })
    ));
    assert!(matches!(
        sim.poke_memory("Top.mem", 4, 1u64.into()),
        Err(SimError::AddressOutOfRange { depth: 4, .. })
    ));
}

#[test]
fn ready_cycle_is_a_combinational_loop() {
    let mut lib = Library::new();
    lib.add_module(ModuleDecl::new("Top").construct(|b| {
        let data = b.constant(&Type::Bits(8), 1)?;
        let one = b.bool(true);
        let (a, ready_a) = b.wrap(&Type::Bits(8), data, one)?;
        let (c, ready_c) = b.wrap(&Type::Bits(8), data, one)?;
        b.unwrap(a, ready_c)?;
        b.unwrap(c, ready_a)?;
        Ok(())
    }))
    .unwrap();
    let mut sim = simulator(lib, BackendPreset::Cosim);
    let err = sim.step().unwrap_err();
    match err {
        SimError::CombinationalLoop { path, signal } => {
            assert_eq!(path, "Top");
            assert!(signal.starts_with("ready of channel"), "{signal}");
        }
        other => panic!("expected a loop, got {other}"),
    }
}

/// A host read endpoint passed straight through to the memory.
fn host_read_top() -> Library {
    let ram = ram();
    let comms = ServiceDecl::host("Comms").with_operation_from("read", ram.operation("read").unwrap());
    let mut lib = Library::new();
    lib.add_service(ram.clone()).unwrap();
    lib.add_service(comms.clone()).unwrap();
    lib.add_module(ModuleDecl::new("Top").clock("clk").construct(move |b| {
        let clk = b.port("clk")?;
        let bundle = b.request(&comms, "read", AppId::new("host_read"))?;
        b.call(&ram, "read", bundle, "ram_read".into())?;
        b.instantiate_builtin(&ram, "mem".into(), "sv_mem", &[], &[clk])?;
        Ok(())
    }))
    .unwrap();
    lib
}

#[test]
fn host_reads_memory_through_pass_through() {
    let mut sim = simulator(host_read_top(), BackendPreset::Cosim);
    assert_eq!(sim.host_paths().collect::<Vec<_>>(), vec!["Top.host_read"]);
    sim.poke_memory("Top.mem", 2, 77u64.into()).unwrap();
    sim.host_send("Top.host_read", "address", 2u64.into()).unwrap();

    assert_eq!(sim.step().unwrap(), 1);
    assert_eq!(sim.host_recv("Top.host_read", "data").unwrap(), None);
    assert_eq!(sim.step().unwrap(), 1);
    assert_eq!(sim.host_pending("Top.host_read", "data").unwrap(), 1);
    assert_eq!(
        sim.host_recv("Top.host_read", "data").unwrap(),
        Some(SimValue::Bits(77))
    );
    assert!(sim.violations().is_empty());
}

#[test]
fn host_directions_are_enforced() {
    let mut sim = simulator(host_read_top(), BackendPreset::Cosim);
    assert!(matches!(
        sim.host_send("Top.host_read", "data", 1u64.into()),
        Err(SimError::WrongDirection { expected: "sent", .. })
    ));
    assert!(matches!(
        sim.host_recv("Top.host_read", "address"),
        Err(SimError::WrongDirection { expected: "received", .. })
    ));
    assert!(matches!(
        sim.host_send("Top.host_read", "address", 4u64.into()),
        Err(SimError::InvalidValue { .. })
    ));
    assert!(matches!(
        sim.host_send("Top.nowhere", "address", 1u64.into()),
        Err(SimError::UnknownEndpoint { .. })
    ));
    assert!(matches!(
        sim.host_recv("Top.host_read", "bogus"),
        Err(SimError::UnknownRole { .. })
    ));
}

#[test]
fn run_until_stops_early() {
    let mut sim = simulator(host_read_top(), BackendPreset::Cosim);
    sim.host_send("Top.host_read", "address", 0u64.into()).unwrap();
    let done = sim
        .run_until(10, |s| s.host_pending("Top.host_read", "data").unwrap_or(0) > 0)
        .unwrap();
    assert!(done);
    assert_eq!(sim.cycle(), 2);
}

/// Fixed priority that counts its grants.
#[derive(Debug)]
struct CountedGrants {
    grants: Arc<AtomicUsize>,
}

impl ArbitrationPolicy for CountedGrants {
    fn kind(&self) -> Arbitration {
        Arbitration::FixedPriority
    }

    fn select(&self, requests: &[bool]) -> Option<usize> {
        FixedPriority.select(requests)
    }

    fn commit(&mut self, _granted: usize) {
        self.grants.fetch_add(1, Ordering::SeqCst);
    }
}

/// Cosim, with every port arbitrated by [`CountedGrants`].
struct CountingCosim {
    grants: Arc<AtomicUsize>,
}

impl Backend for CountingCosim {
    fn preset(&self) -> BackendPreset {
        BackendPreset::Cosim
    }

    fn capabilities(&self) -> Capabilities {
        CosimBackend.capabilities()
    }

    fn default_arbitration(&self) -> Arbitration {
        Arbitration::FixedPriority
    }

    fn arbitration_policy(&self, _kind: Arbitration) -> Box<dyn ArbitrationPolicy> {
        Box::new(CountedGrants {
            grants: Arc::clone(&self.grants),
        })
    }

    fn lower(&self, input: &LoweringInput<'_>) -> Result<Vec<Artifact>, BuildError> {
        CosimBackend.lower(input)
    }
}

#[test]
fn backend_policy_arbitrates_memory_ports() {
    let grants = Arc::new(AtomicUsize::new(0));
    let dir = tempfile::tempdir().unwrap();
    let backend = Box::new(CountingCosim {
        grants: Arc::clone(&grants),
    });
    let mut sys = System::with_backend("S", writer_top(), "Top", backend, dir.path());
    sys.generate().unwrap();
    sys.compile().unwrap();
    let mut sim = Simulator::with_arbitration(sys.compiled().unwrap(), sys.interner(), || {
        sys.arbitration_policy()
    })
    .unwrap();

    sim.set_input("go", 1u64.into()).unwrap();
    sim.set_input("value", 5u64.into()).unwrap();
    assert_eq!(grants.load(Ordering::SeqCst), 0);
    sim.step().unwrap();
    assert_eq!(sim.memory("Top.mem").unwrap()[1], SimValue::Bits(5));
    assert_eq!(grants.load(Ordering::SeqCst), 1);
    assert_eq!(sim.arbitration(), Arbitration::FixedPriority);
}
