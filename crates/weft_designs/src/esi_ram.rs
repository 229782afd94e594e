//! The ESI RAM system.
//!
//! An 8-word, 64-bit random-access memory instantiated as the `sv_mem`
//! builtin at `Top.mem`. `MemWriter` copies word 2 to word 3 through its own
//! read and write service instances. On backends with host channels the
//! memory's read and write operations are also passed through to the host
//! as the `MemComms` service.

use weft_build::{BuildError, Library, ModuleBuilder, ModuleDecl};
use weft_common::InternalError;
use weft_ir::{AppId, Metadata, ServiceDecl, Type};

/// Name of the root module.
pub const TOP: &str = "Top";
/// Path of the memory builtin.
pub const MEM_PATH: &str = "Top.mem";
/// Host endpoint passing writes through to the memory.
pub const HOST_WRITE: &str = "Top.write";
/// Host endpoint passing reads through to the memory.
pub const HOST_READ: &str = "Top.read";
/// Number of memory words.
pub const DEPTH: u32 = 8;
/// Word the writer reads.
pub const SOURCE_ADDRESS: u64 = 2;
/// Word the writer writes.
pub const TARGET_ADDRESS: u64 = 3;

/// When `Top` passes the memory through to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostPassThrough {
    /// Only if the backend supports host channels.
    #[default]
    IfSupported,
    /// Always; generation fails on backends without host channels.
    Always,
}

/// The memory service.
pub fn ram() -> ServiceDecl {
    ServiceDecl::random_access_memory("RamI64x8", Type::Bits(64), DEPTH)
}

/// The host service mirroring the memory's operations.
pub fn mem_comms() -> ServiceDecl {
    let ram = ram();
    let mut comms = ServiceDecl::host("MemComms");
    for op in ram.operations() {
        comms = comms.with_operation_from(op.name.clone(), op);
    }
    comms
}

/// Returns the library with the default pass-through behavior.
pub fn library() -> Result<Library, BuildError> {
    library_with(HostPassThrough::IfSupported)
}

/// Returns the library of the ESI RAM system.
pub fn library_with(pass_through: HostPassThrough) -> Result<Library, BuildError> {
    let mut lib = Library::new();
    lib.add_service(ram())?;
    lib.add_service(mem_comms())?;
    lib.add_module(dummy())?;
    lib.add_module(mem_writer())?;
    lib.add_module(top(pass_through))?;
    Ok(lib)
}

/// A module with no ports and no contents.
fn dummy() -> ModuleDecl {
    ModuleDecl::new("Dummy")
}

/// Copies word 2 to word 3, once per read response.
fn mem_writer() -> ModuleDecl {
    ModuleDecl::new("MemWriter")
        .clock("clk")
        .input("rst", Type::Bits(1))
        .metadata(
            Metadata::new()
                .version("0.1")
                .with("numWriters", 1)
                .with("style", "stupid"),
        )
        .construct(construct_mem_writer)
}

fn construct_mem_writer(b: &mut ModuleBuilder<'_, '_>) -> Result<(), BuildError> {
    let ram = ram();
    let shape = ram
        .memory()
        .ok_or_else(|| InternalError::new("RamI64x8 has no memory shape"))?;
    let address_ty = Type::Bits(shape.address_width());
    let read_ty = bundle_of(&ram, "read")?;
    let write_ty = bundle_of(&ram, "write")?;

    let address = b.constant(&address_ty, SOURCE_ADDRESS)?;
    let always = b.bool(true);
    let (address, _ready) = b.wrap(&address_ty, address, always)?;
    let (read_bundle, mut read_back) = b.pack(&read_ty, vec![("address", address)])?;
    let (read_data, read_valid) = b.unwrap(read_back.take("data")?, always)?;
    b.call(&ram, "read", read_bundle, AppId::new("int_reader"))?;

    let req_ty = write_ty
        .port("req")
        .map(|(_, port)| port.payload.clone())
        .ok_or_else(|| InternalError::new("write bundle has no req role"))?;
    let target = b.constant(&address_ty, TARGET_ADDRESS)?;
    let req = b.make_struct(&req_ty, &[("data", read_data), ("address", target)])?;
    let (req, _ready) = b.wrap(&req_ty, req, read_valid)?;
    // The acknowledgement is left unconsumed.
    let (write_bundle, _acks) = b.pack(&write_ty, vec![("req", req)])?;
    b.call(&ram, "write", write_bundle, AppId::new("int_writer"))?;
    Ok(())
}

fn top(pass_through: HostPassThrough) -> ModuleDecl {
    ModuleDecl::new(TOP)
        .clock("clk")
        .input("rst", Type::Bits(1))
        .construct(move |b| {
            let ram = ram();
            let clk = b.port("clk")?;
            let rst = b.port("rst")?;
            b.instantiate("Dummy", AppId::new("dummy"), &[])?;
            b.instantiate(
                "MemWriter",
                AppId::new("mem_writer"),
                &[("clk", clk), ("rst", rst)],
            )?;

            if pass_through == HostPassThrough::Always || b.capabilities().host_channels {
                let comms = mem_comms();
                let write = b.request(&comms, "write", AppId::new("write"))?;
                b.call(&ram, "write", write, AppId::new("ram_write"))?;
                let read = b.request(&comms, "read", AppId::new("read"))?;
                b.call(&ram, "read", read, AppId::new("ram_read"))?;
            } else {
                tracing::debug!(
                    module = b.module_name(),
                    backend = %b.backend(),
                    "no host channels; skipping pass-through"
                );
            }

            b.instantiate_builtin(&ram, AppId::new("mem"), "sv_mem", &[], &[clk, rst])?;
            Ok(())
        })
}

fn bundle_of(service: &ServiceDecl, op: &str) -> Result<weft_ir::BundleType, BuildError> {
    service
        .operation(op)
        .map(|o| o.bundle.clone())
        .ok_or_else(|| BuildError::UnknownOperation {
            service: service.name().to_string(),
            operation: op.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comms_mirrors_ram_operations() {
        let ram = ram();
        let comms = mem_comms();
        let names: Vec<_> = comms.operations().iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["read", "write"]);
        assert_eq!(
            comms.operation("write").unwrap().bundle,
            ram.operation("write").unwrap().bundle
        );
    }

    #[test]
    fn library_declares_every_module() {
        let lib = library().unwrap();
        let mut names: Vec<_> = lib.module_names().collect();
        names.sort();
        assert_eq!(names, vec!["Dummy", "MemWriter", "Top"]);
        assert!(lib.service("RamI64x8").is_some());
        assert!(lib.service("MemComms").is_some());
        let writer = lib.module("MemWriter").unwrap();
        assert_eq!(
            writer.metadata_ref().and_then(|m| m.version.as_deref()),
            Some("0.1")
        );
    }

    #[test]
    fn memory_is_eight_words_of_64_bits() {
        let shape = ram().memory().cloned().unwrap();
        assert_eq!(shape.depth, DEPTH);
        assert_eq!(shape.data, Type::Bits(64));
        assert_eq!(shape.address_width(), 3);
    }
}
