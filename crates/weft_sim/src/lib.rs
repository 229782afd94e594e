//! Cycle-based handshake simulator for compiled Weft designs.
//!
//! The simulator takes a [`CompiledDesign`](weft_build::CompiledDesign) and
//! runs it one clock cycle at a time. Expressions and handshake signals are
//! settled combinationally each cycle; a transfer happens on every channel
//! whose `valid` and `ready` are both high. Builtin memories (`sv_mem`) and
//! host endpoints are behavioral models clocked at the end of each cycle.
//!
//! # Usage
//!
//! ```ignore
//! use weft_sim::{SimValue, Simulator};
//!
//! let mut sim = Simulator::new(system.compiled().unwrap(), system.interner())?;
//! sim.poke_memory("Top.mem", 2, SimValue::Bits(42))?;
//! sim.run(16)?;
//! assert_eq!(sim.memory("Top.mem")?[3], SimValue::Bits(42));
//! ```
//!
//! # Modules
//!
//! - `value`: Runtime values
//! - `models`: Memory and host endpoint models
//! - `eval`: Per-cycle combinational evaluation
//! - `monitor`: Handshake stability checking
//! - `simulator`: The cycle loop and host-facing API

#![warn(missing_docs)]

pub mod error;
mod eval;
pub mod models;
pub mod monitor;
pub mod simulator;
pub mod value;

pub use error::SimError;
pub use models::MemPort;
pub use monitor::{Violation, ViolationKind};
pub use simulator::{simulate, SimResult, Simulator, SV_MEM};
pub use value::SimValue;
