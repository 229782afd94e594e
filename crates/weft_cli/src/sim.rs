//! `weft sim`: run the configured system in the cycle simulator.
//!
//! Generates and compiles the system for the selected target (nothing is
//! packaged), applies `--poke` and `--input` stimulus, runs for `--cycles`
//! (or `sim.max_cycles`) and prints every memory's contents to stdout.
//! Handshake violations go to stderr and make the command fail.

use weft_sim::{SimResult, SimValue, Simulator};

use crate::pipeline::{parse_assignment, parse_poke, render_diagnostics, Project};
use crate::{GlobalArgs, ReportFormat, SimArgs};

/// Runs the `weft sim` command.
///
/// Returns exit code 0 if the run finished without handshake violations,
/// 1 otherwise.
pub fn run(args: &SimArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = Project::load(global, args.target.as_deref())?;
    let mut system = project.system()?;
    let cycles = args.cycles.unwrap_or(project.config.sim.max_cycles);

    if !global.quiet {
        eprintln!(
            "  Simulating {} ({}, {} cycles)",
            system.name(),
            project.target.name,
            cycles
        );
    }

    let compiled = system
        .generate()
        .map(|_| ())
        .and_then(|()| system.compile().map(|_| ()));
    if let Err(e) = compiled {
        render_diagnostics(&system.diagnostics(), ReportFormat::Text, global.color);
        eprintln!("error: could not compile `{}`: {e}", system.name());
        return Ok(1);
    }
    let design = system.compiled().ok_or("compiled system has no design")?;

    let mut sim = Simulator::with_arbitration(design, system.interner(), || {
        system.arbitration_policy()
    })?;
    apply_stimulus(&mut sim, args)?;
    let result = sim.run(cycles)?;

    print_memories(&sim);
    report(&sim, &result, global);
    Ok(if sim.violations().is_empty() { 0 } else { 1 })
}

/// Applies `--poke` and `--input` assignments before the first cycle.
fn apply_stimulus(sim: &mut Simulator, args: &SimArgs) -> Result<(), Box<dyn std::error::Error>> {
    for poke in &args.poke {
        let (path, address, value) = parse_poke(poke)?;
        sim.poke_memory(path, address, SimValue::Bits(value))?;
    }
    for input in &args.input {
        let (name, value) = parse_assignment(input)?;
        sim.set_input(name, SimValue::Bits(value))?;
    }
    Ok(())
}

fn print_memories(sim: &Simulator) {
    for path in sim.memory_paths() {
        println!("{path}:");
        if let Ok(words) = sim.memory(path) {
            for (address, word) in words.iter().enumerate() {
                println!("  [{address}] {word}");
            }
        }
    }
}

fn report(sim: &Simulator, result: &SimResult, global: &GlobalArgs) {
    for violation in sim.violations() {
        eprintln!("warning: handshake violation at {violation}");
    }
    if !global.quiet {
        eprintln!(
            "    Finished {} cycles, {} transfers, {} violation(s)",
            result.cycles, result.transfers, result.violations
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::{global_for, write_project};
    use weft_config::BackendPreset;

    fn args(pokes: &[&str], inputs: &[&str]) -> SimArgs {
        SimArgs {
            target: Some("cosim".to_string()),
            cycles: Some(8),
            poke: pokes.iter().map(|s| s.to_string()).collect(),
            input: inputs.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn esi_ram_sim(dir: &std::path::Path) -> Simulator {
        let mut system = weft_designs::find("esi_ram")
            .unwrap()
            .system("ESIMem", BackendPreset::Cosim, None, dir)
            .unwrap();
        system.generate().unwrap();
        system.compile().unwrap();
        Simulator::new(system.compiled().unwrap(), system.interner()).unwrap()
    }

    #[test]
    fn sim_runs_clean() {
        let dir = tempfile::tempdir().unwrap();
        write_project(dir.path());
        let code = run(&args(&["Top.mem:2=5"], &["rst=0"]), &global_for(dir.path())).unwrap();
        assert_eq!(code, 0);
    }

    #[test]
    fn stimulus_reaches_the_simulator() {
        let dir = tempfile::tempdir().unwrap();
        let mut sim = esi_ram_sim(&dir.path().join("out"));
        apply_stimulus(&mut sim, &args(&["Top.mem:2=0x2a"], &["rst=0"])).unwrap();
        assert_eq!(sim.memory("Top.mem").unwrap()[2], SimValue::Bits(42));

        sim.run(8).unwrap();
        assert_eq!(sim.memory("Top.mem").unwrap()[3].as_bits(), Some(42));
    }

    #[test]
    fn bad_stimulus_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut sim = esi_ram_sim(&dir.path().join("out"));
        assert!(apply_stimulus(&mut sim, &args(&["Top.mem:8=1"], &[])).is_err());
        assert!(apply_stimulus(&mut sim, &args(&["Top.nowhere:0=1"], &[])).is_err());
        assert!(apply_stimulus(&mut sim, &args(&[], &["enable=1"])).is_err());
    }

    #[test]
    fn unknown_memory_fails_the_command() {
        let dir = tempfile::tempdir().unwrap();
        write_project(dir.path());
        let err = run(&args(&["Top.ram:0=1"], &[]), &global_for(dir.path())).unwrap_err();
        assert!(err.to_string().contains("Top.ram"), "{err}");
    }
}
