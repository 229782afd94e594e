//! `weft build`: generate, compile and package the configured system.
//!
//! Loads `weft.toml`, selects a target, builds the catalog design named by
//! `system.design` with that target's backend preset, and writes the package
//! into the target's output directory.

use weft_build::{BuildError, System};

use crate::pipeline::{render_diagnostics, Project};
use crate::{BuildArgs, GlobalArgs};

/// Runs the `weft build` command.
///
/// Returns exit code 0 when the package was written, 1 when any stage failed.
pub fn run(args: &BuildArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = Project::load(global, args.target.as_deref())?;
    let mut system = project.system()?;

    if !global.quiet {
        eprintln!("   Building {} v{}", system.name(), system.version());
        eprintln!(
            "    Target {} ({}, {})",
            project.target.name,
            project.target.backend,
            system.arbitration()
        );
        eprintln!("    Design {} ({})", project.design.name, project.design.top);
    }

    let result = run_stages(&mut system);
    let diagnostics = system.diagnostics();
    if !global.quiet || result.is_err() {
        render_diagnostics(&diagnostics, args.format, global.color);
    }

    if let Err((stage, e)) = result {
        eprintln!(
            "error: could not build `{}` ({stage} failed: {e})",
            system.name()
        );
        return Ok(1);
    }

    if !global.quiet {
        print_summary(&system, global.verbose);
    }
    Ok(0)
}

/// Runs the three stages, naming the one that failed.
fn run_stages(system: &mut System) -> Result<(), (&'static str, BuildError)> {
    system.generate().map_err(|e| ("generate", e))?;
    system.compile().map_err(|e| ("compile", e))?;
    system.package().map_err(|e| ("package", e))?;
    Ok(())
}

fn print_summary(system: &System, verbose: bool) {
    if let Some(compiled) = system.compiled() {
        eprintln!(
            "   Generated {} instances of {} modules",
            compiled.graph.instance_count(),
            compiled.graph.module_count()
        );
        eprintln!(
            "    Compiled {} builtin(s), {} host endpoint(s), fingerprint {}",
            compiled.services.builtins.len(),
            compiled.services.hosts.len(),
            compiled.fingerprint
        );
    }
    if let Some(report) = system.report() {
        eprintln!(
            "    Packaged {} files ({} bytes) into {}",
            report.files.len(),
            report.total_size(),
            report.output_dir.display()
        );
        if verbose {
            for file in &report.files {
                eprintln!("             {} ({} bytes, {})", file.path.display(), file.size, file.hash);
            }
        }
    }
    let warnings = system.sink().warning_count();
    if warnings > 0 {
        eprintln!("    Finished with {warnings} warning(s)");
    }
}
