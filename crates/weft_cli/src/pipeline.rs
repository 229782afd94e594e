//! Shared pipeline helpers for CLI commands.
//!
//! Contains what `build` and `sim` have in common: project root resolution,
//! loading `weft.toml` into a [`Project`], turning it into a [`System`],
//! diagnostic rendering, and parsing `NAME=VALUE` command-line assignments.

use std::path::{Path, PathBuf};

use weft_build::System;
use weft_config::{ProjectConfig, ResolvedTarget, CONFIG_FILE};
use weft_designs::DesignEntry;
use weft_diagnostics::{Diagnostic, DiagnosticRenderer, JsonRenderer, TerminalRenderer};

use crate::{GlobalArgs, ReportFormat};

/// Walks up from `start` looking for the nearest directory containing `weft.toml`.
pub fn find_project_root(start: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_FILE).exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(format!(
                "could not find {CONFIG_FILE} in {} or any parent directory",
                start.display()
            )
            .into());
        }
    }
}

/// Resolves the project root directory from global CLI args.
///
/// If `--config` is specified, uses that path (file → parent dir, dir → itself).
/// Otherwise walks up from the current directory looking for `weft.toml`.
pub fn resolve_project_root(global: &GlobalArgs) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(ref config_path) = global.config {
        let p = PathBuf::from(config_path);
        if p.is_file() {
            Ok(p.parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")))
        } else {
            Ok(p)
        }
    } else {
        find_project_root(&std::env::current_dir()?)
    }
}

/// A loaded project with its target resolved and its design looked up.
pub struct Project {
    /// Directory holding `weft.toml`.
    pub dir: PathBuf,
    /// The parsed configuration.
    pub config: ProjectConfig,
    /// The selected target.
    pub target: ResolvedTarget,
    /// The catalog entry named by `system.design`.
    pub design: &'static DesignEntry,
}

impl Project {
    /// Loads the project from the global args and selects `target`.
    pub fn load(
        global: &GlobalArgs,
        target: Option<&str>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let dir = resolve_project_root(global)?;
        let config = weft_config::load_config(&dir)?;
        let target = weft_config::resolve_target(&config, target)?;
        let design = weft_designs::find(&config.system.design).ok_or_else(|| {
            let known: Vec<_> = weft_designs::catalog().iter().map(|d| d.name).collect();
            format!(
                "unknown design '{}' (available: {})",
                config.system.design,
                known.join(", ")
            )
        })?;
        tracing::debug!(
            root = %dir.display(),
            target = %target.name,
            design = design.name,
            "loaded project"
        );
        Ok(Self {
            dir,
            config,
            target,
            design,
        })
    }

    /// Absolute output directory of the selected target.
    pub fn output_dir(&self) -> PathBuf {
        self.target.output_dir_in(&self.dir)
    }

    /// Creates the system to build.
    pub fn system(&self) -> Result<System, Box<dyn std::error::Error>> {
        let system = self
            .design
            .system(
                &self.config.system.name,
                self.target.backend,
                self.target.arbitration,
                &self.output_dir(),
            )?
            .with_version(&self.config.system.version);
        Ok(system)
    }
}

/// Renders diagnostics to stderr and returns how many were printed.
pub fn render_diagnostics(diagnostics: &[Diagnostic], format: ReportFormat, color: bool) -> usize {
    let renderer: Box<dyn DiagnosticRenderer> = match format {
        ReportFormat::Text => Box::new(TerminalRenderer::new(color)),
        ReportFormat::Json => Box::new(JsonRenderer),
    };
    for diag in diagnostics {
        eprintln!("{}", renderer.render(diag));
    }
    diagnostics.len()
}

/// Splits `NAME=VALUE` and parses the value as an unsigned integer.
///
/// Hexadecimal values take a `0x` prefix.
pub fn parse_assignment(text: &str) -> Result<(&str, u64), Box<dyn std::error::Error>> {
    let (name, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{text}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing name in '{text}'").into());
    }
    Ok((name, parse_number(value.trim())?))
}

/// Splits `PATH:ADDRESS=VALUE` into its parts.
pub fn parse_poke(text: &str) -> Result<(&str, u64, u64), Box<dyn std::error::Error>> {
    let (location, value) = parse_assignment(text)?;
    let (path, address) = location
        .rsplit_once(':')
        .ok_or_else(|| format!("expected PATH:ADDRESS=VALUE, got '{text}'"))?;
    Ok((path, parse_number(address)?, value))
}

fn parse_number(text: &str) -> Result<u64, Box<dyn std::error::Error>> {
    let parsed = match text.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{text}': {e}").into())
}
