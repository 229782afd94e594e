//! Configuration types deserialized from `weft.toml`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The top-level configuration parsed from `weft.toml`.
#[derive(Debug, Deserialize)]
pub struct ProjectConfig {
    /// System metadata (name, version, which design to build).
    pub system: SystemMeta,
    /// Named targets, each selecting a backend preset.
    #[serde(default)]
    pub targets: BTreeMap<String, TargetConfig>,
    /// Build output settings.
    #[serde(default)]
    pub build: BuildConfig,
    /// Simulator settings.
    #[serde(default)]
    pub sim: SimConfig,
}

/// The `[system]` table.
#[derive(Debug, Deserialize)]
pub struct SystemMeta {
    /// The system name; also the base name of generated artifacts.
    pub name: String,
    /// Version string recorded in the manifest.
    #[serde(default = "default_version")]
    pub version: String,
    /// Name of the design (root module library) to build.
    pub design: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

/// A `[targets.<name>]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// The backend preset this target builds for.
    pub backend: BackendPreset,
    /// Overrides the backend's default arbitration policy.
    #[serde(default)]
    pub arbitration: Option<Arbitration>,
    /// Overrides the output directory for this target.
    #[serde(default)]
    pub output_dir: Option<String>,
}

/// The `[build]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildConfig {
    /// Root output directory, relative to the project root. Targets build into
    /// `<output_dir>/<target>` unless they override it.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> String {
    "build".to_string()
}

/// The `[sim]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct SimConfig {
    /// Number of clock cycles `weft sim` runs when not told otherwise.
    #[serde(default = "default_max_cycles")]
    pub max_cycles: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            max_cycles: default_max_cycles(),
        }
    }
}

fn default_max_cycles() -> u64 {
    64
}

/// A backend preset: the target-specific implementation of the lowering and
/// packaging stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreset {
    /// Co-simulation: host channels are bridged to a software driver.
    Cosim,
    /// FPGA accelerator card deployment through XRT.
    Xrt,
}

impl BackendPreset {
    /// Every preset, in display order.
    pub const ALL: [BackendPreset; 2] = [BackendPreset::Cosim, BackendPreset::Xrt];

    /// Returns the configuration spelling of this preset.
    pub fn as_str(self) -> &'static str {
        match self {
            BackendPreset::Cosim => "cosim",
            BackendPreset::Xrt => "xrt",
        }
    }

    /// Parses a preset name as spelled in `weft.toml` or on the command line.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "cosim" => Some(BackendPreset::Cosim),
            "xrt" => Some(BackendPreset::Xrt),
            _ => None,
        }
    }
}

impl fmt::Display for BackendPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How several service instances share one builtin resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Arbitration {
    /// The lowest-numbered requesting client always wins.
    FixedPriority,
    /// The grant rotates past the most recently served client.
    RoundRobin,
}

impl Arbitration {
    /// Returns the configuration spelling of this policy.
    pub fn as_str(self) -> &'static str {
        match self {
            Arbitration::FixedPriority => "fixed-priority",
            Arbitration::RoundRobin => "round-robin",
        }
    }
}

impl fmt::Display for Arbitration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_config_from_str;

    const BASE: &str = r#"
[system]
name = "ESIMem"
design = "esi_ram"
"#;

    #[test]
    fn backend_presets_deserialize() {
        for (input, expected) in [("cosim", BackendPreset::Cosim), ("xrt", BackendPreset::Xrt)] {
            let toml = format!("{BASE}\n[targets.t]\nbackend = \"{input}\"\n");
            let config = load_config_from_str(&toml).unwrap();
            assert_eq!(config.targets["t"].backend, expected);
        }
    }

    #[test]
    fn arbitration_kebab_case() {
        let toml = format!(
            "{BASE}\n[targets.t]\nbackend = \"xrt\"\narbitration = \"round-robin\"\n"
        );
        let config = load_config_from_str(&toml).unwrap();
        assert_eq!(config.targets["t"].arbitration, Some(Arbitration::RoundRobin));
    }

    #[test]
    fn unknown_backend_is_parse_error() {
        let toml = format!("{BASE}\n[targets.t]\nbackend = \"asic\"\n");
        assert!(load_config_from_str(&toml).is_err());
    }

    #[test]
    fn preset_parse_and_display() {
        assert_eq!(BackendPreset::parse("XRT"), Some(BackendPreset::Xrt));
        assert_eq!(BackendPreset::parse("verilator"), None);
        assert_eq!(BackendPreset::Cosim.to_string(), "cosim");
        assert_eq!(Arbitration::FixedPriority.to_string(), "fixed-priority");
    }

    #[test]
    fn arbitration_serializes_like_config() {
        let json = serde_json::to_string(&Arbitration::RoundRobin).unwrap();
        assert_eq!(json, "\"round-robin\"");
    }
}
