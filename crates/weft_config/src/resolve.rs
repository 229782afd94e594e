//! Target resolution: picking a target and merging its overrides.

use crate::error::ConfigError;
use crate::types::{Arbitration, BackendPreset, ProjectConfig};
use std::path::{Path, PathBuf};

/// A target with every default filled in.
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    /// The target name.
    pub name: String,
    /// The backend preset to build with.
    pub backend: BackendPreset,
    /// Arbitration override; `None` keeps the backend's default.
    pub arbitration: Option<Arbitration>,
    /// Output directory relative to the project root.
    pub output_dir: PathBuf,
}

impl ResolvedTarget {
    /// Returns the output directory anchored at `project_dir`.
    pub fn output_dir_in(&self, project_dir: &Path) -> PathBuf {
        if self.output_dir.is_absolute() {
            self.output_dir.clone()
        } else {
            project_dir.join(&self.output_dir)
        }
    }
}

/// Resolves a target by name, or the only target when `name` is `None`.
///
/// The output directory is the target's own `output_dir` if set, otherwise
/// `<build.output_dir>/<target>`.
pub fn resolve_target(
    config: &ProjectConfig,
    name: Option<&str>,
) -> Result<ResolvedTarget, ConfigError> {
    let name = match name {
        Some(name) => name.to_string(),
        None => {
            let names: Vec<_> = config.targets.keys().collect();
            match names.len() {
                0 => {
                    return Err(ConfigError::AmbiguousTarget(
                        "no targets defined in weft.toml; add a [targets.<name>] section"
                            .to_string(),
                    ))
                }
                1 => names[0].clone(),
                _ => {
                    return Err(ConfigError::AmbiguousTarget(format!(
                        "multiple targets defined ({}); use --target to select one",
                        names
                            .iter()
                            .map(|s| s.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    )))
                }
            }
        }
    };

    let target = config
        .targets
        .get(&name)
        .ok_or_else(|| ConfigError::UnknownTarget(name.clone()))?;

    let output_dir = match &target.output_dir {
        Some(dir) => PathBuf::from(dir),
        None => PathBuf::from(&config.build.output_dir).join(&name),
    };

    Ok(ResolvedTarget {
        name,
        backend: target.backend,
        arbitration: target.arbitration,
        output_dir,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_config_from_str;

    const TWO_TARGETS: &str = r#"
[system]
name = "ESIMem"
design = "esi_ram"

[targets.cosim]
backend = "cosim"

[targets.u250]
backend = "xrt"
arbitration = "round-robin"
output_dir = "/tmp/u250"
"#;

    #[test]
    fn resolve_named_target() {
        let config = load_config_from_str(TWO_TARGETS).unwrap();
        let resolved = resolve_target(&config, Some("cosim")).unwrap();
        assert_eq!(resolved.backend, BackendPreset::Cosim);
        assert_eq!(resolved.arbitration, None);
        assert_eq!(resolved.output_dir, PathBuf::from("build/cosim"));
    }

    #[test]
    fn target_overrides_apply() {
        let config = load_config_from_str(TWO_TARGETS).unwrap();
        let resolved = resolve_target(&config, Some("u250")).unwrap();
        assert_eq!(resolved.arbitration, Some(Arbitration::RoundRobin));
        assert_eq!(
            resolved.output_dir_in(Path::new("/project")),
            PathBuf::from("/tmp/u250")
        );
    }

    #[test]
    fn relative_output_dir_anchored() {
        let config = load_config_from_str(TWO_TARGETS).unwrap();
        let resolved = resolve_target(&config, Some("cosim")).unwrap();
        assert_eq!(
            resolved.output_dir_in(Path::new("/project")),
            PathBuf::from("/project/build/cosim")
        );
    }

    #[test]
    fn unknown_target_errors() {
        let config = load_config_from_str(TWO_TARGETS).unwrap();
        let err = resolve_target(&config, Some("vcu118")).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTarget(_)));
    }

    #[test]
    fn ambiguous_without_name() {
        let config = load_config_from_str(TWO_TARGETS).unwrap();
        let err = resolve_target(&config, None).unwrap_err();
        assert!(err.to_string().contains("cosim, u250"));
    }

    #[test]
    fn single_target_auto_selected() {
        let toml = "[system]\nname = \"x\"\ndesign = \"d\"\n[targets.only]\nbackend = \"xrt\"\n";
        let config = load_config_from_str(toml).unwrap();
        let resolved = resolve_target(&config, None).unwrap();
        assert_eq!(resolved.name, "only");
    }

    #[test]
    fn no_targets_errors() {
        let config = load_config_from_str("[system]\nname = \"x\"\ndesign = \"d\"\n").unwrap();
        assert!(matches!(
            resolve_target(&config, None).unwrap_err(),
            ConfigError::AmbiguousTarget(_)
        ));
    }
}
