//! `weft backends`: list the backend presets and their capabilities.

use weft_build::backend_for;
use weft_config::BackendPreset;

/// Runs the `weft backends` command, printing one preset per line to stdout.
pub fn run() -> Result<i32, Box<dyn std::error::Error>> {
    for preset in BackendPreset::ALL {
        println!("{}", describe(preset));
    }
    Ok(0)
}

fn describe(preset: BackendPreset) -> String {
    let backend = backend_for(preset);
    let caps = backend.capabilities();
    format!(
        "{:6} host channels: {:3}  arbitration: {:14}  builtins: {}",
        preset.as_str(),
        if caps.host_channels { "yes" } else { "no" },
        backend.default_arbitration().as_str(),
        caps.builtins.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosim_bridges_host_channels() {
        let line = describe(BackendPreset::Cosim);
        assert!(line.starts_with("cosim"));
        assert!(line.contains("host channels: yes"));
        assert!(line.contains("arbitration: round-robin"));
        assert!(line.contains("sv_mem"));
    }

    #[test]
    fn xrt_has_no_host_channels() {
        let line = describe(BackendPreset::Xrt);
        assert!(line.contains("host channels: no"));
        assert!(line.contains("arbitration: fixed-priority"));
    }
}
