//! The XRT preset for accelerator cards.
//!
//! The accelerator shell exposes no host channels, so designs must keep all
//! traffic on-chip. Lowering adds a kernel description listing each builtin
//! memory and the runtime's ini file.

use super::{common_artifacts, Artifact, Backend, Capabilities, LoweringInput};
use crate::errors::BuildError;
use std::fmt::Write as _;
use weft_config::{Arbitration, BackendPreset};

const CAPABILITIES: Capabilities = Capabilities {
    host_channels: false,
    builtins: &["sv_mem"],
};

/// Backend for Xilinx runtime accelerator cards.
#[derive(Debug, Default, Clone, Copy)]
pub struct XrtBackend;

impl Backend for XrtBackend {
    fn preset(&self) -> BackendPreset {
        BackendPreset::Xrt
    }

    fn capabilities(&self) -> Capabilities {
        CAPABILITIES
    }

    fn default_arbitration(&self) -> Arbitration {
        Arbitration::FixedPriority
    }

    fn lower(&self, input: &LoweringInput<'_>) -> Result<Vec<Artifact>, BuildError> {
        let mut artifacts = common_artifacts(input)?;
        artifacts.push(Artifact::text("xrt/kernel.xml", kernel_xml(input)));
        artifacts.push(Artifact::text("xrt/xrt.ini", xrt_ini(input.system_name)));
        Ok(artifacts)
    }
}

fn kernel_xml(input: &LoweringInput<'_>) -> String {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str("<root versionMajor=\"1\" versionMinor=\"6\">\n");
    let _ = writeln!(
        xml,
        "  <kernel name=\"{}\" language=\"ip_c\" arbitration=\"{}\" fingerprint=\"{}\">",
        escape(input.system_name),
        input.arbitration,
        input.manifest.fingerprint
    );
    xml.push_str("    <ports>\n");
    xml.push_str(
        "      <port name=\"s_axi_control\" mode=\"slave\" range=\"0x10000\" dataWidth=\"32\" portType=\"addressable\" base=\"0x0\"/>\n",
    );
    xml.push_str("    </ports>\n");
    xml.push_str("    <memories>\n");
    for builtin in &input.services.builtins {
        let shape = input.graph.service(builtin.service).memory();
        let (width, depth) = shape
            .map(|m| (m.data.bit_width().unwrap_or(0), m.depth))
            .unwrap_or((0, 0));
        let _ = writeln!(
            xml,
            "      <memory path=\"{}\" service=\"{}\" impl=\"{}\" dataWidth=\"{}\" depth=\"{}\" clients=\"{}\"/>",
            escape(&builtin.path.to_string()),
            escape(&builtin.service_name),
            escape(&builtin.tag),
            width,
            depth,
            builtin.clients.len()
        );
    }
    xml.push_str("    </memories>\n");
    xml.push_str("  </kernel>\n");
    xml.push_str("</root>\n");
    xml
}

fn xrt_ini(system_name: &str) -> String {
    format!(
        "# Runtime settings for {system_name}\n[Runtime]\nruntime_log=console\n\n[Debug]\nnative_xrt_trace=false\n"
    )
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
        assert_eq!(escape("Top.mem"), "Top.mem");
    }

    #[test]
    fn ini_has_runtime_section() {
        let ini = xrt_ini("ESIMem");
        assert!(ini.starts_with("# Runtime settings for ESIMem\n"));
        assert!(ini.contains("[Runtime]\n"));
    }
}
