//! The cosimulation preset.
//!
//! Host channels are bridged through the simulator, so every host endpoint is
//! listed in `cosim/endpoints.json` for the host-side software to connect to.

use super::{common_artifacts, Artifact, Backend, Capabilities, LoweringInput};
use crate::errors::BuildError;
use serde::Serialize;
use weft_common::InternalError;
use weft_config::{Arbitration, BackendPreset};
use weft_ir::{ChannelDirection, ServiceRole};

const CAPABILITIES: Capabilities = Capabilities {
    host_channels: true,
    builtins: &["sv_mem"],
};

/// Backend for software cosimulation.
#[derive(Debug, Default, Clone, Copy)]
pub struct CosimBackend;

#[derive(Serialize)]
struct EndpointTable<'a> {
    system: &'a str,
    endpoints: Vec<Endpoint>,
}

#[derive(Serialize)]
struct Endpoint {
    path: String,
    service: String,
    operation: String,
    role: ServiceRole,
    channels: Vec<EndpointChannel>,
}

#[derive(Serialize)]
struct EndpointChannel {
    name: String,
    /// Direction as seen from the host.
    direction: &'static str,
    #[serde(rename = "type")]
    ty: String,
}

impl Backend for CosimBackend {
    fn preset(&self) -> BackendPreset {
        BackendPreset::Cosim
    }

    fn capabilities(&self) -> Capabilities {
        CAPABILITIES
    }

    fn default_arbitration(&self) -> Arbitration {
        Arbitration::RoundRobin
    }

    fn lower(&self, input: &LoweringInput<'_>) -> Result<Vec<Artifact>, BuildError> {
        let mut artifacts = common_artifacts(input)?;

        let mut endpoints = Vec::with_capacity(input.services.hosts.len());
        for host in &input.services.hosts {
            let decl = input
                .graph
                .services
                .iter()
                .find(|s| s.name() == host.service)
                .ok_or_else(|| InternalError::new(format!("no service '{}'", host.service)))?;
            let op = decl.operation(&host.operation).ok_or_else(|| {
                InternalError::new(format!(
                    "service '{}' has no operation '{}'",
                    host.service, host.operation
                ))
            })?;
            let channels = op
                .bundle
                .ports
                .iter()
                .map(|port| {
                    let sends = match host.role {
                        ServiceRole::Client => port.direction == ChannelDirection::ToService,
                        ServiceRole::Server => port.direction == ChannelDirection::FromService,
                    };
                    EndpointChannel {
                        name: port.name.clone(),
                        direction: if sends { "send" } else { "recv" },
                        ty: port.payload.to_string(),
                    }
                })
                .collect();
            endpoints.push(Endpoint {
                path: host.path.to_string(),
                service: host.service.clone(),
                operation: host.operation.clone(),
                role: host.role,
                channels,
            });
        }

        let table = EndpointTable {
            system: input.system_name,
            endpoints,
        };
        let json = serde_json::to_string_pretty(&table)
            .map_err(|e| InternalError::new(format!("cannot serialize endpoint table: {e}")))?;
        artifacts.push(Artifact::text("cosim/endpoints.json", json));
        Ok(artifacts)
    }
}
