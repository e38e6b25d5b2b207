//! Container network discovery for trusted-host computation.
//!
//! [`DockerTopology`] shells out to `docker network inspect`; [`StaticTopology`]
//! answers from fixed values, for tests and hosts without a container engine.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Deserialize;
use tokio::process::Command;

use crate::policy::is_dotted_quad;

/// Why a discovery call produced no answer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    /// The inspection tool could not be started.
    #[error("network inspection unavailable: {0}")]
    Unavailable(String),

    #[error("network inspection exited with {status}: {stderr}")]
    CommandFailed { status: String, stderr: String },

    #[error("network inspection timed out after {0:?}")]
    Timeout(Duration),

    #[error("unreadable network inspection output: {0}")]
    Parse(String),
}

/// Answers questions about the network the realms' peers run on.
#[async_trait]
pub trait NetworkTopologyProvider: Send + Sync {
    /// Gateway address of the network, as reported.
    async fn gateway_address(&self) -> Result<Option<String>, TopologyError>;

    /// Address of the first container whose name contains `name_hint`.
    async fn peer_address(&self, name_hint: &str) -> Result<Option<String>, TopologyError>;
}

/// Inspects a Docker network with the `docker` CLI.
#[derive(Debug, Clone)]
pub struct DockerTopology {
    program: String,
    network: String,
    timeout: Duration,
}

impl DockerTopology {
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            program: "docker".to_string(),
            network: network.into(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Uses another executable with the same CLI (e.g. `podman`).
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    async fn inspect(&self, format: &str) -> Result<String, TopologyError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(["network", "inspect", self.network.as_str(), "--format", format])
            .kill_on_drop(true);
        tracing::debug!(program = %self.program, network = %self.network, format, "inspecting network");

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| TopologyError::Timeout(self.timeout))?
            .map_err(|e| TopologyError::Unavailable(format!("{}: {e}", self.program)))?;

        if !output.status.success() {
            return Err(TopologyError::CommandFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl NetworkTopologyProvider for DockerTopology {
    async fn gateway_address(&self) -> Result<Option<String>, TopologyError> {
        let out = self.inspect("{{(index .IPAM.Config 0).Gateway}}").await?;
        Ok(Some(out).filter(|gateway| !gateway.is_empty()))
    }

    async fn peer_address(&self, name_hint: &str) -> Result<Option<String>, TopologyError> {
        let out = self.inspect("{{json .Containers}}").await?;
        parse_container_address(&out, name_hint)
    }
}

#[derive(Debug, Deserialize)]
struct ContainerEntry {
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "IPv4Address", default)]
    ipv4_address: String,
}

/// Finds the address of the first container, in reported order, whose name
/// contains `name_hint` and which has an IPv4 address in the
/// `{{json .Containers}}` output. The CIDR suffix is dropped.
pub fn parse_container_address(output: &str, name_hint: &str) -> Result<Option<String>, TopologyError> {
    if output.is_empty() || output == "null" {
        return Ok(None);
    }
    let containers: IndexMap<String, ContainerEntry> =
        serde_json::from_str(output).map_err(|e| TopologyError::Parse(e.to_string()))?;
    Ok(containers
        .into_values()
        .filter(|c| c.name.contains(name_hint))
        .filter_map(|c| c.ipv4_address.split('/').next().map(str::to_string))
        .find(|address| is_dotted_quad(address)))
}

/// Fixed answers; `unavailable` makes every call fail like a missing engine.
#[derive(Debug, Clone, Default)]
pub struct StaticTopology {
    gateway: Option<String>,
    peers: BTreeMap<String, String>,
    unavailable: bool,
}

impl StaticTopology {
    pub fn new() -> Self {
        Self::default()
    }

    /// A topology whose every lookup fails.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_gateway(mut self, gateway: impl Into<String>) -> Self {
        self.gateway = Some(gateway.into());
        self
    }

    #[must_use]
    pub fn with_peer(mut self, name: impl Into<String>, address: impl Into<String>) -> Self {
        self.peers.insert(name.into(), address.into());
        self
    }

    fn check(&self) -> Result<(), TopologyError> {
        if self.unavailable {
            return Err(TopologyError::Unavailable("static topology marked unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl NetworkTopologyProvider for StaticTopology {
    async fn gateway_address(&self) -> Result<Option<String>, TopologyError> {
        self.check()?;
        Ok(self.gateway.clone())
    }

    async fn peer_address(&self, name_hint: &str) -> Result<Option<String>, TopologyError> {
        self.check()?;
        Ok(self
            .peers
            .iter()
            .find(|(name, _)| name.contains(name_hint))
            .map(|(_, address)| address.clone()))
    }
}
