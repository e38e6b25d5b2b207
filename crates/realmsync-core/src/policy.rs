//! Trusted-hosts client registration policy.
//!
//! Each realm carries a `trusted-hosts` client registration policy component.
//! Its host list is computed per environment: the loopback pair, the container
//! network gateway, and for non-local environments the application peer.
//! Discovery failures only shrink the list; a realm without the component is
//! skipped with a warning.

use std::sync::LazyLock;

use regex::Regex;

use crate::api::AdminApi;
use crate::model::Component;
use crate::settings::Environment;
use crate::topology::NetworkTopologyProvider;
use crate::upsert::{fetch_existing, replace_component};
use crate::Result;

/// Component type of client registration policies.
pub const CLIENT_REGISTRATION_POLICY_TYPE: &str =
    "org.keycloak.services.clientregistration.policy.ClientRegistrationPolicy";

/// Provider id of the trusted-hosts policy.
pub const TRUSTED_HOSTS_PROVIDER_ID: &str = "trusted-hosts";

pub const TRUSTED_HOSTS_KEY: &str = "trusted-hosts";
pub const HOST_MUST_MATCH_KEY: &str = "host-sending-registration-request-must-match";
pub const CLIENT_URIS_MUST_MATCH_KEY: &str = "client-uris-must-match";

// Some server versions report the camel-case spelling.
const HOST_MUST_MATCH_CAMEL_KEY: &str = "hostSendingRegistrationRequestMustMatch";
const CLIENT_URIS_MUST_MATCH_CAMEL_KEY: &str = "clientUrisMustMatch";

/// Hosts trusted in every environment.
pub const STATIC_TRUSTED_HOSTS: [&str; 2] = ["127.0.0.1", "localhost"];

/// Strict dotted-quad IPv4 form.
static DOTTED_QUAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}$").expect("Invalid dotted-quad regex"));

pub fn is_dotted_quad(value: &str) -> bool {
    DOTTED_QUAD.is_match(value)
}

/// Computed host list for one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedHosts {
    pub hosts: Vec<String>,
    /// Discovery problems that left addresses out of the list.
    pub degraded: Vec<String>,
}

impl TrustedHosts {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}

/// Result of the trusted-hosts phase for a realm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyOutcome {
    Updated { hosts: Vec<String> },
    /// The policy already had the requested settings.
    Unchanged,
    /// The realm has no trusted-hosts component.
    Skipped { reason: String },
}

/// Computes the trusted hosts for `environment`.
///
/// Emits a single warning when any discovery step came back empty-handed.
pub async fn resolve_trusted_hosts(
    topology: &dyn NetworkTopologyProvider,
    environment: Environment,
) -> TrustedHosts {
    let mut hosts: Vec<String> = STATIC_TRUSTED_HOSTS.iter().map(|h| h.to_string()).collect();
    let mut degraded = Vec::new();

    match topology.gateway_address().await {
        Ok(Some(gateway)) if is_dotted_quad(&gateway) => hosts.push(gateway),
        Ok(Some(gateway)) => degraded.push(format!("gateway \"{gateway}\" is not an IPv4 address")),
        Ok(None) => degraded.push("network gateway not found".to_string()),
        Err(e) => degraded.push(format!("gateway discovery failed: {e}")),
    }

    if let Some(peer) = environment.peer_service() {
        match topology.peer_address(peer).await {
            Ok(Some(address)) if is_dotted_quad(&address) => hosts.push(address),
            Ok(Some(address)) => degraded.push(format!("{peer} address \"{address}\" is not an IPv4 address")),
            Ok(None) => degraded.push(format!("no {peer} container on the network")),
            Err(e) => degraded.push(format!("{peer} discovery failed: {e}")),
        }
        hosts.push(peer.to_string());
    }

    if !degraded.is_empty() {
        tracing::warn!(
            environment = %environment,
            trusted = ?hosts,
            problems = ?degraded,
            "network discovery incomplete; trusted hosts reduced"
        );
    }
    TrustedHosts { hosts, degraded }
}

/// Locates the realm's trusted-hosts component.
pub async fn find_trusted_hosts_component(api: &dyn AdminApi, realm: &str) -> Result<Option<Component>> {
    let live = fetch_existing(api, realm).await?;
    let components = api
        .list_components(realm, live.parent_id(), CLIENT_REGISTRATION_POLICY_TYPE)
        .await?;
    Ok(components
        .into_iter()
        .find(|c| c.provider_id.as_deref() == Some(TRUSTED_HOSTS_PROVIDER_ID)))
}

/// Copy of `component` enforcing host matching and trusting exactly `hosts`.
/// Other settings and fields are kept.
pub fn with_trusted_hosts(component: &Component, hosts: &[String]) -> Component {
    let mut updated = component.clone();
    updated
        .config
        .insert(HOST_MUST_MATCH_KEY.to_string(), vec!["true".to_string()]);
    updated
        .config
        .insert(TRUSTED_HOSTS_KEY.to_string(), hosts.to_vec());
    updated
        .config
        .insert(CLIENT_URIS_MUST_MATCH_KEY.to_string(), vec!["false".to_string()]);
    updated
}

/// Copy of `component` with both must-match checks switched off, or `None`
/// when they already are.
pub fn relaxed(component: &Component) -> Option<Component> {
    let is_false = |keys: [&str; 2]| {
        keys.iter()
            .any(|key| component.setting(key) == Some(&["false".to_string()][..]))
    };
    let host_off = is_false([HOST_MUST_MATCH_KEY, HOST_MUST_MATCH_CAMEL_KEY]);
    let uris_off = is_false([CLIENT_URIS_MUST_MATCH_KEY, CLIENT_URIS_MUST_MATCH_CAMEL_KEY]);
    if host_off && uris_off {
        return None;
    }

    let mut updated = component.clone();
    for key in [
        HOST_MUST_MATCH_KEY,
        CLIENT_URIS_MUST_MATCH_KEY,
        HOST_MUST_MATCH_CAMEL_KEY,
        CLIENT_URIS_MUST_MATCH_CAMEL_KEY,
    ] {
        updated.config.insert(key.to_string(), vec!["false".to_string()]);
    }
    Some(updated)
}

fn missing_component(realm: &str) -> PolicyOutcome {
    tracing::warn!(realm, "no trusted-hosts component; skipping");
    PolicyOutcome::Skipped {
        reason: format!("no {TRUSTED_HOSTS_PROVIDER_ID} component in {realm}"),
    }
}

/// Applies the environment's trusted hosts to the realm's policy.
pub async fn ensure_trusted_hosts(
    api: &dyn AdminApi,
    topology: &dyn NetworkTopologyProvider,
    realm: &str,
    environment: Environment,
) -> Result<PolicyOutcome> {
    let Some(component) = find_trusted_hosts_component(api, realm).await? else {
        return Ok(missing_component(realm));
    };
    if component.id.is_none() {
        return Ok(missing_component(realm));
    }

    let trusted = resolve_trusted_hosts(topology, environment).await;
    let updated = with_trusted_hosts(&component, &trusted.hosts);
    replace_component(api, realm, &updated).await?;
    tracing::info!(realm, hosts = ?trusted.hosts, "trusted hosts updated");
    Ok(PolicyOutcome::Updated { hosts: trusted.hosts })
}

/// Disables both must-match checks so registration works from any host.
pub async fn relax_trusted_hosts(api: &dyn AdminApi, realm: &str) -> Result<PolicyOutcome> {
    let Some(component) = find_trusted_hosts_component(api, realm).await? else {
        return Ok(missing_component(realm));
    };
    if component.id.is_none() {
        return Ok(missing_component(realm));
    }

    match relaxed(&component) {
        None => {
            tracing::info!(realm, "trusted hosts already relaxed");
            Ok(PolicyOutcome::Unchanged)
        }
        Some(updated) => {
            replace_component(api, realm, &updated).await?;
            tracing::info!(realm, "trusted hosts relaxed");
            let hosts = updated.setting(TRUSTED_HOSTS_KEY).unwrap_or_default().to_vec();
            Ok(PolicyOutcome::Updated { hosts })
        }
    }
}
