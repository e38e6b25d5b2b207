//! Two-phase idempotent apply: ensure the realm exists, then converge it with
//! a full replace of the merged document.
//!
//! The create endpoint only needs an identity-establishing payload; the full
//! configuration is applied by the replace, which is where identity
//! preservation has to hold.

use serde_json::{Value, json};

use crate::api::{AdminApi, CreateOutcome};
use crate::merge::{MergedRealm, merge_realm};
use crate::model::{Component, DesiredRealm, LiveRealm};
use crate::{Error, Result};

/// How the ensure-exists phase concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The realm was already listed; no create call was made.
    Present,
    /// The realm was created with defaults.
    Created,
    /// The create call answered 409; someone else created it meanwhile.
    Conflict,
}

/// Ensures `realm` exists, creating it with defaults if it is not in
/// `known_realms`.
pub async fn ensure_realm(
    api: &dyn AdminApi,
    realm: &str,
    known_realms: &[String],
) -> Result<EnsureOutcome> {
    if known_realms.iter().any(|known| known == realm) {
        return Ok(EnsureOutcome::Present);
    }
    match api.create_realm(&minimal_realm(realm)).await? {
        CreateOutcome::Created { .. } => {
            tracing::info!(realm, "created realm with defaults");
            Ok(EnsureOutcome::Created)
        }
        CreateOutcome::AlreadyExists => {
            tracing::info!(realm, "realm already exists (409), converging existing state");
            Ok(EnsureOutcome::Conflict)
        }
    }
}

/// Payload for the create call.
pub fn minimal_realm(realm: &str) -> Value {
    json!({"realm": realm, "enabled": true})
}

/// Fetches the live realm. It must exist at this point.
pub async fn fetch_existing(api: &dyn AdminApi, realm: &str) -> Result<LiveRealm> {
    api.fetch_realm(realm).await?.ok_or_else(|| Error::Discovery {
        call: format!("GET realm {realm}"),
        status: 404,
        body: "realm not found".to_string(),
    })
}

/// Computes the merge for `desired` without applying it.
pub async fn plan_realm(api: &dyn AdminApi, desired: &DesiredRealm) -> Result<MergedRealm> {
    let current = fetch_existing(api, desired.name()).await?;
    Ok(merge_realm(&current, desired))
}

/// Fetches, merges and replaces the realm.
pub async fn converge_realm(api: &dyn AdminApi, desired: &DesiredRealm) -> Result<MergedRealm> {
    let merged = plan_realm(api, desired).await?;
    api.replace_realm(merged.name(), &merged.to_value()).await?;

    let summary = merged.summary();
    for collection in &summary.collections {
        tracing::info!(
            realm = merged.name(),
            collection = %collection.kind,
            matched = collection.matched.len(),
            added = collection.added.len(),
            dropped = collection.dropped.len(),
            "collection replaced"
        );
    }
    tracing::info!(
        realm = merged.name(),
        scalars = summary.scalars.len(),
        changed = summary.changed,
        "realm updated"
    );
    Ok(merged)
}

/// Creates the realm from its full document when it is missing. Existing
/// realms are left untouched.
pub async fn create_if_missing(
    api: &dyn AdminApi,
    desired: &DesiredRealm,
    known_realms: &[String],
) -> Result<EnsureOutcome> {
    if known_realms.iter().any(|known| known == desired.name()) {
        return Ok(EnsureOutcome::Present);
    }
    let mut representation = desired.source().clone();
    representation
        .entry("realm")
        .or_insert_with(|| Value::String(desired.name().to_string()));
    match api.create_realm(&Value::Object(representation)).await? {
        CreateOutcome::Created { .. } => Ok(EnsureOutcome::Created),
        CreateOutcome::AlreadyExists => Ok(EnsureOutcome::Conflict),
    }
}

/// Full replace of a component that was read from the server.
pub async fn replace_component(api: &dyn AdminApi, realm: &str, component: &Component) -> Result<()> {
    if component.id.is_none() {
        return Err(Error::config(format!("component in realm {realm} has no id")));
    }
    api.replace_component(realm, component).await
}
