//! Realm reconciliation engine for Keycloak-compatible admin APIs.
//!
//! This crate converges the live configuration of a set of realms to the
//! documents declared for them, without console edits and without forking
//! server-assigned identities:
//! - Loads one desired realm document per managed realm ([`loader`])
//! - Discovers current remote state through the admin API ([`client`])
//! - Merges desired into current under a field-ownership policy ([`merge`])
//! - Applies the merge with a create-then-replace upsert ([`upsert`])
//! - Computes environment-scoped trusted hosts ([`policy`], [`topology`])
//! - Ensures test users with a forced password ([`fixture`])
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Reconciler                            │
//! │  ┌──────────┐   ┌──────────┐   ┌─────────┐   ┌────────────┐  │
//! │  │  Loader  │──▶│ AdminApi │──▶│  Merge  │──▶│   Upsert   │  │
//! │  └──────────┘   └────┬─────┘   └─────────┘   └────────────┘  │
//! │                      │                                        │
//! │            ┌─────────┴─────────┐                              │
//! │            ▼                   ▼                              │
//! │     Policy Resolver    Fixture Provisioner                    │
//! │            │                                                  │
//! │    NetworkTopologyProvider                                    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every phase is idempotent or tolerant of "already done", so recovery
//! from a failed run is a full re-run.

pub mod api;
pub mod client;
pub mod fixture;
pub mod loader;
pub mod merge;
pub mod model;
pub mod policy;
pub mod run;
pub mod settings;
pub mod topology;
pub mod upsert;

#[cfg(test)]
pub(crate) mod testing;

use std::path::PathBuf;

pub use api::{AdminApi, CreateOutcome, DeleteOutcome};
pub use client::AdminClient;
pub use fixture::FixtureOutcome;
pub use loader::DocumentLoader;
pub use merge::{CollectionSummary, MergeSummary, MergedRealm, merge_realm};
pub use model::{CollectionKind, Component, DesiredRealm, LiveRealm, SubEntity};
pub use policy::{PolicyOutcome, TrustedHosts};
pub use run::{RealmPlan, RealmReport, Reconciler, RunReport};
pub use settings::{ConnectionSettings, Environment, FixtureCredentials, ManagedRealm, Settings};
pub use topology::{DockerTopology, NetworkTopologyProvider, StaticTopology, TopologyError};
pub use upsert::EnsureOutcome;

/// Errors raised while reconciling realms.
///
/// Every variant is fatal for the run. Recoverable conditions (a conflict on
/// create, a missing optional component) are modelled as outcomes instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The token endpoint rejected the admin credentials.
    #[error("admin token request failed (HTTP {status}): {body}")]
    Authentication { status: u16, body: String },

    /// A read call returned anything other than success or an expected 404.
    #[error("{call} failed (HTTP {status}): {body}")]
    Discovery {
        call: String,
        status: u16,
        body: String,
    },

    /// A mutating call returned an unexpected status.
    #[error("{call} failed (HTTP {status}): {body}")]
    Remote {
        call: String,
        status: u16,
        body: String,
    },

    /// A realm document could not be read or parsed.
    #[error("malformed realm document {}: {reason}", path.display())]
    MalformedDocument { path: PathBuf, reason: String },

    /// The request never produced a response (connect error, timeout).
    #[error("{call}: {source}")]
    Transport {
        call: String,
        #[source]
        source: reqwest::Error,
    },

    /// A success response whose body did not have the expected shape.
    #[error("unexpected response from {call}: {reason}")]
    InvalidResponse { call: String, reason: String },

    /// Invalid run inputs, such as an unmanaged realm or a bad base URL.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedDocument {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_response(call: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            call: call.into(),
            reason: reason.into(),
        }
    }

    /// HTTP status attached to the error, if the remote answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Authentication { status, .. }
            | Self::Discovery { status, .. }
            | Self::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type for reconciliation operations
pub type Result<T> = std::result::Result<T, Error>;
