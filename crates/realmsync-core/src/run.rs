//! The run loop.
//!
//! A full run is phase-major: every realm is ensured and converged first,
//! then the trusted-hosts policy is applied to every converged realm, then
//! fixture users are provisioned. All documents are loaded before the first
//! remote mutation, so a malformed document aborts the run with nothing
//! changed.

use crate::api::{AdminApi, DeleteOutcome};
use crate::fixture::{FixtureOutcome, ensure_fixture_user};
use crate::loader::DocumentLoader;
use crate::merge::{MergeSummary, MergedRealm, merge_realm};
use crate::model::{DesiredRealm, LiveRealm};
use crate::policy::{PolicyOutcome, ensure_trusted_hosts, relax_trusted_hosts};
use crate::settings::{Environment, ManagedRealm, Settings};
use crate::topology::NetworkTopologyProvider;
use crate::upsert::{EnsureOutcome, converge_realm, create_if_missing, ensure_realm, minimal_realm};
use crate::{Error, Result};

/// Per-realm record of what a run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealmReport {
    pub realm: String,
    pub environment: Environment,
    /// Why the realm was left alone, if it was.
    pub skipped: Option<String>,
    pub ensure: Option<EnsureOutcome>,
    pub merge: Option<MergeSummary>,
    pub policy: Option<PolicyOutcome>,
    pub fixture: Option<FixtureOutcome>,
}

impl RealmReport {
    fn new(realm: &ManagedRealm) -> Self {
        Self {
            realm: realm.name.clone(),
            environment: realm.environment,
            skipped: None,
            ensure: None,
            merge: None,
            policy: None,
            fixture: None,
        }
    }

    /// Whether the realm went through the converge phase.
    pub fn converged(&self) -> bool {
        self.merge.is_some()
    }
}

/// Outcome of a full run, one entry per managed realm in declared order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub realms: Vec<RealmReport>,
}

impl RunReport {
    pub fn realm(&self, name: &str) -> Option<&RealmReport> {
        self.realms.iter().find(|r| r.realm == name)
    }

    /// Warnings worth repeating to the operator after the run.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for report in &self.realms {
            if let Some(reason) = &report.skipped {
                warnings.push(format!("{}: {reason}", report.realm));
            }
            if let Some(PolicyOutcome::Skipped { reason }) = &report.policy {
                warnings.push(format!("{}: {reason}", report.realm));
            }
        }
        warnings
    }
}

/// Dry-run result for one realm.
#[derive(Debug, Clone)]
pub struct RealmPlan {
    pub realm: String,
    /// Whether the realm exists remotely; if not the merge is against a
    /// freshly created realm.
    pub exists: bool,
    /// `None` when the realm has no document.
    pub merged: Option<MergedRealm>,
}

/// Drives the phases for every managed realm.
pub struct Reconciler<'a> {
    api: &'a dyn AdminApi,
    topology: &'a dyn NetworkTopologyProvider,
    settings: &'a Settings,
    loader: DocumentLoader,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        api: &'a dyn AdminApi,
        topology: &'a dyn NetworkTopologyProvider,
        settings: &'a Settings,
    ) -> Self {
        Self {
            api,
            topology,
            settings,
            loader: DocumentLoader::new(&settings.import_dir),
        }
    }

    fn managed(&self, name: &str) -> Result<&'a ManagedRealm> {
        self.settings
            .realm(name)
            .ok_or_else(|| Error::config(format!("realm \"{name}\" is not managed")))
    }

    fn load_all(&self) -> Result<Vec<(&'a ManagedRealm, Option<DesiredRealm>)>> {
        self.settings
            .realms
            .iter()
            .map(|realm| Ok((realm, self.loader.load(realm)?)))
            .collect()
    }

    fn missing_document(&self, realm: &ManagedRealm) -> String {
        let path = self.loader.path_for(realm);
        tracing::warn!(realm = %realm.name, path = %path.display(), "realm document not found; skipping");
        format!("document {} not found", path.display())
    }

    /// Runs all phases for all managed realms.
    pub async fn run(&self) -> Result<RunReport> {
        let documents = self.load_all()?;
        let known = self.api.list_realms().await?;
        tracing::debug!(realms = ?known, "remote realms");

        let mut report = RunReport::default();
        for (realm, desired) in &documents {
            let mut entry = RealmReport::new(realm);
            match desired {
                None => entry.skipped = Some(self.missing_document(realm)),
                Some(desired) => {
                    tracing::info!(realm = %realm.name, "converging realm");
                    entry.ensure = Some(ensure_realm(self.api, &realm.name, &known).await?);
                    let merged = converge_realm(self.api, desired).await?;
                    entry.merge = Some(merged.summary().clone());
                }
            }
            report.realms.push(entry);
        }

        for entry in report.realms.iter_mut().filter(|e| e.converged()) {
            let outcome =
                ensure_trusted_hosts(self.api, self.topology, &entry.realm, entry.environment).await?;
            entry.policy = Some(outcome);
        }

        for (entry, (realm, _)) in report.realms.iter_mut().zip(&documents) {
            if entry.converged() && realm.fixtures {
                let outcome = ensure_fixture_user(self.api, &realm.name, &self.settings.fixture).await?;
                entry.fixture = Some(outcome);
            }
        }

        Ok(report)
    }

    /// Computes the merge for every realm without mutating anything.
    pub async fn plan(&self) -> Result<Vec<RealmPlan>> {
        let documents = self.load_all()?;
        let mut plans = Vec::with_capacity(documents.len());
        for (realm, desired) in documents {
            let Some(desired) = desired else {
                self.missing_document(realm);
                plans.push(RealmPlan {
                    realm: realm.name.clone(),
                    exists: false,
                    merged: None,
                });
                continue;
            };
            let (exists, current) = match self.api.fetch_realm(&realm.name).await? {
                Some(current) => (true, current),
                None => (
                    false,
                    LiveRealm::from_value(&realm.name, minimal_realm(&realm.name)).map_err(Error::config)?,
                ),
            };
            plans.push(RealmPlan {
                realm: realm.name.clone(),
                exists,
                merged: Some(merge_realm(&current, &desired)),
            });
        }
        Ok(plans)
    }

    /// Creates missing realms from their full documents; existing realms are
    /// not touched.
    pub async fn ensure_only(&self) -> Result<RunReport> {
        let documents = self.load_all()?;
        let known = self.api.list_realms().await?;

        let mut report = RunReport::default();
        for (realm, desired) in &documents {
            let mut entry = RealmReport::new(realm);
            match desired {
                None => entry.skipped = Some(self.missing_document(realm)),
                Some(desired) => {
                    let outcome = create_if_missing(self.api, desired, &known).await?;
                    match outcome {
                        EnsureOutcome::Present => tracing::info!(realm = %realm.name, "realm exists; skipping"),
                        EnsureOutcome::Created => tracing::info!(realm = %realm.name, "realm created"),
                        EnsureOutcome::Conflict => {
                            tracing::info!(realm = %realm.name, "realm created concurrently (409); skipping")
                        }
                    }
                    entry.ensure = Some(outcome);
                }
            }
            report.realms.push(entry);
        }
        Ok(report)
    }

    /// Deletes every managed realm.
    pub async fn delete_all(&self) -> Result<Vec<(String, DeleteOutcome)>> {
        let mut outcomes = Vec::with_capacity(self.settings.realms.len());
        for realm in &self.settings.realms {
            let outcome = self.api.delete_realm(&realm.name).await?;
            match outcome {
                DeleteOutcome::Deleted => tracing::info!(realm = %realm.name, "realm deleted"),
                DeleteOutcome::NotFound => tracing::info!(realm = %realm.name, "realm not found; skipping"),
            }
            outcomes.push((realm.name.clone(), outcome));
        }
        Ok(outcomes)
    }

    /// Applies the trusted-hosts policy to one realm, or relaxes it.
    pub async fn trusted_hosts(&self, realm: &str, relax: bool) -> Result<PolicyOutcome> {
        let managed = self.managed(realm)?;
        if relax {
            relax_trusted_hosts(self.api, &managed.name).await
        } else {
            ensure_trusted_hosts(self.api, self.topology, &managed.name, managed.environment).await
        }
    }

    /// Provisions the fixture user in one realm.
    pub async fn fixture(&self, realm: &str) -> Result<FixtureOutcome> {
        let managed = self.managed(realm)?;
        if !managed.fixtures {
            return Err(Error::config(format!(
                "realm \"{realm}\" ({}) does not receive fixture users",
                managed.environment
            )));
        }
        ensure_fixture_user(self.api, &managed.name, &self.settings.fixture).await
    }
}
