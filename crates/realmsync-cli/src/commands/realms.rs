use anyhow::Result;

use realmsync_core::{EnsureOutcome, Reconciler};

use crate::output::{delete_message, print_success, print_warning};

pub async fn ensure(reconciler: &Reconciler<'_>) -> Result<()> {
    let report = reconciler.ensure_only().await?;
    for realm in &report.realms {
        match (&realm.skipped, realm.ensure) {
            (Some(reason), _) => print_warning(&format!("{}: {reason}", realm.realm)),
            (None, Some(EnsureOutcome::Created)) => print_success(&format!("Created realm {}", realm.realm)),
            (None, Some(EnsureOutcome::Present | EnsureOutcome::Conflict)) => {
                print_success(&format!("Realm {} already exists, skipped", realm.realm))
            }
            (None, None) => {}
        }
    }
    Ok(())
}

pub async fn delete(reconciler: &Reconciler<'_>) -> Result<()> {
    for (realm, outcome) in reconciler.delete_all().await? {
        print_success(&delete_message(&realm, outcome));
    }
    Ok(())
}
