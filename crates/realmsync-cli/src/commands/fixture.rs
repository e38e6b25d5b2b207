use anyhow::Result;

use realmsync_core::{FixtureOutcome, Reconciler};

use crate::output::print_success;

pub async fn fixture(reconciler: &Reconciler<'_>, realm: &str, username: &str) -> Result<()> {
    match reconciler.fixture(realm).await? {
        FixtureOutcome::Created { .. } => print_success(&format!("{realm}: created test user {username}")),
        FixtureOutcome::Existing { .. } => {
            print_success(&format!("{realm}: test user {username} exists, password reset"))
        }
    }
    Ok(())
}
