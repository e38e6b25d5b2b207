use anyhow::Result;

use realmsync_core::Reconciler;

use crate::output::{print_json, print_merge_summary, print_run_report, print_success, print_warning};

pub async fn sync(reconciler: &Reconciler<'_>) -> Result<()> {
    let report = reconciler.run().await?;
    print_run_report(&report);
    for warning in report.warnings() {
        print_warning(&warning);
    }
    let converged = report.realms.iter().filter(|r| r.converged()).count();
    print_success(&format!("{converged} of {} realm(s) converged", report.realms.len()));
    Ok(())
}

pub async fn plan(reconciler: &Reconciler<'_>, documents: bool) -> Result<()> {
    for plan in reconciler.plan().await? {
        let Some(merged) = plan.merged else {
            print_warning(&format!("{}: no document, skipped", plan.realm));
            continue;
        };
        print_merge_summary(&plan.realm, plan.exists, merged.summary());
        if documents {
            print_json(&merged.to_value());
        }
    }
    Ok(())
}
