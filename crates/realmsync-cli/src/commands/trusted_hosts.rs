use anyhow::Result;
use colored::Colorize;

use realmsync_core::policy::{PolicyOutcome, find_trusted_hosts_component};
use realmsync_core::{AdminApi, Reconciler};

use crate::cli::TrustedHostsArgs;
use crate::output::{print_json, print_success, print_warning};

pub async fn trusted_hosts(api: &dyn AdminApi, reconciler: &Reconciler<'_>, args: &TrustedHostsArgs) -> Result<()> {
    if args.print_config {
        return print_config(api, &args.realm).await;
    }

    match reconciler.trusted_hosts(&args.realm, args.relax).await? {
        PolicyOutcome::Updated { hosts } if args.relax => print_success(&format!(
            "{}: host checks relaxed (trusted hosts: {})",
            args.realm,
            hosts.join(", ")
        )),
        PolicyOutcome::Updated { hosts } => {
            print_success(&format!("{}: trusted hosts set to {}", args.realm, hosts.join(", ")))
        }
        PolicyOutcome::Unchanged => print_success(&format!("{}: host checks already relaxed", args.realm)),
        PolicyOutcome::Skipped { reason } => print_warning(&reason),
    }
    Ok(())
}

async fn print_config(api: &dyn AdminApi, realm: &str) -> Result<()> {
    match find_trusted_hosts_component(api, realm).await? {
        None => print_warning(&format!("No trusted-hosts component in {realm}")),
        Some(component) => {
            println!(
                "{} {} ({})",
                "Component:".cyan(),
                component.name.as_deref().unwrap_or("-"),
                component.id.as_deref().unwrap_or("-")
            );
            print_json(&serde_json::to_value(&component.config)?);
        }
    }
    Ok(())
}
