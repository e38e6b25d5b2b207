use colored::Colorize;
use serde_json::Value;
use tabled::builder::Builder;
use tabled::settings::Style;

use realmsync_core::{
    CollectionKind, DeleteOutcome, EnsureOutcome, FixtureOutcome, MergeSummary, PolicyOutcome, RealmReport,
    RunReport,
};

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_warning(msg: &str) {
    eprintln!("{} {}", "!".yellow(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_json(value: &Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

pub fn print_run_report(report: &RunReport) {
    if report.realms.is_empty() {
        println!("No realms managed.");
        return;
    }
    let mut builder = Builder::default();
    builder.push_record(["Realm", "Env", "State", "Clients", "Flows", "Trusted hosts", "Fixture"]);
    for realm in &report.realms {
        builder.push_record(report_row(realm));
    }
    let table = builder.build().with(Style::rounded()).to_string();
    println!("{table}");
}

fn report_row(realm: &RealmReport) -> [String; 7] {
    let (clients, flows) = match &realm.merge {
        Some(summary) => (
            collection_cell(summary, CollectionKind::Clients),
            collection_cell(summary, CollectionKind::AuthenticationFlows),
        ),
        None => ("-".to_string(), "-".to_string()),
    };
    let state = match (&realm.skipped, realm.ensure) {
        (Some(_), _) => "skipped".to_string(),
        (None, Some(ensure)) => ensure_cell(ensure, realm.merge.as_ref()),
        (None, None) => "-".to_string(),
    };
    [
        realm.realm.clone(),
        realm.environment.to_string(),
        state,
        clients,
        flows,
        realm.policy.as_ref().map(policy_cell).unwrap_or_else(|| "-".to_string()),
        realm.fixture.as_ref().map(fixture_cell).unwrap_or_else(|| "-".to_string()),
    ]
}

fn ensure_cell(ensure: EnsureOutcome, merge: Option<&MergeSummary>) -> String {
    let created = match ensure {
        EnsureOutcome::Present => None,
        EnsureOutcome::Created => Some("created"),
        EnsureOutcome::Conflict => Some("exists (409)"),
    };
    match (created, merge.map(|m| m.changed)) {
        (Some(created), _) => created.to_string(),
        (None, Some(true)) => "updated".to_string(),
        (None, Some(false)) => "unchanged".to_string(),
        (None, None) => "present".to_string(),
    }
}

fn collection_cell(summary: &MergeSummary, kind: CollectionKind) -> String {
    match summary.collection(kind) {
        Some(c) => format!(
            "{} kept, {} new, {} dropped",
            c.matched.len(),
            c.added.len(),
            c.dropped.len()
        ),
        None => "not declared".to_string(),
    }
}

fn policy_cell(policy: &PolicyOutcome) -> String {
    match policy {
        PolicyOutcome::Updated { hosts } => hosts.join(", "),
        PolicyOutcome::Unchanged => "unchanged".to_string(),
        PolicyOutcome::Skipped { .. } => "skipped".to_string(),
    }
}

fn fixture_cell(fixture: &FixtureOutcome) -> String {
    match fixture {
        FixtureOutcome::Created { .. } => "created".to_string(),
        FixtureOutcome::Existing { .. } => "password reset".to_string(),
    }
}

pub fn print_merge_summary(realm: &str, exists: bool, summary: &MergeSummary) {
    let header = if exists {
        realm.cyan().to_string()
    } else {
        format!("{} {}", realm.cyan(), "(will be created)".yellow())
    };
    println!("{header}");
    if summary.scalars.is_empty() {
        println!("  scalars: none");
    } else {
        println!("  scalars: {}", summary.scalars.join(", "));
    }
    for collection in &summary.collections {
        println!("  {}: {}", collection.kind, collection_cell(summary, collection.kind));
        for key in &collection.dropped {
            println!("    {} {}", "-".red(), key);
        }
        for key in &collection.added {
            println!("    {} {}", "+".green(), key);
        }
    }
    if !summary.changed {
        println!("  {}", "no changes".dimmed());
    }
}

pub fn delete_message(realm: &str, outcome: DeleteOutcome) -> String {
    match outcome {
        DeleteOutcome::Deleted => format!("Deleted realm {realm}"),
        DeleteOutcome::NotFound => format!("Realm {realm} not found, skipped"),
    }
}
